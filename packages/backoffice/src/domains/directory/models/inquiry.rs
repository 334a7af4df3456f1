use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::{BusinessId, InquiryId};

/// A customer inquiry against a business listing.
///
/// Child record: merges relink inquiries from duplicates onto the primary so
/// no inquiry ever points at a rejected duplicate.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Inquiry {
    pub id: InquiryId,
    pub business_id: BusinessId,
    pub contact_email: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Inquiry {
    pub fn new(business_id: BusinessId, contact_email: &str, message: &str) -> Self {
        Self {
            id: InquiryId::new(),
            business_id,
            contact_email: contact_email.to_string(),
            message: message.to_string(),
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// SQL Queries - ALL queries must be in models/
// ============================================================================

impl Inquiry {
    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        let inquiry = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO inquiries (id, business_id, contact_email, message, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.business_id)
        .bind(&self.contact_email)
        .bind(&self.message)
        .bind(self.created_at)
        .fetch_one(pool)
        .await?;
        Ok(inquiry)
    }

    pub async fn count_for_business(business_id: BusinessId, pool: &PgPool) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM inquiries WHERE business_id = $1")
                .bind(business_id)
                .fetch_one(pool)
                .await?;
        Ok(count.0)
    }
}
