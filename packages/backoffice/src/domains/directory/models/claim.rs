use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::{BusinessId, ClaimId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "claim_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

/// An ownership claim lodged by someone asserting they run the business.
///
/// Child record: merges relink claims from duplicates onto the primary.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OwnershipClaim {
    pub id: ClaimId,
    pub business_id: BusinessId,
    pub claimant_email: String,
    pub status: ClaimStatus,
    pub created_at: DateTime<Utc>,
}

impl OwnershipClaim {
    pub fn new(business_id: BusinessId, claimant_email: &str) -> Self {
        Self {
            id: ClaimId::new(),
            business_id,
            claimant_email: claimant_email.to_string(),
            status: ClaimStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// SQL Queries - ALL queries must be in models/
// ============================================================================

impl OwnershipClaim {
    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        let claim = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO ownership_claims (id, business_id, claimant_email, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.business_id)
        .bind(&self.claimant_email)
        .bind(self.status)
        .bind(self.created_at)
        .fetch_one(pool)
        .await?;
        Ok(claim)
    }

    pub async fn count_for_business(business_id: BusinessId, pool: &PgPool) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ownership_claims WHERE business_id = $1")
                .bind(business_id)
                .fetch_one(pool)
                .await?;
        Ok(count.0)
    }
}
