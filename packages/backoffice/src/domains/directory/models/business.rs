use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, QueryBuilder};
use typed_builder::TypedBuilder;

use crate::common::BusinessId;

// ============================================================================
// Enums
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default,
)]
#[sqlx(type_name = "approval_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

// ============================================================================
// BusinessRecord
// ============================================================================

/// A business listing in the directory.
///
/// `duplicate_of_id` is a weak reference to the surviving primary after a
/// merge: it never owns the referenced record, and a referenced primary must
/// not itself carry one (merges reject chain-forming primaries).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct BusinessRecord {
    #[builder(default = BusinessId::new())]
    pub id: BusinessId,

    pub name: String,

    // Identity fields (all optional - sources are incomplete)
    #[builder(default, setter(strip_option))]
    pub phone: Option<String>,
    #[builder(default, setter(strip_option))]
    pub email: Option<String>,
    #[builder(default, setter(strip_option))]
    pub website: Option<String>,
    #[builder(default, setter(strip_option))]
    pub abn: Option<String>,
    #[builder(default, setter(strip_option))]
    pub bio: Option<String>,
    #[builder(default, setter(strip_option))]
    pub suburb: Option<String>,
    #[builder(default, setter(strip_option))]
    pub category: Option<String>,

    // Moderation state
    #[builder(default)]
    pub approval_status: ApprovalStatus,
    #[builder(default = 0.0)]
    pub quality_score: f64,
    #[builder(default = false)]
    pub ownership_verified: bool,
    #[builder(default, setter(strip_option))]
    pub duplicate_of_id: Option<BusinessId>,

    // Timestamps
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl BusinessRecord {
    /// True once the record has been resolved as a duplicate of another.
    pub fn is_marked_duplicate(&self) -> bool {
        self.duplicate_of_id.is_some()
    }
}

// ============================================================================
// Filter criteria and bulk field updates (typed, no open config bags)
// ============================================================================

/// One criterion in an ordered target filter. Criteria combine with AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum FilterCriterion {
    Status { value: ApprovalStatus },
    Category { value: String },
    Suburb { value: String },
    QualityAtLeast { value: f64 },
    QualityBelow { value: f64 },
    MissingAbn,
    /// Records not already resolved as duplicates.
    Unresolved,
}

impl FilterCriterion {
    /// In-memory evaluation, mirroring the SQL each criterion compiles to.
    pub fn matches(&self, record: &BusinessRecord) -> bool {
        match self {
            Self::Status { value } => record.approval_status == *value,
            Self::Category { value } => record.category.as_deref() == Some(value.as_str()),
            Self::Suburb { value } => record
                .suburb
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(value)),
            Self::QualityAtLeast { value } => record.quality_score >= *value,
            Self::QualityBelow { value } => record.quality_score < *value,
            Self::MissingAbn => record.abn.as_deref().map_or(true, |a| a.is_empty()),
            Self::Unresolved => record.duplicate_of_id.is_none(),
        }
    }
}

/// Field values applied by a bulk-update operation.
///
/// At least one field must be set; operation creation refuses an empty
/// update, so one can never reach the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub category: Option<String>,
    pub suburb: Option<String>,
    pub quality_score: Option<f64>,
}

impl FieldUpdate {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.suburb.is_none() && self.quality_score.is_none()
    }
}

// ============================================================================
// SQL Queries - ALL queries must be in models/
// ============================================================================

impl BusinessRecord {
    /// Find a business by ID
    pub async fn find_by_id(id: BusinessId, pool: &PgPool) -> Result<Option<Self>> {
        let record = sqlx::query_as::<_, Self>("SELECT * FROM businesses WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(record)
    }

    /// Find businesses by ID set (order follows the input ids)
    pub async fn find_by_ids(ids: &[BusinessId], pool: &PgPool) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, Self>("SELECT * FROM businesses WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(pool)
            .await?;
        // ANY() loses input order; restore it for deterministic batching
        let mut by_id: std::collections::HashMap<BusinessId, Self> =
            rows.into_iter().map(|r| (r.id, r)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Insert a new business
    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        let record = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO businesses (
                id, name, phone, email, website, abn, bio, suburb, category,
                approval_status, quality_score, ownership_verified, duplicate_of_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.phone)
        .bind(&self.email)
        .bind(&self.website)
        .bind(&self.abn)
        .bind(&self.bio)
        .bind(&self.suburb)
        .bind(&self.category)
        .bind(self.approval_status)
        .bind(self.quality_score)
        .bind(self.ownership_verified)
        .bind(self.duplicate_of_id)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(pool)
        .await?;
        Ok(record)
    }

    /// Update a business (full row)
    pub async fn update(&self, pool: &PgPool) -> Result<Self> {
        let record = sqlx::query_as::<_, Self>(
            r#"
            UPDATE businesses
            SET name = $2,
                phone = $3,
                email = $4,
                website = $5,
                abn = $6,
                bio = $7,
                suburb = $8,
                category = $9,
                approval_status = $10,
                quality_score = $11,
                ownership_verified = $12,
                duplicate_of_id = $13,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.phone)
        .bind(&self.email)
        .bind(&self.website)
        .bind(&self.abn)
        .bind(&self.bio)
        .bind(&self.suburb)
        .bind(&self.category)
        .bind(self.approval_status)
        .bind(self.quality_score)
        .bind(self.ownership_verified)
        .bind(self.duplicate_of_id)
        .fetch_one(pool)
        .await?;
        Ok(record)
    }

    /// Records sharing at least one strong identity signal with the given
    /// normalized values. SQL narrows the pool; the dedup domain re-verifies
    /// every match with its own predicates before scoring.
    pub async fn find_strong_matches(
        exclude_id: BusinessId,
        norm_phone: Option<&str>,
        norm_email: Option<&str>,
        norm_website: Option<&str>,
        norm_abn: Option<&str>,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM businesses
            WHERE id != $1
              AND (
                ($2::text IS NOT NULL AND regexp_replace(coalesce(phone, ''), '\D', '', 'g') = $2)
                OR ($3::text IS NOT NULL AND lower(coalesce(email, '')) = $3)
                OR ($4::text IS NOT NULL AND lower(coalesce(website, '')) LIKE '%' || $4 || '%')
                OR ($5::text IS NOT NULL AND regexp_replace(coalesce(abn, ''), '\D', '', 'g') = $5)
              )
            ORDER BY id
            "#,
        )
        .bind(exclude_id)
        .bind(norm_phone)
        .bind(norm_email)
        .bind(norm_website)
        .bind(norm_abn)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Same-suburb pool for loose (fuzzy-name) matching.
    pub async fn find_by_suburb(
        exclude_id: BusinessId,
        suburb: &str,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM businesses
            WHERE id != $1 AND lower(coalesce(suburb, '')) = lower($2)
            ORDER BY id
            "#,
        )
        .bind(exclude_id)
        .bind(suburb)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Find businesses matching an ordered criteria list (AND semantics).
    pub async fn find_by_criteria(criteria: &[FilterCriterion], pool: &PgPool) -> Result<Vec<Self>> {
        let mut qb: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT * FROM businesses WHERE TRUE");
        for criterion in criteria {
            match criterion {
                FilterCriterion::Status { value } => {
                    qb.push(" AND approval_status = ");
                    qb.push_bind(*value);
                }
                FilterCriterion::Category { value } => {
                    qb.push(" AND category = ");
                    qb.push_bind(value.clone());
                }
                FilterCriterion::Suburb { value } => {
                    qb.push(" AND lower(coalesce(suburb, '')) = lower(");
                    qb.push_bind(value.clone());
                    qb.push(")");
                }
                FilterCriterion::QualityAtLeast { value } => {
                    qb.push(" AND quality_score >= ");
                    qb.push_bind(*value);
                }
                FilterCriterion::QualityBelow { value } => {
                    qb.push(" AND quality_score < ");
                    qb.push_bind(*value);
                }
                FilterCriterion::MissingAbn => {
                    qb.push(" AND (abn IS NULL OR abn = '')");
                }
                FilterCriterion::Unresolved => {
                    qb.push(" AND duplicate_of_id IS NULL");
                }
            }
        }
        qb.push(" ORDER BY id");
        let rows = qb.build_query_as::<Self>().fetch_all(pool).await?;
        Ok(rows)
    }

    /// Set approval status for an id set as one atomic statement.
    /// Returns the number of rows affected.
    pub async fn update_status_by_ids(
        ids: &[BusinessId],
        status: ApprovalStatus,
        pool: &PgPool,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE businesses
            SET approval_status = $1, updated_at = NOW()
            WHERE id = ANY($2)
            "#,
        )
        .bind(status)
        .bind(ids)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Apply a bulk field update to an id set as one atomic statement.
    pub async fn apply_field_update_by_ids(
        ids: &[BusinessId],
        update: &FieldUpdate,
        pool: &PgPool,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE businesses
            SET category = COALESCE($1, category),
                suburb = COALESCE($2, suburb),
                quality_score = COALESCE($3, quality_score),
                updated_at = NOW()
            WHERE id = ANY($4)
            "#,
        )
        .bind(&update.category)
        .bind(&update.suburb)
        .bind(update.quality_score)
        .bind(ids)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let record = BusinessRecord::builder().name("Glebe Hardware").build();
        assert_eq!(record.approval_status, ApprovalStatus::Pending);
        assert_eq!(record.quality_score, 0.0);
        assert!(record.duplicate_of_id.is_none());
        assert!(!record.is_marked_duplicate());
    }

    #[test]
    fn test_field_update_emptiness() {
        assert!(FieldUpdate::default().is_empty());
        let update = FieldUpdate {
            category: Some("trades".to_string()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
