//! Postgres implementations of the kernel traits.
//!
//! Bridges the `Base*` traits to the model queries (SQL lives in models/).
//! The transactional paths that span tables - merge application and snapshot
//! restore - are written inline here, since the transaction boundary belongs
//! to the adapter, not to any single model.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::common::{AuditEntry, BackofficeError, BackofficeResult, BusinessId, OperationId, SnapshotId};
use crate::domains::bulk_ops::models::{BulkOperation, Snapshot, SnapshotEntry};
use crate::domains::dedup::models::{MergeApplied, MergePlan};
use crate::domains::dedup::utils::confidence;
use crate::domains::directory::models::{
    ApprovalStatus, BusinessRecord, FieldUpdate, FilterCriterion, Inquiry, OwnershipClaim,
};
use crate::kernel::{BaseAuditSink, BaseDirectoryStore, ChildCounts};

fn to_storage(err: anyhow::Error) -> BackofficeError {
    BackofficeError::Storage(err.to_string())
}

// =============================================================================
// PgDirectoryStore
// =============================================================================

pub struct PgDirectoryStore {
    pool: PgPool,
}

impl PgDirectoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseDirectoryStore for PgDirectoryStore {
    async fn find_business(&self, id: BusinessId) -> BackofficeResult<Option<BusinessRecord>> {
        BusinessRecord::find_by_id(id, &self.pool)
            .await
            .map_err(to_storage)
    }

    async fn find_businesses(&self, ids: &[BusinessId]) -> BackofficeResult<Vec<BusinessRecord>> {
        BusinessRecord::find_by_ids(ids, &self.pool)
            .await
            .map_err(to_storage)
    }

    async fn insert_business(&self, record: &BusinessRecord) -> BackofficeResult<BusinessRecord> {
        record.insert(&self.pool).await.map_err(to_storage)
    }

    async fn update_business(&self, record: &BusinessRecord) -> BackofficeResult<BusinessRecord> {
        record.update(&self.pool).await.map_err(to_storage)
    }

    async fn find_by_criteria(
        &self,
        criteria: &[FilterCriterion],
    ) -> BackofficeResult<Vec<BusinessRecord>> {
        BusinessRecord::find_by_criteria(criteria, &self.pool)
            .await
            .map_err(to_storage)
    }

    async fn find_strong_matches(
        &self,
        target: &BusinessRecord,
    ) -> BackofficeResult<Vec<BusinessRecord>> {
        let norm = |value: &Option<String>, f: fn(&str) -> Option<String>| {
            value.as_deref().and_then(f)
        };
        BusinessRecord::find_strong_matches(
            target.id,
            norm(&target.phone, confidence::normalize_phone).as_deref(),
            norm(&target.email, confidence::normalize_email).as_deref(),
            norm(&target.website, confidence::normalize_website).as_deref(),
            norm(&target.abn, confidence::normalize_abn).as_deref(),
            &self.pool,
        )
        .await
        .map_err(to_storage)
    }

    async fn find_loose_pool(
        &self,
        target: &BusinessRecord,
    ) -> BackofficeResult<Vec<BusinessRecord>> {
        match target.suburb.as_deref() {
            Some(suburb) if !suburb.trim().is_empty() => {
                BusinessRecord::find_by_suburb(target.id, suburb, &self.pool)
                    .await
                    .map_err(to_storage)
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn update_status_by_ids(
        &self,
        ids: &[BusinessId],
        status: ApprovalStatus,
    ) -> BackofficeResult<u64> {
        BusinessRecord::update_status_by_ids(ids, status, &self.pool)
            .await
            .map_err(to_storage)
    }

    async fn apply_field_update_by_ids(
        &self,
        ids: &[BusinessId],
        update: &FieldUpdate,
    ) -> BackofficeResult<u64> {
        BusinessRecord::apply_field_update_by_ids(ids, update, &self.pool)
            .await
            .map_err(to_storage)
    }

    async fn apply_merge(&self, plan: &MergePlan) -> BackofficeResult<MergeApplied> {
        let mut tx = self.pool.begin().await?;

        // Backfill the primary one field at a time. Column names come from
        // the BackfillField enum, never from input.
        for (field, value) in &plan.backfill {
            let sql = format!(
                "UPDATE businesses SET {} = $1, updated_at = NOW() WHERE id = $2",
                field.as_str()
            );
            sqlx::query(&sql)
                .bind(value)
                .bind(plan.primary_id)
                .execute(&mut *tx)
                .await?;
        }

        let inquiries = sqlx::query(
            "UPDATE inquiries SET business_id = $1 WHERE business_id = ANY($2)",
        )
        .bind(plan.primary_id)
        .bind(&plan.duplicate_ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let claims = sqlx::query(
            "UPDATE ownership_claims SET business_id = $1 WHERE business_id = ANY($2)",
        )
        .bind(plan.primary_id)
        .bind(&plan.duplicate_ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            UPDATE businesses
            SET duplicate_of_id = $1,
                approval_status = 'rejected',
                updated_at = NOW()
            WHERE id = ANY($2)
            "#,
        )
        .bind(plan.primary_id)
        .bind(&plan.duplicate_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(MergeApplied {
            inquiries_transferred: inquiries,
            claims_transferred: claims,
        })
    }

    async fn count_children(&self, business_id: BusinessId) -> BackofficeResult<ChildCounts> {
        let inquiries = Inquiry::count_for_business(business_id, &self.pool)
            .await
            .map_err(to_storage)?;
        let claims = OwnershipClaim::count_for_business(business_id, &self.pool)
            .await
            .map_err(to_storage)?;
        Ok(ChildCounts { inquiries, claims })
    }

    async fn insert_operation(&self, operation: &BulkOperation) -> BackofficeResult<()> {
        operation.insert(&self.pool).await.map_err(to_storage)
    }

    async fn update_operation(&self, operation: &BulkOperation) -> BackofficeResult<()> {
        operation.update(&self.pool).await.map_err(to_storage)
    }

    async fn find_operation(&self, id: OperationId) -> BackofficeResult<Option<BulkOperation>> {
        BulkOperation::find_by_id(id, &self.pool)
            .await
            .map_err(to_storage)
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> BackofficeResult<()> {
        snapshot.insert(&self.pool).await.map_err(to_storage)
    }

    async fn find_snapshot(&self, id: SnapshotId) -> BackofficeResult<Option<Snapshot>> {
        Snapshot::find_by_id(id, &self.pool)
            .await
            .map_err(to_storage)
    }

    async fn apply_snapshot_batch(&self, entries: &[SnapshotEntry]) -> BackofficeResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut restored = 0u64;
        for entry in entries {
            let result = sqlx::query(
                r#"
                UPDATE businesses
                SET approval_status = $1,
                    quality_score = $2,
                    category = $3,
                    suburb = $4,
                    updated_at = NOW()
                WHERE id = $5
                "#,
            )
            .bind(entry.approval_status)
            .bind(entry.quality_score)
            .bind(&entry.category)
            .bind(&entry.suburb)
            .bind(entry.business_id)
            .execute(&mut *tx)
            .await?;
            restored += result.rows_affected();
        }
        tx.commit().await?;
        Ok(restored)
    }
}

// =============================================================================
// PgAuditSink
// =============================================================================

pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseAuditSink for PgAuditSink {
    async fn append(&self, entry: AuditEntry) -> BackofficeResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, recorded_at, actor, action, target_id, before, after, operation_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.recorded_at)
        .bind(&entry.actor)
        .bind(entry.action.as_str())
        .bind(entry.target_id)
        .bind(entry.before.as_ref().map(Json))
        .bind(entry.after.as_ref().map(Json))
        .bind(entry.operation_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
