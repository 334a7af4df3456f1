use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::common::{BusinessId, OperationId, SnapshotId};
use crate::domains::directory::models::{ApprovalStatus, BusinessRecord};

/// Captured pre-operation values for one business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub business_id: BusinessId,
    pub approval_status: ApprovalStatus,
    pub quality_score: f64,
    pub category: Option<String>,
    pub suburb: Option<String>,
}

impl SnapshotEntry {
    pub fn capture(record: &BusinessRecord) -> Self {
        Self {
            business_id: record.id,
            approval_status: record.approval_status,
            quality_score: record.quality_score,
            category: record.category.clone(),
            suburb: record.suburb.clone(),
        }
    }
}

/// Point-in-time capture of field values for every record an operation
/// targets. Immutable once captured; owned by the operation that created it
/// and used only for rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub operation_id: OperationId,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn capture(operation_id: OperationId, records: &[BusinessRecord]) -> Self {
        Self {
            id: SnapshotId::new(),
            operation_id,
            created_at: Utc::now(),
            entries: records.iter().map(SnapshotEntry::capture).collect(),
        }
    }
}

// ============================================================================
// SQL Queries - ALL queries must be in models/
// ============================================================================

impl<'r> sqlx::FromRow<'r, PgRow> for Snapshot {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            operation_id: row.try_get("operation_id")?,
            created_at: row.try_get("created_at")?,
            entries: row.try_get::<Json<Vec<SnapshotEntry>>, _>("entries")?.0,
        })
    }
}

impl Snapshot {
    pub async fn insert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO operation_snapshots (id, operation_id, created_at, entries)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(self.id)
        .bind(self.operation_id)
        .bind(self.created_at)
        .bind(Json(&self.entries))
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(id: SnapshotId, pool: &PgPool) -> Result<Option<Self>> {
        let snapshot =
            sqlx::query_as::<_, Self>("SELECT * FROM operation_snapshots WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        Ok(snapshot)
    }
}
