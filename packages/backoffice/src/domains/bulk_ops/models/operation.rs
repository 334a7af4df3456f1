use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use typed_builder::TypedBuilder;

use crate::common::{BusinessId, OperationId, SnapshotId};
use crate::domains::bulk_ops::models::stage::{
    ApprovalConditions, StageConfig, ValidationRule, WorkflowStage,
};
use crate::domains::directory::models::{ApprovalStatus, FieldUpdate, FilterCriterion};

// ============================================================================
// Enums
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default,
)]
#[sqlx(type_name = "operation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    #[default]
    Draft,
    Ready,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    /// Terminal states are sticky: no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What the operation does to each record, with the configuration each
/// variant actually needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationKind {
    Approve,
    Reject,
    ConditionalApprove { conditions: ApprovalConditions },
    StagedApproval,
    BulkUpdate { update: FieldUpdate },
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::ConditionalApprove { .. } => "conditional_approve",
            Self::StagedApproval => "staged_approval",
            Self::BulkUpdate { .. } => "bulk_update",
        }
    }

    /// The approval status each committed record ends in. None for updates
    /// that leave status untouched.
    pub fn target_status(&self) -> Option<ApprovalStatus> {
        match self {
            Self::Approve | Self::ConditionalApprove { .. } | Self::StagedApproval => {
                Some(ApprovalStatus::Approved)
            }
            Self::Reject => Some(ApprovalStatus::Rejected),
            Self::BulkUpdate { .. } => None,
        }
    }

    /// The single atomic store mutation a batch of this kind applies.
    pub fn batch_mutation(&self) -> BatchMutation<'_> {
        match self {
            Self::Approve | Self::ConditionalApprove { .. } | Self::StagedApproval => {
                BatchMutation::SetStatus(ApprovalStatus::Approved)
            }
            Self::Reject => BatchMutation::SetStatus(ApprovalStatus::Rejected),
            Self::BulkUpdate { update } => BatchMutation::UpdateFields(update),
        }
    }

    /// Workflow injected when the caller supplies none.
    pub fn default_workflow(&self) -> Vec<WorkflowStage> {
        match self {
            Self::ConditionalApprove { conditions } => vec![WorkflowStage::new(
                "conditional gate",
                StageConfig::Conditional {
                    conditions: conditions.clone(),
                },
            )],
            Self::StagedApproval => vec![
                WorkflowStage::new(
                    "validation",
                    StageConfig::Validation {
                        rules: vec![ValidationRule::NotMarkedDuplicate],
                    },
                ),
                WorkflowStage::new("manual review", StageConfig::ManualReview {}),
            ],
            _ => Vec::new(),
        }
    }
}

/// What a batch commit does to its id set, derived exhaustively from the
/// operation kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchMutation<'a> {
    SetStatus(ApprovalStatus),
    UpdateFields(&'a FieldUpdate),
}

// ============================================================================
// Safety configuration
// ============================================================================

/// Safety-check configuration for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Hard ceiling on target count; exceeded => the operation is refused.
    pub max_records: i64,
    /// Capture a snapshot before mutating (only honored with
    /// `rollback_enabled`).
    pub backup_required: bool,
    pub rollback_enabled: bool,
    /// When set, a failed mandatory snapshot fails the whole operation
    /// instead of downgrading to a warning.
    pub require_approval: bool,
    /// Batch size driver; effective batch size is min(this, 100).
    pub checkpoint_frequency: i64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_records: 500,
            backup_required: true,
            rollback_enabled: true,
            require_approval: true,
            checkpoint_frequency: 50,
        }
    }
}

pub const MAX_BATCH_SIZE: i64 = 100;

// ============================================================================
// Counters, per-record outcomes, embedded log
// ============================================================================

/// Running totals for an operation. Updated only through [`apply_batch`] by
/// the controller - a single owner, so pause/resume cycles never lose
/// updates.
///
/// [`apply_batch`]: OperationCounters::apply_batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCounters {
    pub target: i64,
    pub processed: i64,
    pub success: i64,
    pub failed: i64,
    pub skipped: i64,
}

impl OperationCounters {
    /// Fold one batch's outcome into the totals. Monotonically
    /// non-decreasing.
    pub fn apply_batch(&mut self, success: i64, failed: i64, skipped: i64) {
        self.processed += success + failed + skipped;
        self.success += success;
        self.failed += failed;
        self.skipped += skipped;
    }

    /// processed == success + failed + skipped, after every batch.
    pub fn is_consistent(&self) -> bool {
        self.processed == self.success + self.failed + self.skipped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    Skipped,
}

/// Per-record outcome. Every multi-record operation reports one of these for
/// each record touched - callers never get a bare pass/fail verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub business_id: BusinessId,
    /// Batch the record was committed (or failed) in; 0 for records resolved
    /// during the workflow stage phase.
    pub batch: i32,
    pub status: OutcomeStatus,
    pub message: Option<String>,
}

/// One event in the operation's own ordered audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLogEvent {
    pub at: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub detail: Option<String>,
}

/// Rollback metadata; present once a snapshot was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackInfo {
    pub snapshot_id: SnapshotId,
    pub captured_at: DateTime<Utc>,
    pub restored_at: Option<DateTime<Utc>>,
}

// ============================================================================
// BulkOperation model
// ============================================================================

/// A staged bulk mutation over a filtered set of business records.
///
/// Owns its workflow stages and snapshot exclusively; deleting the operation
/// deletes both (ON DELETE CASCADE).
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct BulkOperation {
    #[builder(default = OperationId::new())]
    pub id: OperationId,

    pub name: String,
    #[builder(default)]
    pub status: OperationStatus,
    pub kind: OperationKind,

    #[builder(default)]
    pub criteria: Vec<FilterCriterion>,
    #[builder(default)]
    pub safety: SafetyConfig,
    #[builder(default)]
    pub workflow: Vec<WorkflowStage>,

    #[builder(default)]
    pub counters: OperationCounters,

    /// Resolved target ids, in store order. Fixed at creation.
    #[builder(default)]
    pub target_ids: Vec<BusinessId>,
    /// Targets not yet evaluated by the workflow stage phase.
    #[builder(default)]
    pub remaining_ids: Vec<BusinessId>,
    /// Targets that passed all stages and await batch commit.
    #[builder(default)]
    pub pending_ids: Vec<BusinessId>,
    /// Number of batches committed so far.
    #[builder(default = 0)]
    pub batch_no: i32,

    #[builder(default)]
    pub results: Vec<RecordOutcome>,
    #[builder(default)]
    pub audit_log: Vec<OperationLogEvent>,
    #[builder(default, setter(strip_option))]
    pub rollback: Option<RollbackInfo>,

    pub created_by: String,
    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub finished_at: Option<DateTime<Utc>>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl BulkOperation {
    /// Effective batch size: min(checkpoint_frequency, 100), floor 1.
    pub fn batch_size(&self) -> usize {
        self.safety
            .checkpoint_frequency
            .min(MAX_BATCH_SIZE)
            .max(1) as usize
    }

    /// Overall success: no per-record failures. Only meaningful once
    /// terminal.
    pub fn succeeded(&self) -> bool {
        self.counters.failed == 0
    }

    /// Append to the operation's ordered audit log.
    pub fn log(&mut self, actor: &str, action: &str, detail: Option<String>) {
        self.audit_log.push(OperationLogEvent {
            at: Utc::now(),
            actor: actor.to_string(),
            action: action.to_string(),
            detail,
        });
    }

    /// The most recent `n` audit-log events, oldest first.
    pub fn audit_tail(&self, n: usize) -> &[OperationLogEvent] {
        let start = self.audit_log.len().saturating_sub(n);
        &self.audit_log[start..]
    }
}

/// Caller-facing creation spec. `create_operation` resolves targets, injects
/// the default workflow, and runs safety pre-flight before anything persists.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct OperationSpec {
    pub name: String,
    pub kind: OperationKind,
    #[builder(default)]
    pub criteria: Vec<FilterCriterion>,
    #[builder(default)]
    pub workflow: Vec<WorkflowStage>,
    #[builder(default)]
    pub safety: SafetyConfig,
    /// Create in READY rather than DRAFT (scheduled operations).
    #[builder(default = false)]
    pub ready: bool,
}

// ============================================================================
// SQL Queries - ALL queries must be in models/
// ============================================================================

impl<'r> sqlx::FromRow<'r, PgRow> for BulkOperation {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            status: row.try_get("status")?,
            kind: row.try_get::<Json<OperationKind>, _>("kind")?.0,
            criteria: row.try_get::<Json<Vec<FilterCriterion>>, _>("criteria")?.0,
            safety: row.try_get::<Json<SafetyConfig>, _>("safety")?.0,
            workflow: row.try_get::<Json<Vec<WorkflowStage>>, _>("workflow")?.0,
            counters: OperationCounters {
                target: row.try_get("target_count")?,
                processed: row.try_get("processed_count")?,
                success: row.try_get("success_count")?,
                failed: row.try_get("failed_count")?,
                skipped: row.try_get("skipped_count")?,
            },
            target_ids: row.try_get::<Json<Vec<BusinessId>>, _>("target_ids")?.0,
            remaining_ids: row.try_get::<Json<Vec<BusinessId>>, _>("remaining_ids")?.0,
            pending_ids: row.try_get::<Json<Vec<BusinessId>>, _>("pending_ids")?.0,
            batch_no: row.try_get("batch_no")?,
            results: row.try_get::<Json<Vec<RecordOutcome>>, _>("results")?.0,
            audit_log: row.try_get::<Json<Vec<OperationLogEvent>>, _>("audit_log")?.0,
            rollback: row
                .try_get::<Option<Json<RollbackInfo>>, _>("rollback")?
                .map(|j| j.0),
            created_by: row.try_get("created_by")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl BulkOperation {
    pub async fn find_by_id(id: OperationId, pool: &PgPool) -> Result<Option<Self>> {
        let op = sqlx::query_as::<_, Self>("SELECT * FROM bulk_operations WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(op)
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bulk_operations (
                id, name, status, kind, criteria, safety, workflow,
                target_count, processed_count, success_count, failed_count, skipped_count,
                target_ids, remaining_ids, pending_ids, batch_no,
                results, audit_log, rollback,
                created_by, started_at, finished_at, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7,
                $8, $9, $10, $11, $12,
                $13, $14, $15, $16,
                $17, $18, $19,
                $20, $21, $22, $23, $24
            )
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(self.status)
        .bind(Json(&self.kind))
        .bind(Json(&self.criteria))
        .bind(Json(&self.safety))
        .bind(Json(&self.workflow))
        .bind(self.counters.target)
        .bind(self.counters.processed)
        .bind(self.counters.success)
        .bind(self.counters.failed)
        .bind(self.counters.skipped)
        .bind(Json(&self.target_ids))
        .bind(Json(&self.remaining_ids))
        .bind(Json(&self.pending_ids))
        .bind(self.batch_no)
        .bind(Json(&self.results))
        .bind(Json(&self.audit_log))
        .bind(self.rollback.as_ref().map(Json))
        .bind(&self.created_by)
        .bind(self.started_at)
        .bind(self.finished_at)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn update(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE bulk_operations
            SET name = $2,
                status = $3,
                kind = $4,
                criteria = $5,
                safety = $6,
                workflow = $7,
                target_count = $8,
                processed_count = $9,
                success_count = $10,
                failed_count = $11,
                skipped_count = $12,
                target_ids = $13,
                remaining_ids = $14,
                pending_ids = $15,
                batch_no = $16,
                results = $17,
                audit_log = $18,
                rollback = $19,
                started_at = $20,
                finished_at = $21,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(self.status)
        .bind(Json(&self.kind))
        .bind(Json(&self.criteria))
        .bind(Json(&self.safety))
        .bind(Json(&self.workflow))
        .bind(self.counters.target)
        .bind(self.counters.processed)
        .bind(self.counters.success)
        .bind(self.counters.failed)
        .bind(self.counters.skipped)
        .bind(Json(&self.target_ids))
        .bind(Json(&self.remaining_ids))
        .bind(Json(&self.pending_ids))
        .bind(self.batch_no)
        .bind(Json(&self.results))
        .bind(Json(&self.audit_log))
        .bind(self.rollback.as_ref().map(Json))
        .bind(self.started_at)
        .bind(self.finished_at)
        .execute(pool)
        .await?;
        Ok(())
    }
}
