// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic. Domain functions
// (merge planning, scoring, batch orchestration) live in domains/ and use
// these traits for every side effect.
//
// Naming convention: Base* for trait names (e.g., BaseDirectoryStore)

use async_trait::async_trait;

use crate::common::{AuditEntry, BackofficeResult, BusinessId, OperationId, SnapshotId};
use crate::domains::bulk_ops::models::{BulkOperation, ReviewDecision, Snapshot, SnapshotEntry};
use crate::domains::dedup::models::{MergeApplied, MergePlan};
use crate::domains::directory::models::{
    ApprovalStatus, BusinessRecord, FieldUpdate, FilterCriterion,
};

// =============================================================================
// Authorization Trait (Infrastructure)
// =============================================================================

/// Answers "may this actor mutate directory data". Checked before every
/// mutating entry point.
#[async_trait]
pub trait BaseAuthorizer: Send + Sync {
    async fn is_admin(&self, actor: &str) -> BackofficeResult<bool>;
}

// =============================================================================
// Directory Store Trait (Infrastructure - persistence)
// =============================================================================

/// Child-record counts for one business.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChildCounts {
    pub inquiries: i64,
    pub claims: i64,
}

impl ChildCounts {
    pub fn total(&self) -> i64 {
        self.inquiries + self.claims
    }
}

/// Persistence collaborator.
///
/// Atomicity contract: `update_status_by_ids`, `apply_field_update_by_ids`,
/// `apply_merge`, and `apply_snapshot_batch` each either fully apply or not
/// at all, visible atomically to concurrent readers. Batches and merges rely
/// on this; there is no operation-granularity transaction.
#[async_trait]
pub trait BaseDirectoryStore: Send + Sync {
    // -- businesses ---------------------------------------------------------
    async fn find_business(&self, id: BusinessId) -> BackofficeResult<Option<BusinessRecord>>;

    /// Fetch an id set; result order follows the input ids, unknown ids are
    /// silently absent.
    async fn find_businesses(&self, ids: &[BusinessId]) -> BackofficeResult<Vec<BusinessRecord>>;

    async fn insert_business(&self, record: &BusinessRecord) -> BackofficeResult<BusinessRecord>;

    async fn update_business(&self, record: &BusinessRecord) -> BackofficeResult<BusinessRecord>;

    /// Ordered criteria list, AND semantics, results ordered by id.
    async fn find_by_criteria(
        &self,
        criteria: &[FilterCriterion],
    ) -> BackofficeResult<Vec<BusinessRecord>>;

    /// Records sharing at least one strong identity signal with the target
    /// (exact normalized phone/email/website/abn). Excludes the target.
    async fn find_strong_matches(
        &self,
        target: &BusinessRecord,
    ) -> BackofficeResult<Vec<BusinessRecord>>;

    /// Same-suburb pool for loose matching. Empty when the target has no
    /// suburb.
    async fn find_loose_pool(
        &self,
        target: &BusinessRecord,
    ) -> BackofficeResult<Vec<BusinessRecord>>;

    /// One atomic status mutation for the whole id set. Returns rows
    /// affected.
    async fn update_status_by_ids(
        &self,
        ids: &[BusinessId],
        status: ApprovalStatus,
    ) -> BackofficeResult<u64>;

    /// One atomic field update for the whole id set. Returns rows affected.
    async fn apply_field_update_by_ids(
        &self,
        ids: &[BusinessId],
        update: &FieldUpdate,
    ) -> BackofficeResult<u64>;

    // -- merge --------------------------------------------------------------

    /// Apply a validated merge plan as one transaction: backfill the
    /// primary, relink children, mark duplicates rejected. Commits in full
    /// or not at all.
    async fn apply_merge(&self, plan: &MergePlan) -> BackofficeResult<MergeApplied>;

    async fn count_children(&self, business_id: BusinessId) -> BackofficeResult<ChildCounts>;

    // -- bulk operations ----------------------------------------------------
    async fn insert_operation(&self, operation: &BulkOperation) -> BackofficeResult<()>;
    async fn update_operation(&self, operation: &BulkOperation) -> BackofficeResult<()>;
    async fn find_operation(&self, id: OperationId) -> BackofficeResult<Option<BulkOperation>>;

    // -- snapshots ----------------------------------------------------------
    async fn insert_snapshot(&self, snapshot: &Snapshot) -> BackofficeResult<()>;
    async fn find_snapshot(&self, id: SnapshotId) -> BackofficeResult<Option<Snapshot>>;

    /// Re-apply captured values for one batch of entries, atomically.
    async fn apply_snapshot_batch(&self, entries: &[SnapshotEntry]) -> BackofficeResult<u64>;
}

// =============================================================================
// Audit Sink Trait (Infrastructure)
// =============================================================================

/// Append-only audit trail transport.
///
/// Callers must never let a sink failure block a business mutation: use
/// [`crate::kernel::emit_audit`], which downgrades transport errors to a
/// local warning.
#[async_trait]
pub trait BaseAuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> BackofficeResult<()>;
}

// =============================================================================
// Approval Channel Trait (pluggable manual-review capability)
// =============================================================================

/// Requests a human decision for one record during MANUAL_REVIEW stages.
///
/// Production wires a real review queue; the default is the deterministic
/// quality-score heuristic in [`crate::kernel::QualityScoreChannel`].
#[async_trait]
pub trait BaseApprovalChannel: Send + Sync {
    async fn request_review(&self, record: &BusinessRecord) -> BackofficeResult<ReviewDecision>;
}
