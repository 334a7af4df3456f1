// TestDependencies - in-memory implementations for testing
//
// Provides an in-memory kernel that can be injected into BackofficeDeps for
// tests: a BTreeMap-backed store with failure injection, a recording audit
// sink, a static authorizer, and a fixed approval channel. No database
// required.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::common::{
    AuditAction, AuditEntry, BackofficeError, BackofficeResult, BusinessId, OperationId,
    SnapshotId,
};
use crate::domains::bulk_ops::models::{BulkOperation, ReviewDecision, Snapshot, SnapshotEntry};
use crate::domains::dedup::models::{BackfillField, MergeApplied, MergePlan};
use crate::domains::dedup::utils::confidence;
use crate::domains::directory::models::{
    ApprovalStatus, BusinessRecord, FieldUpdate, FilterCriterion, Inquiry, OwnershipClaim,
};
use crate::kernel::deps::{BackofficeDeps, QualityScoreChannel};
use crate::kernel::{
    BaseApprovalChannel, BaseAuditSink, BaseAuthorizer, BaseDirectoryStore, ChildCounts,
};

/// Actor accepted by the default test authorizer.
pub const TEST_ADMIN: &str = "admin@backoffice.test";

// =============================================================================
// MemoryDirectoryStore
// =============================================================================

/// In-memory [`BaseDirectoryStore`]. BTreeMaps keep iteration deterministic
/// (matches the Postgres `ORDER BY id` queries).
#[derive(Default)]
pub struct MemoryDirectoryStore {
    businesses: Mutex<BTreeMap<BusinessId, BusinessRecord>>,
    inquiries: Mutex<Vec<Inquiry>>,
    claims: Mutex<Vec<OwnershipClaim>>,
    operations: Mutex<BTreeMap<OperationId, BulkOperation>>,
    snapshots: Mutex<BTreeMap<SnapshotId, Snapshot>>,
    /// Injected failures, consumed one per batch-style mutation.
    fail_batch_updates: Mutex<VecDeque<String>>,
    fail_snapshot_inserts: Mutex<Option<String>>,
    /// Artificial latency before batch-style mutations (timeout tests).
    batch_delay: Mutex<Option<Duration>>,
}

impl MemoryDirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- seeding ------------------------------------------------------------

    pub fn seed_business(&self, record: BusinessRecord) -> BusinessId {
        let id = record.id;
        self.businesses.lock().unwrap().insert(id, record);
        id
    }

    pub fn seed_inquiry(&self, inquiry: Inquiry) {
        self.inquiries.lock().unwrap().push(inquiry);
    }

    pub fn seed_claim(&self, claim: OwnershipClaim) {
        self.claims.lock().unwrap().push(claim);
    }

    // -- failure injection --------------------------------------------------

    /// The next batch-style mutation (status update, field update, snapshot
    /// restore batch) fails with this message. Queue more to fail several.
    pub fn fail_next_batch_update(&self, message: &str) {
        self.fail_batch_updates
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    pub fn fail_snapshot_inserts(&self, message: &str) {
        *self.fail_snapshot_inserts.lock().unwrap() = Some(message.to_string());
    }

    pub fn delay_batch_updates(&self, delay: Duration) {
        *self.batch_delay.lock().unwrap() = Some(delay);
    }

    // -- assertion accessors ------------------------------------------------

    pub fn business(&self, id: BusinessId) -> Option<BusinessRecord> {
        self.businesses.lock().unwrap().get(&id).cloned()
    }

    pub fn operation(&self, id: OperationId) -> Option<BulkOperation> {
        self.operations.lock().unwrap().get(&id).cloned()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    pub fn inquiries_for(&self, business_id: BusinessId) -> Vec<Inquiry> {
        self.inquiries
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.business_id == business_id)
            .cloned()
            .collect()
    }

    pub fn claims_for(&self, business_id: BusinessId) -> Vec<OwnershipClaim> {
        self.claims
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.business_id == business_id)
            .cloned()
            .collect()
    }

    // -- internals ----------------------------------------------------------

    fn take_injected_failure(&self) -> Option<String> {
        self.fail_batch_updates.lock().unwrap().pop_front()
    }

    async fn apply_batch_delay(&self) {
        let delay = *self.batch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn strong_signal_shared(a: &BusinessRecord, b: &BusinessRecord) -> bool {
        let norm = |value: &Option<String>, f: fn(&str) -> Option<String>| {
            value.as_deref().and_then(f)
        };
        let eq = |x: Option<String>, y: Option<String>| matches!((x, y), (Some(p), Some(q)) if p == q);

        eq(norm(&a.phone, confidence::normalize_phone), norm(&b.phone, confidence::normalize_phone))
            || eq(norm(&a.email, confidence::normalize_email), norm(&b.email, confidence::normalize_email))
            || eq(
                norm(&a.website, confidence::normalize_website),
                norm(&b.website, confidence::normalize_website),
            )
            || eq(norm(&a.abn, confidence::normalize_abn), norm(&b.abn, confidence::normalize_abn))
    }
}

#[async_trait]
impl BaseDirectoryStore for MemoryDirectoryStore {
    async fn find_business(&self, id: BusinessId) -> BackofficeResult<Option<BusinessRecord>> {
        Ok(self.businesses.lock().unwrap().get(&id).cloned())
    }

    async fn find_businesses(&self, ids: &[BusinessId]) -> BackofficeResult<Vec<BusinessRecord>> {
        let businesses = self.businesses.lock().unwrap();
        Ok(ids.iter().filter_map(|id| businesses.get(id).cloned()).collect())
    }

    async fn insert_business(&self, record: &BusinessRecord) -> BackofficeResult<BusinessRecord> {
        self.businesses
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn update_business(&self, record: &BusinessRecord) -> BackofficeResult<BusinessRecord> {
        let mut businesses = self.businesses.lock().unwrap();
        if !businesses.contains_key(&record.id) {
            return Err(BackofficeError::storage(format!(
                "no business row to update: {}",
                record.id
            )));
        }
        businesses.insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn find_by_criteria(
        &self,
        criteria: &[FilterCriterion],
    ) -> BackofficeResult<Vec<BusinessRecord>> {
        Ok(self
            .businesses
            .lock()
            .unwrap()
            .values()
            .filter(|r| criteria.iter().all(|c| c.matches(r)))
            .cloned()
            .collect())
    }

    async fn find_strong_matches(
        &self,
        target: &BusinessRecord,
    ) -> BackofficeResult<Vec<BusinessRecord>> {
        Ok(self
            .businesses
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.id != target.id && Self::strong_signal_shared(target, r))
            .cloned()
            .collect())
    }

    async fn find_loose_pool(
        &self,
        target: &BusinessRecord,
    ) -> BackofficeResult<Vec<BusinessRecord>> {
        let Some(suburb) = target
            .suburb
            .as_deref()
            .and_then(confidence::normalize_suburb)
        else {
            return Ok(Vec::new());
        };
        Ok(self
            .businesses
            .lock()
            .unwrap()
            .values()
            .filter(|r| {
                r.id != target.id
                    && r.suburb.as_deref().and_then(confidence::normalize_suburb)
                        == Some(suburb.clone())
            })
            .cloned()
            .collect())
    }

    async fn update_status_by_ids(
        &self,
        ids: &[BusinessId],
        status: ApprovalStatus,
    ) -> BackofficeResult<u64> {
        self.apply_batch_delay().await;
        if let Some(message) = self.take_injected_failure() {
            return Err(BackofficeError::storage(message));
        }
        let mut businesses = self.businesses.lock().unwrap();
        let mut affected = 0;
        for id in ids {
            if let Some(record) = businesses.get_mut(id) {
                record.approval_status = status;
                record.updated_at = chrono::Utc::now();
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn apply_field_update_by_ids(
        &self,
        ids: &[BusinessId],
        update: &FieldUpdate,
    ) -> BackofficeResult<u64> {
        self.apply_batch_delay().await;
        if let Some(message) = self.take_injected_failure() {
            return Err(BackofficeError::storage(message));
        }
        let mut businesses = self.businesses.lock().unwrap();
        let mut affected = 0;
        for id in ids {
            if let Some(record) = businesses.get_mut(id) {
                if let Some(category) = &update.category {
                    record.category = Some(category.clone());
                }
                if let Some(suburb) = &update.suburb {
                    record.suburb = Some(suburb.clone());
                }
                if let Some(quality) = update.quality_score {
                    record.quality_score = quality;
                }
                record.updated_at = chrono::Utc::now();
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn apply_merge(&self, plan: &MergePlan) -> BackofficeResult<MergeApplied> {
        // Single locked mutation = the in-memory transaction boundary.
        let mut businesses = self.businesses.lock().unwrap();

        let primary = businesses.get_mut(&plan.primary_id).ok_or_else(|| {
            BackofficeError::storage(format!("merge primary vanished: {}", plan.primary_id))
        })?;
        for (field, value) in &plan.backfill {
            let slot = match field {
                BackfillField::Phone => &mut primary.phone,
                BackfillField::Email => &mut primary.email,
                BackfillField::Website => &mut primary.website,
                BackfillField::Bio => &mut primary.bio,
                BackfillField::Abn => &mut primary.abn,
            };
            *slot = Some(value.clone());
        }
        primary.updated_at = chrono::Utc::now();

        let mut applied = MergeApplied::default();
        {
            let mut inquiries = self.inquiries.lock().unwrap();
            for inquiry in inquiries.iter_mut() {
                if plan.duplicate_ids.contains(&inquiry.business_id) {
                    inquiry.business_id = plan.primary_id;
                    applied.inquiries_transferred += 1;
                }
            }
            let mut claims = self.claims.lock().unwrap();
            for claim in claims.iter_mut() {
                if plan.duplicate_ids.contains(&claim.business_id) {
                    claim.business_id = plan.primary_id;
                    applied.claims_transferred += 1;
                }
            }
        }

        for id in &plan.duplicate_ids {
            if let Some(duplicate) = businesses.get_mut(id) {
                duplicate.duplicate_of_id = Some(plan.primary_id);
                duplicate.approval_status = ApprovalStatus::Rejected;
                duplicate.updated_at = chrono::Utc::now();
            }
        }

        Ok(applied)
    }

    async fn count_children(&self, business_id: BusinessId) -> BackofficeResult<ChildCounts> {
        let inquiries = self
            .inquiries
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.business_id == business_id)
            .count() as i64;
        let claims = self
            .claims
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.business_id == business_id)
            .count() as i64;
        Ok(ChildCounts { inquiries, claims })
    }

    async fn insert_operation(&self, operation: &BulkOperation) -> BackofficeResult<()> {
        self.operations
            .lock()
            .unwrap()
            .insert(operation.id, operation.clone());
        Ok(())
    }

    async fn update_operation(&self, operation: &BulkOperation) -> BackofficeResult<()> {
        let mut operations = self.operations.lock().unwrap();
        if !operations.contains_key(&operation.id) {
            return Err(BackofficeError::storage(format!(
                "no operation row to update: {}",
                operation.id
            )));
        }
        operations.insert(operation.id, operation.clone());
        Ok(())
    }

    async fn find_operation(&self, id: OperationId) -> BackofficeResult<Option<BulkOperation>> {
        Ok(self.operations.lock().unwrap().get(&id).cloned())
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> BackofficeResult<()> {
        if let Some(message) = self.fail_snapshot_inserts.lock().unwrap().clone() {
            return Err(BackofficeError::storage(message));
        }
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.id, snapshot.clone());
        Ok(())
    }

    async fn find_snapshot(&self, id: SnapshotId) -> BackofficeResult<Option<Snapshot>> {
        Ok(self.snapshots.lock().unwrap().get(&id).cloned())
    }

    async fn apply_snapshot_batch(&self, entries: &[SnapshotEntry]) -> BackofficeResult<u64> {
        self.apply_batch_delay().await;
        if let Some(message) = self.take_injected_failure() {
            return Err(BackofficeError::storage(message));
        }
        let mut businesses = self.businesses.lock().unwrap();
        let mut restored = 0;
        for entry in entries {
            if let Some(record) = businesses.get_mut(&entry.business_id) {
                record.approval_status = entry.approval_status;
                record.quality_score = entry.quality_score;
                record.category = entry.category.clone();
                record.suburb = entry.suburb.clone();
                record.updated_at = chrono::Utc::now();
                restored += 1;
            }
        }
        Ok(restored)
    }
}

// =============================================================================
// RecordingAuditSink
// =============================================================================

#[derive(Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
    fail_next: Mutex<Option<String>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, message: &str) {
        *self.fail_next.lock().unwrap() = Some(message.to_string());
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.entries.lock().unwrap().iter().map(|e| e.action).collect()
    }

    pub fn count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl BaseAuditSink for RecordingAuditSink {
    async fn append(&self, entry: AuditEntry) -> BackofficeResult<()> {
        if let Some(message) = self.fail_next.lock().unwrap().take() {
            return Err(BackofficeError::storage(message));
        }
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

// =============================================================================
// StaticAuthorizer
// =============================================================================

pub struct StaticAuthorizer {
    admins: Vec<String>,
}

impl StaticAuthorizer {
    pub fn admins(identifiers: &[&str]) -> Self {
        Self {
            admins: identifiers.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn deny_all() -> Self {
        Self { admins: Vec::new() }
    }
}

#[async_trait]
impl BaseAuthorizer for StaticAuthorizer {
    async fn is_admin(&self, actor: &str) -> BackofficeResult<bool> {
        Ok(self.admins.iter().any(|a| a == actor))
    }
}

// =============================================================================
// FixedApprovalChannel
// =============================================================================

/// Always returns the configured decision, regardless of the record.
pub struct FixedApprovalChannel {
    decision: ReviewDecision,
}

impl FixedApprovalChannel {
    pub fn approving() -> Self {
        Self {
            decision: ReviewDecision::Approved,
        }
    }

    pub fn declining(reason: &str) -> Self {
        Self {
            decision: ReviewDecision::Declined {
                reason: reason.to_string(),
            },
        }
    }
}

#[async_trait]
impl BaseApprovalChannel for FixedApprovalChannel {
    async fn request_review(&self, _record: &BusinessRecord) -> BackofficeResult<ReviewDecision> {
        Ok(self.decision.clone())
    }
}

// =============================================================================
// Test kernel assembly
// =============================================================================

/// Everything a test needs: deps plus direct handles to the fakes.
pub struct TestKernel {
    pub deps: BackofficeDeps,
    pub store: Arc<MemoryDirectoryStore>,
    pub audit: Arc<RecordingAuditSink>,
}

/// Standard test kernel: in-memory store, recording sink, [`TEST_ADMIN`]
/// authorized, deterministic quality-score review channel.
pub fn test_kernel() -> TestKernel {
    test_kernel_with(Arc::new(QualityScoreChannel::default()))
}

/// Test kernel with a custom approval channel.
pub fn test_kernel_with(approvals: Arc<dyn BaseApprovalChannel>) -> TestKernel {
    let store = Arc::new(MemoryDirectoryStore::new());
    let audit = Arc::new(RecordingAuditSink::new());
    let deps = BackofficeDeps::new(
        store.clone(),
        audit.clone(),
        Arc::new(StaticAuthorizer::admins(&[TEST_ADMIN])),
        approvals,
        Duration::from_secs(5),
    );
    TestKernel { deps, store, audit }
}
