// Audit trail types shared between the kernel and domain layers
//
// The trail is append-only: entries are inserted through the audit sink and
// never updated or deleted. Shared here (not in a domain) because both the
// dedup and bulk-operation domains emit entries and the kernel persists them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::entity_ids::{AuditEntryId, OperationId};

/// What happened, for filtering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    BusinessesMerged,
    DuplicateUnmarked,
    OperationCreated,
    OperationTransitioned,
    RecordStatusChanged,
    RecordFieldsChanged,
    SnapshotCaptured,
    SnapshotRestored,
    RecordRestored,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BusinessesMerged => "businesses_merged",
            Self::DuplicateUnmarked => "duplicate_unmarked",
            Self::OperationCreated => "operation_created",
            Self::OperationTransitioned => "operation_transitioned",
            Self::RecordStatusChanged => "record_status_changed",
            Self::RecordFieldsChanged => "record_fields_changed",
            Self::SnapshotCaptured => "snapshot_captured",
            Self::SnapshotRestored => "snapshot_restored",
            Self::RecordRestored => "record_restored",
        }
    }
}

/// One entry in the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub recorded_at: DateTime<Utc>,
    /// Identifier of the admin (or system component) that acted.
    pub actor: String,
    pub action: AuditAction,
    /// The entity acted upon. Raw UUID: targets are heterogeneous
    /// (businesses, operations, snapshots).
    pub target_id: Uuid,
    /// Field values before the change, where the action replaced values.
    pub before: Option<JsonValue>,
    /// Field values after the change.
    pub after: Option<JsonValue>,
    /// Set when the entry was produced by a bulk operation.
    pub operation_id: Option<OperationId>,
}

impl AuditEntry {
    pub fn new(actor: &str, action: AuditAction, target_id: Uuid) -> Self {
        Self {
            id: AuditEntryId::new(),
            recorded_at: Utc::now(),
            actor: actor.to_string(),
            action,
            target_id,
            before: None,
            after: None,
            operation_id: None,
        }
    }

    pub fn with_before(mut self, before: JsonValue) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_after(mut self, after: JsonValue) -> Self {
        self.after = Some(after);
        self
    }

    pub fn for_operation(mut self, operation_id: OperationId) -> Self {
        self.operation_id = Some(operation_id);
        self
    }
}
