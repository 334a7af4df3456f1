//! Safety & snapshot manager
//!
//! Pre-flight target ceiling and pre-operation snapshot capture. A failed
//! mandatory snapshot escalates to operation failure; a failed optional one
//! downgrades to a warning and the operation proceeds without rollback.

use tracing::{info, warn};

use crate::common::{AuditAction, AuditEntry, BackofficeError, BackofficeResult};
use crate::domains::bulk_ops::models::{BulkOperation, RollbackInfo, SafetyConfig, Snapshot};
use crate::kernel::{emit_audit, BackofficeDeps};

/// Refuse operations over the configured ceiling. Nothing has been persisted
/// when this runs, so failure mutates nothing.
pub fn preflight(target_count: usize, safety: &SafetyConfig) -> BackofficeResult<()> {
    if target_count as i64 > safety.max_records {
        return Err(BackofficeError::validation(format!(
            "target count {target_count} exceeds safety limit max_records={}",
            safety.max_records
        )));
    }
    Ok(())
}

/// What the snapshot phase decided for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotPhase {
    /// Snapshot captured now; rollback metadata recorded on the operation.
    Captured,
    /// A snapshot from an earlier run (pause/resume) is already in place.
    AlreadyCaptured,
    /// Configuration does not ask for one.
    NotRequired,
    /// Optional capture failed; proceeding without rollback.
    ProceededWithoutBackup { warning: String },
}

/// Capture the pre-operation snapshot if configuration asks for one.
///
/// Returns Err only for a mandatory (`require_approval`) capture failure -
/// the controller turns that into operation failure with no changes applied.
pub async fn run_snapshot_phase(
    deps: &BackofficeDeps,
    operation: &mut BulkOperation,
    actor: &str,
) -> BackofficeResult<SnapshotPhase> {
    if operation.rollback.is_some() {
        return Ok(SnapshotPhase::AlreadyCaptured);
    }
    if !(operation.safety.backup_required && operation.safety.rollback_enabled) {
        return Ok(SnapshotPhase::NotRequired);
    }

    let records = deps.store.find_businesses(&operation.target_ids).await?;
    let snapshot = Snapshot::capture(operation.id, &records);

    match deps.store.insert_snapshot(&snapshot).await {
        Ok(()) => {
            operation.rollback = Some(RollbackInfo {
                snapshot_id: snapshot.id,
                captured_at: snapshot.created_at,
                restored_at: None,
            });
            operation.log(
                actor,
                "snapshot_captured",
                Some(format!("{} records captured", snapshot.entries.len())),
            );
            emit_audit(
                deps,
                AuditEntry::new(actor, AuditAction::SnapshotCaptured, snapshot.id.into_uuid())
                    .for_operation(operation.id),
            )
            .await;
            info!(
                operation = %operation.id,
                snapshot = %snapshot.id,
                records = snapshot.entries.len(),
                "captured pre-operation snapshot"
            );
            Ok(SnapshotPhase::Captured)
        }
        Err(err) if operation.safety.require_approval => Err(BackofficeError::storage(format!(
            "mandatory snapshot capture failed: {err}"
        ))),
        Err(err) => {
            let warning = format!("snapshot capture failed, proceeding without rollback: {err}");
            warn!(operation = %operation.id, error = %err, "optional snapshot capture failed");
            operation.log(actor, "snapshot_waived", Some(warning.clone()));
            Ok(SnapshotPhase::ProceededWithoutBackup { warning })
        }
    }
}

/// Snapshot capture happens only before the first committed batch; after
/// that the captured values would no longer be pre-operation state.
pub fn capture_window_open(operation: &BulkOperation) -> bool {
    operation.batch_no == 0
}
