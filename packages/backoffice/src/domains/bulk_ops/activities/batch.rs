//! Batch processor
//!
//! Commits one batch of processed records as a single atomic store mutation,
//! wrapped in a wall-clock timeout so a stuck dependency becomes a
//! batch-level failure instead of a hung operation. Batch failures are
//! isolated: every record in a failed batch is marked FAILED with the
//! causing message, and the caller moves on to the next batch. Counters are
//! updated here and nowhere else.

use serde_json::json;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::common::{AuditAction, AuditEntry, BusinessId};
use crate::domains::bulk_ops::models::{
    BatchMutation, BulkOperation, OutcomeStatus, RecordOutcome,
};
use crate::kernel::{emit_audit, BackofficeDeps};

/// Commit one batch. Never returns an error: batch-level failures become
/// per-record FAILED outcomes. Returns whether the batch committed.
pub async fn commit_batch(
    deps: &BackofficeDeps,
    operation: &mut BulkOperation,
    batch_ids: &[BusinessId],
) -> bool {
    operation.batch_no += 1;
    let batch_no = operation.batch_no;

    // Prior values for the audit trail, read before the mutation.
    let prior = match deps.store.find_businesses(batch_ids).await {
        Ok(records) => records,
        Err(err) => {
            record_batch_failure(operation, batch_ids, &format!("batch pre-read failed: {err}"));
            return false;
        }
    };

    let mutation = operation.kind.batch_mutation();
    let applied = match mutation {
        BatchMutation::SetStatus(status) => {
            timeout(
                deps.batch_timeout,
                deps.store.update_status_by_ids(batch_ids, status),
            )
            .await
        }
        BatchMutation::UpdateFields(update) => {
            timeout(
                deps.batch_timeout,
                deps.store.apply_field_update_by_ids(batch_ids, update),
            )
            .await
        }
    };

    let message = match applied {
        Ok(Ok(_rows)) => None,
        Ok(Err(err)) => Some(format!("batch update failed: {err}")),
        Err(_elapsed) => Some(format!(
            "batch timed out after {:?}",
            deps.batch_timeout
        )),
    };

    if let Some(message) = message {
        warn!(
            operation = %operation.id,
            batch = batch_no,
            error = %message,
            "batch failed; continuing with next batch"
        );
        record_batch_failure(operation, batch_ids, &message);
        return false;
    }

    for id in batch_ids {
        operation.results.push(RecordOutcome {
            business_id: *id,
            batch: batch_no,
            status: OutcomeStatus::Success,
            message: None,
        });
    }
    operation.counters.apply_batch(batch_ids.len() as i64, 0, 0);

    // Fire-and-forget: audit transport failures degrade to a local warning
    // inside emit_audit and never block batch completion.
    let snapshot_id = operation.rollback.as_ref().map(|r| r.snapshot_id);
    for id in batch_ids {
        let prior_status = prior
            .iter()
            .find(|r| r.id == *id)
            .map(|r| r.approval_status);
        let (action, after) = match mutation {
            BatchMutation::SetStatus(status) => (
                AuditAction::RecordStatusChanged,
                json!({
                    "batch": batch_no,
                    "approval_status": status,
                    "snapshot_id": snapshot_id,
                }),
            ),
            BatchMutation::UpdateFields(update) => (
                AuditAction::RecordFieldsChanged,
                json!({
                    "batch": batch_no,
                    "update": update,
                    "snapshot_id": snapshot_id,
                }),
            ),
        };
        emit_audit(
            deps,
            AuditEntry::new(&operation.created_by, action, id.into_uuid())
                .with_before(json!({ "approval_status": prior_status }))
                .with_after(after)
                .for_operation(operation.id),
        )
        .await;
    }

    info!(
        operation = %operation.id,
        batch = batch_no,
        records = batch_ids.len(),
        "batch committed"
    );
    true
}

fn record_batch_failure(operation: &mut BulkOperation, batch_ids: &[BusinessId], message: &str) {
    for id in batch_ids {
        operation.results.push(RecordOutcome {
            business_id: *id,
            batch: operation.batch_no,
            status: OutcomeStatus::Failed,
            message: Some(message.to_string()),
        });
    }
    operation.counters.apply_batch(0, batch_ids.len() as i64, 0);
}
