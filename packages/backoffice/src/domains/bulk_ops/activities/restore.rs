//! Snapshot restore
//!
//! Re-applies a captured snapshot through the same atomic per-batch
//! mechanism the forward path uses: one atomic update per batch, per-record
//! audit entries, isolated batch failures, and a structured per-record
//! report instead of a single verdict.

use chrono::Utc;
use serde_json::json;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::common::{AuditAction, AuditEntry, BackofficeError, BackofficeResult, OperationId, SnapshotId};
use crate::domains::bulk_ops::models::{OutcomeStatus, RecordOutcome};
use crate::kernel::{emit_audit, ensure_admin, BackofficeDeps};

/// Structured result of a restore run.
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub operation_id: OperationId,
    pub snapshot_id: SnapshotId,
    pub restored: i64,
    pub failed: i64,
    pub outcomes: Vec<RecordOutcome>,
}

impl RestoreReport {
    pub fn succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Roll a finished operation back to its captured pre-operation values.
///
/// Only valid once the operation is terminal, and only once: a second
/// restore fails validation (the captured values are no longer the state
/// being rolled back from).
pub async fn restore_snapshot(
    deps: &BackofficeDeps,
    actor: &str,
    operation_id: OperationId,
) -> BackofficeResult<RestoreReport> {
    ensure_admin(deps, actor).await?;

    let mut operation = deps
        .store
        .find_operation(operation_id)
        .await?
        .ok_or_else(|| BackofficeError::not_found("bulk operation", operation_id))?;

    if !operation.status.is_terminal() {
        return Err(BackofficeError::invalid_state(format!(
            "operation {} is {}; restore is only available once it has finished",
            operation_id,
            operation.status.as_str()
        )));
    }
    let Some(rollback) = operation.rollback.clone() else {
        return Err(BackofficeError::validation(
            "operation has no captured snapshot to restore",
        ));
    };
    if rollback.restored_at.is_some() {
        return Err(BackofficeError::validation(
            "snapshot has already been restored",
        ));
    }

    let snapshot = deps
        .store
        .find_snapshot(rollback.snapshot_id)
        .await?
        .ok_or_else(|| BackofficeError::not_found("snapshot", rollback.snapshot_id))?;

    let batch_size = operation.batch_size();
    let mut outcomes: Vec<RecordOutcome> = Vec::with_capacity(snapshot.entries.len());
    let mut restored = 0i64;
    let mut failed = 0i64;

    for (index, entries) in snapshot.entries.chunks(batch_size).enumerate() {
        let batch_no = (index + 1) as i32;
        let applied = timeout(deps.batch_timeout, deps.store.apply_snapshot_batch(entries)).await;

        let message = match applied {
            Ok(Ok(_rows)) => None,
            Ok(Err(err)) => Some(format!("restore batch failed: {err}")),
            Err(_elapsed) => Some(format!(
                "restore batch timed out after {:?}",
                deps.batch_timeout
            )),
        };

        match message {
            None => {
                restored += entries.len() as i64;
                for entry in entries {
                    outcomes.push(RecordOutcome {
                        business_id: entry.business_id,
                        batch: batch_no,
                        status: OutcomeStatus::Success,
                        message: None,
                    });
                    emit_audit(
                        deps,
                        AuditEntry::new(
                            actor,
                            AuditAction::RecordRestored,
                            entry.business_id.into_uuid(),
                        )
                        .with_after(json!({
                            "batch": batch_no,
                            "approval_status": entry.approval_status,
                            "snapshot_id": snapshot.id,
                        }))
                        .for_operation(operation_id),
                    )
                    .await;
                }
            }
            Some(message) => {
                warn!(
                    operation = %operation_id,
                    batch = batch_no,
                    error = %message,
                    "restore batch failed; continuing with next batch"
                );
                failed += entries.len() as i64;
                for entry in entries {
                    outcomes.push(RecordOutcome {
                        business_id: entry.business_id,
                        batch: batch_no,
                        status: OutcomeStatus::Failed,
                        message: Some(message.clone()),
                    });
                }
            }
        }
    }

    if let Some(rollback) = operation.rollback.as_mut() {
        rollback.restored_at = Some(Utc::now());
    }
    operation.log(
        actor,
        "snapshot_restored",
        Some(format!("restored={restored} failed={failed}")),
    );
    deps.store.update_operation(&operation).await?;
    emit_audit(
        deps,
        AuditEntry::new(actor, AuditAction::SnapshotRestored, snapshot.id.into_uuid())
            .with_after(json!({ "restored": restored, "failed": failed }))
            .for_operation(operation_id),
    )
    .await;

    info!(operation = %operation_id, restored, failed, "snapshot restore finished");

    Ok(RestoreReport {
        operation_id,
        snapshot_id: snapshot.id,
        restored,
        failed,
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::bulk_ops::activities::controller::{
        create_operation, run_operation, transition_operation,
    };
    use crate::domains::bulk_ops::machines::OperationAction;
    use crate::domains::bulk_ops::models::{OperationKind, OperationSpec, SafetyConfig};
    use crate::domains::directory::models::{ApprovalStatus, BusinessRecord, FilterCriterion};
    use crate::kernel::test_dependencies::{test_kernel, TestKernel, TEST_ADMIN};

    async fn approved_operation(kernel: &TestKernel, count: usize, batch: i64) -> OperationId {
        for i in 0..count {
            kernel.store.seed_business(
                BusinessRecord::builder().name(format!("Business {i}")).build(),
            );
        }
        let spec = OperationSpec::builder()
            .name("approve all")
            .kind(OperationKind::Approve)
            .criteria(vec![FilterCriterion::Status {
                value: ApprovalStatus::Pending,
            }])
            .safety(SafetyConfig {
                checkpoint_frequency: batch,
                ..Default::default()
            })
            .build();
        let operation = create_operation(&kernel.deps, TEST_ADMIN, spec).await.unwrap();
        transition_operation(&kernel.deps, TEST_ADMIN, operation.id, OperationAction::Ready)
            .await
            .unwrap();
        transition_operation(&kernel.deps, TEST_ADMIN, operation.id, OperationAction::Start)
            .await
            .unwrap();
        run_operation(&kernel.deps, TEST_ADMIN, operation.id)
            .await
            .unwrap();
        operation.id
    }

    #[tokio::test]
    async fn test_restore_reapplies_captured_statuses() {
        let kernel = test_kernel();
        let operation_id = approved_operation(&kernel, 3, 50).await;

        let operation = kernel.store.operation(operation_id).unwrap();
        for id in &operation.target_ids {
            assert_eq!(
                kernel.store.business(*id).unwrap().approval_status,
                ApprovalStatus::Approved
            );
        }

        let report = restore_snapshot(&kernel.deps, TEST_ADMIN, operation_id)
            .await
            .unwrap();
        assert_eq!(report.restored, 3);
        assert_eq!(report.failed, 0);
        assert!(report.succeeded());

        for id in &operation.target_ids {
            assert_eq!(
                kernel.store.business(*id).unwrap().approval_status,
                ApprovalStatus::Pending
            );
        }
        let operation = kernel.store.operation(operation_id).unwrap();
        assert!(operation.rollback.unwrap().restored_at.is_some());
        assert!(kernel
            .audit
            .actions()
            .contains(&AuditAction::SnapshotRestored));
    }

    #[tokio::test]
    async fn test_restore_requires_terminal_state() {
        let kernel = test_kernel();
        kernel
            .store
            .seed_business(BusinessRecord::builder().name("Acme").build());
        let spec = OperationSpec::builder()
            .name("approve")
            .kind(OperationKind::Approve)
            .criteria(vec![FilterCriterion::Status {
                value: ApprovalStatus::Pending,
            }])
            .build();
        let operation = create_operation(&kernel.deps, TEST_ADMIN, spec).await.unwrap();

        let err = restore_snapshot(&kernel.deps, TEST_ADMIN, operation.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BackofficeError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_restore_without_snapshot_fails_validation() {
        let kernel = test_kernel();
        kernel
            .store
            .seed_business(BusinessRecord::builder().name("Acme").build());
        let spec = OperationSpec::builder()
            .name("approve without backup")
            .kind(OperationKind::Approve)
            .criteria(vec![FilterCriterion::Status {
                value: ApprovalStatus::Pending,
            }])
            .safety(SafetyConfig {
                backup_required: false,
                ..Default::default()
            })
            .build();
        let operation = create_operation(&kernel.deps, TEST_ADMIN, spec).await.unwrap();
        transition_operation(&kernel.deps, TEST_ADMIN, operation.id, OperationAction::Ready)
            .await
            .unwrap();
        transition_operation(&kernel.deps, TEST_ADMIN, operation.id, OperationAction::Start)
            .await
            .unwrap();
        run_operation(&kernel.deps, TEST_ADMIN, operation.id)
            .await
            .unwrap();

        let err = restore_snapshot(&kernel.deps, TEST_ADMIN, operation.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BackofficeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_second_restore_fails() {
        let kernel = test_kernel();
        let operation_id = approved_operation(&kernel, 2, 50).await;

        restore_snapshot(&kernel.deps, TEST_ADMIN, operation_id)
            .await
            .unwrap();
        let err = restore_snapshot(&kernel.deps, TEST_ADMIN, operation_id)
            .await
            .unwrap_err();
        assert!(matches!(err, BackofficeError::Validation(_)));
    }

    #[tokio::test]
    async fn test_restore_batch_failures_are_isolated() {
        let kernel = test_kernel();
        // Batch size 2 over 4 records = 2 restore batches
        let operation_id = approved_operation(&kernel, 4, 2).await;
        kernel.store.fail_next_batch_update("replica lag");

        let report = restore_snapshot(&kernel.deps, TEST_ADMIN, operation_id)
            .await
            .unwrap();
        assert_eq!(report.failed, 2);
        assert_eq!(report.restored, 2);
        assert!(!report.succeeded());

        // Second batch landed despite the first failing
        let restored: Vec<_> = report
            .outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Success)
            .collect();
        assert!(restored.iter().all(|o| o.batch == 2));
        for outcome in restored {
            assert_eq!(
                kernel
                    .store
                    .business(outcome.business_id)
                    .unwrap()
                    .approval_status,
                ApprovalStatus::Pending
            );
        }
    }
}
