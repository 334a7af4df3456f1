//! Bulk operation controller
//!
//! Owns the operation lifecycle: creation (with safety pre-flight),
//! transitions through the pure state machine, and the run loop that drives
//! snapshot capture, the workflow stage phase, and batch commits. The loop
//! re-reads the operation at every boundary, so PAUSE and CANCEL from other
//! sessions are honored cooperatively between batches, never mid-commit.

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::common::{
    AuditAction, AuditEntry, BackofficeError, BackofficeResult, BusinessId, OperationId,
};
use crate::domains::bulk_ops::activities::{batch, safety, stages};
use crate::domains::bulk_ops::machines::{self, OperationAction};
use crate::domains::bulk_ops::models::{
    BulkOperation, OperationKind, OperationSpec, OperationStatus, OutcomeStatus, RecordOutcome,
    StageStatus,
};
use crate::kernel::{emit_audit, ensure_admin, BackofficeDeps};

/// Create an operation in DRAFT (or READY when the spec says so).
///
/// Resolves targets from the criteria, runs the safety pre-flight, and
/// injects the kind's default workflow when none is supplied. Pre-flight
/// failure leaves nothing behind.
pub async fn create_operation(
    deps: &BackofficeDeps,
    actor: &str,
    spec: OperationSpec,
) -> BackofficeResult<BulkOperation> {
    ensure_admin(deps, actor).await?;

    if spec.name.trim().is_empty() {
        return Err(BackofficeError::validation("operation name is empty"));
    }
    if let OperationKind::BulkUpdate { update } = &spec.kind {
        if update.is_empty() {
            return Err(BackofficeError::validation(
                "bulk update must set at least one field",
            ));
        }
    }

    let targets = deps.store.find_by_criteria(&spec.criteria).await?;
    safety::preflight(targets.len(), &spec.safety)?;

    let target_ids: Vec<BusinessId> = targets.iter().map(|t| t.id).collect();
    let workflow = if spec.workflow.is_empty() {
        spec.kind.default_workflow()
    } else {
        spec.workflow
    };

    let mut status = OperationStatus::Draft;
    if spec.ready {
        status = machines::transition(status, OperationAction::Ready)?;
    }

    let mut operation = BulkOperation::builder()
        .name(spec.name)
        .status(status)
        .kind(spec.kind)
        .criteria(spec.criteria)
        .safety(spec.safety)
        .workflow(workflow)
        .target_ids(target_ids.clone())
        .remaining_ids(target_ids)
        .created_by(actor)
        .build();
    operation.counters.target = operation.target_ids.len() as i64;
    operation.log(
        actor,
        "created",
        Some(format!(
            "{} targets, status {}",
            operation.counters.target,
            operation.status.as_str()
        )),
    );

    deps.store.insert_operation(&operation).await?;
    emit_audit(
        deps,
        AuditEntry::new(actor, AuditAction::OperationCreated, operation.id.into_uuid())
            .with_after(json!({
                "name": operation.name,
                "kind": operation.kind.label(),
                "target_count": operation.counters.target,
                "status": operation.status,
            }))
            .for_operation(operation.id),
    )
    .await;

    info!(
        operation = %operation.id,
        kind = operation.kind.label(),
        targets = operation.counters.target,
        "created bulk operation"
    );
    Ok(operation)
}

/// Apply one caller-facing lifecycle action. Invalid transitions fail with
/// InvalidState and mutate nothing.
pub async fn transition_operation(
    deps: &BackofficeDeps,
    actor: &str,
    id: OperationId,
    action: OperationAction,
) -> BackofficeResult<BulkOperation> {
    ensure_admin(deps, actor).await?;

    if matches!(action, OperationAction::Complete | OperationAction::Fail) {
        return Err(BackofficeError::validation(format!(
            "{} is driven by the run loop, not callers",
            action.as_str()
        )));
    }

    let mut operation = deps
        .store
        .find_operation(id)
        .await?
        .ok_or_else(|| BackofficeError::not_found("bulk operation", id))?;

    let previous = operation.status;
    operation.status = machines::transition(previous, action)?;

    match action {
        OperationAction::Start => operation.started_at = Some(Utc::now()),
        OperationAction::Cancel => operation.finished_at = Some(Utc::now()),
        _ => {}
    }
    operation.log(actor, action.as_str(), None);

    deps.store.update_operation(&operation).await?;
    emit_audit(
        deps,
        AuditEntry::new(actor, AuditAction::OperationTransitioned, id.into_uuid())
            .with_before(json!({ "status": previous }))
            .with_after(json!({ "status": operation.status }))
            .for_operation(id),
    )
    .await;

    info!(
        operation = %id,
        action = action.as_str(),
        from = previous.as_str(),
        to = operation.status.as_str(),
        "operation transitioned"
    );
    Ok(operation)
}

/// Fetch an operation: status, counters, per-record results, audit-log tail.
pub async fn get_operation(
    deps: &BackofficeDeps,
    id: OperationId,
) -> BackofficeResult<BulkOperation> {
    deps.store
        .find_operation(id)
        .await?
        .ok_or_else(|| BackofficeError::not_found("bulk operation", id))
}

/// Drive a RUNNING operation until it completes, fails, or a cooperative
/// pause/cancel takes effect. Re-entrant: resuming a paused operation and
/// calling this again continues from the persisted cursors.
pub async fn run_operation(
    deps: &BackofficeDeps,
    actor: &str,
    id: OperationId,
) -> BackofficeResult<BulkOperation> {
    ensure_admin(deps, actor).await?;

    let first = deps
        .store
        .find_operation(id)
        .await?
        .ok_or_else(|| BackofficeError::not_found("bulk operation", id))?;
    if first.status != OperationStatus::Running {
        return Err(BackofficeError::invalid_state(format!(
            "operation {} is {}; it must be running to be driven",
            id,
            first.status.as_str()
        )));
    }

    loop {
        // Fresh read every cycle: a concurrent PAUSE or CANCEL lands here,
        // never inside a committing batch.
        let mut operation = deps
            .store
            .find_operation(id)
            .await?
            .ok_or_else(|| BackofficeError::not_found("bulk operation", id))?;
        if operation.status != OperationStatus::Running {
            return Ok(operation);
        }

        // Snapshot phase, while no batch has committed yet.
        if safety::capture_window_open(&operation) {
            if let Err(err) = safety::run_snapshot_phase(deps, &mut operation, actor).await {
                return fail_operation(deps, operation, actor, &err.to_string()).await;
            }
        }

        // Stage phase: evaluate the workflow per record.
        if !operation.remaining_ids.is_empty() {
            if operation.workflow.is_empty() {
                let mut remaining = std::mem::take(&mut operation.remaining_ids);
                operation.pending_ids.append(&mut remaining);
            } else {
                let pause = evaluate_stage_chunk(deps, &mut operation).await;
                if let Some(message) = pause {
                    operation.status =
                        machines::transition(operation.status, OperationAction::Pause)?;
                    operation.log(actor, "pause", Some(format!("checkpoint: {message}")));
                    emit_audit(
                        deps,
                        AuditEntry::new(actor, AuditAction::OperationTransitioned, id.into_uuid())
                            .with_before(json!({ "status": OperationStatus::Running }))
                            .with_after(json!({
                                "status": operation.status,
                                "checkpoint": message,
                            }))
                            .for_operation(id),
                    )
                    .await;
                }
            }
            persist(deps, &operation).await?;
            continue;
        }

        // Batch phase: commit processed records, one batch per cycle.
        if !operation.pending_ids.is_empty() {
            let take = operation.batch_size().min(operation.pending_ids.len());
            let batch_ids: Vec<BusinessId> = operation.pending_ids.drain(..take).collect();
            batch::commit_batch(deps, &mut operation, &batch_ids).await;
            persist(deps, &operation).await?;
            continue;
        }

        // Nothing left: complete.
        for stage in operation.workflow.iter_mut() {
            stage.status = StageStatus::Completed;
        }
        operation.status = machines::transition(operation.status, OperationAction::Complete)?;
        operation.finished_at = Some(Utc::now());
        operation.log(
            actor,
            "complete",
            Some(format!(
                "processed={} success={} failed={} skipped={}",
                operation.counters.processed,
                operation.counters.success,
                operation.counters.failed,
                operation.counters.skipped
            )),
        );
        persist(deps, &operation).await?;
        emit_audit(
            deps,
            AuditEntry::new(actor, AuditAction::OperationTransitioned, id.into_uuid())
                .with_after(json!({
                    "status": operation.status,
                    "counters": operation.counters,
                }))
                .for_operation(id),
        )
        .await;
        info!(
            operation = %id,
            success = operation.counters.success,
            failed = operation.counters.failed,
            skipped = operation.counters.skipped,
            "operation completed"
        );
        return Ok(operation);
    }
}

/// Evaluate up to one batch-size chunk of remaining records through the
/// workflow. Returns the checkpoint message when a pause was requested;
/// unevaluated records stay at the front of `remaining_ids`.
async fn evaluate_stage_chunk(
    deps: &BackofficeDeps,
    operation: &mut BulkOperation,
) -> Option<String> {
    let take = operation.batch_size().min(operation.remaining_ids.len());
    let chunk: Vec<BusinessId> = operation.remaining_ids.drain(..take).collect();

    let mut failed = 0i64;
    let mut skipped = 0i64;
    let mut pause: Option<String> = None;

    let mut iter = chunk.into_iter();
    for id in iter.by_ref() {
        let record = match deps.store.find_business(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                operation.results.push(RecordOutcome {
                    business_id: id,
                    batch: 0,
                    status: OutcomeStatus::Skipped,
                    message: Some("record no longer exists".to_string()),
                });
                skipped += 1;
                continue;
            }
            Err(err) => {
                operation.results.push(RecordOutcome {
                    business_id: id,
                    batch: 0,
                    status: OutcomeStatus::Failed,
                    message: Some(format!("stage read failed: {err}")),
                });
                failed += 1;
                continue;
            }
        };

        let outcome = stages::evaluate_record(deps, &mut operation.workflow, &record).await;
        match outcome.evaluation {
            stages::RecordEvaluation::Passed => operation.pending_ids.push(id),
            stages::RecordEvaluation::Skipped { reason } => {
                operation.results.push(RecordOutcome {
                    business_id: id,
                    batch: 0,
                    status: OutcomeStatus::Skipped,
                    message: Some(reason),
                });
                skipped += 1;
            }
            stages::RecordEvaluation::Failed { failed_rules } => {
                operation.results.push(RecordOutcome {
                    business_id: id,
                    batch: 0,
                    status: OutcomeStatus::Failed,
                    message: Some(format!("failed rules: {}", failed_rules.join(", "))),
                });
                failed += 1;
            }
        }

        if outcome.pause_requested {
            pause = Some(
                outcome
                    .checkpoint_message
                    .unwrap_or_else(|| "operator review".to_string()),
            );
            break;
        }
    }

    // Anything the pause cut off goes back to the front, in order.
    let rest: Vec<BusinessId> = iter.collect();
    operation.remaining_ids.splice(0..0, rest);

    if failed + skipped > 0 {
        operation.counters.apply_batch(0, failed, skipped);
    }
    pause
}

async fn persist(deps: &BackofficeDeps, operation: &BulkOperation) -> BackofficeResult<()> {
    if let Err(err) = deps.store.update_operation(operation).await {
        // Progress cannot be saved; there is no safe continuation.
        warn!(operation = %operation.id, error = %err, "failed to persist operation progress");
        return Err(err);
    }
    Ok(())
}

async fn fail_operation(
    deps: &BackofficeDeps,
    mut operation: BulkOperation,
    actor: &str,
    reason: &str,
) -> BackofficeResult<BulkOperation> {
    operation.status = machines::transition(operation.status, OperationAction::Fail)?;
    operation.finished_at = Some(Utc::now());
    operation.log(actor, "fail", Some(reason.to_string()));
    deps.store.update_operation(&operation).await?;
    emit_audit(
        deps,
        AuditEntry::new(
            actor,
            AuditAction::OperationTransitioned,
            operation.id.into_uuid(),
        )
        .with_after(json!({ "status": operation.status, "reason": reason }))
        .for_operation(operation.id),
    )
    .await;
    warn!(operation = %operation.id, reason, "operation failed");
    Ok(operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::bulk_ops::models::{
        ApprovalConditions, SafetyConfig, StageConfig, ValidationRule, WorkflowStage,
    };
    use crate::domains::directory::models::{ApprovalStatus, BusinessRecord, FilterCriterion};
    use crate::kernel::test_dependencies::{test_kernel, TestKernel, TEST_ADMIN};

    fn seed_pending(kernel: &TestKernel, count: usize, quality: f64) -> Vec<BusinessId> {
        (0..count)
            .map(|i| {
                kernel.store.seed_business(
                    BusinessRecord::builder()
                        .name(format!("Business {i}"))
                        .quality_score(quality)
                        .build(),
                )
            })
            .collect()
    }

    fn pending_filter() -> Vec<FilterCriterion> {
        vec![FilterCriterion::Status {
            value: ApprovalStatus::Pending,
        }]
    }

    fn approve_spec(name: &str) -> OperationSpec {
        OperationSpec::builder()
            .name(name)
            .kind(OperationKind::Approve)
            .criteria(pending_filter())
            .build()
    }

    async fn start(kernel: &TestKernel, id: OperationId) {
        transition_operation(&kernel.deps, TEST_ADMIN, id, OperationAction::Ready)
            .await
            .unwrap();
        transition_operation(&kernel.deps, TEST_ADMIN, id, OperationAction::Start)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_resolves_targets_and_persists_draft() {
        let kernel = test_kernel();
        seed_pending(&kernel, 3, 50.0);

        let operation = create_operation(&kernel.deps, TEST_ADMIN, approve_spec("approve all"))
            .await
            .unwrap();

        assert_eq!(operation.status, OperationStatus::Draft);
        assert_eq!(operation.counters.target, 3);
        assert_eq!(operation.target_ids.len(), 3);
        assert!(kernel.store.operation(operation.id).is_some());
        assert!(kernel
            .audit
            .actions()
            .contains(&AuditAction::OperationCreated));
    }

    #[tokio::test]
    async fn test_create_ready_spec_lands_in_ready() {
        let kernel = test_kernel();
        seed_pending(&kernel, 1, 50.0);
        let spec = OperationSpec::builder()
            .name("scheduled approve")
            .kind(OperationKind::Approve)
            .criteria(pending_filter())
            .ready(true)
            .build();

        let operation = create_operation(&kernel.deps, TEST_ADMIN, spec).await.unwrap();
        assert_eq!(operation.status, OperationStatus::Ready);
    }

    #[tokio::test]
    async fn test_create_over_safety_ceiling_mutates_nothing() {
        let kernel = test_kernel();
        seed_pending(&kernel, 6, 50.0);
        let spec = OperationSpec::builder()
            .name("too big")
            .kind(OperationKind::Approve)
            .criteria(pending_filter())
            .safety(SafetyConfig {
                max_records: 5,
                ..Default::default()
            })
            .build();

        let err = create_operation(&kernel.deps, TEST_ADMIN, spec).await.unwrap_err();
        assert!(matches!(err, BackofficeError::Validation(_)));
        assert!(err.to_string().contains("max_records=5"));
        // Nothing persisted, nothing audited
        assert_eq!(kernel.audit.count(), 0);
    }

    #[tokio::test]
    async fn test_start_records_started_at_and_appends_audit() {
        let kernel = test_kernel();
        seed_pending(&kernel, 1, 50.0);
        let operation = create_operation(&kernel.deps, TEST_ADMIN, approve_spec("approve"))
            .await
            .unwrap();

        start(&kernel, operation.id).await;

        let operation = kernel.store.operation(operation.id).unwrap();
        assert_eq!(operation.status, OperationStatus::Running);
        assert!(operation.started_at.is_some());
        let actions: Vec<_> = operation.audit_log.iter().map(|e| e.action.clone()).collect();
        assert_eq!(actions, vec!["created", "ready", "start"]);
    }

    #[tokio::test]
    async fn test_invalid_transition_mutates_nothing() {
        let kernel = test_kernel();
        seed_pending(&kernel, 1, 50.0);
        let operation = create_operation(&kernel.deps, TEST_ADMIN, approve_spec("approve"))
            .await
            .unwrap();

        // START from DRAFT is illegal
        let err = transition_operation(
            &kernel.deps,
            TEST_ADMIN,
            operation.id,
            OperationAction::Start,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BackofficeError::InvalidState(_)));

        let stored = kernel.store.operation(operation.id).unwrap();
        assert_eq!(stored.status, OperationStatus::Draft);
        assert!(stored.started_at.is_none());
    }

    #[tokio::test]
    async fn test_internal_actions_are_rejected() {
        let kernel = test_kernel();
        seed_pending(&kernel, 1, 50.0);
        let operation = create_operation(&kernel.deps, TEST_ADMIN, approve_spec("approve"))
            .await
            .unwrap();

        for action in [OperationAction::Complete, OperationAction::Fail] {
            let err = transition_operation(&kernel.deps, TEST_ADMIN, operation.id, action)
                .await
                .unwrap_err();
            assert!(matches!(err, BackofficeError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_full_run_approves_in_batches() {
        let kernel = test_kernel();
        let targets = seed_pending(&kernel, 5, 50.0);
        let spec = OperationSpec::builder()
            .name("approve in pairs")
            .kind(OperationKind::Approve)
            .criteria(pending_filter())
            .safety(SafetyConfig {
                checkpoint_frequency: 2,
                ..Default::default()
            })
            .build();
        let operation = create_operation(&kernel.deps, TEST_ADMIN, spec).await.unwrap();
        start(&kernel, operation.id).await;

        let done = run_operation(&kernel.deps, TEST_ADMIN, operation.id)
            .await
            .unwrap();

        assert_eq!(done.status, OperationStatus::Completed);
        assert!(done.finished_at.is_some());
        assert_eq!(done.batch_no, 3); // 2 + 2 + 1
        assert_eq!(done.counters.processed, 5);
        assert_eq!(done.counters.success, 5);
        assert!(done.counters.is_consistent());
        assert!(done.succeeded());
        assert_eq!(done.results.len(), 5);
        for id in targets {
            let record = kernel.store.business(id).unwrap();
            assert_eq!(record.approval_status, ApprovalStatus::Approved);
        }
        // Snapshot captured by default safety config
        assert!(done.rollback.is_some());
        assert_eq!(kernel.store.snapshot_count(), 1);
    }

    #[tokio::test]
    async fn test_run_requires_running_state() {
        let kernel = test_kernel();
        seed_pending(&kernel, 1, 50.0);
        let operation = create_operation(&kernel.deps, TEST_ADMIN, approve_spec("approve"))
            .await
            .unwrap();

        let err = run_operation(&kernel.deps, TEST_ADMIN, operation.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BackofficeError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_validation_failures_are_per_record_not_fatal() {
        let kernel = test_kernel();
        // Two records with abn, one without
        let with_abn: Vec<BusinessId> = (0..2)
            .map(|i| {
                let mut record = BusinessRecord::builder()
                    .name(format!("Has Abn {i}"))
                    .quality_score(60.0)
                    .build();
                record.abn = Some("51824753556".to_string());
                kernel.store.seed_business(record)
            })
            .collect();
        let without_abn = seed_pending(&kernel, 1, 60.0);

        let spec = OperationSpec::builder()
            .name("approve validated")
            .kind(OperationKind::Approve)
            .criteria(pending_filter())
            .workflow(vec![WorkflowStage::new(
                "validation",
                StageConfig::Validation {
                    rules: vec![ValidationRule::AbnPresent],
                },
            )])
            .build();
        let operation = create_operation(&kernel.deps, TEST_ADMIN, spec).await.unwrap();
        start(&kernel, operation.id).await;

        let done = run_operation(&kernel.deps, TEST_ADMIN, operation.id)
            .await
            .unwrap();

        assert_eq!(done.status, OperationStatus::Completed);
        assert_eq!(done.counters.success, 2);
        assert_eq!(done.counters.failed, 1);
        assert!(done.counters.is_consistent());
        assert!(!done.succeeded());

        let failure = done
            .results
            .iter()
            .find(|o| o.status == OutcomeStatus::Failed)
            .unwrap();
        assert_eq!(failure.business_id, without_abn[0]);
        assert!(failure.message.as_deref().unwrap().contains("abn_present"));

        for id in with_abn {
            assert_eq!(
                kernel.store.business(id).unwrap().approval_status,
                ApprovalStatus::Approved
            );
        }
        assert_eq!(
            kernel.store.business(without_abn[0]).unwrap().approval_status,
            ApprovalStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_conditional_approve_skips_low_quality() {
        let kernel = test_kernel();
        seed_pending(&kernel, 2, 80.0);
        seed_pending(&kernel, 1, 20.0);

        let spec = OperationSpec::builder()
            .name("conditional approve")
            .kind(OperationKind::ConditionalApprove {
                conditions: ApprovalConditions {
                    quality_score_min: Some(50.0),
                    ..Default::default()
                },
            })
            .criteria(pending_filter())
            .build();
        let operation = create_operation(&kernel.deps, TEST_ADMIN, spec).await.unwrap();
        start(&kernel, operation.id).await;

        let done = run_operation(&kernel.deps, TEST_ADMIN, operation.id)
            .await
            .unwrap();

        assert_eq!(done.counters.success, 2);
        assert_eq!(done.counters.skipped, 1);
        assert!(done.counters.is_consistent());
        assert!(done.succeeded()); // skips are not failures
    }

    #[tokio::test]
    async fn test_checkpoint_pauses_then_resume_finishes() {
        let kernel = test_kernel();
        let targets = seed_pending(&kernel, 3, 50.0);

        let spec = OperationSpec::builder()
            .name("checkpointed approve")
            .kind(OperationKind::Approve)
            .criteria(pending_filter())
            .workflow(vec![WorkflowStage::new(
                "operator check",
                StageConfig::Checkpoint {
                    message: "review the plan".to_string(),
                    pause_for_review: true,
                },
            )])
            .build();
        let operation = create_operation(&kernel.deps, TEST_ADMIN, spec).await.unwrap();
        start(&kernel, operation.id).await;

        let paused = run_operation(&kernel.deps, TEST_ADMIN, operation.id)
            .await
            .unwrap();
        assert_eq!(paused.status, OperationStatus::Paused);
        // Nothing committed yet
        for id in &targets {
            assert_eq!(
                kernel.store.business(*id).unwrap().approval_status,
                ApprovalStatus::Pending
            );
        }

        transition_operation(&kernel.deps, TEST_ADMIN, operation.id, OperationAction::Resume)
            .await
            .unwrap();
        let done = run_operation(&kernel.deps, TEST_ADMIN, operation.id)
            .await
            .unwrap();

        assert_eq!(done.status, OperationStatus::Completed);
        assert_eq!(done.counters.success, 3);
        for id in &targets {
            assert_eq!(
                kernel.store.business(*id).unwrap().approval_status,
                ApprovalStatus::Approved
            );
        }
    }

    #[tokio::test]
    async fn test_batch_failure_is_isolated() {
        let kernel = test_kernel();
        seed_pending(&kernel, 4, 50.0);
        let spec = OperationSpec::builder()
            .name("approve with flaky store")
            .kind(OperationKind::Approve)
            .criteria(pending_filter())
            .safety(SafetyConfig {
                checkpoint_frequency: 2,
                ..Default::default()
            })
            .build();
        let operation = create_operation(&kernel.deps, TEST_ADMIN, spec).await.unwrap();
        start(&kernel, operation.id).await;
        kernel.store.fail_next_batch_update("replica lag");

        let done = run_operation(&kernel.deps, TEST_ADMIN, operation.id)
            .await
            .unwrap();

        assert_eq!(done.status, OperationStatus::Completed);
        assert_eq!(done.counters.failed, 2);
        assert_eq!(done.counters.success, 2);
        assert!(done.counters.is_consistent());
        assert!(!done.succeeded());
        let failed: Vec<_> = done
            .results
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 2);
        assert!(failed
            .iter()
            .all(|o| o.message.as_deref().unwrap().contains("replica lag")));
    }

    #[tokio::test]
    async fn test_mandatory_snapshot_failure_fails_operation_with_no_changes() {
        let kernel = test_kernel();
        let targets = seed_pending(&kernel, 2, 50.0);
        let operation = create_operation(&kernel.deps, TEST_ADMIN, approve_spec("approve"))
            .await
            .unwrap();
        start(&kernel, operation.id).await;
        kernel.store.fail_snapshot_inserts("disk full");

        let done = run_operation(&kernel.deps, TEST_ADMIN, operation.id)
            .await
            .unwrap();

        assert_eq!(done.status, OperationStatus::Failed);
        assert_eq!(done.counters.processed, 0);
        for id in targets {
            assert_eq!(
                kernel.store.business(id).unwrap().approval_status,
                ApprovalStatus::Pending
            );
        }
    }

    #[tokio::test]
    async fn test_cancelled_operation_cannot_be_driven() {
        let kernel = test_kernel();
        seed_pending(&kernel, 1, 50.0);
        let operation = create_operation(&kernel.deps, TEST_ADMIN, approve_spec("approve"))
            .await
            .unwrap();
        transition_operation(&kernel.deps, TEST_ADMIN, operation.id, OperationAction::Cancel)
            .await
            .unwrap();

        let err = run_operation(&kernel.deps, TEST_ADMIN, operation.id)
            .await
            .unwrap_err();
        assert!(matches!(err, BackofficeError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_non_admin_cannot_create_or_transition() {
        let kernel = test_kernel();
        seed_pending(&kernel, 1, 50.0);

        let err = create_operation(&kernel.deps, "visitor@example.com", approve_spec("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackofficeError::AdminRequired));

        let operation = create_operation(&kernel.deps, TEST_ADMIN, approve_spec("approve"))
            .await
            .unwrap();
        let err = transition_operation(
            &kernel.deps,
            "visitor@example.com",
            operation.id,
            OperationAction::Ready,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BackofficeError::AdminRequired));
    }

    #[tokio::test]
    async fn test_get_operation_returns_audit_tail() {
        let kernel = test_kernel();
        seed_pending(&kernel, 1, 50.0);
        let operation = create_operation(&kernel.deps, TEST_ADMIN, approve_spec("approve"))
            .await
            .unwrap();
        start(&kernel, operation.id).await;

        let fetched = get_operation(&kernel.deps, operation.id).await.unwrap();
        assert_eq!(fetched.status, OperationStatus::Running);
        let tail = fetched.audit_tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].action, "ready");
        assert_eq!(tail[1].action, "start");

        let err = get_operation(&kernel.deps, OperationId::new()).await.unwrap_err();
        assert!(matches!(err, BackofficeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_target_set_completes_immediately() {
        let kernel = test_kernel();
        // No businesses seeded: filter resolves nothing
        let operation = create_operation(&kernel.deps, TEST_ADMIN, approve_spec("approve none"))
            .await
            .unwrap();
        assert_eq!(operation.counters.target, 0);
        start(&kernel, operation.id).await;

        let done = run_operation(&kernel.deps, TEST_ADMIN, operation.id)
            .await
            .unwrap();
        assert_eq!(done.status, OperationStatus::Completed);
        assert_eq!(done.counters.processed, 0);
        assert!(done.succeeded());
    }
}
