//! Workflow stage executor
//!
//! Runs an operation's ordered stage sequence against one record at a time,
//! short-circuiting on the first failing or skipping stage. Stage state
//! (status, per-stage totals) is mutated in place on the operation's
//! workflow; the caller persists it.

use tracing::{debug, warn};

use crate::domains::bulk_ops::models::{
    ReviewDecision, StageConfig, StageStatus, WorkflowStage,
};
use crate::domains::directory::models::BusinessRecord;
use crate::kernel::BackofficeDeps;

/// Where one record landed after the stage pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEvaluation {
    /// Passed every stage; flows to the batch processor.
    Passed,
    /// An approval/review stage declined the record.
    Skipped { reason: String },
    /// A validation stage failed; carries every failed rule label.
    Failed { failed_rules: Vec<String> },
}

/// Result of evaluating one record, plus whether a checkpoint asked the
/// operation to pause before later records are processed.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    pub evaluation: RecordEvaluation,
    pub pause_requested: bool,
    /// Message of the checkpoint that requested the pause, for the
    /// operation's audit log.
    pub checkpoint_message: Option<String>,
}

/// Run one record through the stage pipeline.
///
/// A pausing checkpoint never interrupts the current record: the record
/// finishes its remaining stages, and `pause_requested` tells the controller
/// to stop before evaluating further records. The checkpoint is marked
/// Completed so a resumed operation passes straight through it.
pub async fn evaluate_record(
    deps: &BackofficeDeps,
    workflow: &mut [WorkflowStage],
    record: &BusinessRecord,
) -> EvaluationOutcome {
    let mut pause_requested = false;
    let mut checkpoint_message = None;

    for stage in workflow.iter_mut() {
        if stage.status == StageStatus::Pending {
            stage.status = StageStatus::InProgress;
        }

        match &stage.config {
            StageConfig::Validation { rules } => {
                let failed_rules: Vec<String> = rules
                    .iter()
                    .filter(|rule| !rule.passes(record))
                    .map(|rule| rule.label())
                    .collect();
                if !failed_rules.is_empty() {
                    stage.results.failed += 1;
                    return EvaluationOutcome {
                        evaluation: RecordEvaluation::Failed { failed_rules },
                        pause_requested,
                        checkpoint_message,
                    };
                }
                stage.results.passed += 1;
            }

            StageConfig::AutoApprove { conditions } | StageConfig::Conditional { conditions } => {
                if let Some(reason) = conditions.first_unmet(record) {
                    stage.results.skipped += 1;
                    return EvaluationOutcome {
                        evaluation: RecordEvaluation::Skipped { reason },
                        pause_requested,
                        checkpoint_message,
                    };
                }
                stage.results.passed += 1;
            }

            StageConfig::ManualReview {} => {
                match deps.approvals.request_review(record).await {
                    Ok(ReviewDecision::Approved) => stage.results.passed += 1,
                    Ok(ReviewDecision::Declined { reason }) => {
                        stage.results.skipped += 1;
                        return EvaluationOutcome {
                            evaluation: RecordEvaluation::Skipped {
                                reason: format!("manual review declined: {reason}"),
                            },
                            pause_requested,
                            checkpoint_message,
                        };
                    }
                    Err(err) => {
                        // A broken review channel must not fail the whole
                        // operation; the record waits for a later run.
                        warn!(record = %record.id, error = %err, "approval channel unavailable");
                        stage.results.skipped += 1;
                        return EvaluationOutcome {
                            evaluation: RecordEvaluation::Skipped {
                                reason: format!("manual review unavailable: {err}"),
                            },
                            pause_requested,
                            checkpoint_message,
                        };
                    }
                }
            }

            StageConfig::Checkpoint {
                message,
                pause_for_review,
            } => {
                // Checkpoints never change eligibility.
                debug!(record = %record.id, checkpoint = %message, "checkpoint reached");
                if *pause_for_review && stage.status != StageStatus::Completed {
                    // First record through an unacknowledged checkpoint:
                    // request a cooperative pause and acknowledge, so RESUME
                    // flows straight past it.
                    stage.status = StageStatus::Completed;
                    pause_requested = true;
                    checkpoint_message = Some(message.clone());
                }
                stage.results.passed += 1;
            }
        }
    }

    EvaluationOutcome {
        evaluation: RecordEvaluation::Passed,
        pause_requested,
        checkpoint_message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::bulk_ops::models::{ApprovalConditions, ValidationRule};
    use crate::kernel::test_dependencies::{test_kernel, test_kernel_with, FixedApprovalChannel};
    use std::sync::Arc;

    fn record(quality: f64) -> BusinessRecord {
        BusinessRecord::builder()
            .name("Test Business")
            .quality_score(quality)
            .build()
    }

    fn validation_stage() -> WorkflowStage {
        WorkflowStage::new(
            "validation",
            StageConfig::Validation {
                rules: vec![
                    ValidationRule::MinQualityScore { min: 40.0 },
                    ValidationRule::AbnPresent,
                ],
            },
        )
    }

    #[tokio::test]
    async fn test_validation_failure_lists_every_failed_rule() {
        let kernel = test_kernel();
        let mut workflow = vec![validation_stage()];

        let outcome = evaluate_record(&kernel.deps, &mut workflow, &record(10.0)).await;
        let RecordEvaluation::Failed { failed_rules } = outcome.evaluation else {
            panic!("expected failure");
        };
        assert_eq!(failed_rules.len(), 2);
        assert!(failed_rules[0].starts_with("min_quality_score"));
        assert_eq!(failed_rules[1], "abn_present");
        assert_eq!(workflow[0].results.failed, 1);
    }

    #[tokio::test]
    async fn test_conditional_skip_reports_first_unmet() {
        let kernel = test_kernel();
        let mut workflow = vec![WorkflowStage::new(
            "gate",
            StageConfig::Conditional {
                conditions: ApprovalConditions {
                    quality_score_min: Some(60.0),
                    ..Default::default()
                },
            },
        )];

        let outcome = evaluate_record(&kernel.deps, &mut workflow, &record(30.0)).await;
        let RecordEvaluation::Skipped { reason } = outcome.evaluation else {
            panic!("expected skip");
        };
        assert!(reason.contains("quality score"));
        assert_eq!(workflow[0].results.skipped, 1);
    }

    #[tokio::test]
    async fn test_failed_record_short_circuits_later_stages() {
        let kernel = test_kernel();
        let mut workflow = vec![
            validation_stage(),
            WorkflowStage::new("review", StageConfig::ManualReview {}),
        ];

        evaluate_record(&kernel.deps, &mut workflow, &record(10.0)).await;
        // The review stage never saw the record
        assert_eq!(workflow[1].results.passed, 0);
        assert_eq!(workflow[1].results.skipped, 0);
    }

    #[tokio::test]
    async fn test_manual_review_decline_skips_with_reason() {
        let kernel = test_kernel_with(Arc::new(FixedApprovalChannel::declining("needs photos")));
        let mut workflow = vec![WorkflowStage::new("review", StageConfig::ManualReview {})];

        let outcome = evaluate_record(&kernel.deps, &mut workflow, &record(90.0)).await;
        let RecordEvaluation::Skipped { reason } = outcome.evaluation else {
            panic!("expected skip");
        };
        assert!(reason.contains("needs photos"));
    }

    #[tokio::test]
    async fn test_quality_channel_is_deterministic() {
        let kernel = test_kernel(); // QualityScoreChannel, floor 75
        let mut workflow = vec![WorkflowStage::new("review", StageConfig::ManualReview {})];

        let high = evaluate_record(&kernel.deps, &mut workflow, &record(80.0)).await;
        assert_eq!(high.evaluation, RecordEvaluation::Passed);

        let low = evaluate_record(&kernel.deps, &mut workflow, &record(70.0)).await;
        assert!(matches!(low.evaluation, RecordEvaluation::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_checkpoint_pauses_once_and_never_blocks_eligibility() {
        let kernel = test_kernel();
        let mut workflow = vec![WorkflowStage::new(
            "operator check",
            StageConfig::Checkpoint {
                message: "eyeball the first batch".to_string(),
                pause_for_review: true,
            },
        )];

        let first = evaluate_record(&kernel.deps, &mut workflow, &record(50.0)).await;
        assert_eq!(first.evaluation, RecordEvaluation::Passed);
        assert!(first.pause_requested);
        assert_eq!(workflow[0].status, StageStatus::Completed);

        // Acknowledged: later records flow straight through
        let second = evaluate_record(&kernel.deps, &mut workflow, &record(50.0)).await;
        assert_eq!(second.evaluation, RecordEvaluation::Passed);
        assert!(!second.pause_requested);
    }

    #[tokio::test]
    async fn test_non_pausing_checkpoint_never_pauses() {
        let kernel = test_kernel();
        let mut workflow = vec![WorkflowStage::new(
            "note",
            StageConfig::Checkpoint {
                message: "progress marker".to_string(),
                pause_for_review: false,
            },
        )];

        let outcome = evaluate_record(&kernel.deps, &mut workflow, &record(50.0)).await;
        assert_eq!(outcome.evaluation, RecordEvaluation::Passed);
        assert!(!outcome.pause_requested);
    }
}
