//! Unmark / restore operator
//!
//! Clears `duplicate_of_id` on a currently-marked record and restores a
//! caller-supplied approval status. Deliberately not idempotent: unmarking a
//! record that is not marked is a caller mistake and fails validation
//! instead of silently succeeding.

use serde_json::json;
use tracing::info;

use crate::common::{AuditAction, AuditEntry, BackofficeError, BackofficeResult, BusinessId};
use crate::domains::directory::models::ApprovalStatus;
use crate::kernel::{emit_audit, ensure_admin, BackofficeDeps};

/// Prior and new state returned for the caller's own audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct UnmarkOutcome {
    pub business_id: BusinessId,
    pub previous_duplicate_of: BusinessId,
    pub previous_status: ApprovalStatus,
    pub new_status: ApprovalStatus,
}

/// Clear a duplicate marking, restoring the record to `restore_status`
/// (PENDING when the caller passes None).
pub async fn unmark_duplicate(
    deps: &BackofficeDeps,
    actor: &str,
    business_id: BusinessId,
    restore_status: Option<ApprovalStatus>,
) -> BackofficeResult<UnmarkOutcome> {
    ensure_admin(deps, actor).await?;

    let mut record = deps
        .store
        .find_business(business_id)
        .await?
        .ok_or_else(|| BackofficeError::not_found("business", business_id))?;

    let Some(previous_duplicate_of) = record.duplicate_of_id else {
        return Err(BackofficeError::validation(format!(
            "business {business_id} is not marked as a duplicate"
        )));
    };

    let previous_status = record.approval_status;
    let new_status = restore_status.unwrap_or(ApprovalStatus::Pending);

    record.duplicate_of_id = None;
    record.approval_status = new_status;
    deps.store.update_business(&record).await?;

    emit_audit(
        deps,
        AuditEntry::new(actor, AuditAction::DuplicateUnmarked, business_id.into_uuid())
            .with_before(json!({
                "duplicate_of_id": previous_duplicate_of,
                "approval_status": previous_status,
            }))
            .with_after(json!({
                "duplicate_of_id": null,
                "approval_status": new_status,
            })),
    )
    .await;

    info!(business = %business_id, restored_to = new_status.as_str(), "unmarked duplicate");

    Ok(UnmarkOutcome {
        business_id,
        previous_duplicate_of,
        previous_status,
        new_status,
    })
}
