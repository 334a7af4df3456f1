//! Merge executor
//!
//! Validates a duplicate set, computes the backfill plan as pure logic, then
//! hands the store one plan to apply atomically: backfill, child relinking,
//! and duplicate marking commit in full or not at all. One audit entry
//! summarizes the merge.

use serde_json::json;
use tracing::info;

use crate::common::{AuditAction, AuditEntry, BackofficeError, BackofficeResult, BusinessId};
use crate::domains::dedup::models::{
    BackfillField, MergePlan, MergeResult, MergeStrategy,
};
use crate::domains::directory::models::BusinessRecord;
use crate::kernel::{emit_audit, ensure_admin, BackofficeDeps};

/// List-shape checks that need no store access. Zero side effects on
/// failure.
fn validate_duplicate_ids(
    primary_id: BusinessId,
    duplicate_ids: &[BusinessId],
) -> BackofficeResult<()> {
    if duplicate_ids.is_empty() {
        return Err(BackofficeError::validation("duplicate list is empty"));
    }
    if duplicate_ids.contains(&primary_id) {
        return Err(BackofficeError::validation(
            "primary cannot appear in its own duplicate list",
        ));
    }
    let mut seen = std::collections::BTreeSet::new();
    for id in duplicate_ids {
        if !seen.insert(*id) {
            return Err(BackofficeError::validation(format!(
                "duplicate list repeats id {id}"
            )));
        }
    }
    Ok(())
}

fn field_value<'a>(record: &'a BusinessRecord, field: BackfillField) -> Option<&'a str> {
    let value = match field {
        BackfillField::Phone => &record.phone,
        BackfillField::Email => &record.email,
        BackfillField::Website => &record.website,
        BackfillField::Bio => &record.bio,
        BackfillField::Abn => &record.abn,
    };
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Pure planning step: invariant checks plus backfill computation.
///
/// Under `MergeData`, each empty primary field takes the first non-empty
/// value among duplicates in list order - later duplicates never override an
/// already-filled field. `PrimaryOnly` plans no backfill.
pub fn build_merge_plan(
    primary: &BusinessRecord,
    duplicates: &[BusinessRecord],
    strategy: MergeStrategy,
) -> BackofficeResult<MergePlan> {
    if primary.is_marked_duplicate() {
        return Err(BackofficeError::validation(format!(
            "primary {} is itself resolved as a duplicate; merging into it would form a chain",
            primary.id
        )));
    }
    for duplicate in duplicates {
        if let Some(resolved_to) = duplicate.duplicate_of_id {
            return Err(BackofficeError::validation(format!(
                "{} is already resolved as a duplicate of {resolved_to}",
                duplicate.id
            )));
        }
    }

    let backfill = match strategy {
        MergeStrategy::PrimaryOnly => Vec::new(),
        MergeStrategy::MergeData => BackfillField::ALL
            .iter()
            .filter(|field| field_value(primary, **field).is_none())
            .filter_map(|field| {
                duplicates
                    .iter()
                    .find_map(|d| field_value(d, *field))
                    .map(|value| (*field, value.to_string()))
            })
            .collect(),
    };

    Ok(MergePlan {
        primary_id: primary.id,
        duplicate_ids: duplicates.iter().map(|d| d.id).collect(),
        backfill,
    })
}

/// Merge an ordered, distinct set of duplicates into a primary record.
///
/// Not idempotent by design: once duplicates are marked, a second identical
/// call fails validation instead of silently succeeding.
pub async fn merge_businesses(
    deps: &BackofficeDeps,
    actor: &str,
    primary_id: BusinessId,
    duplicate_ids: &[BusinessId],
    strategy: MergeStrategy,
) -> BackofficeResult<MergeResult> {
    ensure_admin(deps, actor).await?;
    validate_duplicate_ids(primary_id, duplicate_ids)?;

    let primary = deps
        .store
        .find_business(primary_id)
        .await?
        .ok_or_else(|| BackofficeError::not_found("business", primary_id))?;

    let duplicates = deps.store.find_businesses(duplicate_ids).await?;
    for id in duplicate_ids {
        if !duplicates.iter().any(|d| d.id == *id) {
            return Err(BackofficeError::not_found("business", *id));
        }
    }

    let plan = build_merge_plan(&primary, &duplicates, strategy)?;
    let applied = deps.store.apply_merge(&plan).await?;

    let result = MergeResult {
        primary_id,
        merged_ids: plan.duplicate_ids.clone(),
        fields_backfilled: plan.backfill.iter().map(|(field, _)| *field).collect(),
        inquiries_transferred: applied.inquiries_transferred,
        claims_transferred: applied.claims_transferred,
    };

    emit_audit(
        deps,
        AuditEntry::new(actor, AuditAction::BusinessesMerged, primary_id.into_uuid())
            .with_before(json!({ "duplicate_ids": result.merged_ids }))
            .with_after(json!({
                "fields_backfilled": result.fields_backfilled,
                "inquiries_transferred": result.inquiries_transferred,
                "claims_transferred": result.claims_transferred,
            })),
    )
    .await;

    info!(
        primary = %primary_id,
        merged = result.merged_ids.len(),
        inquiries = result.inquiries_transferred,
        claims = result.claims_transferred,
        "merged duplicate set"
    );

    Ok(result)
}
