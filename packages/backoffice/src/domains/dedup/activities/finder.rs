//! Duplicate candidate finder
//!
//! Read-only: retrieves a candidate pool from the store, then classifies and
//! scores it with the pure confidence functions. Strict mode needs an exact
//! strong-identity match; loose mode accepts fuzzy name similarity within
//! the same suburb.

use strsim::jaro_winkler;
use tracing::debug;

use crate::common::{BackofficeError, BackofficeResult, BusinessId};
use crate::domains::dedup::models::{DuplicateCandidate, MatchMode, MatchedField};
use crate::domains::dedup::utils::confidence;
use crate::kernel::BackofficeDeps;

/// Jaro-Winkler floor for loose-mode name similarity. Lower than an
/// auto-merge floor on purpose: loose results feed a scored review queue,
/// so recall wins over precision here.
pub const LOOSE_NAME_SIMILARITY: f64 = 0.85;

const STRONG_SIGNALS: [MatchedField; 4] = [
    MatchedField::Abn,
    MatchedField::Phone,
    MatchedField::Website,
    MatchedField::Email,
];

/// Find scored duplicate candidates for one target record.
///
/// Excludes the target itself, and (unless `include_resolved`) records
/// already resolved as duplicates. Fails with NotFound when the target id is
/// unknown. No side effects.
pub async fn find_duplicates(
    deps: &BackofficeDeps,
    target_id: BusinessId,
    mode: MatchMode,
    include_resolved: bool,
) -> BackofficeResult<Vec<DuplicateCandidate>> {
    let target = deps
        .store
        .find_business(target_id)
        .await?
        .ok_or_else(|| BackofficeError::not_found("business", target_id))?;

    let pool = match mode {
        MatchMode::Strict => deps.store.find_strong_matches(&target).await?,
        MatchMode::Loose => deps.store.find_loose_pool(&target).await?,
    };

    let target_name = confidence::normalize_name(&target.name);
    let mut candidates: Vec<DuplicateCandidate> = pool
        .into_iter()
        .filter(|candidate| include_resolved || !candidate.is_marked_duplicate())
        .filter_map(|candidate| {
            let (matched_fields, confidence_score, recommendation) =
                confidence::score_pair(&target, &candidate);

            let qualifies = match mode {
                // The store narrows with SQL; re-verify with the domain
                // predicates before surfacing anything.
                MatchMode::Strict => {
                    STRONG_SIGNALS.iter().any(|s| matched_fields.contains(s))
                }
                MatchMode::Loose => {
                    let similarity =
                        jaro_winkler(&target_name, &confidence::normalize_name(&candidate.name));
                    similarity >= LOOSE_NAME_SIMILARITY
                }
            };
            if !qualifies {
                return None;
            }

            Some(DuplicateCandidate {
                target_id,
                candidate_id: candidate.id,
                matched_fields,
                confidence_score,
                recommendation,
            })
        })
        .collect();

    // Score descending, ties broken by candidate id ascending.
    candidates.sort_by(|a, b| {
        b.confidence_score
            .cmp(&a.confidence_score)
            .then(a.candidate_id.cmp(&b.candidate_id))
    });

    debug!(
        target = %target_id,
        mode = ?mode,
        candidates = candidates.len(),
        "duplicate scan complete"
    );

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::dedup::models::Recommendation;
    use crate::domains::directory::models::BusinessRecord;
    use crate::kernel::test_dependencies::test_kernel;

    fn business(name: &str) -> BusinessRecord {
        BusinessRecord::builder().name(name).build()
    }

    #[tokio::test]
    async fn test_unknown_target_is_not_found() {
        let kernel = test_kernel();
        let err = find_duplicates(&kernel.deps, BusinessId::new(), MatchMode::Strict, false)
            .await
            .unwrap_err();
        assert!(matches!(err, BackofficeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_strict_single_abn_match() {
        let kernel = test_kernel();
        let mut target = business("Acme Plumbing");
        target.abn = Some("51 824 753 556".to_string());
        let target_id = kernel.store.seed_business(target);

        let mut twin = business("Acme Plumbing Group");
        twin.abn = Some("51824753556".to_string());
        let twin_id = kernel.store.seed_business(twin);

        // Unrelated record in the same store
        kernel.store.seed_business(business("Zenith Bakery"));

        let candidates = find_duplicates(&kernel.deps, target_id, MatchMode::Strict, false)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].candidate_id, twin_id);
        assert!(candidates[0].matched_fields.contains(&MatchedField::Abn));
        assert!(candidates[0].confidence_score >= 35);
    }

    #[tokio::test]
    async fn test_strict_excludes_resolved_duplicates() {
        let kernel = test_kernel();
        let mut target = business("Acme Plumbing");
        target.phone = Some("0400000000".to_string());
        let target_id = kernel.store.seed_business(target);

        let mut resolved = business("Acme Plumbing (old)");
        resolved.phone = Some("0400 000 000".to_string());
        resolved.duplicate_of_id = Some(BusinessId::new());
        kernel.store.seed_business(resolved);

        let hidden = find_duplicates(&kernel.deps, target_id, MatchMode::Strict, false)
            .await
            .unwrap();
        assert!(hidden.is_empty());

        let shown = find_duplicates(&kernel.deps, target_id, MatchMode::Strict, true)
            .await
            .unwrap();
        assert_eq!(shown.len(), 1);
    }

    #[tokio::test]
    async fn test_loose_matches_fuzzy_name_in_same_suburb() {
        let kernel = test_kernel();
        let mut target = business("Glebe Point Bakery");
        target.suburb = Some("Glebe".to_string());
        let target_id = kernel.store.seed_business(target);

        let mut near = business("Glebe Point Bakeryy");
        near.suburb = Some("glebe".to_string());
        let near_id = kernel.store.seed_business(near);

        let mut elsewhere = business("Glebe Point Bakery");
        elsewhere.suburb = Some("Newtown".to_string());
        kernel.store.seed_business(elsewhere);

        let mut unrelated = business("Harbour Smash Repairs");
        unrelated.suburb = Some("Glebe".to_string());
        kernel.store.seed_business(unrelated);

        let candidates = find_duplicates(&kernel.deps, target_id, MatchMode::Loose, false)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].candidate_id, near_id);
        // Fuzzy-only match: suburb is the only exactly-matched field
        assert!(candidates[0].matched_fields.contains(&MatchedField::Suburb));
        assert_eq!(candidates[0].recommendation, Recommendation::Ignore);
    }

    #[tokio::test]
    async fn test_ordering_score_desc_then_id_asc() {
        let kernel = test_kernel();
        let mut target = business("Acme Plumbing");
        target.phone = Some("0400000000".to_string());
        target.abn = Some("51824753556".to_string());
        let target_id = kernel.store.seed_business(target);

        // Phone-only match (30)
        let mut weak = business("Acme Pipes");
        weak.phone = Some("0400000000".to_string());
        let weak_id = kernel.store.seed_business(weak);

        // Abn + phone match (65)
        let mut strong = business("Acme Trade Services");
        strong.phone = Some("0400000000".to_string());
        strong.abn = Some("51824753556".to_string());
        let strong_id = kernel.store.seed_business(strong);

        // Another phone-only match, higher id than `weak`
        let mut weak_two = business("Acme Drains");
        weak_two.phone = Some("0400000000".to_string());
        let weak_two_id = kernel.store.seed_business(weak_two);

        let candidates = find_duplicates(&kernel.deps, target_id, MatchMode::Strict, false)
            .await
            .unwrap();

        let ids: Vec<_> = candidates.iter().map(|c| c.candidate_id).collect();
        assert_eq!(ids[0], strong_id);
        // Equal scores resolve by ascending candidate id (v7 ids are
        // creation-ordered, so weak < weak_two)
        assert_eq!(ids[1], weak_id.min(weak_two_id));
        assert_eq!(ids[2], weak_id.max(weak_two_id));
    }
}
