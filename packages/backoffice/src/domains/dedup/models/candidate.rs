use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::common::BusinessId;

/// How aggressively to look for duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Require an exact strong-identity field match (phone/email/website/abn).
    Strict,
    /// Fuzzy name similarity within the same suburb.
    Loose,
}

/// Identity field that matched between two records.
///
/// Ordered by descending weight so sets print strongest-signal first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MatchedField {
    Abn,
    Phone,
    Website,
    Name,
    Email,
    Suburb,
}

/// What the scorer recommends doing with a candidate pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Merge,
    Review,
    Ignore,
}

/// A scored duplicate candidate. Transient: computed per request, never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub target_id: BusinessId,
    pub candidate_id: BusinessId,
    pub matched_fields: BTreeSet<MatchedField>,
    /// 0-100, capped.
    pub confidence_score: u8,
    pub recommendation: Recommendation,
}

// ============================================================================
// Merge types
// ============================================================================

/// How a merge treats the primary's fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Backfill empty primary fields from duplicates in list order.
    MergeData,
    /// Keep the primary exactly as-is; relink and mark only.
    PrimaryOnly,
}

/// Backfillable fields, in the order backfill considers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillField {
    Phone,
    Email,
    Website,
    Bio,
    Abn,
}

impl BackfillField {
    pub const ALL: [Self; 5] = [Self::Phone, Self::Email, Self::Website, Self::Bio, Self::Abn];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Website => "website",
            Self::Bio => "bio",
            Self::Abn => "abn",
        }
    }
}

/// A validated, fully-computed merge ready for atomic application.
///
/// Built by the pure planning step; the store applies it in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub primary_id: BusinessId,
    /// Ordered, distinct, non-empty; never contains the primary.
    pub duplicate_ids: Vec<BusinessId>,
    /// (field, value) pairs to write onto the primary. Empty for PrimaryOnly.
    pub backfill: Vec<(BackfillField, String)>,
}

/// Counts reported by the store after applying a merge plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeApplied {
    pub inquiries_transferred: u64,
    pub claims_transferred: u64,
}

/// Outcome of a completed merge. Persisted only via the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResult {
    pub primary_id: BusinessId,
    /// In the order the caller supplied them.
    pub merged_ids: Vec<BusinessId>,
    pub fields_backfilled: Vec<BackfillField>,
    pub inquiries_transferred: u64,
    pub claims_transferred: u64,
}
