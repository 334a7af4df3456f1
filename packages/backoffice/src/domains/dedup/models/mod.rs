pub mod candidate;

pub use candidate::{
    BackfillField, DuplicateCandidate, MatchMode, MatchedField, MergeApplied, MergePlan,
    MergeResult, MergeStrategy, Recommendation,
};
