pub mod finder;
pub mod merge;

pub use finder::find_duplicates;
pub use merge::{build_merge_plan, merge_businesses};
