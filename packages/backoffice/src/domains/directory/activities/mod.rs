pub mod unmark;

pub use unmark::{unmark_duplicate, UnmarkOutcome};
