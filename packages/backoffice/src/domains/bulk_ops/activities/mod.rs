// Bulk operation activities
//
// controller - lifecycle: create / transition / get / run
// safety     - pre-flight ceiling + snapshot capture
// stages     - per-record workflow stage executor
// batch      - atomic per-batch commits with isolation and timeouts
// restore    - snapshot rollback through the forward batch mechanism

pub mod batch;
pub mod controller;
pub mod restore;
pub mod safety;
pub mod stages;

pub use controller::{create_operation, get_operation, run_operation, transition_operation};
pub use restore::{restore_snapshot, RestoreReport};
pub use stages::{EvaluationOutcome, RecordEvaluation};
