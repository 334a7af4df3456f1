pub mod operation;
pub mod snapshot;
pub mod stage;

pub use operation::{
    BatchMutation, BulkOperation, OperationCounters, OperationKind, OperationLogEvent,
    OperationSpec, OperationStatus, OutcomeStatus, RecordOutcome, RollbackInfo, SafetyConfig,
    MAX_BATCH_SIZE,
};
pub use snapshot::{Snapshot, SnapshotEntry};
pub use stage::{
    ApprovalConditions, RequiredField, ReviewDecision, StageConfig, StageResults, StageStatus,
    ValidationRule, WorkflowStage,
};
