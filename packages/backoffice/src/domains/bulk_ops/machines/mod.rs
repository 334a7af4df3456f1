//! Bulk operation state machine
//!
//! Pure decision logic - NO IO, only state transitions. The controller owns
//! persistence and audit; this module only answers "is this transition
//! legal, and where does it land".

use serde::{Deserialize, Serialize};

use crate::common::{BackofficeError, BackofficeResult};
use crate::domains::bulk_ops::models::OperationStatus;

/// Everything that can move an operation between states, including the
/// internal actions only the controller may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationAction {
    /// DRAFT -> READY (explicitly readied or scheduled).
    Ready,
    /// READY -> RUNNING; the controller records `started_at`.
    Start,
    /// RUNNING -> PAUSED (cooperative, honored at batch boundaries).
    Pause,
    /// PAUSED -> RUNNING.
    Resume,
    /// Any non-terminal state -> CANCELLED.
    Cancel,
    /// RUNNING -> COMPLETED. Internal: all batches processed.
    Complete,
    /// RUNNING -> FAILED. Internal: mandatory snapshot failed or an
    /// unrecoverable batch error left no safe continuation.
    Fail,
}

impl OperationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
            Self::Complete => "complete",
            Self::Fail => "fail",
        }
    }
}

/// Compute the state an action lands in, or refuse without side effects.
///
/// Terminal states (COMPLETED, FAILED, CANCELLED) are sticky: every action
/// from them is an InvalidState error.
pub fn transition(
    status: OperationStatus,
    action: OperationAction,
) -> BackofficeResult<OperationStatus> {
    use OperationAction as A;
    use OperationStatus as S;

    let next = match (status, action) {
        (S::Draft, A::Ready) => S::Ready,
        (S::Ready, A::Start) => S::Running,
        (S::Running, A::Pause) => S::Paused,
        (S::Paused, A::Resume) => S::Running,
        (S::Draft | S::Ready | S::Running | S::Paused, A::Cancel) => S::Cancelled,
        (S::Running, A::Complete) => S::Completed,
        (S::Running, A::Fail) => S::Failed,
        (from, action) => {
            return Err(BackofficeError::invalid_state(format!(
                "cannot {} an operation in state {}",
                action.as_str(),
                from.as_str()
            )))
        }
    };
    Ok(next)
}
