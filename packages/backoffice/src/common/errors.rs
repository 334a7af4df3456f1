use thiserror::Error;

/// Result alias used across the back office.
pub type BackofficeResult<T> = Result<T, BackofficeError>;

/// Error taxonomy for the back office.
///
/// Partial failure of a multi-record operation is NOT an error: it is
/// reported per record in the operation's results, and callers always get
/// the full breakdown.
#[derive(Error, Debug)]
pub enum BackofficeError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid state transition: {0}")]
    InvalidState(String),

    #[error("admin access required")]
    AdminRequired,

    #[error("storage error: {0}")]
    Storage(String),
}

impl BackofficeError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

impl From<sqlx::Error> for BackofficeError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
