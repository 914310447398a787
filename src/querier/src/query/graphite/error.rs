//! Graphite-specific error types

use crate::services::storage::StorageError;

/// Errors raised while parsing, validating or evaluating a target
#[derive(Debug, thiserror::Error)]
pub enum GraphiteError {
    /// Malformed target syntax
    #[error("could not parse target: {target} ({message} at position {position})")]
    Parse {
        target: String,
        position: usize,
        message: String,
    },
    /// Function called with the wrong arity or argument kind
    #[error("{function}: {message}")]
    InvalidArgument { function: String, message: String },
    /// Pointwise combination of series with differing range or step
    #[error("{function}: time series are not aligned")]
    NotAligned { function: String },
    /// Call to a name that is not registered
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    /// A literal used where a series expression is required
    #[error("{0} is not a series expression")]
    NotASeries(String),
    /// Failure in the storage collaborator
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Evaluation observed the request's cancellation token
    #[error("evaluation cancelled")]
    Cancelled,
}

impl GraphiteError {
    pub fn invalid_argument(function: &str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            function: function.to_string(),
            message: message.into(),
        }
    }

    pub fn not_aligned(function: &str) -> Self {
        Self::NotAligned {
            function: function.to_string(),
        }
    }

    /// Whether the error is the caller's fault rather than the system's.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. }
                | Self::InvalidArgument { .. }
                | Self::NotAligned { .. }
                | Self::UnknownFunction(_)
                | Self::NotASeries(_)
                | Self::Storage(StorageError::InvalidPattern { .. })
                | Self::Storage(StorageError::InvalidRange { .. })
        )
    }
}

pub type GraphiteResult<T> = Result<T, GraphiteError>;
