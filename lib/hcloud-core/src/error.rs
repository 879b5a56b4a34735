use thiserror::Error;

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that stop a reconciliation pass from producing a status update
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Cluster store error: {0}")]
    Store(#[from] StoreError),

    #[error("Status update conflicted {0} times in a row")]
    PersistentConflict(u32),

    #[error("Reconciliation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error returned by a Hetzner Cloud API call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HCloudError {
    #[error("rate limit exceeded")]
    RateLimited,

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("request timed out")]
    Timeout,

    #[error("transient error: {0}")]
    Transient(String),

    #[error("call cancelled")]
    Cancelled,
}

impl HCloudError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether re-running the pass later may succeed without a spec change
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Conflict(_) | Self::Timeout | Self::Transient(_)
        )
    }
}
