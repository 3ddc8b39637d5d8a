use thiserror::Error;

/// The closed set of error kinds every core operation can surface.
///
/// This mirrors the kinds, not concrete types, called for by the error
/// handling design: the outer (out-of-scope) HTTP layer maps these to status
/// codes, but the core never depends on an HTTP crate to do so.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Unauthenticated,
    RateLimited,
    NotFound,
    PreconditionFailed,
    UpstreamUnavailable,
    UpstreamQuota,
    TransientInternal,
    Internal,
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream quota exhausted: {0}")]
    UpstreamQuota(String),

    #[error("transient internal error: {0}")]
    TransientInternal(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            CoreError::Unauthenticated => ErrorKind::Unauthenticated,
            CoreError::RateLimited { .. } => ErrorKind::RateLimited,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            CoreError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            CoreError::UpstreamQuota(_) => ErrorKind::UpstreamQuota,
            CoreError::TransientInternal(_) => ErrorKind::TransientInternal,
            CoreError::Internal(_) | CoreError::Database(_) => ErrorKind::Internal,
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        CoreError::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        CoreError::PreconditionFailed(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
