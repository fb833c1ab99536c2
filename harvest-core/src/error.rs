use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    /// Store-level failure (pool exhaustion, query timeout, constraint
    /// violation). Transient from the caller's point of view; retryable.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Cache round-trip failure. Never surfaced to API callers; call sites
    /// log and fall through to the store.
    #[error("cache error: {0}")]
    Cache(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    /// Ownership conflict: a worker acting on a task it does not hold.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, HarvestError>;
