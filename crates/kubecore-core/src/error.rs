use thiserror::Error;

#[derive(Error, Debug)]
pub enum KubeCoreError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("circular dependency: {0}")]
    CircularDependency(String),

    #[error("resolution limit exceeded: {0}")]
    ResolutionLimit(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KubeCoreError>;

impl KubeCoreError {
    /// Transient and connection failures may be retried; everything else is
    /// a definitive answer from the cluster.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Connection(_))
    }

    /// Failures that should be recorded against a kind-level circuit breaker.
    pub fn is_kind_failure(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::Connection(_) | Self::Timeout(_)
        )
    }
}
