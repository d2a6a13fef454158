//! Error types for platform operations

use thiserror::Error;

/// Errors that can occur in platform operations
#[derive(Debug, Error)]
pub enum PlatformError {
    /// NATS connection error
    #[error("NATS connection error: {0}")]
    NatsConnection(String),

    /// NATS publish error
    #[error("NATS publish error: {0}")]
    NatsPublish(String),

    /// NATS consumer error
    #[error("NATS consumer error: {0}")]
    NatsConsumer(String),

    /// Bus fetch timed out or disconnected; retry with backoff, do not ack
    #[error("Transient bus error: {0}")]
    TransientBus(String),

    /// Message cannot be decoded; ack and drop
    #[error("Bad message: {0}")]
    BadMessage(String),

    /// Object store returned a retryable failure; nak for redelivery
    #[error("Object store error: {0}")]
    ObjectStore(String),

    /// Object not found
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Path does not match the /buckets/{tenant}/{category}/... grammar
    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    /// No parser registered for the file extension
    #[error("No parser for: {0}")]
    ParserAbsent(String),

    /// Parser raised while extracting chunks
    #[error("Parser failed for {path}: {reason}")]
    ParserFailed { path: String, reason: String },

    /// Embedding provider unavailable; nak for redelivery
    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Repository operation on a tenant-isolated model without tenant context
    #[error("Missing tenant context for tenant-isolated model {0}")]
    MissingTenantContext(String),

    /// Repository error
    #[error("Repository error: {0}")]
    Repository(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic platform error
    #[error("Platform error: {0}")]
    Generic(String),
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

impl PlatformError {
    /// True when redelivery may succeed (nak rather than ack-and-drop).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlatformError::TransientBus(_)
                | PlatformError::ObjectStore(_)
                | PlatformError::EmbeddingUnavailable(_)
                | PlatformError::Timeout(_)
        )
    }
}

impl From<async_nats::Error> for PlatformError {
    fn from(err: async_nats::Error) -> Self {
        PlatformError::NatsConnection(err.to_string())
    }
}

impl From<serde_json::Error> for PlatformError {
    fn from(err: serde_json::Error) -> Self {
        PlatformError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for PlatformError {
    fn from(err: std::io::Error) -> Self {
        PlatformError::Generic(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(PlatformError::TransientBus("timeout".into()).is_retryable());
        assert!(PlatformError::EmbeddingUnavailable("provider down".into()).is_retryable());
        assert!(!PlatformError::BadMessage("not json".into()).is_retryable());
        assert!(!PlatformError::ParserAbsent(".xyz".into()).is_retryable());
    }
}
