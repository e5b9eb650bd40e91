use thiserror::Error;

/// Node-wide infrastructure errors.
///
/// Per-event check outcomes are not errors; they travel as verdicts through
/// completion callbacks. Only failures of the machinery itself land here.
#[derive(Debug, Error)]
pub enum MeridianError {
    /// Storage layer error (RocksDB, in-memory backend, commit).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Cryptographic error (key parsing, signing).
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// The consensus engine refused an event that already passed every check.
    #[error("Engine error: {0}")]
    Engine(String),

    /// A queue was used after it had been closed.
    #[error("Queue closed: {0}")]
    QueueClosed(String),

    /// The service is shutting down and no longer accepts writes.
    #[error("Service stopped")]
    Stopped,

    /// The node hit an unrecoverable consistency fault and is halted.
    #[error("Fatal: {0}")]
    Fatal(String),

    /// Invalid state transition or configuration.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for MeridianError {
    fn from(e: serde_json::Error) -> Self {
        MeridianError::Serialization(e.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for MeridianError {
    fn from(e: ed25519_dalek::SignatureError) -> Self {
        MeridianError::Crypto(e.to_string())
    }
}

impl From<hex::FromHexError> for MeridianError {
    fn from(e: hex::FromHexError) -> Self {
        MeridianError::Serialization(e.to_string())
    }
}
