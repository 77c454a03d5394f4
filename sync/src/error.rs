//! Error types for the sync runtime.

use harbor_engine::Record;

/// Failure reported by the remote collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The server's copy changed since the write was queued.
    #[error("Conflict on {table}/{id}")]
    Conflict {
        table: String,
        id: String,
        server: Option<Record>,
    },

    #[error("Not found: {table}/{id}")]
    NotFound { table: String, id: String },

    #[error("Rejected: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Whether a later attempt could succeed without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemoteError::Network(_) | RemoteError::Server { .. } | RemoteError::Conflict { .. }
        )
    }

    /// Whether the server rejected the write as stale.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RemoteError::Conflict { .. })
    }
}

/// Durable storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Sync runtime error type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Engine error: {0}")]
    Engine(#[from] harbor_engine::Error),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Offline and offline mode is disabled")]
    Offline,
}

/// Result type alias for the sync runtime.
pub type Result<T> = std::result::Result<T, SyncError>;
