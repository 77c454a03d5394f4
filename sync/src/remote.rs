//! The remote collaborator contract.
//!
//! Implementations talk to whatever backend holds the authoritative copy of
//! each table. Every call may fail; the [`SyncManager`](crate::SyncManager)
//! catches every error at its boundary and turns it into queue state.
//! Request timeouts are the implementation's responsibility.

use crate::error::RemoteError;
use async_trait::async_trait;
use harbor_engine::Record;
use serde_json::Value;

/// Result type for remote calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[async_trait]
pub trait Remote: Send + Sync {
    /// Create a record. The returned record carries the server-assigned id.
    async fn create(&self, table: &str, data: &Record) -> RemoteResult<Record>;

    /// Update a record. Returns the stored result.
    ///
    /// When `data` carries a `version` that no longer matches the server's,
    /// the call fails with [`RemoteError::Conflict`].
    async fn update(&self, table: &str, id: &str, data: &Record) -> RemoteResult<Record>;

    async fn delete(&self, table: &str, id: &str) -> RemoteResult<()>;

    /// Read records, optionally restricted by equality `filters` on top-level fields.
    async fn read(&self, table: &str, filters: Option<&Value>) -> RemoteResult<Vec<Record>>;

    /// Fetch the server's copy of one record, used to resolve conflicts.
    async fn fetch(&self, table: &str, id: &str) -> RemoteResult<Option<Record>>;
}

/// Equality match of `filters` (a JSON object) against a record's top-level fields.
///
/// Anything other than an object matches every record.
pub fn matches_filters(record: &Record, filters: Option<&Value>) -> bool {
    match filters {
        Some(Value::Object(filters)) => filters
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected)),
        _ => true,
    }
}
