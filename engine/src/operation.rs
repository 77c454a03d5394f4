//! Sync operations: mutations waiting for remote confirmation.
//!
//! The persisted shape is stable across restarts:
//!
//! ```json
//! { "id": "…", "type": "update", "table": "clients", "data": { "id": "c-1", "name": "Acme" },
//!   "timestamp": 1706745600000, "retries": 0, "status": "pending" }
//! ```

use crate::{Record, RecordId, TableName, Timestamp};
use serde::{Deserialize, Serialize};

/// Unique identifier for an operation.
pub type OperationId = String;

/// What the operation does. Discriminated on the wire by `type`, with the
/// body under `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Change {
    /// Create a record; `data` is the full record including its local id.
    Create(Record),
    /// Update a record; `data` holds the changed fields plus `id`.
    Update(Record),
    /// Delete a record; `data` is `{ "id": … }`.
    Delete(DeleteTarget),
}

/// Body of a delete operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteTarget {
    pub id: RecordId,
}

impl Change {
    /// Wire name of the change kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Change::Create(_) => "create",
            Change::Update(_) => "update",
            Change::Delete(_) => "delete",
        }
    }

    /// The record this change targets.
    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            Change::Create(record) | Change::Update(record) => record.id(),
            Change::Delete(target) => Some(target.id.clone()),
        }
    }

    /// The record body, for creates and updates.
    pub fn record(&self) -> Option<&Record> {
        match self {
            Change::Create(record) | Change::Update(record) => Some(record),
            Change::Delete(_) => None,
        }
    }
}

/// Lifecycle of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Syncing,
    Completed,
    Failed,
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "pending"),
            OperationStatus::Syncing => write!(f, "syncing"),
            OperationStatus::Completed => write!(f, "completed"),
            OperationStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A queued mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Operation ID
    pub id: OperationId,
    /// The mutation, serialized as `type` + `data`
    #[serde(flatten)]
    pub change: Change,
    /// Target table
    pub table: TableName,
    /// When the operation was queued (milliseconds since epoch)
    pub timestamp: Timestamp,
    /// Failed remote attempts so far
    pub retries: u32,
    /// Current status
    pub status: OperationStatus,
    /// Last failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncOperation {
    /// Create a new pending operation.
    pub fn new(
        id: impl Into<OperationId>,
        table: impl Into<TableName>,
        change: Change,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            change,
            table: table.into(),
            timestamp,
            retries: 0,
            status: OperationStatus::Pending,
            error: None,
        }
    }

    /// The record this operation targets.
    pub fn record_id(&self) -> Option<RecordId> {
        self.change.record_id()
    }

    /// Whether the drain loop should attempt this operation.
    pub fn is_pending(&self) -> bool {
        self.status == OperationStatus::Pending
    }

    /// Whether automatic retries have been exhausted.
    pub fn is_failed(&self) -> bool {
        self.status == OperationStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update_op() -> SyncOperation {
        SyncOperation::new(
            "op-1",
            "clients",
            Change::Update(Record::with_id(json!({"id": "c-1", "name": "Acme"})).unwrap()),
            1_706_745_600_000,
        )
    }

    #[test]
    fn new_operation_is_pending() {
        let op = update_op();
        assert!(op.is_pending());
        assert_eq!(op.retries, 0);
        assert_eq!(op.record_id().as_deref(), Some("c-1"));
        assert_eq!(op.change.kind(), "update");
    }

    #[test]
    fn persisted_shape() {
        let json = serde_json::to_value(update_op()).unwrap();
        assert_eq!(
            json,
            json!({
                "id": "op-1",
                "type": "update",
                "table": "clients",
                "data": {"id": "c-1", "name": "Acme"},
                "timestamp": 1_706_745_600_000u64,
                "retries": 0,
                "status": "pending"
            })
        );
    }

    #[test]
    fn delete_shape() {
        let op = SyncOperation::new(
            "op-2",
            "clients",
            Change::Delete(DeleteTarget { id: "c-1".into() }),
            5,
        );
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "delete");
        assert_eq!(json["data"], json!({"id": "c-1"}));
        assert!(op.change.record().is_none());
    }

    #[test]
    fn parses_failed_operation_with_error() {
        let op: SyncOperation = serde_json::from_value(json!({
            "id": "op-3",
            "type": "create",
            "table": "tasks",
            "data": {"id": "t-1", "title": "Call"},
            "timestamp": 10,
            "retries": 3,
            "status": "failed",
            "error": "server error (503)"
        }))
        .unwrap();

        assert!(op.is_failed());
        assert_eq!(op.error.as_deref(), Some("server error (503)"));
        assert!(matches!(op.change, Change::Create(_)));
    }

    #[test]
    fn json_roundtrip() {
        let mut op = update_op();
        op.retries = 2;
        op.status = OperationStatus::Syncing;
        op.error = Some("timeout".into());

        let json = serde_json::to_string(&op).unwrap();
        let parsed: SyncOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, parsed);
    }
}
