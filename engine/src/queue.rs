//! The sync queue model.
//!
//! An ordered list of [`SyncOperation`]s. Enqueue order is the only order:
//! the drain loop walks [`SyncQueue::pending_ids`] front to back, and no
//! operation is ever reordered or coalesced. Status transitions live here so
//! the async runtime only decides *when* to attempt an operation, never *how*
//! the queue changes.

use crate::{
    error::Result,
    operation::{Change, OperationId, OperationStatus, SyncOperation},
    record::{ID_FIELD, VERSION_FIELD},
    Error, Record, RecordId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Counts by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    pub total: usize,
    pub pending: usize,
    pub syncing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to pending, will be retried automatically.
    WillRetry { retries: u32 },
    /// Retry budget exhausted; only a manual retry revives it.
    GaveUp { retries: u32 },
}

/// The ordered operation list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncQueue {
    operations: Vec<SyncOperation>,
}

impl SyncQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a queue from persisted operations.
    pub fn from_operations(operations: Vec<SyncOperation>) -> Self {
        Self { operations }
    }

    /// Append an operation at the back.
    pub fn enqueue(&mut self, operation: SyncOperation) {
        self.operations.push(operation);
    }

    /// All operations in enqueue order.
    pub fn operations(&self) -> &[SyncOperation] {
        &self.operations
    }

    /// Get an operation by ID.
    pub fn get(&self, id: &str) -> Option<&SyncOperation> {
        self.operations.iter().find(|op| op.id == id)
    }

    /// IDs of pending operations, in enqueue order.
    pub fn pending_ids(&self) -> Vec<OperationId> {
        self.operations
            .iter()
            .filter(|op| op.is_pending())
            .map(|op| op.id.clone())
            .collect()
    }

    /// Operations whose retries are exhausted.
    pub fn failed(&self) -> Vec<SyncOperation> {
        self.operations
            .iter()
            .filter(|op| op.is_failed())
            .cloned()
            .collect()
    }

    /// Number of operations, whatever their status.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if the queue holds no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Counts by status.
    pub fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts {
            total: self.operations.len(),
            ..QueueCounts::default()
        };
        for op in &self.operations {
            match op.status {
                OperationStatus::Pending => counts.pending += 1,
                OperationStatus::Syncing => counts.syncing += 1,
                OperationStatus::Completed => counts.completed += 1,
                OperationStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Move a pending operation to `syncing` and return a copy of it.
    pub fn begin(&mut self, id: &str) -> Result<SyncOperation> {
        let op = self.require(id, OperationStatus::Pending)?;
        op.status = OperationStatus::Syncing;
        Ok(op.clone())
    }

    /// Mark a syncing operation completed.
    pub fn complete(&mut self, id: &str) -> Result<()> {
        let op = self.require(id, OperationStatus::Syncing)?;
        op.status = OperationStatus::Completed;
        op.error = None;
        Ok(())
    }

    /// Record a failed attempt on a syncing operation.
    ///
    /// Increments `retries`; at `max_retries` the operation becomes `failed`,
    /// otherwise it returns to `pending`.
    pub fn record_failure(
        &mut self,
        id: &str,
        error: impl Into<String>,
        max_retries: u32,
    ) -> Result<FailureOutcome> {
        let op = self.require(id, OperationStatus::Syncing)?;
        op.retries += 1;
        op.error = Some(error.into());

        if op.retries >= max_retries {
            op.status = OperationStatus::Failed;
            Ok(FailureOutcome::GaveUp {
                retries: op.retries,
            })
        } else {
            op.status = OperationStatus::Pending;
            Ok(FailureOutcome::WillRetry {
                retries: op.retries,
            })
        }
    }

    /// Fail a pending operation because an earlier one on the same record failed.
    ///
    /// The retry count is left alone so a manual retry revives both together.
    pub fn fail_blocked(&mut self, id: &str, blocker: &str) -> Result<()> {
        let op = self.require(id, OperationStatus::Pending)?;
        op.status = OperationStatus::Failed;
        op.error = Some(format!("blocked by failed operation {blocker}"));
        Ok(())
    }

    /// Put a syncing operation back to pending without counting an attempt.
    pub fn release(&mut self, id: &str) -> Result<()> {
        let op = self.require(id, OperationStatus::Syncing)?;
        op.status = OperationStatus::Pending;
        Ok(())
    }

    /// Replace the body of a create or update, e.g. with a conflict resolution.
    pub fn replace_data(&mut self, id: &str, data: Record) -> Result<()> {
        let op = self
            .operations
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or_else(|| Error::OperationNotFound(id.to_string()))?;

        match &mut op.change {
            Change::Create(record) | Change::Update(record) => *record = data,
            Change::Delete(_) => {
                return Err(Error::InvalidStatus {
                    id: id.to_string(),
                    expected: "create or update".into(),
                    actual: "delete".into(),
                })
            }
        }
        Ok(())
    }

    /// Drop completed operations. Returns how many were removed.
    pub fn prune_completed(&mut self) -> usize {
        let before = self.operations.len();
        self.operations
            .retain(|op| op.status != OperationStatus::Completed);
        before - self.operations.len()
    }

    /// Reset every failed operation to pending with zero retries.
    pub fn retry_failed(&mut self) -> usize {
        let mut revived = 0;
        for op in self.operations.iter_mut().filter(|op| op.is_failed()) {
            op.status = OperationStatus::Pending;
            op.retries = 0;
            op.error = None;
            revived += 1;
        }
        revived
    }

    /// Reset operations interrupted mid-sync (e.g. by a crash) to pending.
    pub fn recover_interrupted(&mut self) -> usize {
        let mut recovered = 0;
        for op in self
            .operations
            .iter_mut()
            .filter(|op| op.status == OperationStatus::Syncing)
        {
            op.status = OperationStatus::Pending;
            recovered += 1;
        }
        recovered
    }

    /// Point queued operations at a record's server-assigned id.
    ///
    /// Used after a create is confirmed under a different id than the
    /// temporary one the optimistic record was given.
    pub fn rewrite_record_id(&mut self, table: &str, from: &str, to: &str) -> usize {
        let mut rewritten = 0;
        for op in self
            .operations
            .iter_mut()
            .filter(|op| op.table == table && op.status != OperationStatus::Completed)
        {
            if op.record_id().as_deref() != Some(from) {
                continue;
            }
            match &mut op.change {
                Change::Create(record) | Change::Update(record) => {
                    record.insert(ID_FIELD, Value::String(to.to_string()));
                }
                Change::Delete(target) => target.id = to.to_string(),
            }
            rewritten += 1;
        }
        rewritten
    }

    /// Stamp a record's confirmed server `version` on later queued updates to it.
    ///
    /// Only updates that already carry a `version` are touched; they were
    /// based on the local copy, which predates the write just confirmed.
    pub fn rebase_version(
        &mut self,
        after: &str,
        table: &str,
        record_id: &RecordId,
        version: &Value,
    ) -> usize {
        let mut rebased = 0;
        for op in self
            .operations
            .iter_mut()
            .skip_while(|op| op.id != after)
            .skip(1)
            .filter(|op| op.table == table && op.status != OperationStatus::Completed)
        {
            if op.record_id().as_ref() != Some(record_id) {
                continue;
            }
            if let Change::Update(record) = &mut op.change {
                if record.version().is_some() {
                    record.insert(VERSION_FIELD, version.clone());
                    rebased += 1;
                }
            }
        }
        rebased
    }

    /// The first unfinished operation ahead of `id` that targets the same record.
    pub fn blocker(&self, id: &str, table: &str, record_id: &RecordId) -> Option<&SyncOperation> {
        self.operations
            .iter()
            .take_while(|op| op.id != id)
            .find(|op| {
                op.table == table
                    && op.status != OperationStatus::Completed
                    && op.record_id().as_ref() == Some(record_id)
            })
    }

    /// Whether an earlier, unfinished operation targets the same record.
    pub fn has_unfinished_before(&self, id: &str, table: &str, record_id: &RecordId) -> bool {
        self.blocker(id, table, record_id).is_some()
    }

    /// Whether a later, unfinished operation targets the same record.
    pub fn has_unfinished_after(&self, id: &str, table: &str, record_id: &RecordId) -> bool {
        self.operations
            .iter()
            .skip_while(|op| op.id != id)
            .skip(1)
            .any(|op| {
                op.table == table
                    && op.status != OperationStatus::Completed
                    && op.record_id().as_ref() == Some(record_id)
            })
    }

    /// Serialize as a JSON array.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.operations).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from a JSON array.
    pub fn from_json(json: &str) -> Result<Self> {
        let operations: Vec<SyncOperation> =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;
        Ok(Self { operations })
    }

    fn require(&mut self, id: &str, expected: OperationStatus) -> Result<&mut SyncOperation> {
        let op = self
            .operations
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or_else(|| Error::OperationNotFound(id.to_string()))?;

        if op.status != expected {
            return Err(Error::InvalidStatus {
                id: id.to_string(),
                expected: expected.to_string(),
                actual: op.status.to_string(),
            });
        }
        Ok(op)
    }
}
