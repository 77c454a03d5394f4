//! In-process remote.
//!
//! Holds tables in memory, assigns ids on create when the client sends none,
//! and rejects updates whose
//! `version` is stale. Failures can be injected per call and every call is
//! logged, which makes it the remote used by the test suite and by hosts
//! running without a backend.

use crate::error::RemoteError;
use crate::remote::{matches_filters, Remote, RemoteResult};
use async_trait::async_trait;
use harbor_engine::record::VERSION_FIELD;
use harbor_engine::Record;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

/// One call received by an [`InMemoryRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Create { table: String },
    Update { table: String, id: String },
    Delete { table: String, id: String },
    Read { table: String },
    Fetch { table: String, id: String },
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, BTreeMap<String, Record>>,
    next_id: u64,
    calls: Vec<RemoteCall>,
    failures: VecDeque<RemoteError>,
    unreachable: bool,
}

/// A deterministic in-memory remote.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, to make concurrent drains overlap in tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Store a record as-is, bypassing id assignment and versioning.
    pub fn seed(&self, table: &str, record: Record) {
        if let Some(id) = record.id() {
            self.inner
                .lock()
                .tables
                .entry(table.to_string())
                .or_default()
                .insert(id, record);
        }
    }

    /// The stored copy of a record.
    pub fn record(&self, table: &str, id: &str) -> Option<Record> {
        self.inner
            .lock()
            .tables
            .get(table)
            .and_then(|t| t.get(id))
            .cloned()
    }

    /// Number of records stored in a table.
    pub fn len(&self, table: &str) -> usize {
        self.inner.lock().tables.get(table).map_or(0, |t| t.len())
    }

    /// Every call received so far, oldest first.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.inner.lock().calls.clone()
    }

    /// Fail the next call with `error`. Queued failures are used in order.
    pub fn fail_next(&self, error: RemoteError) {
        self.inner.lock().failures.push_back(error);
    }

    /// Fail the next `n` calls with `error`.
    pub fn fail_next_n(&self, n: usize, error: RemoteError) {
        let mut inner = self.inner.lock();
        for _ in 0..n {
            inner.failures.push_back(error.clone());
        }
    }

    /// While unreachable, every call fails with a network error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().unreachable = unreachable;
    }

    async fn enter(&self, call: RemoteCall) -> RemoteResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.inner.lock();
        inner.calls.push(call);
        if inner.unreachable {
            return Err(RemoteError::Network("remote unreachable".into()));
        }
        match inner.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn stored_copy(data: &Record) -> Record {
    let mut record = data.clone();
    record.clear_optimistic();
    record
}

fn next_version(current: Option<&Value>) -> Value {
    Value::from(current.and_then(Value::as_u64).unwrap_or(0) + 1)
}

#[async_trait]
impl Remote for InMemoryRemote {
    async fn create(&self, table: &str, data: &Record) -> RemoteResult<Record> {
        self.enter(RemoteCall::Create {
            table: table.to_string(),
        })
        .await?;

        let mut inner = self.inner.lock();
        let id = match data.id() {
            Some(id) => {
                let taken = inner.tables.get(table).is_some_and(|t| t.contains_key(&id));
                if taken {
                    return Err(RemoteError::Rejected(format!("{table}/{id} already exists")));
                }
                id
            }
            None => {
                inner.next_id += 1;
                format!("{}-{}", table, inner.next_id)
            }
        };

        let mut record = stored_copy(data);
        record.set_id(id.clone());
        record.insert(VERSION_FIELD, Value::from(1u64));

        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, table: &str, id: &str, data: &Record) -> RemoteResult<Record> {
        self.enter(RemoteCall::Update {
            table: table.to_string(),
            id: id.to_string(),
        })
        .await?;

        let mut inner = self.inner.lock();
        let existing = inner
            .tables
            .get_mut(table)
            .and_then(|t| t.get_mut(id))
            .ok_or_else(|| RemoteError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;

        if let Some(expected) = data.version() {
            if existing.version() != Some(expected) {
                return Err(RemoteError::Conflict {
                    table: table.to_string(),
                    id: id.to_string(),
                    server: Some(existing.clone()),
                });
            }
        }

        let version = next_version(existing.version());
        existing.patch(&stored_copy(data));
        existing.set_id(id);
        existing.insert(VERSION_FIELD, version);
        Ok(existing.clone())
    }

    async fn delete(&self, table: &str, id: &str) -> RemoteResult<()> {
        self.enter(RemoteCall::Delete {
            table: table.to_string(),
            id: id.to_string(),
        })
        .await?;

        let mut inner = self.inner.lock();
        inner
            .tables
            .get_mut(table)
            .and_then(|t| t.remove(id))
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            })
    }

    async fn read(&self, table: &str, filters: Option<&Value>) -> RemoteResult<Vec<Record>> {
        self.enter(RemoteCall::Read {
            table: table.to_string(),
        })
        .await?;

        let inner = self.inner.lock();
        Ok(inner
            .tables
            .get(table)
            .map(|t| {
                t.values()
                    .filter(|r| matches_filters(r, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch(&self, table: &str, id: &str) -> RemoteResult<Option<Record>> {
        self.enter(RemoteCall::Fetch {
            table: table.to_string(),
            id: id.to_string(),
        })
        .await?;

        Ok(self.record(table, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn create_assigns_id_and_version() {
        let remote = InMemoryRemote::new();
        let created = remote
            .create("clients", &record(json!({"name": "Acme", "_optimistic": true})))
            .await
            .unwrap();

        assert_eq!(created.id().as_deref(), Some("clients-1"));
        assert_eq!(created.version(), Some(&json!(1)));
        assert!(!created.is_optimistic());
        assert_eq!(remote.len("clients"), 1);
    }

    #[tokio::test]
    async fn create_keeps_client_ids() {
        let remote = InMemoryRemote::new();
        let created = remote
            .create("clients", &record(json!({"id": "c-9", "name": "Acme"})))
            .await
            .unwrap();
        assert_eq!(created.id().as_deref(), Some("c-9"));

        let err = remote
            .create("clients", &record(json!({"id": "c-9"})))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Rejected(_)));
        assert_eq!(remote.len("clients"), 1);
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let remote = InMemoryRemote::new();
        remote.seed("clients", record(json!({"id": "c-1", "name": "Acme", "version": 4})));

        let err = remote
            .update("clients", "c-1", &record(json!({"name": "Beta", "version": 3})))
            .await
            .unwrap_err();
        match err {
            RemoteError::Conflict { server, .. } => {
                assert_eq!(server.unwrap().get("name"), Some(&json!("Acme")));
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        let updated = remote
            .update("clients", "c-1", &record(json!({"name": "Beta", "version": 4})))
            .await
            .unwrap();
        assert_eq!(updated.version(), Some(&json!(5)));
        assert_eq!(updated.get("name"), Some(&json!("Beta")));
    }

    #[tokio::test]
    async fn update_without_version_always_applies() {
        let remote = InMemoryRemote::new();
        remote.seed("clients", record(json!({"id": "c-1", "name": "Acme"})));

        let updated = remote
            .update("clients", "c-1", &record(json!({"city": "Oslo"})))
            .await
            .unwrap();
        assert_eq!(
            updated.into_value(),
            json!({"id": "c-1", "name": "Acme", "city": "Oslo", "version": 1})
        );
    }

    #[tokio::test]
    async fn missing_records() {
        let remote = InMemoryRemote::new();
        assert!(matches!(
            remote.delete("clients", "nope").await,
            Err(RemoteError::NotFound { .. })
        ));
        assert!(remote.fetch("clients", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_filters_by_equality() {
        let remote = InMemoryRemote::new();
        remote.seed("tasks", record(json!({"id": "t-1", "owner": "u-1"})));
        remote.seed("tasks", record(json!({"id": "t-2", "owner": "u-2"})));

        let all = remote.read("tasks", None).await.unwrap();
        assert_eq!(all.len(), 2);

        let mine = remote
            .read("tasks", Some(&json!({"owner": "u-1"})))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id().as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn injected_failures_and_call_log() {
        let remote = InMemoryRemote::new();
        remote.fail_next(RemoteError::Network("reset".into()));

        assert!(remote.read("tasks", None).await.is_err());
        assert!(remote.read("tasks", None).await.is_ok());

        remote.set_unreachable(true);
        assert!(matches!(
            remote.fetch("tasks", "t-1").await,
            Err(RemoteError::Network(_))
        ));

        assert_eq!(remote.calls().len(), 3);
        assert_eq!(
            remote.calls()[2],
            RemoteCall::Fetch {
                table: "tasks".into(),
                id: "t-1".into()
            }
        );
    }
}
