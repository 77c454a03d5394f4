//! Built-in store middlewares.

use crate::storage::SharedStorage;
use dashmap::DashMap;
use harbor_engine::{
    snapshot::STATE_STORAGE_KEY, Action, AppState, Middleware, Next, PersistedState,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};

/// Logs every dispatch through `tracing`.
#[derive(Debug, Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    fn process(
        &self,
        state: &AppState,
        action: &Action,
        next: Next<'_>,
    ) -> harbor_engine::error::Result<AppState> {
        debug!(
            action = %action.type_name(),
            optimistic = action.meta.optimistic,
            version = state.version,
            "dispatching action"
        );

        let result = next.run(state, action);
        if let Err(e) = &result {
            error!(action = %action.type_name(), error = %e, "reducer rejected action");
        }
        result
    }
}

/// Writes the whitelisted state subset to durable storage after each dispatch.
///
/// The write is skipped when the subset did not change. Storage failures are
/// logged and never fail the dispatch.
pub struct PersistenceMiddleware {
    storage: SharedStorage,
    last_written: Mutex<Option<PersistedState>>,
}

impl PersistenceMiddleware {
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            last_written: Mutex::new(None),
        }
    }

    /// Remember a subset already known to be on disk, e.g. after hydration.
    pub fn with_persisted(self, persisted: PersistedState) -> Self {
        *self.last_written.lock() = Some(persisted);
        self
    }

    fn persist(&self, state: &AppState) {
        let subset = PersistedState::from_state(state);
        let mut last = self.last_written.lock();
        if last.as_ref() == Some(&subset) {
            return;
        }

        let json = match subset.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "failed to serialize persisted state");
                return;
            }
        };

        match self.storage.set(STATE_STORAGE_KEY, &json) {
            Ok(()) => *last = Some(subset),
            Err(e) => warn!(error = %e, "failed to persist state, continuing in memory"),
        }
    }
}

impl Middleware for PersistenceMiddleware {
    fn name(&self) -> &str {
        "persistence"
    }

    fn process(
        &self,
        state: &AppState,
        action: &Action,
        next: Next<'_>,
    ) -> harbor_engine::error::Result<AppState> {
        let next_state = next.run(state, action)?;
        self.persist(&next_state);
        Ok(next_state)
    }
}

/// Counts dispatched actions by type.
#[derive(Debug, Default)]
pub struct MetricsMiddleware {
    counts: DashMap<String, u64>,
    errors: AtomicU64,
}

impl MetricsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatches seen for one action type.
    pub fn count(&self, action_type: &str) -> u64 {
        self.counts.get(action_type).map_or(0, |c| *c)
    }

    /// Dispatches seen across all types.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|entry| *entry.value()).sum()
    }

    /// Dispatches the reducer rejected.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// All counters, sorted by action type.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

impl Middleware for MetricsMiddleware {
    fn name(&self) -> &str {
        "metrics"
    }

    fn process(
        &self,
        state: &AppState,
        action: &Action,
        next: Next<'_>,
    ) -> harbor_engine::error::Result<AppState> {
        *self
            .counts
            .entry(action.type_name().to_string())
            .or_insert(0) += 1;

        let result = next.run(state, action);
        if result.is_err() {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DurableStore, MemoryStore};
    use harbor_engine::{ActionKind, Record, Store, Theme};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn persistence_writes_whitelisted_subset() {
        let storage = Arc::new(MemoryStore::new());
        let mut store =
            Store::new().with_middleware(Arc::new(PersistenceMiddleware::new(storage.clone())));

        store.dispatch(ActionKind::SetTheme(Theme::Dark)).unwrap();
        store
            .dispatch(ActionKind::UpsertRecord {
                table: "clients".into(),
                record: Record::with_id(json!({"id": "c-1"})).unwrap(),
            })
            .unwrap();

        let json = storage.get(STATE_STORAGE_KEY).unwrap().unwrap();
        let persisted = PersistedState::from_json(&json).unwrap();
        assert_eq!(persisted.theme, Theme::Dark);
        assert!(!json.contains("clients"));
    }

    #[test]
    fn persistence_failure_does_not_fail_dispatch() {
        let storage = Arc::new(MemoryStore::new());
        storage.set_fail_writes(true);
        let mut store =
            Store::new().with_middleware(Arc::new(PersistenceMiddleware::new(storage.clone())));

        store.dispatch(ActionKind::ToggleSidebar).unwrap();
        assert!(store.get_state().ui.sidebar_collapsed);
        assert!(storage.get(STATE_STORAGE_KEY).unwrap().is_none());

        // Written on the next dispatch once storage recovers.
        storage.set_fail_writes(false);
        store.dispatch(ActionKind::SetTheme(Theme::Light)).unwrap();
        let persisted =
            PersistedState::from_json(&storage.get(STATE_STORAGE_KEY).unwrap().unwrap()).unwrap();
        assert!(persisted.sidebar_collapsed);
    }

    #[test]
    fn metrics_count_by_type() {
        let metrics = Arc::new(MetricsMiddleware::new());
        let mut store = Store::new().with_middleware(metrics.clone());

        store.dispatch(ActionKind::ToggleSidebar).unwrap();
        store.dispatch(ActionKind::ToggleSidebar).unwrap();
        store.dispatch(ActionKind::SetOnline(true)).unwrap();

        let bad = store.dispatch(ActionKind::UpsertRecord {
            table: "clients".into(),
            record: Record::from_value(json!({"name": "no id"})).unwrap(),
        });
        assert!(bad.is_err());

        assert_eq!(metrics.count("ui/toggleSidebar"), 2);
        assert_eq!(metrics.count("sync/setOnline"), 1);
        assert_eq!(metrics.total(), 4);
        assert_eq!(metrics.errors(), 1);
        assert_eq!(metrics.snapshot().len(), 3);
    }

    #[test]
    fn logging_passes_through() {
        let mut store = Store::new().with_middleware(Arc::new(LoggingMiddleware));
        store.dispatch(ActionKind::SetTheme(Theme::System)).unwrap();
        assert_eq!(store.get_state().ui.theme, Theme::System);
    }
}
