//! The state tree.
//!
//! [`AppState`] is an immutable snapshot made of named slices. Each slice sits
//! behind an [`Arc`], so producing the next snapshot clones only the slices an
//! action touches; untouched slices are shared with the previous snapshot and
//! stay pointer-equal. Selectors rely on that to detect change in O(1).

use crate::{Record, RecordId, TableName, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Color theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    System,
}

/// The signed-in user as far as the client core cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Identity slice.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthSlice {
    pub user: Option<UserProfile>,
}

/// Presentation preferences slice.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UiSlice {
    pub theme: Theme,
    pub sidebar_collapsed: bool,
}

/// One entity collection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityTable {
    records: BTreeMap<RecordId, Arc<Record>>,
    pub loading: bool,
    pub error: Option<String>,
    pub last_loaded_at: Option<Timestamp>,
}

impl EntityTable {
    /// Get a record by ID.
    pub fn get(&self, id: &str) -> Option<&Arc<Record>> {
        self.records.get(id)
    }

    /// Check if a record exists.
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Iterate records ordered by ID.
    pub fn records(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.records.values()
    }

    /// Records still awaiting remote confirmation.
    pub fn optimistic_records(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.records.values().filter(|r| r.is_optimistic())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the table has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn insert(&mut self, id: RecordId, record: Record) {
        self.records.insert(id, Arc::new(record));
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Arc<Record>> {
        self.records.remove(id)
    }

    pub(crate) fn replace_all(&mut self, records: BTreeMap<RecordId, Arc<Record>>) {
        self.records = records;
    }
}

/// All entity collections, keyed by table name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntitiesSlice {
    pub(crate) tables: BTreeMap<TableName, Arc<EntityTable>>,
}

impl EntitiesSlice {
    /// Get a table by name.
    pub fn table(&self, name: &str) -> Option<&Arc<EntityTable>> {
        self.tables.get(name)
    }

    /// Names of all tables that have been touched.
    pub fn table_names(&self) -> impl Iterator<Item = &TableName> {
        self.tables.keys()
    }

    /// Mutable access to a table, creating it on first use.
    pub(crate) fn table_mut(&mut self, name: &str) -> &mut EntityTable {
        let table = self.tables.entry(name.to_string()).or_default();
        Arc::make_mut(table)
    }
}

/// Sync status as mirrored into the state tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub is_online: bool,
    pub is_syncing: bool,
    pub queue_length: usize,
    pub pending_operations: usize,
    pub failed_operations: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<Timestamp>,
}

/// Read-cache accounting mirrored into the state tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheSlice {
    pub hits: u64,
    pub misses: u64,
}

impl CacheSlice {
    /// Fraction of lookups served from cache, 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// An immutable snapshot of the whole client state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    /// Incremented on every dispatch
    pub version: u64,
    pub auth: Arc<AuthSlice>,
    pub ui: Arc<UiSlice>,
    pub entities: Arc<EntitiesSlice>,
    pub sync: Arc<SyncSummary>,
    pub cache: Arc<CacheSlice>,
}

impl AppState {
    /// The fixed initial shape.
    pub fn initial() -> Self {
        Self::default()
    }

    /// Get a table by name.
    pub fn table(&self, name: &str) -> Option<&Arc<EntityTable>> {
        self.entities.table(name)
    }

    /// Get a record by table and ID.
    pub fn record(&self, table: &str, id: &str) -> Option<&Arc<Record>> {
        self.entities.table(table).and_then(|t| t.get(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initial_state_is_empty() {
        let state = AppState::initial();
        assert_eq!(state.version, 0);
        assert!(state.auth.user.is_none());
        assert_eq!(state.ui.theme, Theme::Light);
        assert!(state.entities.table_names().next().is_none());
        assert!(!state.sync.is_online);
    }

    #[test]
    fn table_mut_copies_on_write() {
        let mut entities = EntitiesSlice::default();
        entities.table_mut("clients").insert(
            "c-1".into(),
            Record::with_id(json!({"id": "c-1"})).unwrap(),
        );

        let before = entities.clone();
        entities.table_mut("clients").insert(
            "c-2".into(),
            Record::with_id(json!({"id": "c-2"})).unwrap(),
        );

        assert_eq!(before.table("clients").unwrap().len(), 1);
        assert_eq!(entities.table("clients").unwrap().len(), 2);
        assert!(Arc::ptr_eq(
            before.table("clients").unwrap().get("c-1").unwrap(),
            entities.table("clients").unwrap().get("c-1").unwrap(),
        ));
    }

    #[test]
    fn cache_hit_rate() {
        assert_eq!(CacheSlice::default().hit_rate(), 0.0);
        let slice = CacheSlice { hits: 3, misses: 1 };
        assert_eq!(slice.hit_rate(), 0.75);
    }

    #[test]
    fn optimistic_records_filter() {
        let mut table = EntityTable::default();
        let mut pending = Record::with_id(json!({"id": "a"})).unwrap();
        pending.mark_optimistic();
        table.insert("a".into(), pending);
        table.insert("b".into(), Record::with_id(json!({"id": "b"})).unwrap());

        let ids: Vec<_> = table.optimistic_records().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a".to_string()]);
    }
}
