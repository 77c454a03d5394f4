//! The reducer: `(state, action) -> state`.
//!
//! Pure and total. It never performs IO, never mutates its input, and returns
//! an identical snapshot for action kinds it does not handle. Structurally
//! invalid payloads are programming errors and come back as
//! [`Error::MalformedAction`] for the dispatcher to propagate.

use crate::{
    action::{Action, ActionKind},
    error::Result,
    state::AppState,
    Error, Record,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Signature of a reducer usable by the store.
pub type ReducerFn = fn(&AppState, &Action) -> Result<AppState>;

/// Compute the next snapshot.
///
/// Slices the action does not touch are shared with `state`.
pub fn reduce(state: &AppState, action: &Action) -> Result<AppState> {
    let mut next = state.clone();

    match &action.kind {
        ActionKind::SetUser(user) => {
            Arc::make_mut(&mut next.auth).user = user.clone();
        }
        ActionKind::SetTheme(theme) => {
            Arc::make_mut(&mut next.ui).theme = *theme;
        }
        ActionKind::ToggleSidebar => {
            let ui = Arc::make_mut(&mut next.ui);
            ui.sidebar_collapsed = !ui.sidebar_collapsed;
        }
        ActionKind::SetSidebarCollapsed(collapsed) => {
            Arc::make_mut(&mut next.ui).sidebar_collapsed = *collapsed;
        }
        ActionKind::LoadRecords { table, records } => {
            let mut loaded = BTreeMap::new();
            for record in records {
                let id = require_id(action, record)?;
                loaded.insert(id, Arc::new(record.clone()));
            }

            let entities = Arc::make_mut(&mut next.entities);
            let target = entities.table_mut(table);

            // Unconfirmed local records are unknown to the server; keep them.
            for pending in target.optimistic_records() {
                if let Some(id) = pending.id() {
                    loaded.entry(id).or_insert_with(|| pending.clone());
                }
            }

            target.replace_all(loaded);
            target.loading = false;
            target.error = None;
            target.last_loaded_at = action.meta.timestamp;
        }
        ActionKind::UpsertRecord { table, record } => {
            let id = require_id(action, record)?;
            Arc::make_mut(&mut next.entities)
                .table_mut(table)
                .insert(id, record.clone());
        }
        ActionKind::ConfirmRecord {
            table,
            local_id,
            record,
        } => {
            let id = require_id(action, record)?;
            let mut confirmed = record.clone();
            confirmed.clear_optimistic();

            let target = Arc::make_mut(&mut next.entities).table_mut(table);
            target.remove(local_id);
            target.insert(id, confirmed);
        }
        ActionKind::RemoveRecord { table, id } => {
            if next.record(table, id).is_some() {
                Arc::make_mut(&mut next.entities)
                    .table_mut(table)
                    .remove(id);
            }
        }
        ActionKind::SetLoading { table, loading } => {
            Arc::make_mut(&mut next.entities).table_mut(table).loading = *loading;
        }
        ActionKind::SetError { table, error } => {
            let target = Arc::make_mut(&mut next.entities).table_mut(table);
            target.error = error.clone();
            if error.is_some() {
                target.loading = false;
            }
        }
        ActionKind::SetOnline(online) => {
            if next.sync.is_online != *online {
                Arc::make_mut(&mut next.sync).is_online = *online;
            }
        }
        ActionKind::SetSyncStatus(summary) => {
            if *next.sync != *summary {
                next.sync = Arc::new(summary.clone());
            }
        }
        ActionKind::CacheStats { hits, misses } => {
            if next.cache.hits != *hits || next.cache.misses != *misses {
                let cache = Arc::make_mut(&mut next.cache);
                cache.hits = *hits;
                cache.misses = *misses;
            }
        }
        ActionKind::Hydrate(persisted) => {
            Arc::make_mut(&mut next.auth).user = persisted.user.clone();
            let ui = Arc::make_mut(&mut next.ui);
            ui.theme = persisted.theme;
            ui.sidebar_collapsed = persisted.sidebar_collapsed;
        }
        ActionKind::Reset => {
            next = AppState {
                version: state.version,
                ..AppState::initial()
            };
        }
        ActionKind::Unknown(_) => {}
    }

    Ok(next)
}

fn require_id(action: &Action, record: &Record) -> Result<String> {
    record
        .id()
        .ok_or_else(|| Error::malformed(action.type_name(), "record is missing an 'id' field"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::PersistedState;
    use crate::state::{SyncSummary, Theme};
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        Record::with_id(value).unwrap()
    }

    fn upsert(table: &str, value: serde_json::Value) -> Action {
        Action::new(ActionKind::UpsertRecord {
            table: table.into(),
            record: record(value),
        })
    }

    #[test]
    fn unknown_action_is_noop() {
        let state = reduce(&AppState::initial(), &upsert("clients", json!({"id": "c-1"}))).unwrap();
        let next = reduce(&state, &Action::new(ActionKind::Unknown("x/y".into()))).unwrap();

        assert_eq!(next, state);
        assert!(Arc::ptr_eq(&next.entities, &state.entities));
        assert!(Arc::ptr_eq(&next.ui, &state.ui));
    }

    #[test]
    fn does_not_mutate_input() {
        let state = AppState::initial();
        let next = reduce(&state, &Action::new(ActionKind::SetTheme(Theme::Dark))).unwrap();

        assert_eq!(state.ui.theme, Theme::Light);
        assert_eq!(next.ui.theme, Theme::Dark);
    }

    #[test]
    fn untouched_slices_are_shared() {
        let state = AppState::initial();
        let next = reduce(&state, &Action::new(ActionKind::ToggleSidebar)).unwrap();

        assert!(next.ui.sidebar_collapsed);
        assert!(!Arc::ptr_eq(&next.ui, &state.ui));
        assert!(Arc::ptr_eq(&next.auth, &state.auth));
        assert!(Arc::ptr_eq(&next.entities, &state.entities));
    }

    #[test]
    fn upsert_requires_id() {
        let action = Action::new(ActionKind::UpsertRecord {
            table: "clients".into(),
            record: Record::from_value(json!({"name": "Acme"})).unwrap(),
        });
        let result = reduce(&AppState::initial(), &action);
        assert!(matches!(result, Err(Error::MalformedAction { .. })));
    }

    #[test]
    fn upsert_and_remove() {
        let state = reduce(&AppState::initial(), &upsert("clients", json!({"id": "c-1", "name": "Acme"}))).unwrap();
        assert_eq!(
            state.record("clients", "c-1").unwrap().get("name"),
            Some(&json!("Acme"))
        );

        let removed = reduce(
            &state,
            &Action::new(ActionKind::RemoveRecord {
                table: "clients".into(),
                id: "c-1".into(),
            }),
        )
        .unwrap();
        assert!(removed.record("clients", "c-1").is_none());
    }

    #[test]
    fn removing_missing_record_shares_slice() {
        let state = AppState::initial();
        let next = reduce(
            &state,
            &Action::new(ActionKind::RemoveRecord {
                table: "clients".into(),
                id: "nope".into(),
            }),
        )
        .unwrap();
        assert!(Arc::ptr_eq(&next.entities, &state.entities));
    }

    #[test]
    fn confirm_replaces_optimistic_record() {
        let mut optimistic = record(json!({"id": "tmp-1", "name": "Acme"}));
        optimistic.mark_optimistic();
        let state = reduce(
            &AppState::initial(),
            &Action::new(ActionKind::UpsertRecord {
                table: "clients".into(),
                record: optimistic,
            }),
        )
        .unwrap();

        let confirmed = reduce(
            &state,
            &Action::new(ActionKind::ConfirmRecord {
                table: "clients".into(),
                local_id: "tmp-1".into(),
                record: record(json!({"id": "c-9", "name": "Acme", "_optimistic": true})),
            }),
        )
        .unwrap();

        assert!(confirmed.record("clients", "tmp-1").is_none());
        let row = confirmed.record("clients", "c-9").unwrap();
        assert!(!row.is_optimistic());
    }

    #[test]
    fn load_keeps_unconfirmed_records() {
        let mut optimistic = record(json!({"id": "tmp-1", "name": "Draft"}));
        optimistic.mark_optimistic();
        let state = reduce(
            &AppState::initial(),
            &Action::new(ActionKind::UpsertRecord {
                table: "clients".into(),
                record: optimistic,
            }),
        )
        .unwrap();
        let state = reduce(&state, &upsert("clients", json!({"id": "stale"}))).unwrap();

        let loaded = reduce(
            &state,
            &Action::new(ActionKind::LoadRecords {
                table: "clients".into(),
                records: vec![record(json!({"id": "c-1"})), record(json!({"id": "c-2"}))],
            })
            .at(500),
        )
        .unwrap();

        let table = loaded.table("clients").unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.contains("tmp-1"));
        assert!(!table.contains("stale"));
        assert_eq!(table.last_loaded_at, Some(500));
        assert!(!table.loading);
    }

    #[test]
    fn set_error_clears_loading() {
        let state = reduce(
            &AppState::initial(),
            &Action::new(ActionKind::SetLoading {
                table: "tasks".into(),
                loading: true,
            }),
        )
        .unwrap();
        assert!(state.table("tasks").unwrap().loading);

        let state = reduce(
            &state,
            &Action::new(ActionKind::SetError {
                table: "tasks".into(),
                error: Some("boom".into()),
            }),
        )
        .unwrap();
        let table = state.table("tasks").unwrap();
        assert!(!table.loading);
        assert_eq!(table.error.as_deref(), Some("boom"));
    }

    #[test]
    fn unchanged_sync_status_shares_slice() {
        let state = AppState::initial();
        let next = reduce(
            &state,
            &Action::new(ActionKind::SetSyncStatus(SyncSummary::default())),
        )
        .unwrap();
        assert!(Arc::ptr_eq(&next.sync, &state.sync));

        let online = reduce(&state, &Action::new(ActionKind::SetOnline(true))).unwrap();
        assert!(online.sync.is_online);
        assert!(!Arc::ptr_eq(&online.sync, &state.sync));
    }

    #[test]
    fn hydrate_restores_whitelist() {
        let persisted = PersistedState {
            theme: Theme::System,
            sidebar_collapsed: true,
            ..Default::default()
        };
        let state = reduce(&AppState::initial(), &Action::new(ActionKind::Hydrate(persisted))).unwrap();
        assert_eq!(state.ui.theme, Theme::System);
        assert!(state.ui.sidebar_collapsed);
    }

    #[test]
    fn reset_keeps_version() {
        let mut state = reduce(&AppState::initial(), &upsert("clients", json!({"id": "c-1"}))).unwrap();
        state.version = 12;
        let reset = reduce(&state, &Action::new(ActionKind::Reset)).unwrap();
        assert_eq!(reset.version, 12);
        assert!(reset.table("clients").is_none());
    }
}
