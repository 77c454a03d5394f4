//! Persisted subsets of engine state.
//!
//! Only a whitelisted part of the state tree survives a restart: the user
//! identity and UI preferences. Entity tables start empty and are refilled by
//! explicit load actions. The sync queue is persisted separately as a plain
//! JSON array (see [`crate::queue::SyncQueue::to_json`]).

use crate::{
    error::Result,
    state::{AppState, Theme, UserProfile},
    Error,
};
use serde::{Deserialize, Serialize};

/// Version of the persisted state format.
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Durable storage key for the persisted state subset.
pub const STATE_STORAGE_KEY: &str = "harbor:state";

/// Durable storage key for the sync queue.
pub const QUEUE_STORAGE_KEY: &str = "harbor:sync-queue";

/// The whitelisted subset of [`AppState`] written to durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub sidebar_collapsed: bool,
}

fn default_format_version() -> u32 {
    STATE_FORMAT_VERSION
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            format_version: STATE_FORMAT_VERSION,
            user: None,
            theme: Theme::default(),
            sidebar_collapsed: false,
        }
    }
}

impl PersistedState {
    /// Extract the whitelisted paths from a snapshot.
    pub fn from_state(state: &AppState) -> Self {
        Self {
            format_version: STATE_FORMAT_VERSION,
            user: state.auth.user.clone(),
            theme: state.ui.theme,
            sidebar_collapsed: state.ui.sidebar_collapsed,
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let persisted: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if persisted.format_version > STATE_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported state format version: {} (max supported: {})",
                persisted.format_version, STATE_FORMAT_VERSION
            )));
        }

        Ok(persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn extracts_whitelisted_paths_only() {
        let mut state = AppState::initial();
        state.ui = Arc::new(crate::state::UiSlice {
            theme: Theme::Dark,
            sidebar_collapsed: true,
        });
        state.cache = Arc::new(crate::state::CacheSlice { hits: 9, misses: 1 });

        let persisted = PersistedState::from_state(&state);
        assert_eq!(persisted.theme, Theme::Dark);
        assert!(persisted.sidebar_collapsed);

        let json = persisted.to_json().unwrap();
        assert!(!json.contains("hits"));
        assert!(json.contains("sidebarCollapsed"));
    }

    #[test]
    fn json_roundtrip() {
        let persisted = PersistedState {
            user: Some(UserProfile {
                id: "u-1".into(),
                email: "ada@example.com".into(),
                display_name: Some("Ada".into()),
            }),
            ..Default::default()
        };
        let parsed = PersistedState::from_json(&persisted.to_json().unwrap()).unwrap();
        assert_eq!(persisted, parsed);
    }

    #[test]
    fn missing_fields_default() {
        let parsed = PersistedState::from_json("{}").unwrap();
        assert_eq!(parsed, PersistedState::default());
    }

    #[test]
    fn rejects_future_format() {
        let result = PersistedState::from_json(r#"{"formatVersion": 99}"#);
        assert!(matches!(result, Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            PersistedState::from_json("not json"),
            Err(Error::InvalidSnapshot(_))
        ));
    }
}
