//! Action types for expressing state changes.
//!
//! State never changes directly: callers describe intent as an [`Action`] and
//! the store runs it through the middleware chain and the reducer.
//!
//! The wire shape is stable:
//!
//! ```json
//! { "type": "entities/upsert", "payload": { ... }, "meta": { "timestamp": 1706745600000, "source": "sync", "optimistic": true } }
//! ```
//!
//! Unrecognized `type` strings deserialize into [`ActionKind::Unknown`] and
//! are a no-op for the reducer.

use crate::{
    snapshot::PersistedState,
    state::{SyncSummary, Theme, UserProfile},
    Record, RecordId, TableName, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata stamped on every action.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMeta {
    /// Dispatch time in milliseconds since epoch. `None` until the store stamps it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Who issued the action ("ui", "sync", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Whether the action carries unconfirmed local state
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optimistic: bool,
}

/// The closed set of things that can happen to the state tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all_fields = "camelCase")]
pub enum ActionKind {
    #[serde(rename = "auth/setUser")]
    SetUser(Option<UserProfile>),

    #[serde(rename = "ui/setTheme")]
    SetTheme(Theme),

    #[serde(rename = "ui/toggleSidebar")]
    ToggleSidebar,

    #[serde(rename = "ui/setSidebarCollapsed")]
    SetSidebarCollapsed(bool),

    /// Replace a table's contents with freshly read records.
    #[serde(rename = "entities/load")]
    LoadRecords {
        table: TableName,
        records: Vec<Record>,
    },

    /// Insert or replace one record.
    #[serde(rename = "entities/upsert")]
    UpsertRecord { table: TableName, record: Record },

    /// Swap an optimistic record for its server-confirmed version.
    #[serde(rename = "entities/confirm")]
    ConfirmRecord {
        table: TableName,
        local_id: RecordId,
        record: Record,
    },

    #[serde(rename = "entities/remove")]
    RemoveRecord { table: TableName, id: RecordId },

    #[serde(rename = "entities/setLoading")]
    SetLoading { table: TableName, loading: bool },

    #[serde(rename = "entities/setError")]
    SetError {
        table: TableName,
        error: Option<String>,
    },

    #[serde(rename = "sync/setOnline")]
    SetOnline(bool),

    #[serde(rename = "sync/setStatus")]
    SetSyncStatus(SyncSummary),

    #[serde(rename = "cache/stats")]
    CacheStats { hits: u64, misses: u64 },

    /// Restore the persisted subset at startup.
    #[serde(rename = "app/hydrate")]
    Hydrate(PersistedState),

    #[serde(rename = "app/reset")]
    Reset,

    /// An action type this build does not know about.
    #[serde(skip)]
    Unknown(String),
}

impl ActionKind {
    /// Every action type string this build understands.
    pub const TYPES: &'static [&'static str] = &[
        "auth/setUser",
        "ui/setTheme",
        "ui/toggleSidebar",
        "ui/setSidebarCollapsed",
        "entities/load",
        "entities/upsert",
        "entities/confirm",
        "entities/remove",
        "entities/setLoading",
        "entities/setError",
        "sync/setOnline",
        "sync/setStatus",
        "cache/stats",
        "app/hydrate",
        "app/reset",
    ];

    /// The wire `type` string.
    pub fn type_name(&self) -> &str {
        match self {
            ActionKind::SetUser(_) => "auth/setUser",
            ActionKind::SetTheme(_) => "ui/setTheme",
            ActionKind::ToggleSidebar => "ui/toggleSidebar",
            ActionKind::SetSidebarCollapsed(_) => "ui/setSidebarCollapsed",
            ActionKind::LoadRecords { .. } => "entities/load",
            ActionKind::UpsertRecord { .. } => "entities/upsert",
            ActionKind::ConfirmRecord { .. } => "entities/confirm",
            ActionKind::RemoveRecord { .. } => "entities/remove",
            ActionKind::SetLoading { .. } => "entities/setLoading",
            ActionKind::SetError { .. } => "entities/setError",
            ActionKind::SetOnline(_) => "sync/setOnline",
            ActionKind::SetSyncStatus(_) => "sync/setStatus",
            ActionKind::CacheStats { .. } => "cache/stats",
            ActionKind::Hydrate(_) => "app/hydrate",
            ActionKind::Reset => "app/reset",
            ActionKind::Unknown(name) => name,
        }
    }
}

/// An action: what happened plus when and by whom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub struct Action {
    pub kind: ActionKind,
    pub meta: ActionMeta,
}

impl Action {
    /// Create an unstamped action.
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            meta: ActionMeta::default(),
        }
    }

    /// Mark the action as carrying optimistic state.
    pub fn optimistic(mut self) -> Self {
        self.meta.optimistic = true;
        self
    }

    /// Tag the issuing component.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }

    /// Stamp an explicit timestamp.
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.meta.timestamp = Some(timestamp);
        self
    }

    /// The wire `type` string.
    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }
}

impl From<ActionKind> for Action {
    fn from(kind: ActionKind) -> Self {
        Action::new(kind)
    }
}

/// Wire representation used for (de)serialization.
#[derive(Serialize, Deserialize)]
struct RawAction {
    #[serde(rename = "type")]
    action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(default)]
    meta: ActionMeta,
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        let action_type = action.kind.type_name().to_string();
        let payload = match &action.kind {
            ActionKind::Unknown(_) => None,
            kind => match serde_json::to_value(kind) {
                Ok(Value::Object(mut tagged)) => tagged.remove("payload"),
                _ => None,
            },
        };
        RawAction {
            action_type,
            payload,
            meta: action.meta,
        }
    }
}

impl TryFrom<RawAction> for Action {
    type Error = String;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        if !ActionKind::TYPES.contains(&raw.action_type.as_str()) {
            return Ok(Action {
                kind: ActionKind::Unknown(raw.action_type),
                meta: raw.meta,
            });
        }

        let mut tagged = serde_json::Map::new();
        tagged.insert("type".into(), Value::String(raw.action_type.clone()));
        if let Some(payload) = raw.payload {
            tagged.insert("payload".into(), payload);
        }

        let kind: ActionKind = serde_json::from_value(Value::Object(tagged))
            .map_err(|e| format!("malformed action '{}': {}", raw.action_type, e))?;

        Ok(Action {
            kind,
            meta: raw.meta,
        })
    }
}
