//! # Harbor Engine
//!
//! A deterministic client-side state core for offline-first applications.
//!
//! This crate holds the logic that must behave identically whether or not a
//! network is present: a single authoritative store driven by actions, the
//! model of the durable sync queue, conflict resolution, and a TTL read cache.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches files, network, or timers; time comes
//!   from an injected [`Clock`]
//! - **Immutable snapshots**: every dispatch produces a new [`AppState`]; slices
//!   not touched by an action are shared, so change detection is a pointer
//!   comparison
//! - **Closed types**: actions and queued operations are tagged unions matched
//!   exhaustively
//! - **Explicit instances**: a [`Store`] is constructed and passed around, never
//!   reached through a global
//!
//! ## Core Concepts
//!
//! ### Store
//!
//! [`Store::dispatch`] runs an [`Action`] through the [`Middleware`] chain into
//! the [`reduce`] function, replaces the snapshot, then notifies listeners and
//! selector subscriptions ([`Store::select`]).
//!
//! ### Sync Queue
//!
//! [`SyncQueue`] is the ordered list of [`SyncOperation`]s waiting for the
//! remote. It owns every status transition (`pending → syncing → completed`,
//! or back to `pending` / on to `failed` after a failed attempt).
//!
//! ### Conflict Resolution
//!
//! [`ConflictResolver`] applies a per-table [`ConflictStrategy`]:
//! client-wins, server-wins (default), merge, or a manual resolver function.
//!
//! ### Cache
//!
//! [`TtlCache`] serves reads with per-entry TTL, lazy expiry, insertion-order
//! eviction, and hit/miss accounting.
//!
//! ## Quick Start
//!
//! ```rust
//! use harbor_engine::{ActionKind, AppState, Record, Store};
//! use serde_json::json;
//!
//! let mut store = Store::new();
//!
//! store.select(
//!     |state: &AppState| state.table("clients").map(|t| t.len()).unwrap_or(0),
//!     |new: &usize, old: &usize| println!("clients: {} -> {}", old, new),
//! );
//!
//! store
//!     .dispatch(ActionKind::UpsertRecord {
//!         table: "clients".into(),
//!         record: Record::with_id(json!({"id": "c-1", "name": "Acme"})).unwrap(),
//!     })
//!     .unwrap();
//!
//! assert!(store.get_state().record("clients", "c-1").is_some());
//! ```

pub mod action;
pub mod cache;
pub mod clock;
pub mod conflict;
pub mod error;
pub mod middleware;
pub mod operation;
pub mod queue;
pub mod record;
pub mod reducer;
pub mod selector;
pub mod snapshot;
pub mod state;
pub mod store;

// Re-export main types at crate root
pub use action::{Action, ActionKind, ActionMeta};
pub use cache::{CacheEntry, CacheStats, TtlCache};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use conflict::{
    ConflictPolicy, ConflictResolution, ConflictResolver, ConflictStrategy, Resolution,
};
pub use error::Error;
pub use middleware::{Middleware, Next};
pub use operation::{Change, DeleteTarget, OperationId, OperationStatus, SyncOperation};
pub use queue::{FailureOutcome, QueueCounts, SyncQueue};
pub use record::Record;
pub use reducer::reduce;
pub use selector::Observed;
pub use snapshot::{PersistedState, QUEUE_STORAGE_KEY, STATE_STORAGE_KEY};
pub use state::{AppState, EntityTable, SyncSummary, Theme, UserProfile};
pub use store::{Store, SubscriptionId};

/// Type aliases for clarity
pub type RecordId = String;
pub type TableName = String;
pub type Timestamp = u64;
