//! # Harbor Sync
//!
//! The async half of Harbor: it connects a [`harbor_engine::Store`] to a
//! remote backend and to durable local storage.
//!
//! - [`SyncManager`] performs writes online when it can and queues them
//!   offline when it cannot, drains the queue in order with bounded retries,
//!   and resolves conflicts with per-table policies.
//! - [`Remote`] is the backend contract; [`InMemoryRemote`] implements it
//!   in-process.
//! - [`DurableStore`] holds the persisted state subset and the queue;
//!   [`FileStore`] and [`MemoryStore`] implement it.
//! - [`ConnectivitySource`] and [`VisibilitySource`] feed the background
//!   worker started by [`SyncManager::spawn_worker`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use harbor_sync::{InMemoryRemote, ManualSignals, MemoryStore, SyncManager};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> harbor_sync::Result<()> {
//! let signals = Arc::new(ManualSignals::new(false));
//! let manager = SyncManager::builder(Arc::new(InMemoryRemote::new()), Arc::new(MemoryStore::new()))
//!     .connectivity(signals.clone())
//!     .build()?;
//!
//! // Offline: returns at once with an optimistic record.
//! let draft = manager.create("clients", json!({"name": "Acme"})).await?;
//! assert!(draft.is_optimistic());
//!
//! signals.set_online(true);
//! manager.sync_all().await?;
//! assert_eq!(manager.get_sync_status().queue_length, 0);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handle;
pub mod manager;
pub mod memory;
pub mod middleware;
pub mod remote;
pub mod signals;
pub mod storage;

pub use config::SyncConfig;
pub use error::{ConfigError, RemoteError, Result, StorageError, SyncError};
pub use handle::StoreHandle;
pub use manager::{SyncManager, SyncManagerBuilder, SyncReport, SyncWorker, TEMP_ID_PREFIX};
pub use memory::{InMemoryRemote, RemoteCall};
pub use middleware::{LoggingMiddleware, MetricsMiddleware, PersistenceMiddleware};
pub use remote::{Remote, RemoteResult};
pub use signals::{ConnectivitySource, ManualSignals, VisibilitySource};
pub use storage::{DurableStore, FileStore, MemoryStore, SharedStorage};
