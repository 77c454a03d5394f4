//! The sync manager.
//!
//! Writes go to the remote directly while online. When the remote is
//! unreachable (and offline mode is on) the manager synthesizes an optimistic
//! record, dispatches it, and appends an operation to the durable queue.
//! A drain pass later replays queued operations in enqueue order.
//!
//! # Drain pass
//!
//! 1. Take the single-flight guard; a second caller returns immediately.
//! 2. Walk pending operations front to back. An operation whose record still
//!    has an earlier unfinished operation is deferred to the next pass, or
//!    failed with it when that earlier operation has already failed.
//! 3. On success the operation completes, the confirmed record is
//!    dispatched, and later updates to the record adopt its new `version`. On a conflict the table's policy resolves the payload, which
//!    is rebased on the server's `version` and retried once in the same pass.
//!    Any other failure counts against the retry budget.
//! 4. Completed operations are pruned and the queue is persisted.
//!
//! The queue is persisted after every change to it. Storage failures are
//! logged and the queue keeps working from memory.

use crate::config::SyncConfig;
use crate::error::{RemoteError, Result, SyncError};
use crate::handle::StoreHandle;
use crate::middleware::{LoggingMiddleware, PersistenceMiddleware};
use crate::remote::{matches_filters, Remote};
use crate::signals::{ConnectivitySource, ManualSignals, VisibilitySource};
use crate::storage::{DurableStore, SharedStorage};
use harbor_engine::{
    clock::{system_clock, SharedClock},
    conflict::ConflictResolution,
    record::{ID_FIELD, VERSION_FIELD},
    snapshot::{QUEUE_STORAGE_KEY, STATE_STORAGE_KEY},
    Action, ActionKind, CacheStats, Change, ConflictResolver, DeleteTarget, FailureOutcome,
    Middleware, PersistedState, Record, Store, SyncOperation, SyncQueue, SyncSummary, TtlCache,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Prefix of ids given to records created while offline.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Source tag on actions dispatched by the manager.
const ACTION_SOURCE: &str = "sync";

/// What one drain pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Another pass was already running; nothing was attempted
    pub skipped: bool,
    pub attempted: usize,
    pub completed: usize,
    /// Failed, back to pending
    pub retrying: usize,
    /// Failed, retry budget exhausted
    pub failed: usize,
    /// Held back behind an earlier operation on the same record
    pub deferred: usize,
    pub conflicts: usize,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Releases the single-flight flag when dropped.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// How an attempted operation ended.
enum Attempt {
    /// The remote accepted the write and returned its copy (none for deletes).
    Written(Option<Record>),
    /// A conflict resolved in the server's favour; nothing was written.
    TookServer(Record),
}

/// Builder for [`SyncManager`].
pub struct SyncManagerBuilder {
    remote: Arc<dyn Remote>,
    storage: SharedStorage,
    connectivity: Option<Arc<dyn ConnectivitySource>>,
    resolver: ConflictResolver,
    config: SyncConfig,
    clock: SharedClock,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl SyncManagerBuilder {
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn connectivity(mut self, connectivity: Arc<dyn ConnectivitySource>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn resolver(mut self, resolver: ConflictResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Add a store middleware. Added ones run inside logging and outside persistence.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Restore persisted state and queue, then build the manager.
    pub fn build(self) -> Result<SyncManager> {
        let persisted = load_persisted_state(&*self.storage);

        let mut persistence = PersistenceMiddleware::new(self.storage.clone());
        if let Some(persisted) = &persisted {
            persistence = persistence.with_persisted(persisted.clone());
        }

        let mut store = Store::new()
            .with_clock(self.clock.clone())
            .with_history_limit(self.config.history_limit)
            .with_middleware(Arc::new(LoggingMiddleware));
        for middleware in self.middleware {
            store = store.with_middleware(middleware);
        }
        let store = StoreHandle::new(store.with_middleware(Arc::new(persistence)));

        if let Some(persisted) = persisted {
            store.dispatch(Action::new(ActionKind::Hydrate(persisted)).with_source(ACTION_SOURCE))?;
        }

        let mut queue = load_queue(&*self.storage);
        let recovered = queue.recover_interrupted();
        if recovered > 0 {
            info!(recovered, "reset interrupted operations to pending");
        }

        let cache = TtlCache::with_limits(
            self.clock.clone(),
            self.config.cache_ttl_millis(),
            self.config.cache_capacity,
        );

        let manager = SyncManager {
            store,
            remote: self.remote,
            storage: self.storage,
            connectivity: self
                .connectivity
                .unwrap_or_else(|| Arc::new(ManualSignals::new(true))),
            resolver: self.resolver,
            config: self.config,
            clock: self.clock,
            queue: Mutex::new(queue),
            cache: Mutex::new(cache),
            draining: AtomicBool::new(false),
            last_synced_at: Mutex::new(None),
        };

        if recovered > 0 {
            manager.persist_queue();
        }
        manager.publish_status()?;

        info!(
            queued = manager.queue.lock().len(),
            online = manager.is_online(),
            "sync manager ready"
        );

        Ok(manager)
    }
}

fn load_persisted_state(storage: &dyn DurableStore) -> Option<PersistedState> {
    match storage.get(STATE_STORAGE_KEY) {
        Ok(Some(json)) => match PersistedState::from_json(&json) {
            Ok(persisted) => Some(persisted),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable persisted state");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "failed to read persisted state");
            None
        }
    }
}

fn load_queue(storage: &dyn DurableStore) -> SyncQueue {
    match storage.get(QUEUE_STORAGE_KEY) {
        Ok(Some(json)) => match SyncQueue::from_json(&json) {
            Ok(queue) => queue,
            Err(e) => {
                error!(error = %e, "discarding unreadable sync queue");
                SyncQueue::new()
            }
        },
        Ok(None) => SyncQueue::new(),
        Err(e) => {
            warn!(error = %e, "failed to read sync queue, starting empty");
            SyncQueue::new()
        }
    }
}

/// Coordinates the store, the remote, the durable queue, and the read cache.
pub struct SyncManager {
    store: StoreHandle,
    remote: Arc<dyn Remote>,
    storage: SharedStorage,
    connectivity: Arc<dyn ConnectivitySource>,
    resolver: ConflictResolver,
    config: SyncConfig,
    clock: SharedClock,
    queue: Mutex<SyncQueue>,
    cache: Mutex<TtlCache<Vec<Record>>>,
    draining: AtomicBool,
    last_synced_at: Mutex<Option<u64>>,
}

impl SyncManager {
    pub fn builder(remote: Arc<dyn Remote>, storage: SharedStorage) -> SyncManagerBuilder {
        SyncManagerBuilder {
            remote,
            storage,
            connectivity: None,
            resolver: ConflictResolver::new(),
            config: SyncConfig::default(),
            clock: system_clock(),
            middleware: Vec::new(),
        }
    }

    /// The store this manager feeds.
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Create a record.
    ///
    /// Online, returns the server's record. Offline, returns the optimistic
    /// record (with a temporary id when `data` has none) already visible in
    /// the store.
    pub async fn create(&self, table: &str, data: Value) -> Result<Record> {
        let mut record = Record::from_value(data)?;

        if self.use_remote()? {
            match self.remote.create(table, &record).await {
                Ok(created) => {
                    self.dispatch(ActionKind::UpsertRecord {
                        table: table.to_string(),
                        record: created.clone(),
                    })?;
                    self.invalidate_table(table);
                    return Ok(created);
                }
                Err(e) => self.fall_back(table, "create", e)?,
            }
        }

        if record.id().is_none() {
            record.set_id(format!("{}{}", TEMP_ID_PREFIX, uuid::Uuid::new_v4()));
        }
        record.mark_optimistic();

        self.dispatch_optimistic(ActionKind::UpsertRecord {
            table: table.to_string(),
            record: record.clone(),
        })?;
        self.enqueue(table, Change::Create(record.clone()))?;
        Ok(record)
    }

    /// Shallow-update a record with the fields of `patch`.
    ///
    /// Offline, the queued payload carries the patch plus the `version` the
    /// local copy was based on, so the server can detect a stale write.
    pub async fn update(&self, table: &str, id: &str, patch: Value) -> Result<Record> {
        let mut patch = Record::from_value(patch)?;
        patch.set_id(id);

        if self.use_remote()? {
            match self.remote.update(table, id, &patch).await {
                Ok(updated) => {
                    self.dispatch(ActionKind::UpsertRecord {
                        table: table.to_string(),
                        record: updated.clone(),
                    })?;
                    self.invalidate_table(table);
                    return Ok(updated);
                }
                Err(e) => self.fall_back(table, "update", e)?,
            }
        }

        let base = self
            .store
            .state()
            .record(table, id)
            .map(|r| (**r).clone());

        if patch.version().is_none() {
            if let Some(version) = base.as_ref().and_then(|b| b.version()) {
                patch.insert(VERSION_FIELD, version.clone());
            }
        }

        let mut optimistic = base.unwrap_or_default();
        optimistic.patch(&patch);
        optimistic.mark_optimistic();

        self.dispatch_optimistic(ActionKind::UpsertRecord {
            table: table.to_string(),
            record: optimistic.clone(),
        })?;
        self.enqueue(table, Change::Update(patch))?;
        Ok(optimistic)
    }

    /// Delete a record.
    pub async fn delete(&self, table: &str, id: &str) -> Result<()> {
        if self.use_remote()? {
            match self.remote.delete(table, id).await {
                Ok(()) | Err(RemoteError::NotFound { .. }) => {
                    self.dispatch(ActionKind::RemoveRecord {
                        table: table.to_string(),
                        id: id.to_string(),
                    })?;
                    self.invalidate_table(table);
                    return Ok(());
                }
                Err(e) => self.fall_back(table, "delete", e)?,
            }
        }

        self.dispatch_optimistic(ActionKind::RemoveRecord {
            table: table.to_string(),
            id: id.to_string(),
        })?;
        self.enqueue(
            table,
            Change::Delete(DeleteTarget { id: id.to_string() }),
        )
    }

    /// Whether to try the remote first. Errors when offline with offline mode disabled.
    fn use_remote(&self) -> Result<bool> {
        if self.is_online() {
            Ok(true)
        } else if self.config.offline_mode {
            Ok(false)
        } else {
            Err(SyncError::Offline)
        }
    }

    /// Decide whether a failed online write may continue on the offline path.
    ///
    /// Only transient failures are queued; a rejected write would be rejected
    /// again on every drain.
    fn fall_back(&self, table: &str, intent: &str, error: RemoteError) -> Result<()> {
        if !self.config.offline_mode || !error.is_retryable() {
            return Err(error.into());
        }
        warn!(table = %table, intent = %intent, error = %error, "remote write failed, queueing offline");
        Ok(())
    }

    fn enqueue(&self, table: &str, change: Change) -> Result<()> {
        let operation = SyncOperation::new(
            uuid::Uuid::new_v4().to_string(),
            table,
            change,
            self.clock.now_millis(),
        );

        debug!(
            op_id = %operation.id,
            table = %table,
            kind = operation.change.kind(),
            "queued operation"
        );

        self.queue.lock().enqueue(operation);
        self.persist_queue();
        self.publish_status()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read a table, cache first.
    ///
    /// Cache misses go to the remote while online. Offline, or when the
    /// remote fails in offline mode, the local records matching `filters`
    /// are returned instead.
    pub async fn read(&self, table: &str, filters: Option<Value>) -> Result<Vec<Record>> {
        let key = cache_key(table, filters.as_ref());

        let cached = self.cache.lock().get(&key);
        if let Some(records) = cached {
            debug!(table = %table, key = %key, "cache hit");
            self.publish_cache_stats()?;
            return Ok(records);
        }
        self.publish_cache_stats()?;

        if !self.use_remote()? {
            return Ok(self.local_records(table, filters.as_ref()));
        }

        self.dispatch(ActionKind::SetLoading {
            table: table.to_string(),
            loading: true,
        })?;

        match self.remote.read(table, filters.as_ref()).await {
            Ok(records) => {
                self.cache.lock().set(key, records.clone(), None);
                if filters.is_none() {
                    self.dispatch(ActionKind::LoadRecords {
                        table: table.to_string(),
                        records: records.clone(),
                    })?;
                } else {
                    for record in &records {
                        self.dispatch(ActionKind::UpsertRecord {
                            table: table.to_string(),
                            record: record.clone(),
                        })?;
                    }
                    self.dispatch(ActionKind::SetLoading {
                        table: table.to_string(),
                        loading: false,
                    })?;
                }
                Ok(records)
            }
            Err(e) => {
                self.dispatch(ActionKind::SetError {
                    table: table.to_string(),
                    error: Some(e.to_string()),
                })?;
                if !self.config.offline_mode {
                    return Err(e.into());
                }
                warn!(table = %table, error = %e, "remote read failed, serving local records");
                Ok(self.local_records(table, filters.as_ref()))
            }
        }
    }

    fn local_records(&self, table: &str, filters: Option<&Value>) -> Vec<Record> {
        self.store
            .state()
            .table(table)
            .map(|t| {
                t.records()
                    .filter(|r| matches_filters(r, filters))
                    .map(|r| (**r).clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Hit/miss counters of the read cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    /// Drop every cached read.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    fn invalidate_table(&self, table: &str) {
        let dropped = self.cache.lock().invalidate_prefix(&format!("{table}:"));
        if dropped > 0 {
            debug!(table = %table, dropped, "invalidated cached reads");
        }
    }

    fn publish_cache_stats(&self) -> Result<()> {
        let stats = self.cache_stats();
        self.dispatch(ActionKind::CacheStats {
            hits: stats.hits,
            misses: stats.misses,
        })
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    /// Run one drain pass over the queue.
    pub async fn sync_all(&self) -> Result<SyncReport> {
        let Some(guard) = DrainGuard::acquire(&self.draining) else {
            debug!("drain already in progress");
            return Ok(SyncReport::skipped());
        };

        if !self.is_online() {
            debug!("offline, skipping drain");
            drop(guard);
            return Ok(SyncReport::default());
        }

        if self.queue.lock().pending_ids().is_empty() {
            drop(guard);
            return Ok(SyncReport::default());
        }

        self.publish_status()?;
        let result = self.drain().await;
        drop(guard);
        self.publish_status()?;

        let report = result?;
        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                completed = report.completed,
                retrying = report.retrying,
                failed = report.failed,
                deferred = report.deferred,
                conflicts = report.conflicts,
                "drain pass finished"
            );
        }
        Ok(report)
    }

    async fn drain(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let ids = self.queue.lock().pending_ids();

        for id in ids {
            let operation = {
                let mut queue = self.queue.lock();
                let Some(op) = queue.get(&id) else {
                    continue;
                };
                if !op.is_pending() {
                    continue;
                }
                let blocker = op.record_id().and_then(|record_id| {
                    queue
                        .blocker(&id, &op.table, &record_id)
                        .map(|b| (b.id.clone(), b.is_failed()))
                });
                match blocker {
                    Some((blocker, true)) => {
                        queue.fail_blocked(&id, &blocker)?;
                        warn!(op_id = %id, blocked_by = %blocker, "earlier operation on the record failed, failing this one too");
                        report.failed += 1;
                        continue;
                    }
                    Some(_) => {
                        report.deferred += 1;
                        continue;
                    }
                    None => {}
                }
                queue.begin(&id)?
            };
            self.persist_queue();
            report.attempted += 1;

            let outcome = match self.attempt(&operation).await {
                Err(e) if e.is_conflict() => {
                    report.conflicts += 1;
                    self.resolve_and_retry(&operation, e).await
                }
                other => other,
            };

            match outcome {
                Ok(attempt) => {
                    self.finish(&operation, attempt)?;
                    report.completed += 1;
                }
                Err(e) => match self.fail(&operation, &e)? {
                    FailureOutcome::WillRetry { .. } => report.retrying += 1,
                    FailureOutcome::GaveUp { .. } => report.failed += 1,
                },
            }
        }

        let pruned = self.queue.lock().prune_completed();
        if pruned > 0 || report.attempted > 0 || report.failed > 0 {
            self.persist_queue();
        }
        if report.attempted > 0 {
            *self.last_synced_at.lock() = Some(self.clock.now_millis());
        }
        Ok(report)
    }

    async fn attempt(&self, operation: &SyncOperation) -> std::result::Result<Attempt, RemoteError> {
        let table = operation.table.as_str();
        match &operation.change {
            Change::Create(record) => {
                let mut outgoing = record.clone();
                outgoing.clear_optimistic();
                // Temporary ids are local; the remote assigns the real one.
                if record.id().is_some_and(|id| id.starts_with(TEMP_ID_PREFIX)) {
                    outgoing.remove(ID_FIELD);
                }
                let created = self.remote.create(table, &outgoing).await?;
                Ok(Attempt::Written(Some(created)))
            }
            Change::Update(record) => {
                let id = record
                    .id()
                    .ok_or_else(|| RemoteError::Rejected("update without a record id".into()))?;
                let mut outgoing = record.clone();
                outgoing.clear_optimistic();
                let updated = self.remote.update(table, &id, &outgoing).await?;
                Ok(Attempt::Written(Some(updated)))
            }
            Change::Delete(target) => match self.remote.delete(table, &target.id).await {
                Ok(()) | Err(RemoteError::NotFound { .. }) => Ok(Attempt::Written(None)),
                Err(e) => Err(e),
            },
        }
    }

    /// Resolve a conflict with the table's policy and retry once.
    async fn resolve_and_retry(
        &self,
        operation: &SyncOperation,
        error: RemoteError,
    ) -> std::result::Result<Attempt, RemoteError> {
        let table = operation.table.as_str();
        let (Some(client), Some(record_id)) = (operation.change.record(), operation.record_id())
        else {
            return Err(error);
        };

        let server = match error {
            RemoteError::Conflict {
                server: Some(server),
                ..
            } => server,
            other => match self.remote.fetch(table, &record_id).await? {
                Some(server) => server,
                None => return Err(other),
            },
        };

        let resolution = self
            .resolver
            .resolve(table, client, &server, self.clock.now_millis());

        match resolution.applied {
            ConflictResolution::ServerWins | ConflictResolution::ServerWinsFallback => {
                if resolution.applied == ConflictResolution::ServerWinsFallback {
                    warn!(
                        op_id = %operation.id,
                        table = %table,
                        "manual conflict strategy has no resolver, server copy wins"
                    );
                } else {
                    info!(op_id = %operation.id, table = %table, "conflict resolved, server copy wins");
                }
                return Ok(Attempt::TookServer(server));
            }
            applied => {
                info!(op_id = %operation.id, table = %table, resolution = ?applied, "conflict resolved");
            }
        }

        let mut resolved = resolution.record;
        resolved.set_id(record_id);
        match server.version() {
            Some(version) => resolved.insert(VERSION_FIELD, version.clone()),
            None => {
                resolved.remove(VERSION_FIELD);
            }
        }

        let persisted = self.queue.lock().replace_data(&operation.id, resolved.clone());
        if let Err(e) = persisted {
            error!(op_id = %operation.id, error = %e, "failed to store resolved payload");
        }
        self.persist_queue();

        let mut rebased = operation.clone();
        rebased.change = match &operation.change {
            Change::Create(_) => Change::Create(resolved),
            _ => Change::Update(resolved),
        };
        self.attempt(&rebased).await
    }

    fn finish(&self, operation: &SyncOperation, attempt: Attempt) -> Result<()> {
        let table = operation.table.as_str();
        self.queue.lock().complete(&operation.id)?;

        let confirmed = match attempt {
            Attempt::Written(record) => record,
            Attempt::TookServer(server) => Some(server),
        };

        if let (Some(server), Some(local_id)) = (confirmed, operation.record_id()) {
            let server_id = server.id().unwrap_or_else(|| local_id.clone());

            if server_id != local_id {
                let rewritten = self
                    .queue
                    .lock()
                    .rewrite_record_id(table, &local_id, &server_id);
                if rewritten > 0 {
                    debug!(table = %table, from = %local_id, to = %server_id, rewritten, "rewrote queued record ids");
                }
            }

            if let Some(version) = server.version() {
                let rebased =
                    self.queue
                        .lock()
                        .rebase_version(&operation.id, table, &server_id, version);
                if rebased > 0 {
                    debug!(table = %table, id = %server_id, version = %version, rebased, "rebased queued updates");
                }
            }

            let followups = self
                .queue
                .lock()
                .has_unfinished_after(&operation.id, table, &server_id);

            if followups {
                // A later intent for this record is still queued; keep showing it.
                if server_id != local_id {
                    self.rename_local(table, &local_id, &server_id)?;
                }
            } else {
                self.dispatch(ActionKind::ConfirmRecord {
                    table: table.to_string(),
                    local_id,
                    record: server,
                })?;
            }
        }

        self.invalidate_table(table);
        self.persist_queue();

        debug!(op_id = %operation.id, table = %table, kind = operation.change.kind(), "operation completed");
        Ok(())
    }

    fn rename_local(&self, table: &str, from: &str, to: &str) -> Result<()> {
        let current = self.store.state().record(table, from).map(|r| (**r).clone());
        if let Some(mut record) = current {
            record.set_id(to);
            self.dispatch(ActionKind::RemoveRecord {
                table: table.to_string(),
                id: from.to_string(),
            })?;
            self.dispatch_optimistic(ActionKind::UpsertRecord {
                table: table.to_string(),
                record,
            })?;
        }
        Ok(())
    }

    fn fail(&self, operation: &SyncOperation, error: &RemoteError) -> Result<FailureOutcome> {
        // Rejections will not succeed on retry.
        let max_retries = if error.is_retryable() {
            self.config.max_retries
        } else {
            0
        };

        let outcome =
            self.queue
                .lock()
                .record_failure(&operation.id, error.to_string(), max_retries)?;
        self.persist_queue();

        match outcome {
            FailureOutcome::WillRetry { retries } => warn!(
                op_id = %operation.id,
                table = %operation.table,
                retries,
                error = %error,
                "operation failed, will retry"
            ),
            FailureOutcome::GaveUp { retries } => error!(
                op_id = %operation.id,
                table = %operation.table,
                retries,
                error = %error,
                "operation failed, giving up"
            ),
        }
        Ok(outcome)
    }

    /// Current sync status.
    pub fn get_sync_status(&self) -> SyncSummary {
        let counts = self.queue.lock().counts();
        SyncSummary {
            is_online: self.is_online(),
            is_syncing: self.draining.load(Ordering::Acquire),
            queue_length: counts.total,
            pending_operations: counts.pending + counts.syncing,
            failed_operations: counts.failed,
            last_synced_at: *self.last_synced_at.lock(),
        }
    }

    /// Operations whose retries are exhausted.
    pub fn get_failed_operations(&self) -> Vec<SyncOperation> {
        self.queue.lock().failed()
    }

    /// Every queued operation, in enqueue order.
    pub fn operations(&self) -> Vec<SyncOperation> {
        self.queue.lock().operations().to_vec()
    }

    /// Reset failed operations to pending with zero retries, then drain.
    pub async fn retry_failed_operations(&self) -> Result<SyncReport> {
        let revived = self.queue.lock().retry_failed();
        if revived == 0 {
            return Ok(SyncReport::default());
        }

        info!(revived, "retrying failed operations");
        self.persist_queue();
        self.publish_status()?;
        self.sync_all().await
    }

    /// Drop completed operations. Returns how many were removed.
    pub fn clear_completed(&self) -> usize {
        let pruned = self.queue.lock().prune_completed();
        if pruned > 0 {
            self.persist_queue();
        }
        pruned
    }

    fn persist_queue(&self) {
        let json = self.queue.lock().to_json();
        let result = json
            .map_err(SyncError::from)
            .and_then(|json| Ok(self.storage.set(QUEUE_STORAGE_KEY, &json)?));

        if let Err(e) = result {
            warn!(error = %e, "failed to persist sync queue, continuing in memory");
        }
    }

    // ------------------------------------------------------------------
    // Store plumbing
    // ------------------------------------------------------------------

    fn dispatch(&self, kind: ActionKind) -> Result<()> {
        self.store
            .dispatch(Action::new(kind).with_source(ACTION_SOURCE))?;
        Ok(())
    }

    fn dispatch_optimistic(&self, kind: ActionKind) -> Result<()> {
        self.store
            .dispatch(Action::new(kind).optimistic().with_source(ACTION_SOURCE))?;
        Ok(())
    }

    fn publish_status(&self) -> Result<()> {
        self.dispatch(ActionKind::SetSyncStatus(self.get_sync_status()))
    }

    /// Mirror the current connectivity into the store.
    pub fn publish_connectivity(&self) -> Result<()> {
        self.dispatch(ActionKind::SetOnline(self.is_online()))?;
        self.publish_status()
    }

    // ------------------------------------------------------------------
    // Background worker
    // ------------------------------------------------------------------

    /// Spawn the background drain loop.
    ///
    /// The loop drains on every interval tick (the first tick fires at once),
    /// when connectivity comes back, and when the host becomes visible again.
    pub fn spawn_worker(self: &Arc<Self>, visibility: Option<Arc<dyn VisibilitySource>>) -> SyncWorker {
        let manager = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let mut online_rx = manager.connectivity.watch_online();
        let mut visible_rx = visibility.map(|v| v.watch_visible());

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.sync_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut online_open = true;
            let mut visible_open = visible_rx.is_some();

            info!(interval = ?manager.config.sync_interval, "sync worker started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => manager.drain_in_background("interval").await,
                    changed = online_rx.changed(), if online_open => {
                        if changed.is_err() {
                            online_open = false;
                            continue;
                        }
                        let online = *online_rx.borrow_and_update();
                        info!(online, "connectivity changed");
                        if let Err(e) = manager.publish_connectivity() {
                            error!(error = %e, "failed to publish connectivity");
                        }
                        if online {
                            manager.drain_in_background("reconnect").await;
                        }
                    }
                    changed = wait_changed(&mut visible_rx), if visible_open => {
                        if changed.is_err() {
                            visible_open = false;
                            continue;
                        }
                        let visible = visible_rx.as_mut().map(|rx| *rx.borrow_and_update()).unwrap_or(false);
                        if visible {
                            manager.drain_in_background("visible").await;
                        }
                    }
                }
            }

            info!("sync worker stopped");
        });

        SyncWorker {
            shutdown: shutdown_tx,
            handle,
        }
    }

    async fn drain_in_background(&self, trigger: &str) {
        match self.sync_all().await {
            Ok(report) if report.skipped => debug!(trigger = %trigger, "drain skipped"),
            Ok(_) => {}
            Err(e) => error!(trigger = %trigger, error = %e, "drain failed"),
        }
    }
}

async fn wait_changed(
    rx: &mut Option<watch::Receiver<bool>>,
) -> std::result::Result<(), watch::error::RecvError> {
    match rx {
        Some(rx) => rx.changed().await,
        None => std::future::pending().await,
    }
}

fn cache_key(table: &str, filters: Option<&Value>) -> String {
    match filters {
        Some(filters) => format!("{table}:{filters}"),
        None => format!("{table}:all"),
    }
}

/// Handle to a running background worker.
pub struct SyncWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SyncWorker {
    /// Stop the loop and wait for it to exit. A drain in flight finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "sync worker panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_keys_are_table_prefixed() {
        assert_eq!(cache_key("clients", None), "clients:all");
        assert_eq!(
            cache_key("clients", Some(&json!({"owner": "u-1"}))),
            "clients:{\"owner\":\"u-1\"}"
        );
    }

    #[test]
    fn drain_guard_is_single_flight() {
        let flag = AtomicBool::new(false);
        let first = DrainGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(DrainGuard::acquire(&flag).is_none());

        drop(first);
        assert!(DrainGuard::acquire(&flag).is_some());
    }
}
