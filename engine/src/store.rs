//! Store - the single authoritative state container.
//!
//! The Store owns the current [`AppState`] snapshot. Every dispatch stamps the
//! action, runs it through the middleware chain into the reducer, replaces the
//! snapshot wholesale, records the action in a bounded history, and then
//! notifies plain listeners followed by selector subscriptions, each in
//! registration order. Nothing observes a half-applied dispatch.
//!
//! Listener and selector callbacks receive the new snapshot by reference and
//! must not dispatch back into the same store from inside the callback.

use crate::{
    action::Action,
    clock::{system_clock, SharedClock},
    error::Result,
    middleware::{run_chain, Middleware},
    reducer::{reduce, ReducerFn},
    selector::{Observed, SelectorWatch, Watcher},
    state::AppState,
};
use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of actions kept in the history ring buffer.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Handle returned by `subscribe`/`select`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&AppState) + Send>;

/// The store.
pub struct Store {
    state: AppState,
    reducer: ReducerFn,
    middleware: Vec<Arc<dyn Middleware>>,
    clock: SharedClock,
    history: VecDeque<Action>,
    history_limit: usize,
    listeners: Vec<(SubscriptionId, Listener)>,
    watchers: Vec<(SubscriptionId, Box<dyn Watcher>)>,
    next_subscription: u64,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("version", &self.state.version)
            .field(
                "middleware",
                &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("history_len", &self.history.len())
            .field("listeners", &self.listeners.len())
            .field("selectors", &self.watchers.len())
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create a store with the initial state, the default reducer, and the system clock.
    pub fn new() -> Self {
        Self {
            state: AppState::initial(),
            reducer: reduce,
            middleware: Vec::new(),
            clock: system_clock(),
            history: VecDeque::with_capacity(DEFAULT_HISTORY_LIMIT),
            history_limit: DEFAULT_HISTORY_LIMIT,
            listeners: Vec::new(),
            watchers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Use a specific clock for stamping actions.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Append a middleware. The first one added is the outermost.
    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Replace the reducer.
    pub fn with_reducer(mut self, reducer: ReducerFn) -> Self {
        self.reducer = reducer;
        self
    }

    /// Bound the action history. Zero disables history.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        while self.history.len() > limit {
            self.history.pop_front();
        }
        self
    }

    /// Start from a specific snapshot instead of the initial shape.
    pub fn with_state(mut self, state: AppState) -> Self {
        self.state = state;
        self
    }

    /// The current snapshot.
    pub fn get_state(&self) -> &AppState {
        &self.state
    }

    /// Dispatch an action.
    ///
    /// A reducer or middleware error is returned unchanged and leaves the
    /// current snapshot, history, and subscribers untouched.
    pub fn dispatch(&mut self, action: impl Into<Action>) -> Result<()> {
        let mut action = action.into();
        if action.meta.timestamp.is_none() {
            action.meta.timestamp = Some(self.clock.now_millis());
        }

        let mut next = run_chain(&self.middleware, self.reducer, &self.state, &action)?;
        next.version = self.state.version + 1;
        self.state = next;

        if self.history_limit > 0 {
            if self.history.len() == self.history_limit {
                self.history.pop_front();
            }
            self.history.push_back(action);
        }

        for (_, listener) in self.listeners.iter_mut() {
            listener(&self.state);
        }
        for (_, watcher) in self.watchers.iter_mut() {
            watcher.evaluate(&self.state);
        }

        Ok(())
    }

    /// Register a listener called after every dispatch.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&AppState) + Send + 'static,
    {
        let id = self.next_id();
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Register a selector.
    ///
    /// The selector runs now to seed its value and again after every
    /// dispatch; `callback(new, old)` fires only when the value changed.
    pub fn select<T, S, C>(&mut self, selector: S, callback: C) -> SubscriptionId
    where
        T: Observed,
        S: Fn(&AppState) -> T + Send + 'static,
        C: FnMut(&T, &T) + Send + 'static,
    {
        let id = self.next_id();
        let watch = SelectorWatch::new(&self.state, selector, callback);
        self.watchers.push((id, Box::new(watch)));
        id
    }

    /// Remove a listener or selector. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len() + self.watchers.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.watchers.retain(|(sid, _)| *sid != id);
        before != self.listeners.len() + self.watchers.len()
    }

    /// Recent actions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Action> {
        self.history.iter()
    }

    /// Number of actions currently held in history.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Re-run the recorded history through the reducer, starting at `base`.
    ///
    /// Middleware is not involved, so this has no side effects.
    pub fn replay(&self, base: &AppState) -> Result<AppState> {
        let mut state = base.clone();
        for action in &self.history {
            let version = state.version + 1;
            state = (self.reducer)(&state, action)?;
            state.version = version;
        }
        Ok(state)
    }

    fn next_id(&mut self) -> SubscriptionId {
        self.next_subscription += 1;
        SubscriptionId(self.next_subscription)
    }
}
