//! Shared access to a [`Store`] from async code.

use harbor_engine::{Action, AppState, Observed, Store, SubscriptionId};
use parking_lot::Mutex;
use std::sync::Arc;

/// A cloneable handle to one store.
///
/// Every method takes the lock for the duration of one synchronous call;
/// nothing here can be held across an `.await`. Callbacks registered through
/// `subscribe`/`select` run with the lock held and must not dispatch back
/// through the same handle.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    inner: Arc<Mutex<Store>>,
}

impl StoreHandle {
    pub fn new(store: Store) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Dispatch an action.
    pub fn dispatch(&self, action: impl Into<Action>) -> harbor_engine::error::Result<()> {
        self.inner.lock().dispatch(action)
    }

    /// A copy of the current snapshot. Slices are shared, so this is cheap.
    pub fn state(&self) -> AppState {
        self.inner.lock().get_state().clone()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: FnMut(&AppState) + Send + 'static,
    {
        self.inner.lock().subscribe(listener)
    }

    pub fn select<T, S, C>(&self, selector: S, callback: C) -> SubscriptionId
    where
        T: Observed,
        S: Fn(&AppState) -> T + Send + 'static,
        C: FnMut(&T, &T) + Send + 'static,
    {
        self.inner.lock().select(selector, callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.lock().unsubscribe(id)
    }

    /// Run a closure with exclusive access to the store.
    pub fn with<R>(&self, f: impl FnOnce(&mut Store) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
