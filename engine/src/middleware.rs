//! Middleware pipeline around the reducer.
//!
//! Middlewares are composed in registration order: the first registered is the
//! outermost wrapper and the reducer call sits innermost. Each middleware gets
//! the current snapshot, the action, and a [`Next`] handle that continues the
//! chain. It may observe, rewrite the action, or short-circuit by returning a
//! snapshot without calling `next`.

use crate::{action::Action, error::Result, reducer::ReducerFn, state::AppState};
use std::sync::Arc;

/// A wrapper around dispatch.
pub trait Middleware: Send + Sync {
    /// Short name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Handle an action, usually by calling `next.run(state, action)`.
    fn process(&self, state: &AppState, action: &Action, next: Next<'_>) -> Result<AppState>;
}

/// Continuation of the middleware chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    reducer: ReducerFn,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], reducer: ReducerFn) -> Self {
        Self { chain, reducer }
    }

    /// Run the rest of the chain, ending in the reducer.
    pub fn run(self, state: &AppState, action: &Action) -> Result<AppState> {
        match self.chain.split_first() {
            Some((head, rest)) => head.process(state, action, Next::new(rest, self.reducer)),
            None => (self.reducer)(state, action),
        }
    }
}

/// Run an action through a full chain.
pub fn run_chain(
    chain: &[Arc<dyn Middleware>],
    reducer: ReducerFn,
    state: &AppState,
    action: &Action,
) -> Result<AppState> {
    Next::new(chain, reducer).run(state, action)
}
