//! Fine-grained subscriptions on derived values.
//!
//! A selector maps a snapshot to a value; its callback runs only when that
//! value changes. Change is judged by identity, never by deep comparison:
//! `Arc`s compare by pointer and plain values compare by `==`. Because the
//! reducer shares untouched slices between snapshots, selecting a slice
//! (`|s| s.ui.clone()`) fires only when that slice was actually replaced.
//!
//! Selectors must be pure functions of the snapshot.

use crate::state::AppState;
use std::sync::Arc;

/// Values that can be observed by a selector.
pub trait Observed: Clone + Send + 'static {
    /// Whether `self` and `other` count as the same observation.
    fn same_as(&self, other: &Self) -> bool;
}

impl<T: ?Sized + Send + Sync + 'static> Observed for Arc<T> {
    fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

macro_rules! observed_by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Observed for $ty {
                fn same_as(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

observed_by_value!(
    bool,
    u8,
    u16,
    u32,
    u64,
    usize,
    i8,
    i16,
    i32,
    i64,
    isize,
    char,
    String,
    &'static str,
    crate::state::Theme,
);

impl Observed for f64 {
    fn same_as(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl<T: Observed> Observed for Option<T> {
    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_as(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<A: Observed, B: Observed> Observed for (A, B) {
    fn same_as(&self, other: &Self) -> bool {
        self.0.same_as(&other.0) && self.1.same_as(&other.1)
    }
}

impl<A: Observed, B: Observed, C: Observed> Observed for (A, B, C) {
    fn same_as(&self, other: &Self) -> bool {
        self.0.same_as(&other.0) && self.1.same_as(&other.1) && self.2.same_as(&other.2)
    }
}

/// Type-erased selector subscription held by the store.
pub(crate) trait Watcher: Send {
    /// Re-evaluate against a new snapshot and fire if the value changed.
    fn evaluate(&mut self, state: &AppState);
}

/// A selector together with its last value and callback.
pub(crate) struct SelectorWatch<T, S, C> {
    selector: S,
    callback: C,
    last: T,
}

impl<T, S, C> SelectorWatch<T, S, C>
where
    T: Observed,
    S: Fn(&AppState) -> T + Send + 'static,
    C: FnMut(&T, &T) + Send + 'static,
{
    /// Evaluate the selector immediately to seed the last value.
    pub(crate) fn new(state: &AppState, selector: S, callback: C) -> Self {
        let last = selector(state);
        Self {
            selector,
            callback,
            last,
        }
    }
}

impl<T, S, C> Watcher for SelectorWatch<T, S, C>
where
    T: Observed,
    S: Fn(&AppState) -> T + Send + 'static,
    C: FnMut(&T, &T) + Send + 'static,
{
    fn evaluate(&mut self, state: &AppState) {
        let value = (self.selector)(state);
        if !value.same_as(&self.last) {
            let old = std::mem::replace(&mut self.last, value);
            (self.callback)(&self.last, &old);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Theme, UiSlice};
    use std::sync::Mutex;

    #[test]
    fn arc_identity_is_pointer_equality() {
        let a = Arc::new(UiSlice::default());
        let b = Arc::new(UiSlice::default());
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&b));
    }

    #[test]
    fn primitives_compare_by_value() {
        assert!(3u64.same_as(&3));
        assert!(!"a".to_string().same_as(&"b".to_string()));
        assert!(Some(Theme::Dark).same_as(&Some(Theme::Dark)));
        assert!(!Some(1usize).same_as(&None));
        assert!((1u32, true).same_as(&(1, true)));
        assert!(f64::NAN.same_as(&f64::NAN));
    }

    #[test]
    fn watch_fires_only_on_change() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let mut state = AppState::initial();
        let mut watch = SelectorWatch::new(
            &state,
            |s: &AppState| s.ui.sidebar_collapsed,
            move |new: &bool, old: &bool| sink.lock().unwrap().push((*new, *old)),
        );

        watch.evaluate(&state);
        assert!(calls.lock().unwrap().is_empty());

        state.ui = Arc::new(UiSlice {
            sidebar_collapsed: true,
            ..UiSlice::default()
        });
        watch.evaluate(&state);
        watch.evaluate(&state);

        assert_eq!(*calls.lock().unwrap(), vec![(true, false)]);
    }
}
