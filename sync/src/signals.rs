//! Environment signals that trigger a drain.
//!
//! Hosts expose connectivity and visibility as `watch` channels. The
//! background worker wakes on every change and drains when the host comes
//! back online or regains visibility.

use tokio::sync::watch;

/// Network reachability as seen by the host.
pub trait ConnectivitySource: Send + Sync {
    fn is_online(&self) -> bool;

    /// A receiver that observes every connectivity change.
    fn watch_online(&self) -> watch::Receiver<bool>;
}

/// Whether the host application is in the foreground.
pub trait VisibilitySource: Send + Sync {
    fn is_visible(&self) -> bool;

    /// A receiver that observes every visibility change.
    fn watch_visible(&self) -> watch::Receiver<bool>;
}

/// Signals driven by explicit calls, for embedding hosts and tests.
#[derive(Debug)]
pub struct ManualSignals {
    online: watch::Sender<bool>,
    visible: watch::Sender<bool>,
}

impl ManualSignals {
    /// Start visible with the given connectivity.
    pub fn new(online: bool) -> Self {
        let (online, _) = watch::channel(online);
        let (visible, _) = watch::channel(true);
        Self { online, visible }
    }

    pub fn set_online(&self, online: bool) {
        self.online.send_replace(online);
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.send_replace(visible);
    }
}

impl Default for ManualSignals {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivitySource for ManualSignals {
    fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    fn watch_online(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }
}

impl VisibilitySource for ManualSignals {
    fn is_visible(&self) -> bool {
        *self.visible.borrow()
    }

    fn watch_visible(&self) -> watch::Receiver<bool> {
        self.visible.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receivers_see_changes() {
        let signals = ManualSignals::new(false);
        let mut online = signals.watch_online();

        assert!(!signals.is_online());
        signals.set_online(true);

        online.changed().await.unwrap();
        assert!(*online.borrow_and_update());
        assert!(signals.is_online());
    }

    #[test]
    fn changes_without_receivers_are_kept() {
        let signals = ManualSignals::default();
        signals.set_visible(false);
        assert!(!signals.is_visible());
        assert!(!*signals.watch_visible().borrow());
    }
}
