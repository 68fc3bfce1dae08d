//! Protected-app set store.
//!
//! The set of apps the user wants guarded is supplied by an external
//! persistence layer and replaced wholesale on every update. Readers hold an
//! `Arc` snapshot, so a concurrent update never produces a torn read; update
//! notifications travel over a watch channel.

use crate::types::AppId;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Copy-on-write store for the protected-app set
pub struct ProtectedAppStore {
    tx: watch::Sender<Arc<HashSet<AppId>>>,
}

impl ProtectedAppStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(HashSet::new()));
        Self { tx }
    }

    /// Replace the whole set atomically and notify subscribers
    pub fn replace(&self, apps: HashSet<AppId>) {
        debug!("🔔 Protected apps updated ({} entries)", apps.len());
        // send_replace stores the value even with no receivers attached
        self.tx.send_replace(Arc::new(apps));
    }

    /// Current snapshot. The returned `Arc` stays valid across later updates.
    pub fn current(&self) -> Arc<HashSet<AppId>> {
        self.tx.borrow().clone()
    }

    /// Subscribe to update notifications
    pub fn subscribe(&self) -> watch::Receiver<Arc<HashSet<AppId>>> {
        self.tx.subscribe()
    }
}

impl Default for ProtectedAppStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_of(apps: &[&str]) -> HashSet<AppId> {
        apps.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_replace_is_wholesale() {
        let store = ProtectedAppStore::new();
        store.replace(set_of(&["com.bank.app", "com.chat.app"]));

        let before = store.current();
        store.replace(set_of(&["com.other.app"]));

        // Old snapshot is unchanged; new snapshot is the full replacement
        assert!(before.contains("com.bank.app"));
        let after = store.current();
        assert_eq!(after.len(), 1);
        assert!(after.contains("com.other.app"));
    }

    #[tokio::test]
    async fn test_subscribers_are_notified() {
        let store = ProtectedAppStore::new();
        let mut rx = store.subscribe();

        store.replace(set_of(&["com.bank.app"]));

        rx.changed().await.unwrap();
        assert!(rx.borrow().contains("com.bank.app"));
    }
}
