//! Bubble visibility state machine.
//!
//! Consumes foreground-app changes plus the protected-app set, debounces
//! bursts of window churn, and drives show/hide on the bubble UI
//! collaborator. All UI side effects are dispatched from the controller's
//! single worker task, which stands in for the UI-owning thread.

use crate::config::{GeneralConfig, TimingConfig};
use crate::monitor::AppSwitchMonitor;
use crate::protected::ProtectedAppStore;
use crate::types::{AppId, BubbleState};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// Bubble UI collaborator. Implementations render/remove the overlay;
/// the controller guarantees edge-triggered, single-task invocation.
pub trait BubbleUi: Send + Sync {
    fn show_bubble(&self);
    fn hide_bubble(&self);
}

/// Pure transition function for bubble visibility.
///
/// - Unknown foreground app keeps the prior state.
/// - Our own app keeps the prior state (the user may be interacting with
///   the bubble's own UI).
/// - Otherwise the bubble shows exactly when the protected set is non-empty
///   and contains the current app.
pub fn decide(
    current_app: Option<&str>,
    host_app_id: &str,
    protected: &HashSet<AppId>,
    prior_visible: bool,
) -> bool {
    match current_app {
        None => prior_visible,
        Some(app) if app == host_app_id => prior_visible,
        Some(app) => !protected.is_empty() && protected.contains(app),
    }
}

enum Trigger {
    /// Debounced evaluation request from an app-switch callback
    Evaluate,
    /// Protected set changed: drop the no-op cache so the next evaluation
    /// always runs even if the foreground app did not change
    ForceRefresh,
}

/// Debounced visibility controller
pub struct BubbleVisibilityController {
    tx: mpsc::UnboundedSender<Trigger>,
    state_rx: watch::Receiver<BubbleState>,
    worker: tokio::task::JoinHandle<()>,
}

impl BubbleVisibilityController {
    /// Spawn the controller's worker task. Protected-set updates from
    /// `store` automatically force a refresh.
    pub fn spawn(
        monitor: AppSwitchMonitor,
        store: &ProtectedAppStore,
        ui: Arc<dyn BubbleUi>,
        general: &GeneralConfig,
        timing: &TimingConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(BubbleState::Hidden);

        let worker = tokio::spawn(run_worker(
            rx,
            store.subscribe(),
            monitor,
            ui,
            general.host_app_id.clone(),
            timing.debounce(),
            state_tx,
        ));

        Self {
            tx,
            state_rx,
            worker,
        }
    }

    /// Schedule a debounced evaluation. Every call resets the pending delay,
    /// so only the settled state of a burst gets evaluated.
    pub fn notify_app_changed(&self) {
        let _ = self.tx.send(Trigger::Evaluate);
    }

    /// Bypass the unchanged-state cache and re-evaluate
    pub fn force_refresh(&self) {
        let _ = self.tx.send(Trigger::ForceRefresh);
    }

    /// Current bubble state as last decided by the worker
    pub fn state(&self) -> BubbleState {
        *self.state_rx.borrow()
    }

    /// Stop the worker task
    pub fn shutdown(self) {
        drop(self.tx);
        self.worker.abort();
    }
}

struct EvalCache {
    last_app: Option<AppId>,
    last_protected: Option<Arc<HashSet<AppId>>>,
}

#[allow(clippy::too_many_arguments)]
async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Trigger>,
    mut protected_rx: watch::Receiver<Arc<HashSet<AppId>>>,
    monitor: AppSwitchMonitor,
    ui: Arc<dyn BubbleUi>,
    host_app_id: String,
    debounce: std::time::Duration,
    state_tx: watch::Sender<BubbleState>,
) {
    let mut cache = EvalCache {
        last_app: None,
        last_protected: None,
    };
    let mut visible = false;

    loop {
        // Wait for the first trigger of a burst
        let mut forced = tokio::select! {
            msg = rx.recv() => match msg {
                Some(Trigger::Evaluate) => false,
                Some(Trigger::ForceRefresh) => true,
                None => return,
            },
            changed = protected_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                true
            }
        };

        // Debounce: every further trigger restarts the delay, collapsing
        // rapid window-state churn into one evaluation of the settled state
        loop {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => break,
                msg = rx.recv() => match msg {
                    Some(Trigger::Evaluate) => continue,
                    Some(Trigger::ForceRefresh) => forced = true,
                    None => return,
                },
                changed = protected_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    forced = true;
                }
            }
        }

        if forced {
            cache.last_app = None;
            cache.last_protected = None;
        }

        let current = monitor.last_known();
        let protected = protected_rx.borrow().clone();

        // Skip entirely when neither input changed
        if cache.last_app == current
            && cache
                .last_protected
                .as_ref()
                .is_some_and(|prev| **prev == *protected)
        {
            trace!("⏭️ No change detected, skipping visibility update");
            continue;
        }
        cache.last_app = current.clone();
        cache.last_protected = Some(protected.clone());

        let should_show = decide(current.as_deref(), &host_app_id, &protected, visible);

        if should_show == visible {
            continue;
        }
        visible = should_show;

        if should_show {
            debug!("✅ {:?} in protected list, showing bubble", current);
            ui.show_bubble();
            let _ = state_tx.send(BubbleState::Visible);
        } else {
            debug!("Hiding bubble (current: {:?})", current);
            ui.hide_bubble();
            let _ = state_tx.send(BubbleState::Hidden);
        }
    }
}
