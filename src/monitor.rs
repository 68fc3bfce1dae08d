//! Foreground app-switch monitoring.
//!
//! Converts raw window-state-change notifications into a de-duplicated
//! stream of "current foreground app" values. The primary path is
//! event-driven; a periodic fallback query covers the case where the event
//! source goes quiet (or was never available).

use crate::config::{MonitorConfig, TimingConfig};
use crate::types::{AppId, ForegroundAppEvent, MonitorError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;
use tracing::{debug, trace, warn};

/// OS query for the currently running top task.
///
/// The platform layer implements this; the engine only depends on the
/// query contract. Failures are recovered locally (last-known value wins).
pub trait ForegroundQuery: Send + Sync {
    fn current_foreground(&self) -> Result<Option<AppId>, MonitorError>;
}

type EventCallback = Arc<dyn Fn(&ForegroundAppEvent) + Send + Sync>;

struct MonitorState {
    /// Last known foreground app
    current: Option<AppId>,
    /// When the last primary-path event arrived
    last_primary_at: Option<Instant>,
    subscribers: HashMap<u64, EventCallback>,
    next_subscriber_id: u64,
}

struct MonitorInner {
    state: Mutex<MonitorState>,
    /// Packages that are never real foreground apps
    system_patterns: Vec<glob::Pattern>,
}

/// De-duplicating foreground-app monitor
#[derive(Clone)]
pub struct AppSwitchMonitor {
    inner: Arc<MonitorInner>,
}

impl AppSwitchMonitor {
    pub fn new(config: &MonitorConfig) -> Self {
        let system_patterns = config
            .system_packages
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Invalid system package pattern '{}': {}", p, e);
                    None
                }
            })
            .collect();

        Self {
            inner: Arc::new(MonitorInner {
                state: Mutex::new(MonitorState {
                    current: None,
                    last_primary_at: None,
                    subscribers: HashMap::new(),
                    next_subscriber_id: 0,
                }),
                system_patterns,
            }),
        }
    }

    /// Register an observer. The callback runs synchronously on the thread
    /// that delivered the change. Dropping the returned handle unsubscribes.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ForegroundAppEvent) + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock().unwrap();
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        state.subscribers.insert(id, Arc::new(callback));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Last known foreground app id
    pub fn last_known(&self) -> Option<AppId> {
        self.inner.state.lock().unwrap().current.clone()
    }

    /// Primary path: the OS delivered a window-state change for `app_id`
    pub fn handle_window_event(&self, app_id: &str) {
        self.report(app_id, true);
    }

    fn is_system_surface(&self, app_id: &str) -> bool {
        self.inner
            .system_patterns
            .iter()
            .any(|p| p.matches(app_id))
    }

    /// Shared de-duplication for both the primary and fallback paths
    fn report(&self, app_id: &str, primary: bool) {
        if app_id.is_empty() {
            return;
        }

        if self.is_system_surface(app_id) {
            trace!("Ignoring system surface: {}", app_id);
            return;
        }

        let (event, callbacks) = {
            let mut state = self.inner.state.lock().unwrap();
            if primary {
                state.last_primary_at = Some(Instant::now());
            }

            // Re-delivery of the same app is a no-op
            if state.current.as_deref() == Some(app_id) {
                return;
            }

            debug!("🔄 App switched to: {}", app_id);
            state.current = Some(app_id.to_string());

            let event = ForegroundAppEvent::now(app_id);
            let callbacks: Vec<EventCallback> = state.subscribers.values().cloned().collect();
            (event, callbacks)
        };

        // Invoke outside the lock so observers may query the monitor
        for callback in callbacks {
            callback(&event);
        }
    }

    /// Whether the fallback check should actually query the OS: either the
    /// primary path is absent entirely, or it has gone quiet for too long.
    fn fallback_due(&self, timing: &TimingConfig, primary_available: bool) -> bool {
        if !primary_available {
            return true;
        }
        let state = self.inner.state.lock().unwrap();
        match state.last_primary_at {
            Some(at) => at.elapsed() > timing.primary_timeout(),
            None => true,
        }
    }

    /// One fallback poll. Query failures keep the previous known value.
    pub fn poll_fallback_once(&self, query: &dyn ForegroundQuery) {
        match query.current_foreground() {
            Ok(Some(app_id)) => self.report(&app_id, false),
            Ok(None) => trace!("Fallback query returned no foreground app"),
            Err(e) => warn!("Fallback foreground query failed: {}", e),
        }
    }

    /// Spawn the periodic fallback loop.
    ///
    /// With a healthy primary path the loop runs at the long
    /// `fallback_interval` and only queries when no primary event arrived
    /// within `primary_timeout`. In sole-source mode (`primary_available =
    /// false`) it polls unconditionally at the shorter
    /// `sole_source_interval`.
    pub fn spawn_fallback(
        &self,
        query: Arc<dyn ForegroundQuery>,
        timing: TimingConfig,
        primary_available: bool,
    ) -> tokio::task::JoinHandle<()> {
        let monitor = self.clone();
        let period = if primary_available {
            timing.fallback_interval()
        } else {
            timing.sole_source_interval()
        };

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of tokio's interval fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if monitor.fallback_due(&timing, primary_available) {
                    debug!("⚠️ Primary path quiet, running fallback foreground check");
                    monitor.poll_fallback_once(query.as_ref());
                }
            }
        })
    }
}

/// Handle for a registered observer; unsubscribes when dropped
pub struct Subscription {
    id: u64,
    inner: Weak<MonitorInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }

    fn remove(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.state.lock().unwrap().subscribers.remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}
