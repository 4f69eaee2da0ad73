//! Lifecycle states and the status cell observed by the application
//!
//! The shield walks a linear lifecycle with failure branches; every state
//! change is pushed synchronously to registered observers before the
//! transition's side effect runs, and mirrored into a `watch` channel for
//! async consumers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Process-wide lifecycle position of the shield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShieldStatus {
    /// Nothing started yet
    Idle,
    /// Local proxy bridge init in progress
    Initializing,
    /// Bridge init succeeded
    Initialized,
    /// Bridge init failed; bootstrap continues regardless
    InitializeFailure,
    /// Local proxy server start in progress
    StartLocalService,
    /// Local proxy server is up, base URL derived from its host/port
    LocalServiceStarted,
    /// Local proxy server failed to start
    LocalServiceFailure,
    /// A race generation has been requested
    StartDomainSpeedTest,
    /// All sources answered, some probes still in flight
    DomainSpeedTesting,
    /// A probe won the race; terminal for this generation
    DomainSpeedTestSuccess,
    /// Every source answered and every probe failed; terminal
    DomainSpeedTestFailure,
}

impl ShieldStatus {
    /// Whether this state ends a race generation
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ShieldStatus::DomainSpeedTestSuccess | ShieldStatus::DomainSpeedTestFailure
        )
    }

    /// Stable display name used in logs and CLI output
    pub fn as_str(&self) -> &'static str {
        match self {
            ShieldStatus::Idle => "idle",
            ShieldStatus::Initializing => "initializing",
            ShieldStatus::Initialized => "initialized",
            ShieldStatus::InitializeFailure => "initialize_failure",
            ShieldStatus::StartLocalService => "start_local_service",
            ShieldStatus::LocalServiceStarted => "local_service_started",
            ShieldStatus::LocalServiceFailure => "local_service_failure",
            ShieldStatus::StartDomainSpeedTest => "start_domain_speed_test",
            ShieldStatus::DomainSpeedTesting => "domain_speed_testing",
            ShieldStatus::DomainSpeedTestSuccess => "domain_speed_test_success",
            ShieldStatus::DomainSpeedTestFailure => "domain_speed_test_failure",
        }
    }
}

impl std::fmt::Display for ShieldStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer of status changes
///
/// Registration hands back an [`ObserverId`] the caller revokes with
/// [`StatusCell::remove_observer`]; there is no weak-reference liveness
/// detection.
pub trait StatusObserver: Send + Sync {
    fn status_changed(&self, status: ShieldStatus);
}

/// Token identifying a registered observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Single-writer holder of the current [`ShieldStatus`]
///
/// All transitions funnel through [`StatusCell::transition`]; observers are
/// invoked synchronously on the transitioning task, so they must stay
/// cheap and must not call back into the shield.
pub struct StatusCell {
    current: Mutex<ShieldStatus>,
    observers: Mutex<HashMap<ObserverId, Arc<dyn StatusObserver>>>,
    next_observer_id: AtomicU64,
    watch_tx: watch::Sender<ShieldStatus>,
}

impl StatusCell {
    pub fn new() -> Self {
        let (watch_tx, _) = watch::channel(ShieldStatus::Idle);
        Self {
            current: Mutex::new(ShieldStatus::Idle),
            observers: Mutex::new(HashMap::new()),
            next_observer_id: AtomicU64::new(1),
            watch_tx,
        }
    }

    /// Current status
    pub fn current(&self) -> ShieldStatus {
        *self.current.lock().expect("status lock poisoned")
    }

    /// Move to `next`, notifying observers. Returns `false` when the cell
    /// already holds `next`; a no-change set is not a transition and does
    /// not re-notify.
    pub fn transition(&self, next: ShieldStatus) -> bool {
        {
            let mut current = self.current.lock().expect("status lock poisoned");
            if *current == next {
                return false;
            }
            tracing::debug!(from = %current, to = %next, "status transition");
            *current = next;
        }

        // Notify outside the status lock: observers may read `current()`.
        let _ = self.watch_tx.send(next);
        let observers: Vec<Arc<dyn StatusObserver>> = {
            let map = self.observers.lock().expect("observer lock poisoned");
            map.values().cloned().collect()
        };
        for observer in observers {
            observer.status_changed(next);
        }
        true
    }

    /// Register an observer; the id revokes it later
    pub fn register_observer(&self, observer: Arc<dyn StatusObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .expect("observer lock poisoned")
            .insert(id, observer);
        id
    }

    /// Remove a previously registered observer
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers
            .lock()
            .expect("observer lock poisoned")
            .remove(&id)
            .is_some()
    }

    /// Subscribe to status changes as a watch stream
    pub fn subscribe(&self) -> watch::Receiver<ShieldStatus> {
        self.watch_tx.subscribe()
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingObserver {
        seen: Mutex<Vec<ShieldStatus>>,
    }

    impl RecordingObserver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<ShieldStatus> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl StatusObserver for RecordingObserver {
        fn status_changed(&self, status: ShieldStatus) {
            self.seen.lock().unwrap().push(status);
        }
    }

    #[test]
    fn test_initial_state_is_idle() {
        let cell = StatusCell::new();
        assert_eq!(cell.current(), ShieldStatus::Idle);
    }

    #[test]
    fn test_transition_notifies_observer_in_order() {
        let cell = StatusCell::new();
        let observer = RecordingObserver::new();
        cell.register_observer(observer.clone());

        cell.transition(ShieldStatus::Initializing);
        cell.transition(ShieldStatus::Initialized);
        cell.transition(ShieldStatus::StartLocalService);

        assert_eq!(
            observer.seen(),
            vec![
                ShieldStatus::Initializing,
                ShieldStatus::Initialized,
                ShieldStatus::StartLocalService,
            ]
        );
        assert_eq!(cell.current(), ShieldStatus::StartLocalService);
    }

    #[test]
    fn test_no_change_set_is_not_a_transition() {
        let cell = StatusCell::new();
        let observer = RecordingObserver::new();
        cell.register_observer(observer.clone());

        assert!(cell.transition(ShieldStatus::DomainSpeedTesting));
        assert!(!cell.transition(ShieldStatus::DomainSpeedTesting));
        assert_eq!(observer.seen().len(), 1);
    }

    #[test]
    fn test_removed_observer_is_silent() {
        let cell = StatusCell::new();
        let observer = RecordingObserver::new();
        let id = cell.register_observer(observer.clone());

        cell.transition(ShieldStatus::Initializing);
        assert!(cell.remove_observer(id));
        assert!(!cell.remove_observer(id));
        cell.transition(ShieldStatus::Initialized);

        assert_eq!(observer.seen(), vec![ShieldStatus::Initializing]);
    }

    #[tokio::test]
    async fn test_watch_subscription_sees_latest() {
        let cell = StatusCell::new();
        let mut rx = cell.subscribe();

        cell.transition(ShieldStatus::StartDomainSpeedTest);
        cell.transition(ShieldStatus::DomainSpeedTestSuccess);

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ShieldStatus::DomainSpeedTestSuccess);
    }

    #[test]
    fn test_terminal_classification() {
        assert!(ShieldStatus::DomainSpeedTestSuccess.is_terminal());
        assert!(ShieldStatus::DomainSpeedTestFailure.is_terminal());
        assert!(!ShieldStatus::DomainSpeedTesting.is_terminal());
        assert!(!ShieldStatus::Idle.is_terminal());
    }
}
