//! Public facade of the endpoint-discovery engine
//!
//! A [`Shield`] is explicitly constructed with its collaborators (proxy
//! bridge, domain store) injected; there are no process-wide singletons.
//! `start` walks the bootstrap states through the blocking bridge calls,
//! `start_speed_test` opens a race generation, and the accessors expose
//! the values the application reads between races. No method raises a
//! race failure to the caller; every failure resolves into an observable
//! status value.

use crate::bridge::ProxyBridge;
use crate::config::ShieldConfig;
use crate::error::Result;
use crate::probe::SpeedProbe;
use crate::race::{EndpointSlots, RaceCoordinator};
use crate::sources::{DomainSource, SelfEndpointSource, SiteQuerySource, StaticListSource};
use crate::status::{ObserverId, ShieldStatus, StatusCell, StatusObserver};
use crate::store::DomainStore;
use crate::types::Candidate;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use url::Url;
use uuid::Uuid;

/// Endpoint-discovery and racing engine
pub struct Shield {
    config: ShieldConfig,
    bridge: Arc<dyn ProxyBridge>,
    store: Arc<dyn DomainStore>,
    probe: Arc<SpeedProbe>,
    status: Arc<StatusCell>,
    slots: Arc<EndpointSlots>,
    coordinator: Arc<RaceCoordinator>,
    static_source: Arc<StaticListSource>,
    site_source: Arc<SiteQuerySource>,
    local_service_url: Mutex<Option<Candidate>>,
}

impl Shield {
    /// Build a shield from a validated configuration and its collaborators
    pub fn new(
        config: ShieldConfig,
        bridge: Arc<dyn ProxyBridge>,
        store: Arc<dyn DomainStore>,
    ) -> Result<Self> {
        config.validate()?;

        let probe = Arc::new(SpeedProbe::new(&config)?);
        let status = Arc::new(StatusCell::new());
        let slots = Arc::new(EndpointSlots::new());
        let coordinator = RaceCoordinator::new(
            Arc::clone(&probe),
            Arc::clone(&store),
            Arc::clone(&status),
            Arc::clone(&slots),
        );
        let static_source = Arc::new(StaticListSource::new(&config)?);
        let site_source = Arc::new(SiteQuerySource::new(&config)?);

        Ok(Self {
            config,
            bridge,
            store,
            probe,
            status,
            slots,
            coordinator,
            static_source,
            site_source,
            local_service_url: Mutex::new(None),
        })
    }

    /// Bootstrap the local proxy: init the bridge, start the local server,
    /// derive the local base URL from its host/port.
    ///
    /// Failures are not fatal; they surface as `InitializeFailure` /
    /// `LocalServiceFailure` and the caller decides whether to retry. An
    /// init failure still proceeds to the server-start stage.
    pub async fn start(&self) {
        self.status.transition(ShieldStatus::Initializing);

        let bridge = Arc::clone(&self.bridge);
        let app_key = self.config.app_key.clone();
        let init_code = tokio::task::spawn_blocking(move || bridge.init(&app_key))
            .await
            .unwrap_or(-1);
        if init_code == 0 {
            self.status.transition(ShieldStatus::Initialized);
        } else {
            tracing::warn!(code = init_code, "proxy bridge init failed");
            self.status.transition(ShieldStatus::InitializeFailure);
        }

        self.status.transition(ShieldStatus::StartLocalService);

        let bridge = Arc::clone(&self.bridge);
        let site_code = self.config.site_code.clone();
        let started = tokio::task::spawn_blocking(move || bridge.start_local_server(&site_code))
            .await
            .unwrap_or_else(|_| Err(crate::error::ShieldError::bootstrap("start_local_server", -1)));

        match started.and_then(|endpoint| endpoint.base_url()) {
            Ok(base) => {
                tracing::info!(url = %base, "local proxy service started");
                *self
                    .local_service_url
                    .lock()
                    .expect("local url lock poisoned") = Some(base);
                self.status.transition(ShieldStatus::LocalServiceStarted);
            }
            Err(e) => {
                tracing::warn!(error = %e, "local proxy service failed to start");
                self.status.transition(ShieldStatus::LocalServiceFailure);
            }
        }
    }

    /// Open a new race generation and return its token
    ///
    /// The persisted domain list (or the configured default list when the
    /// store is empty, absent or unreadable) seeds an immediate probe
    /// pass; the three asynchronous sources are then raced concurrently.
    /// Must be called from within a tokio runtime.
    pub fn start_speed_test(&self) -> Uuid {
        self.status.transition(ShieldStatus::StartDomainSpeedTest);

        let seed = match self.store.load() {
            Ok(Some(list)) if !list.is_empty() => list,
            Ok(_) => self.config.default_candidates(),
            Err(e) => {
                tracing::warn!(error = %e, "domain store unreadable, using default list");
                self.config.default_candidates()
            }
        };

        let sources: Vec<Arc<dyn DomainSource>> = vec![
            Arc::clone(&self.static_source) as Arc<dyn DomainSource>,
            Arc::clone(&self.site_source) as Arc<dyn DomainSource>,
            Arc::new(SelfEndpointSource::new(
                Arc::clone(&self.probe),
                self.local_service_candidate(),
            )),
        ];
        debug_assert_eq!(sources.len(), crate::defaults::REMOTE_SOURCE_COUNT);

        self.coordinator.start_race(seed, sources)
    }

    /// Current lifecycle position
    pub fn current_status(&self) -> ShieldStatus {
        self.status.current()
    }

    /// Base URL of the winning candidate, with an optional path appended
    pub fn active_base_url(&self, path: Option<&str>) -> Option<Url> {
        let active = self.slots.active()?;
        match path {
            Some(p) => active.join_path(p).ok(),
            None => Some(active.to_url()),
        }
    }

    /// Base URL of the local proxy service, when it started
    pub fn local_service_url(&self) -> Option<Url> {
        self.local_service_candidate().map(|c| c.to_url())
    }

    fn local_service_candidate(&self) -> Option<Candidate> {
        self.local_service_url
            .lock()
            .expect("local url lock poisoned")
            .clone()
    }

    /// Whether the latest winner was served by the primary line
    pub fn is_primary_line(&self) -> bool {
        self.slots.is_primary_line()
    }

    /// Last endpoint known to answer a speed test, winner or not
    pub fn last_successful_domain(&self) -> Option<Url> {
        self.slots.last_success().map(|c| c.to_url())
    }

    /// Register a status observer; revoke it with [`Shield::remove_observer`]
    pub fn register_observer(&self, observer: Arc<dyn StatusObserver>) -> ObserverId {
        self.status.register_observer(observer)
    }

    /// Remove a previously registered observer
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.status.remove_observer(id)
    }

    /// Subscribe to status changes as a watch stream
    pub fn subscribe_status(&self) -> watch::Receiver<ShieldStatus> {
        self.status.subscribe()
    }

    /// Restart every local proxy server
    pub fn restart_local_proxy(&self) {
        self.bridge.restart_all();
    }

    /// Wait until the current race generation reaches a terminal state
    pub async fn wait_for_terminal(&self) -> ShieldStatus {
        let mut rx = self.status.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            if current.is_terminal() {
                return current;
            }
            if rx.changed().await.is_err() {
                return self.status.current();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{ProxyEndpoint, StaticBridge};
    use crate::store::MemoryDomainStore;
    use crate::types::ShieldError;

    fn test_config() -> ShieldConfig {
        ShieldConfig {
            app_key: "key".to_string(),
            site_code: "site".to_string(),
            package_name: "com.example.app".to_string(),
            speed_test_path: "api/v1/speed".to_string(),
            static_list_url: "https://lists.example.com/d.json".to_string(),
            site_query_url: "https://backup.example.com/api".to_string(),
            default_domains: vec!["http://127.0.0.1:1/".to_string()],
            timeout_seconds: 2,
            site_query_timeout_seconds: 2,
        }
    }

    fn shield_with_bridge(bridge: Arc<dyn ProxyBridge>) -> Shield {
        Shield::new(test_config(), bridge, Arc::new(MemoryDomainStore::new())).unwrap()
    }

    struct FailingInitBridge;

    impl ProxyBridge for FailingInitBridge {
        fn init(&self, _app_key: &str) -> i32 {
            -3
        }
        fn start_local_server(&self, _site_code: &str) -> Result<ProxyEndpoint> {
            Err(ShieldError::bootstrap("start_local_server", -3))
        }
        fn restart_all(&self) {}
    }

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
    fn test_new_rejects_invalid_config() {
        let mut config = test_config();
        config.default_domains.clear();
        let result = Shield::new(
            config,
            Arc::new(StaticBridge::unavailable()),
            Arc::new(MemoryDomainStore::new()),
        );
        assert!(matches!(result, Err(ShieldError::Config(_))));
    }

    #[tokio::test]
    async fn test_bootstrap_happy_path_transitions() {
        let shield = shield_with_bridge(Arc::new(StaticBridge::with_endpoint(
            ProxyEndpoint::new("127.0.0.1", 18080),
        )));
        let observer = RecordingObserver::new();
        shield.register_observer(observer.clone());

        shield.start().await;

        assert_eq!(
            observer.seen(),
            vec![
                ShieldStatus::Initializing,
                ShieldStatus::Initialized,
                ShieldStatus::StartLocalService,
                ShieldStatus::LocalServiceStarted,
            ]
        );
        assert_eq!(
            shield.local_service_url().unwrap().as_str(),
            "http://127.0.0.1:18080/"
        );
    }

    #[tokio::test]
    async fn test_bootstrap_init_failure_still_tries_local_service() {
        let shield = shield_with_bridge(Arc::new(FailingInitBridge));
        let observer = RecordingObserver::new();
        shield.register_observer(observer.clone());

        shield.start().await;

        assert_eq!(
            observer.seen(),
            vec![
                ShieldStatus::Initializing,
                ShieldStatus::InitializeFailure,
                ShieldStatus::StartLocalService,
                ShieldStatus::LocalServiceFailure,
            ]
        );
        assert!(shield.local_service_url().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_server_failure_is_not_fatal() {
        let shield = shield_with_bridge(Arc::new(StaticBridge::unavailable()));
        shield.start().await;
        assert_eq!(shield.current_status(), ShieldStatus::LocalServiceFailure);
        // A speed test may still be requested afterwards
        shield.start_speed_test();
        assert_ne!(shield.current_status(), ShieldStatus::Idle);
    }

    #[tokio::test]
    async fn test_accessors_reflect_slots() {
        let shield = shield_with_bridge(Arc::new(StaticBridge::unavailable()));
        assert!(shield.active_base_url(None).is_none());
        assert!(shield.last_successful_domain().is_none());
        assert!(!shield.is_primary_line());

        let winner = Candidate::parse("https://fast.example.com").unwrap();
        shield.slots.set_active(winner.clone());
        shield.slots.set_last_success(winner);
        shield.slots.set_primary(true);

        assert_eq!(
            shield.active_base_url(None).unwrap().as_str(),
            "https://fast.example.com/"
        );
        assert_eq!(
            shield
                .active_base_url(Some("api/v2/config"))
                .unwrap()
                .as_str(),
            "https://fast.example.com/api/v2/config"
        );
        assert!(shield.is_primary_line());
        assert!(shield.last_successful_domain().is_some());
    }

    #[tokio::test]
    async fn test_speed_test_seeds_default_list_when_store_empty() {
        let shield = shield_with_bridge(Arc::new(StaticBridge::unavailable()));
        shield.start_speed_test();

        let tracked = shield.coordinator.tracked_candidates();
        assert!(tracked
            .iter()
            .any(|c| c.url().port() == Some(1)));
    }

    #[tokio::test]
    async fn test_speed_test_prefers_cached_list() {
        let cached = Candidate::parse("http://127.0.0.1:2/").unwrap();
        let store = Arc::new(MemoryDomainStore::with_domains(vec![cached.clone()]));
        let shield = Shield::new(
            test_config(),
            Arc::new(StaticBridge::unavailable()),
            store,
        )
        .unwrap();

        shield.start_speed_test();

        let tracked = shield.coordinator.tracked_candidates();
        assert!(tracked.contains(&cached));
        // The default list stays out when the cache has entries
        assert!(!tracked.iter().any(|c| c.url().port() == Some(1)));
    }
}
