//! Cloud Shield
//!
//! An endpoint-discovery and racing engine: given several independent
//! sources of candidate domains (a persisted cache, two remote list
//! providers and the shield's own local service endpoint), it finds the
//! fastest reachable endpoint within a bounded time, switches the active
//! base URL to it and remembers the winning domain list for the next
//! launch. Progress is observable through a discrete status lifecycle.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod error;
pub mod probe;
pub mod race;
pub mod shield;
pub mod sources;
pub mod status;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use bridge::{ProxyBridge, ProxyEndpoint, StaticBridge};
pub use config::ShieldConfig;
pub use error::{Result, ShieldError};
pub use probe::{SpeedProbe, SpeedTestResponse};
pub use race::RaceCoordinator;
pub use shield::Shield;
pub use status::{ObserverId, ShieldStatus, StatusObserver};
pub use store::{DomainStore, FileDomainStore, MemoryDomainStore};
pub use types::{ApiLine, Candidate, ProbeOutcome};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Path appended to a candidate to form the speed-test URL
    pub const DEFAULT_SPEED_TEST_PATH: &str = "api/v1/speed";

    /// Default request timeout for probes and the static list fetch
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Stricter bound applied to the site-query provider
    pub const SITE_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

    /// Number of asynchronous domain-list sources raced per generation
    pub const REMOTE_SOURCE_COUNT: usize = 3;
}
