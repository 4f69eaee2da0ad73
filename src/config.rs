//! Configuration data model and validation

use crate::types::{Candidate, Result, ShieldError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration
///
/// Everything the shield needs to bootstrap the local proxy and run a
/// domain race: credentials for the bridge, the speed-test contract, the
/// two remote list providers and the statically configured fallback
/// domain list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShieldConfig {
    /// Application key handed to the local proxy bridge at init
    pub app_key: String,

    /// Deployment/site code used by the bridge and the site-query provider
    pub site_code: String,

    /// Package/bundle identifier attached to every speed-test request
    pub package_name: String,

    /// Path appended to a candidate to form the speed-test URL
    #[serde(default = "default_speed_test_path")]
    pub speed_test_path: String,

    /// Static list provider: GET returns a JSON array of URL strings
    pub static_list_url: String,

    /// Site-query provider: POST `{"site": ..}` returns a JSON array of URL strings
    pub site_query_url: String,

    /// Fallback domain list used when the persisted cache is empty or absent.
    /// Must never be empty.
    pub default_domains: Vec<String>,

    /// Default request timeout for probes and the static list fetch
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,

    /// Stricter timeout applied to the site-query provider
    #[serde(default = "default_site_query_timeout_secs")]
    pub site_query_timeout_seconds: u64,
}

impl ShieldConfig {
    /// Get the default request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Get the site-query timeout as a Duration
    pub fn site_query_timeout(&self) -> Duration {
        Duration::from_secs(self.site_query_timeout_seconds)
    }

    /// Parse the configured fallback list into candidates
    pub fn default_candidates(&self) -> Vec<Candidate> {
        Candidate::parse_list(&self.default_domains)
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        if self.app_key.trim().is_empty() {
            return Err(ShieldError::config("App key cannot be empty"));
        }

        if self.site_code.trim().is_empty() {
            return Err(ShieldError::config("Site code cannot be empty"));
        }

        if self.speed_test_path.trim().is_empty() {
            return Err(ShieldError::config("Speed-test path cannot be empty"));
        }

        for (label, value) in [
            ("static list URL", &self.static_list_url),
            ("site-query URL", &self.site_query_url),
        ] {
            if value.is_empty() {
                return Err(ShieldError::config(format!("{} cannot be empty", label)));
            }
            if let Err(e) = url::Url::parse(value) {
                return Err(ShieldError::config(format!(
                    "Invalid {} '{}': {}",
                    label, value, e
                )));
            }
        }

        // The cache source falls back to this list; it must always exist
        if self.default_domains.is_empty() {
            return Err(ShieldError::config("Default domain list cannot be empty"));
        }
        for domain in &self.default_domains {
            Candidate::parse(domain)
                .map_err(|e| ShieldError::config(format!("Invalid default domain: {}", e)))?;
        }

        if self.timeout_seconds == 0 {
            return Err(ShieldError::config("Timeout must be greater than 0"));
        }
        if self.timeout_seconds > 300 {
            return Err(ShieldError::config("Timeout cannot exceed 300 seconds"));
        }
        if self.site_query_timeout_seconds == 0 {
            return Err(ShieldError::config(
                "Site-query timeout must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(app_key) = std::env::var("SHIELD_APP_KEY") {
            self.app_key = app_key;
        }

        if let Ok(site_code) = std::env::var("SHIELD_SITE_CODE") {
            self.site_code = site_code;
        }

        if let Ok(package_name) = std::env::var("SHIELD_PACKAGE_NAME") {
            self.package_name = package_name;
        }

        if let Ok(domains) = std::env::var("SHIELD_DEFAULT_DOMAINS") {
            self.default_domains = domains
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(timeout) = std::env::var("SHIELD_TIMEOUT_SECONDS") {
            self.timeout_seconds = timeout.parse().map_err(|e| {
                ShieldError::config(format!(
                    "Invalid SHIELD_TIMEOUT_SECONDS value '{}': {}",
                    timeout, e
                ))
            })?;
        }

        Ok(())
    }
}

// Default value functions for serde
fn default_speed_test_path() -> String {
    crate::defaults::DEFAULT_SPEED_TEST_PATH.to_string()
}

fn default_timeout_secs() -> u64 {
    crate::defaults::DEFAULT_TIMEOUT.as_secs()
}

fn default_site_query_timeout_secs() -> u64 {
    crate::defaults::SITE_QUERY_TIMEOUT.as_secs()
}
