//! Independent providers of candidate domain lists
//!
//! Each source resolves exactly once per race generation, successfully or
//! not, and the race tolerates any subset failing. Failures are logged
//! here and reported to the coordinator only as a source-answered event;
//! no typed error crosses the public surface.

use crate::config::ShieldConfig;
use crate::error::{Result, ShieldError};
use crate::probe::{SpeedProbe, SpeedTestResponse};
use crate::types::Candidate;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// A successful speed test of a source's own endpoint
///
/// The self endpoint is itself a candidate: its fetch doubles as a probe,
/// so the payload is handed to the coordinator as a race result and the
/// endpoint is recorded as a standing "last known good" value independent
/// of who finally wins.
#[derive(Debug, Clone)]
pub struct SelfProbe {
    pub endpoint: Candidate,
    pub payload: SpeedTestResponse,
}

/// What one source contributes to the race
#[derive(Debug, Clone, Default)]
pub struct SourceYield {
    /// Candidate domains learned from this source
    pub domains: Vec<Candidate>,

    /// Set only by the self-endpoint source on success
    pub self_probe: Option<SelfProbe>,
}

impl SourceYield {
    pub fn domains(domains: Vec<Candidate>) -> Self {
        Self {
            domains,
            self_probe: None,
        }
    }
}

/// One independent provider of candidate domains
#[async_trait]
pub trait DomainSource: Send + Sync {
    /// Stable name used in logs
    fn name(&self) -> &'static str;

    /// Fetch the domain list. Errors are absorbed by the coordinator.
    async fn fetch(&self) -> Result<SourceYield>;
}

/// Hosted static list: GET returning a JSON array of URL strings
pub struct StaticListSource {
    client: Client,
    url: String,
}

impl StaticListSource {
    pub fn new(config: &ShieldConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ShieldError::source_fetch(format!("client build failed: {}", e)))?;
        Ok(Self {
            client,
            url: config.static_list_url.clone(),
        })
    }
}

#[async_trait]
impl DomainSource for StaticListSource {
    fn name(&self) -> &'static str {
        "static-list"
    }

    async fn fetch(&self) -> Result<SourceYield> {
        let entries: Vec<String> = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ShieldError::source_fetch(format!("{}: {}", self.name(), e)))?
            .json()
            .await
            .map_err(|e| ShieldError::source_fetch(format!("{}: bad payload: {}", self.name(), e)))?;

        Ok(SourceYield::domains(Candidate::parse_list(&entries)))
    }
}

/// Site-query provider: POST `{"site": <code>}`, strict timeout
pub struct SiteQuerySource {
    client: Client,
    url: String,
    site_code: String,
    timeout: Duration,
}

impl SiteQuerySource {
    pub fn new(config: &ShieldConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.site_query_timeout())
            .build()
            .map_err(|e| ShieldError::source_fetch(format!("client build failed: {}", e)))?;
        Ok(Self {
            client,
            url: config.site_query_url.clone(),
            site_code: config.site_code.clone(),
            timeout: config.site_query_timeout(),
        })
    }
}

#[async_trait]
impl DomainSource for SiteQuerySource {
    fn name(&self) -> &'static str {
        "site-query"
    }

    async fn fetch(&self) -> Result<SourceYield> {
        let body = serde_json::json!({ "site": self.site_code });
        let entries: Vec<String> = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ShieldError::source_fetch(format!("{}: {}", self.name(), e)))?
            .json()
            .await
            .map_err(|e| ShieldError::source_fetch(format!("{}: bad payload: {}", self.name(), e)))?;

        Ok(SourceYield::domains(Candidate::parse_list(&entries)))
    }
}

/// The shield's own endpoint raced as a source
///
/// The local service URL can serve traffic directly, so a successful fetch
/// also reports the endpoint itself as a standing last-known-good value
/// even when a faster mirror later wins the race.
pub struct SelfEndpointSource {
    probe: Arc<SpeedProbe>,
    endpoint: Option<Candidate>,
}

impl SelfEndpointSource {
    pub fn new(probe: Arc<SpeedProbe>, endpoint: Option<Candidate>) -> Self {
        Self { probe, endpoint }
    }
}

#[async_trait]
impl DomainSource for SelfEndpointSource {
    fn name(&self) -> &'static str {
        "self-endpoint"
    }

    async fn fetch(&self) -> Result<SourceYield> {
        let endpoint = self
            .endpoint
            .clone()
            .ok_or_else(|| ShieldError::source_fetch("self-endpoint: no local service URL"))?;

        let payload = self.probe.probe(&endpoint).await?;
        Ok(SourceYield {
            domains: payload.candidate_domains(),
            self_probe: Some(SelfProbe { endpoint, payload }),
        })
    }
}
