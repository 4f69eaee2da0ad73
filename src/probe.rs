//! Speed-test probe: one timed HTTP round-trip per candidate
//!
//! A probe is the unit of work the race coordinator fans out. The success
//! rule is strict: transport success, a non-empty body, a decodable
//! payload and an embedded application status of 200. Every other outcome
//! collapses into a single probe failure; callers never need finer
//! classification.

use crate::config::ShieldConfig;
use crate::error::{Result, ShieldError};
use crate::types::{ApiLine, Candidate};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

/// Application-level status code that marks a usable endpoint
pub const OK_CODE: i64 = 200;

/// Speed-test response payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedTestResponse {
    /// Application status code; 200 means the endpoint is serving
    pub code: i64,
    pub data: SpeedTestData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedTestData {
    #[serde(rename = "siteConfig")]
    pub site_config: SiteConfig,
}

/// Per-site configuration embedded in a successful speed-test response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Mirror URLs the winning endpoint advertises
    #[serde(rename = "appDomains", default)]
    pub app_domains: Vec<String>,

    /// Which backend line served this response
    #[serde(rename = "apiLine", default)]
    pub api_line: ApiLine,
}

impl SpeedTestResponse {
    /// Parse the advertised mirror list, dropping malformed entries
    pub fn candidate_domains(&self) -> Vec<Candidate> {
        Candidate::parse_list(&self.data.site_config.app_domains)
    }

    /// Whether the primary shield line served this response
    pub fn is_primary_line(&self) -> bool {
        self.data.site_config.api_line.is_primary()
    }
}

/// Issues timed speed-test requests against candidates
pub struct SpeedProbe {
    client: Client,
    speed_test_path: String,
    package_name: String,
    default_timeout: Duration,
}

impl SpeedProbe {
    /// Create a probe from the engine configuration
    pub fn new(config: &ShieldConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("cloud-shield/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ShieldError::probe(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            speed_test_path: config.speed_test_path.clone(),
            package_name: config.package_name.clone(),
            default_timeout: config.timeout(),
        })
    }

    /// Build the full speed-test URL for a candidate
    ///
    /// Fails fast with [`ShieldError::MissingIdentity`] when no package
    /// name is configured; the backend rejects anonymous probes anyway.
    pub fn speed_test_url(&self, candidate: &Candidate) -> Result<Url> {
        if self.package_name.is_empty() {
            return Err(ShieldError::MissingIdentity);
        }

        let mut url = candidate.join_path(&self.speed_test_path)?;
        url.query_pairs_mut()
            .append_pair("pkg_name", &self.package_name);
        Ok(url)
    }

    /// Probe a candidate with the default timeout
    pub async fn probe(&self, candidate: &Candidate) -> Result<SpeedTestResponse> {
        self.probe_with_timeout(candidate, self.default_timeout).await
    }

    /// Probe a candidate with a caller-supplied timeout bound
    pub async fn probe_with_timeout(
        &self,
        candidate: &Candidate,
        bound: Duration,
    ) -> Result<SpeedTestResponse> {
        let url = self.speed_test_url(candidate)?;

        let response = timeout(bound, self.client.get(url).send())
            .await
            .map_err(|_| ShieldError::probe(format!("{}: request timed out", candidate)))?
            .map_err(|e| ShieldError::probe(format!("{}: {}", candidate, e)))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| ShieldError::probe(format!("{}: failed to read body: {}", candidate, e)))?;

        if body.is_empty() {
            return Err(ShieldError::probe(format!("{}: empty response body", candidate)));
        }

        let payload: SpeedTestResponse = serde_json::from_slice(&body)
            .map_err(|e| ShieldError::probe(format!("{}: undecodable payload: {}", candidate, e)))?;

        if payload.code != OK_CODE {
            return Err(ShieldError::probe(format!(
                "{}: endpoint answered with code {}",
                candidate, payload.code
            )));
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_config(package_name: &str) -> ShieldConfig {
        ShieldConfig {
            app_key: "k".to_string(),
            site_code: "s".to_string(),
            package_name: package_name.to_string(),
            speed_test_path: "api/v1/speed".to_string(),
            static_list_url: "https://lists.example.com/d.json".to_string(),
            site_query_url: "https://backup.example.com/api".to_string(),
            default_domains: vec!["https://d.example.com".to_string()],
            timeout_seconds: 10,
            site_query_timeout_seconds: 10,
        }
    }

    #[test]
    fn test_speed_test_url_shape() {
        let probe = SpeedProbe::new(&probe_config("com.example.app")).unwrap();
        let candidate = Candidate::parse("https://mirror.example.com").unwrap();
        let url = probe.speed_test_url(&candidate).unwrap();
        assert_eq!(
            url.as_str(),
            "https://mirror.example.com/api/v1/speed?pkg_name=com.example.app"
        );
    }

    #[test]
    fn test_missing_identity_fails_fast() {
        let probe = SpeedProbe::new(&probe_config("")).unwrap();
        let candidate = Candidate::parse("https://mirror.example.com").unwrap();
        let err = probe.speed_test_url(&candidate).unwrap_err();
        assert!(matches!(err, ShieldError::MissingIdentity));
    }

    #[test]
    fn test_response_decoding() {
        let json = r#"{
            "code": 200,
            "data": {
                "siteConfig": {
                    "appDomains": ["https://a.example.com", "bogus"],
                    "apiLine": 1
                }
            }
        }"#;
        let payload: SpeedTestResponse = serde_json::from_str(json).unwrap();
        assert_eq!(payload.code, 200);
        assert!(payload.is_primary_line());
        // Malformed entries drop out instead of failing the decode
        assert_eq!(payload.candidate_domains().len(), 1);
    }

    #[test]
    fn test_response_tolerates_missing_optional_fields() {
        let json = r#"{"code": 200, "data": {"siteConfig": {}}}"#;
        let payload: SpeedTestResponse = serde_json::from_str(json).unwrap();
        assert!(payload.candidate_domains().is_empty());
        assert!(!payload.is_primary_line());
    }

    #[tokio::test]
    async fn test_probe_rejects_non_ok_code() {
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/speed"))
            .and(query_param("pkg_name", "com.example.app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 503,
                "data": {"siteConfig": {"appDomains": [], "apiLine": 0}}
            })))
            .mount(&server)
            .await;

        let probe = SpeedProbe::new(&probe_config("com.example.app")).unwrap();
        let candidate = Candidate::parse(&server.uri()).unwrap();
        let err = probe.probe(&candidate).await.unwrap_err();
        assert!(matches!(err, ShieldError::Probe(_)));
    }

    #[tokio::test]
    async fn test_probe_success_roundtrip() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/speed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "data": {"siteConfig": {"appDomains": ["https://m1.example.com"], "apiLine": 0}}
            })))
            .mount(&server)
            .await;

        let probe = SpeedProbe::new(&probe_config("com.example.app")).unwrap();
        let candidate = Candidate::parse(&server.uri()).unwrap();
        let payload = probe.probe(&candidate).await.unwrap();
        assert_eq!(payload.candidate_domains().len(), 1);
        assert!(!payload.is_primary_line());
    }

    #[tokio::test]
    async fn test_probe_empty_body_is_failure() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/speed"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let probe = SpeedProbe::new(&probe_config("com.example.app")).unwrap();
        let candidate = Candidate::parse(&server.uri()).unwrap();
        assert!(probe.probe(&candidate).await.is_err());
    }
}
