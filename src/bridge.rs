//! Local proxy bridge boundary
//!
//! The proxy itself is an external collaborator; the engine only needs the
//! blocking init/start calls and their integer status codes. Both calls
//! are made from the state machine via `spawn_blocking`, so implementations
//! may block freely.

use crate::error::{Result, ShieldError};
use crate::types::Candidate;

/// Address reported by the local proxy server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub ip: String,
    pub port: u16,
}

impl ProxyEndpoint {
    pub fn new<S: Into<String>>(ip: S, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Derive the local base URL (`http://{ip}:{port}`) as a candidate
    pub fn base_url(&self) -> Result<Candidate> {
        Candidate::parse(&format!("http://{}:{}", self.ip, self.port))
    }
}

/// Synchronous boundary to the out-of-process local proxy
///
/// Return codes follow the native convention: `0` means success, anything
/// else is an implementation-defined failure code surfaced to the state
/// machine as a bootstrap failure.
pub trait ProxyBridge: Send + Sync {
    /// Initialize the proxy runtime with the application key. Returns 0 on
    /// success.
    fn init(&self, app_key: &str) -> i32;

    /// Start the local proxy server for the given site code and report the
    /// address it bound.
    fn start_local_server(&self, site_code: &str) -> Result<ProxyEndpoint>;

    /// Restart every local proxy server
    fn restart_all(&self);
}

/// Bridge stand-in that reports a pre-configured endpoint
///
/// Used by the CLI when the proxy daemon is managed elsewhere, and by
/// tests that need a deterministic bootstrap.
#[derive(Debug, Clone)]
pub struct StaticBridge {
    endpoint: Option<ProxyEndpoint>,
}

impl StaticBridge {
    /// A bridge whose server start always succeeds with `endpoint`
    pub fn with_endpoint(endpoint: ProxyEndpoint) -> Self {
        Self {
            endpoint: Some(endpoint),
        }
    }

    /// A bridge whose server start always fails
    pub fn unavailable() -> Self {
        Self { endpoint: None }
    }
}

impl ProxyBridge for StaticBridge {
    fn init(&self, _app_key: &str) -> i32 {
        0
    }

    fn start_local_server(&self, _site_code: &str) -> Result<ProxyEndpoint> {
        self.endpoint
            .clone()
            .ok_or(ShieldError::bootstrap("start_local_server", -1))
    }

    fn restart_all(&self) {}
}
