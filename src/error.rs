//! Crate-wide error type.
//!
//! A single `thiserror`-derived enum with string-payload variants per
//! failure domain, small constructor helpers so call sites stay terse, and
//! an [`ShieldError::exit_code`] mapping for the binary. `Result<T>` is the
//! crate-local alias used throughout.

use thiserror::Error;

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, ShieldError>;

/// All failures the engine can surface.
#[derive(Debug, Error)]
pub enum ShieldError {
    /// Configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A candidate URL or other input could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// A speed-test probe failed.
    #[error("probe error: {0}")]
    Probe(String),

    /// Fetching a domain list from a source failed.
    #[error("source fetch error: {0}")]
    SourceFetch(String),

    /// Persisting or loading the domain list failed.
    #[error("store error: {0}")]
    Store(String),

    /// The local proxy bridge failed to bootstrap.
    #[error("bridge bootstrap failed at {op} (code {code})")]
    Bootstrap { op: String, code: i32 },

    /// No package/identity was available for the probe request.
    #[error("missing identity: no package name configured")]
    MissingIdentity,

    /// Every candidate was probed and none succeeded.
    #[error("all candidates exhausted")]
    AllCandidatesExhausted,
}

impl ShieldError {
    /// Build a [`ShieldError::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        ShieldError::Config(msg.into())
    }

    /// Build a [`ShieldError::Parse`].
    pub fn parse(msg: impl Into<String>) -> Self {
        ShieldError::Parse(msg.into())
    }

    /// Build a [`ShieldError::Probe`].
    pub fn probe(msg: impl Into<String>) -> Self {
        ShieldError::Probe(msg.into())
    }

    /// Build a [`ShieldError::SourceFetch`].
    pub fn source_fetch(msg: impl Into<String>) -> Self {
        ShieldError::SourceFetch(msg.into())
    }

    /// Build a [`ShieldError::Store`].
    pub fn store(msg: impl Into<String>) -> Self {
        ShieldError::Store(msg.into())
    }

    /// Build a [`ShieldError::Bootstrap`].
    pub fn bootstrap(op: impl Into<String>, code: i32) -> Self {
        ShieldError::Bootstrap {
            op: op.into(),
            code,
        }
    }

    /// Process exit code for the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShieldError::Config(_) => 2,
            ShieldError::Parse(_) => 2,
            ShieldError::MissingIdentity => 2,
            ShieldError::Probe(_) => 3,
            ShieldError::SourceFetch(_) => 3,
            ShieldError::Store(_) => 4,
            ShieldError::Bootstrap { .. } => 5,
            ShieldError::AllCandidatesExhausted => 6,
        }
    }
}
