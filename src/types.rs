//! Type definitions and aliases

use serde::{Deserialize, Serialize};
use url::Url;

// Re-export commonly used types
pub use crate::error::{Result, ShieldError};

/// One network location considered as a possible fast path to the service.
///
/// Identity is the normalized URL: `http`/`https` scheme, a host, an
/// optional port, fragment stripped. Two candidates contributed by
/// different sources compare equal when they normalize to the same URL,
/// which is what the race's de-duplication keys on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate(Url);

impl Candidate {
    /// Parse and normalize a candidate URL
    pub fn parse(input: &str) -> Result<Self> {
        let mut url = Url::parse(input)
            .map_err(|e| ShieldError::parse(format!("Invalid candidate URL '{}': {}", input, e)))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(ShieldError::parse(format!(
                    "Unsupported candidate scheme '{}' in '{}'",
                    scheme, input
                )))
            }
        }

        if url.host_str().is_none() {
            return Err(ShieldError::parse(format!(
                "Candidate URL '{}' must have a host",
                input
            )));
        }

        url.set_fragment(None);
        Ok(Self(url))
    }

    /// Build a candidate from an already-parsed URL
    pub fn from_url(mut url: Url) -> Result<Self> {
        url.set_fragment(None);
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ShieldError::parse(format!(
                "URL '{}' is not a usable candidate",
                url
            )));
        }
        Ok(Self(url))
    }

    /// Borrow the underlying URL
    pub fn url(&self) -> &Url {
        &self.0
    }

    /// Clone the underlying URL
    pub fn to_url(&self) -> Url {
        self.0.clone()
    }

    /// Append path segments to this candidate, preserving any existing path
    pub fn join_path(&self, path: &str) -> Result<Url> {
        let mut url = self.0.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ShieldError::parse(format!("Candidate '{}' cannot take a path", self.0))
            })?;
            segments.pop_if_empty();
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    /// Parse a list of URL strings, dropping the malformed entries
    ///
    /// Sources deliver lists from remote JSON; a single bad entry must not
    /// poison the rest of the list.
    pub fn parse_list<S: AsRef<str>>(inputs: &[S]) -> Vec<Candidate> {
        inputs
            .iter()
            .filter_map(|s| match Candidate::parse(s.as_ref()) {
                Ok(candidate) => Some(candidate),
                Err(e) => {
                    tracing::debug!("skipping unparseable domain entry: {}", e);
                    None
                }
            })
            .collect()
    }
}

impl std::fmt::Display for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for Candidate {
    type Err = ShieldError;

    fn from_str(s: &str) -> Result<Self> {
        Candidate::parse(s)
    }
}

/// Per-candidate outcome within one race generation
///
/// Exactly one outcome per tracked candidate at a time; a candidate is
/// probed at most once per generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Probe submitted, no result yet
    Pending,
    /// Probe round-trip succeeded with an OK payload
    Success,
    /// Transport error, timeout, decode failure or non-OK payload
    Failure,
}

impl ProbeOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, ProbeOutcome::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ProbeOutcome::Failure)
    }
}

/// Backend line classification returned by a winning candidate
///
/// The wire format is a bare integer; `1` identifies the primary shield
/// line, which the application surfaces as a boolean mode flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ApiLine {
    /// Standard mirror line
    Standard,
    /// Primary shield line
    Primary,
    /// Unrecognized line identifier, passed through untouched
    Other(i64),
}

impl ApiLine {
    pub fn is_primary(&self) -> bool {
        matches!(self, ApiLine::Primary)
    }
}

impl Default for ApiLine {
    fn default() -> Self {
        ApiLine::Standard
    }
}

impl From<i64> for ApiLine {
    fn from(value: i64) -> Self {
        match value {
            0 => ApiLine::Standard,
            1 => ApiLine::Primary,
            other => ApiLine::Other(other),
        }
    }
}

impl From<ApiLine> for i64 {
    fn from(line: ApiLine) -> Self {
        match line {
            ApiLine::Standard => 0,
            ApiLine::Primary => 1,
            ApiLine::Other(value) => value,
        }
    }
}
