//! Persistence for the last winning domain list
//!
//! A plain key-value overwrite surface: the race saves the winner's
//! advertised mirror list, the next cold start loads it to seed an
//! immediate probe pass. The file store writes a small versioned JSON
//! document via a temp-file rename; an optional TTL is available but off
//! by default, matching the observed no-expiry behavior.

use crate::error::{Result, ShieldError};
use crate::types::Candidate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Store file format version for compatibility
const STORE_FORMAT_VERSION: u32 = 1;

/// Persistence surface for the cached domain list
pub trait DomainStore: Send + Sync {
    /// Overwrite the stored list
    fn save(&self, domains: &[Candidate]) -> Result<()>;

    /// Load the stored list; `None` when absent, expired or incompatible
    fn load(&self) -> Result<Option<Vec<Candidate>>>;
}

/// Serialized store document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    saved_at: DateTime<Utc>,
    domains: Vec<String>,
}

/// File-backed domain store
pub struct FileDomainStore {
    path: PathBuf,
    ttl: Option<Duration>,
}

impl FileDomainStore {
    /// Create a store at the given path with no expiry
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            ttl: None,
        }
    }

    /// Create a store whose entries expire after `ttl`
    pub fn with_ttl<P: Into<PathBuf>>(path: P, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl: Some(ttl),
        }
    }

    /// Default store location following the XDG cache convention
    pub fn default_path() -> PathBuf {
        let cache_dir = if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
            PathBuf::from(xdg_cache)
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".cache")
        } else {
            return PathBuf::from("cloud-shield-domains.json");
        };

        cache_dir.join("cloud-shield").join("domains.json")
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    ShieldError::store(format!(
                        "Failed to create store directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }

    fn is_expired(&self, document: &StoreDocument) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        let age = Utc::now().signed_duration_since(document.saved_at);
        age.num_seconds() >= ttl.as_secs() as i64
    }
}

impl DomainStore for FileDomainStore {
    fn save(&self, domains: &[Candidate]) -> Result<()> {
        self.ensure_parent_dir()?;

        let document = StoreDocument {
            version: STORE_FORMAT_VERSION,
            saved_at: Utc::now(),
            domains: domains.iter().map(|c| c.to_string()).collect(),
        };

        let content = serde_json::to_string_pretty(&document)
            .map_err(|e| ShieldError::store(format!("Failed to serialize domain list: {}", e)))?;

        // Write-then-rename keeps a crashed save from corrupting the store
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content).map_err(|e| {
            ShieldError::store(format!(
                "Failed to write store file '{}': {}",
                tmp_path.display(),
                e
            ))
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            ShieldError::store(format!(
                "Failed to move store file into place '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(count = domains.len(), path = %self.path.display(), "domain list saved");
        Ok(())
    }

    fn load(&self) -> Result<Option<Vec<Candidate>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            ShieldError::store(format!(
                "Failed to read store file '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        let document: StoreDocument = serde_json::from_str(&content).map_err(|e| {
            ShieldError::store(format!(
                "Failed to parse store file '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        if document.version != STORE_FORMAT_VERSION {
            tracing::warn!(
                version = document.version,
                "store format incompatible, treating as absent"
            );
            return Ok(None);
        }

        if self.is_expired(&document) {
            tracing::debug!("stored domain list expired, treating as absent");
            return Ok(None);
        }

        Ok(Some(Candidate::parse_list(&document.domains)))
    }
}

/// In-memory domain store for tests and embedded use
#[derive(Default)]
pub struct MemoryDomainStore {
    slot: Mutex<Option<Vec<Candidate>>>,
}

impl MemoryDomainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store
    pub fn with_domains(domains: Vec<Candidate>) -> Self {
        Self {
            slot: Mutex::new(Some(domains)),
        }
    }
}

impl DomainStore for MemoryDomainStore {
    fn save(&self, domains: &[Candidate]) -> Result<()> {
        *self.slot.lock().expect("store lock poisoned") = Some(domains.to_vec());
        Ok(())
    }

    fn load(&self) -> Result<Option<Vec<Candidate>>> {
        Ok(self.slot.lock().expect("store lock poisoned").clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn candidates(urls: &[&str]) -> Vec<Candidate> {
        urls.iter().map(|u| Candidate::parse(u).unwrap()).collect()
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileDomainStore::new(dir.path().join("domains.json"));

        let list = candidates(&["https://a.example.com", "https://b.example.com"]);
        store.save(&list).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, list);
    }

    #[test]
    fn test_load_absent_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileDomainStore::new(dir.path().join("missing.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites_previous_list() {
        let dir = TempDir::new().unwrap();
        let store = FileDomainStore::new(dir.path().join("domains.json"));

        store.save(&candidates(&["https://old.example.com"])).unwrap();
        store.save(&candidates(&["https://new.example.com"])).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].url().host_str(), Some("new.example.com"));
    }

    #[test]
    fn test_corrupted_file_is_a_store_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("domains.json");
        fs::write(&path, "not json at all").unwrap();

        let store = FileDomainStore::new(path);
        assert!(matches!(store.load(), Err(ShieldError::Store(_))));
    }

    #[test]
    fn test_version_mismatch_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("domains.json");
        fs::write(
            &path,
            serde_json::json!({
                "version": 99,
                "saved_at": Utc::now(),
                "domains": ["https://a.example.com"]
            })
            .to_string(),
        )
        .unwrap();

        let store = FileDomainStore::new(path);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_expired_entry_loads_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("domains.json");
        fs::write(
            &path,
            serde_json::json!({
                "version": STORE_FORMAT_VERSION,
                "saved_at": Utc::now() - chrono::Duration::hours(2),
                "domains": ["https://a.example.com"]
            })
            .to_string(),
        )
        .unwrap();

        let expiring = FileDomainStore::with_ttl(&path, Duration::from_secs(3600));
        assert!(expiring.load().unwrap().is_none());

        // Without a TTL the same entry is still served
        let forever = FileDomainStore::new(&path);
        assert_eq!(forever.load().unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_parent_directories_created_on_save() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("deep").join("nested").join("domains.json");
        let store = FileDomainStore::new(&nested);

        store.save(&candidates(&["https://a.example.com"])).unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryDomainStore::new();
        assert!(store.load().unwrap().is_none());

        let list = candidates(&["https://a.example.com"]);
        store.save(&list).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), list);
    }

    #[test]
    fn test_default_path_mentions_crate_dir() {
        let path = FileDomainStore::default_path();
        assert!(path.to_string_lossy().contains("cloud-shield"));
    }
}
