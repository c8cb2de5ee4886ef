//! Content-addressed response cache with lazy expiry

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use shared::{CacheConfig, GenerationResult};
use crate::types::{CacheEntry, Fingerprint};

/// In-memory cache shared by every generation client in a run
#[derive(Debug)]
pub struct ResponseCache {
    enabled: bool,
    ttl: Duration,
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
}

impl ResponseCache {
    /// Create cache from configuration
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            ttl: config.expiry,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cache that never stores anything
    pub fn disabled() -> Self {
        Self::new(&CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Default time-to-live applied by callers
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live entry. Expired entries are removed and reported as absent.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<GenerationResult> {
        if !self.enabled {
            return None;
        }

        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(fingerprint) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => {
                    let mut hit = entry.result.clone();
                    hit.cache_hit = true;
                    return Some(hit);
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(fingerprint).is_some_and(|e| e.is_expired(now)) {
            entries.remove(fingerprint);
            debug!(fingerprint = fingerprint.short(), "🗑️ Evicted expired cache entry");
        }
        None
    }

    /// Store a result; a later store for the same fingerprint replaces it
    pub async fn put(&self, fingerprint: Fingerprint, result: GenerationResult, ttl: Duration) {
        if !self.enabled {
            return;
        }

        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let entry = CacheEntry {
            result,
            expires_at: Utc::now() + ttl,
        };
        self.entries.write().await.insert(fingerprint, entry);
    }

    /// Number of stored entries, expired ones included until touched
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Merge entries from a snapshot file, skipping those already expired.
    ///
    /// A missing file is not an error and loads nothing.
    pub async fn load(&self, path: &Path) -> io::Result<usize> {
        if !self.enabled {
            return Ok(0);
        }

        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let snapshot: HashMap<Fingerprint, CacheEntry> =
            serde_json::from_str(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let mut loaded = 0;
        for (fingerprint, entry) in snapshot {
            if !entry.is_expired(now) {
                entries.insert(fingerprint, entry);
                loaded += 1;
            }
        }

        info!(path = %path.display(), entries = loaded, "📦 Loaded cache snapshot");
        Ok(loaded)
    }

    /// Write all live entries to a snapshot file
    pub async fn save(&self, path: &Path) -> io::Result<usize> {
        if !self.enabled {
            return Ok(0);
        }

        self.purge_expired().await;
        let json = {
            let entries = self.entries.read().await;
            serde_json::to_string_pretty(&*entries)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;

        let saved = self.len().await;
        info!(path = %path.display(), entries = saved, "💾 Saved cache snapshot");
        Ok(saved)
    }
}
