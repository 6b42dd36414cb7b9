//! Local mirror of the last successful fetch.
//!
//! Two files under the cache directory, both replaced atomically:
//! - `solutions-snapshot.json`: the normalized solutions
//! - `last-fetch.json`: fetch timestamp, content hash and row count
//!
//! The cache is only a fallback for transport failures. It is never merged
//! with live data.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::portfolio::Solution;
use crate::util::atomic_write_str;

pub const SNAPSHOT_FILE: &str = "solutions-snapshot.json";
pub const LAST_FETCH_FILE: &str = "last-fetch.json";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cache file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Contents of `last-fetch.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchMetadata {
    /// RFC 3339
    pub fetched_at: String,
    pub content_hash: String,
    pub solution_count: usize,
}

impl FetchMetadata {
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.fetched_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// A snapshot read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSnapshot {
    pub solutions: Vec<Solution>,
    pub metadata: Option<FetchMetadata>,
}

/// True when `fetched_at` is unparseable or older than `max_age_hours`.
pub fn is_stale(fetched_at: &str, max_age_hours: u32) -> bool {
    DateTime::parse_from_rfc3339(fetched_at)
        .map(|dt| {
            let age = Utc::now() - dt.with_timezone(&Utc);
            age.num_minutes() >= i64::from(max_age_hours) * 60
        })
        .unwrap_or(true)
}

/// SHA-256 of the canonical snapshot JSON, hex encoded.
pub fn content_hash(solutions: &[Solution]) -> Result<String, CacheError> {
    let bytes = serde_json::to_vec(solutions)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

pub struct SnapshotCache {
    dir: PathBuf,
}

impl SnapshotCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(LAST_FETCH_FILE)
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, CacheError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| CacheError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
    }

    fn write(path: &Path, content: &str) -> Result<(), CacheError> {
        atomic_write_str(path, content).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `Ok(None)` when nothing has been cached yet.
    pub fn load(&self) -> Result<Option<CachedSnapshot>, CacheError> {
        let Some(solutions) = Self::read_json::<Vec<Solution>>(&self.snapshot_path())? else {
            return Ok(None);
        };
        let metadata = match self.last_fetch() {
            Ok(m) => m,
            Err(e) => {
                log::warn!("Ignoring unreadable fetch metadata: {}", e);
                None
            }
        };
        let metadata = match metadata {
            Some(meta) if meta.content_hash != content_hash(&solutions)? => {
                log::warn!(
                    "Fetch metadata in {} does not match the cached snapshot, ignoring it",
                    self.dir.display()
                );
                None
            }
            other => other,
        };
        log::debug!(
            "Loaded {} cached solutions from {}",
            solutions.len(),
            self.dir.display()
        );
        Ok(Some(CachedSnapshot {
            solutions,
            metadata,
        }))
    }

    pub fn last_fetch(&self) -> Result<Option<FetchMetadata>, CacheError> {
        Self::read_json(&self.metadata_path())
    }

    /// Overwrite the snapshot and stamp the fetch time.
    pub fn store(
        &self,
        solutions: &[Solution],
        fetched_at: DateTime<Utc>,
    ) -> Result<FetchMetadata, CacheError> {
        let hash = content_hash(solutions)?;

        if let Ok(Some(previous)) = self.last_fetch() {
            if previous.content_hash == hash {
                log::info!("Portfolio snapshot unchanged since {}", previous.fetched_at);
            }
        }

        let metadata = FetchMetadata {
            fetched_at: fetched_at.to_rfc3339(),
            content_hash: hash,
            solution_count: solutions.len(),
        };
        let snapshot = serde_json::to_string(solutions)?;
        let metadata_json = serde_json::to_string_pretty(&metadata)?;

        let snapshot_path = self.snapshot_path();
        let previous = std::fs::read_to_string(&snapshot_path).ok();
        Self::write(&snapshot_path, &snapshot)?;

        // The pair must describe the same snapshot; undo the first write.
        if let Err(e) = Self::write(&self.metadata_path(), &metadata_json) {
            let rollback = match &previous {
                Some(content) => atomic_write_str(&snapshot_path, content),
                None => std::fs::remove_file(&snapshot_path),
            };
            if let Err(rollback_err) = rollback {
                log::warn!(
                    "Failed to roll back {} after metadata write failure: {}",
                    snapshot_path.display(),
                    rollback_err
                );
            }
            return Err(e);
        }

        log::info!(
            "Cached {} solutions (sha256 {})",
            metadata.solution_count,
            &metadata.content_hash[..12]
        );
        Ok(metadata)
    }

    /// Whether the scheduler should fetch again.
    pub fn is_refresh_due(&self, interval_hours: u32) -> bool {
        match self.last_fetch() {
            Ok(Some(meta)) => is_stale(&meta.fetched_at, interval_hours),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::test_support::solution;

    #[test]
    fn empty_cache_loads_nothing_and_is_due() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        assert_eq!(cache.load().unwrap(), None);
        assert!(cache.is_refresh_due(24));
    }

    #[test]
    fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path().join("cache"));
        let solutions = vec![solution(1, "Checkout"), solution(2, "Alerts")];

        let meta = cache.store(&solutions, Utc::now()).unwrap();
        assert_eq!(meta.solution_count, 2);
        assert_eq!(meta.content_hash.len(), 64);

        let loaded = cache.load().unwrap().unwrap();
        assert_eq!(loaded.solutions, solutions);
        assert_eq!(loaded.metadata, Some(meta));
        assert!(!cache.is_refresh_due(24));
    }

    #[test]
    fn hash_tracks_content() {
        let a = vec![solution(1, "Checkout")];
        let b = vec![solution(1, "Checkout v2")];
        assert_eq!(content_hash(&a).unwrap(), content_hash(&a).unwrap());
        assert_ne!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn corrupt_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        std::fs::write(cache.snapshot_path(), "{not json").unwrap();
        assert!(matches!(cache.load(), Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn failed_metadata_write_restores_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        let first = vec![solution(1, "Checkout")];
        cache.store(&first, Utc::now()).unwrap();

        // A directory in place of last-fetch.json makes the rename fail
        std::fs::remove_file(cache.metadata_path()).unwrap();
        std::fs::create_dir(cache.metadata_path()).unwrap();

        let second = vec![solution(1, "Checkout v2"), solution(2, "Alerts")];
        assert!(matches!(
            cache.store(&second, Utc::now()),
            Err(CacheError::Io { .. })
        ));
        assert_eq!(cache.load().unwrap().unwrap().solutions, first);
    }

    #[test]
    fn failed_first_store_leaves_no_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        std::fs::create_dir(cache.metadata_path()).unwrap();

        assert!(cache.store(&[solution(1, "Checkout")], Utc::now()).is_err());
        assert!(!cache.snapshot_path().exists());
        assert_eq!(cache.load().unwrap(), None);
    }

    #[test]
    fn mismatched_metadata_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path());
        cache.store(&[solution(1, "Checkout")], Utc::now()).unwrap();
        std::fs::write(
            cache.snapshot_path(),
            serde_json::to_string(&[solution(1, "Other")]).unwrap(),
        )
        .unwrap();

        let loaded = cache.load().unwrap().unwrap();
        assert_eq!(loaded.solutions[0].name, "Other");
        assert_eq!(loaded.metadata, None);
    }

    #[test]
    fn staleness() {
        let old = (Utc::now() - chrono::Duration::hours(25)).to_rfc3339();
        let fresh = (Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        assert!(is_stale(&old, 24));
        assert!(!is_stale(&fresh, 24));
        assert!(is_stale("garbage", 24));
    }
}
