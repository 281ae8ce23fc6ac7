//! Per-dataset JSON cache store
//!
//! Provides a `CacheStore` that persists one mapping per dataset to a JSON
//! file on local storage. Writes merge on top of whatever is already on
//! disk (new entries win on key collision) and stamp every entry with the
//! write time, so callers never manage timestamps themselves.

use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::warn;

/// A cached entry: the dataset-specific payload plus the write stamp
///
/// The payload fields are flattened into the entry object, so a Booklog
/// entry serializes as `{"status": "...", "cachedAt": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<P> {
    /// The cached payload
    #[serde(flatten)]
    pub payload: P,
    /// When this entry was last refreshed; set by the store on write
    #[serde(rename = "cachedAt")]
    pub cached_at: DateTime<Utc>,
}

/// Returns true while a cache stamp is younger than `max_age_days`
///
/// Strict comparison: an entry that is exactly `max_age_days` old is no
/// longer valid. Once false for a given stamp it stays false until the
/// entry is rewritten.
pub fn is_valid(cached_at: DateTime<Utc>, max_age_days: i64) -> bool {
    Utc::now().signed_duration_since(cached_at) < Duration::days(max_age_days)
}

/// Manages reading and writing per-dataset cache files
///
/// Each dataset lives in its own file, `<dataset>-cache.json`, under the
/// store's directory. Every operation degrades gracefully: a missing,
/// empty or malformed file loads as an empty mapping, and a failed write
/// is logged and swallowed, never propagated into the surrounding request.
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Directory where dataset files are stored
    data_dir: PathBuf,
}

impl CacheStore {
    /// Creates a new CacheStore using the XDG-compliant cache directory
    ///
    /// Uses `~/.cache/lifestream/` on Linux, or the equivalent path on
    /// other platforms. Returns `None` if no home directory can be
    /// determined.
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "lifestream")?;
        let data_dir = project_dirs.cache_dir().to_path_buf();
        Some(Self { data_dir })
    }

    /// Creates a new CacheStore rooted at a custom directory
    pub fn with_dir(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Returns the path of the file backing the given dataset
    fn dataset_path(&self, dataset: &str) -> PathBuf {
        self.data_dir.join(format!("{}-cache.json", dataset))
    }

    /// Loads the full mapping for a dataset
    ///
    /// Any read or parse failure (file missing, empty, invalid JSON)
    /// resolves to an empty mapping. Never returns an error.
    pub fn load<P: DeserializeOwned>(&self, dataset: &str) -> HashMap<String, CacheEntry<P>> {
        let path = self.dataset_path(dataset);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => return HashMap::new(),
        };

        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dataset, error = %err, "discarding unreadable cache file");
                HashMap::new()
            }
        }
    }

    /// Merges freshly fetched payloads into a dataset file
    ///
    /// Re-reads the existing mapping through the same tolerant path as
    /// [`load`](Self::load), overlays `new_payloads` on top (new entries
    /// win on key collision) and writes the result back as pretty-printed
    /// JSON. Every payload is stamped with the current time. Write
    /// failures are logged and swallowed; cache persistence is
    /// best-effort and must not fail the surrounding request.
    pub fn save<P>(&self, dataset: &str, new_payloads: HashMap<String, P>)
    where
        P: Serialize + DeserializeOwned,
    {
        let mut merged = self.load::<P>(dataset);
        let now = Utc::now();
        for (key, payload) in new_payloads {
            merged.insert(
                key,
                CacheEntry {
                    payload,
                    cached_at: now,
                },
            );
        }

        if let Err(err) = self.write_dataset(dataset, &merged) {
            warn!(dataset, error = %err, "failed to persist cache file");
        }
    }

    /// Writes a dataset mapping to disk, creating the directory if needed
    fn write_dataset<P: Serialize>(
        &self,
        dataset: &str,
        entries: &HashMap<String, CacheEntry<P>>,
    ) -> io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;

        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        fs::write(self.dataset_path(dataset), json)
    }
}
