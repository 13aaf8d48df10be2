//! Disk-backed cache for expensive-to-refetch responses, mainly repository
//! metadata documents.
//!
//! Each entry is two files: the payload itself and a `.meta` JSON sidecar
//! recording when it was stored and the request URL it came from. An entry
//! older than the configured max age is treated as a miss; the next network
//! result overwrites it.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

fn sanitize_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new("[^a-zA-Z0-9._-]").unwrap())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheMeta {
    url: String,
    stored_at: DateTime<Utc>,
}

pub struct ResponseCache {
    root: PathBuf,
    max_age: Duration,
    enabled: bool,
}

impl ResponseCache {
    pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            max_age: Self::DEFAULT_MAX_AGE,
            enabled: true,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Derive the on-disk name for a request identity. Keys stay readable for
    /// debugging; a digest suffix keeps collisions off the table after
    /// sanitizing.
    fn entry_name(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        let readable = sanitize_regex().replace_all(key, "-");
        let readable: &str = if readable.len() > 80 {
            &readable[..80]
        } else {
            readable.as_ref()
        };
        format!("{}-{}", readable, &digest[..16])
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        self.root.join(Self::entry_name(key))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.meta", Self::entry_name(key)))
    }

    /// Read a cached payload, treating entries at or past the max age as
    /// misses.
    pub fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        if !self.enabled {
            return Ok(None);
        }

        let meta_bytes = match fs::read(self.meta_path(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let meta: CacheMeta = match serde_json::from_slice(&meta_bytes) {
            Ok(meta) => meta,
            // An unreadable sidecar invalidates the entry
            Err(_) => return Ok(None),
        };

        let age = Utc::now().signed_duration_since(meta.stored_at);
        if age.num_seconds() < 0 || age.to_std().map(|a| a >= self.max_age).unwrap_or(true) {
            log::debug!("Cache entry for {} expired", meta.url);
            return Ok(None);
        }

        match fs::read(self.payload_path(key)) {
            Ok(payload) => {
                log::debug!("Cache hit for {}", meta.url);
                Ok(Some(payload))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Store a payload, replacing any previous entry for the key.
    pub fn write(&self, key: &str, url: &str, payload: &[u8]) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        fs::create_dir_all(&self.root)?;
        fs::write(self.payload_path(key), payload)?;

        let meta = CacheMeta {
            url: url.to_string(),
            stored_at: Utc::now(),
        };
        let meta_bytes = serde_json::to_vec(&meta)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(self.meta_path(key), meta_bytes)
    }

    /// Remove entries whose payload file is older than `ttl`. Returns the
    /// number of bytes freed.
    pub fn gc(&self, ttl: Duration) -> io::Result<u64> {
        if !self.enabled || !self.root.is_dir() {
            return Ok(0);
        }

        let now = std::time::SystemTime::now();
        let mut freed = 0u64;

        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Ok(metadata) = fs::metadata(path) {
                if let Ok(modified) = metadata.modified() {
                    if let Ok(age) = now.duration_since(modified) {
                        if age > ttl {
                            let size = metadata.len();
                            if fs::remove_file(path).is_ok() {
                                freed += size;
                            }
                        }
                    }
                }
            }
        }

        Ok(freed)
    }

    /// Total size of the cache in bytes
    pub fn size(&self) -> io::Result<u64> {
        if !self.root.is_dir() {
            return Ok(0);
        }

        let mut total = 0u64;
        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if let Ok(metadata) = entry.metadata() {
                if metadata.is_file() {
                    total += metadata.len();
                }
            }
        }
        Ok(total)
    }

    /// Check that the cache directory is writable before relying on it
    pub fn is_usable(&self) -> bool {
        if !self.enabled {
            return false;
        }
        if !self.root.exists() && fs::create_dir_all(&self.root).is_err() {
            return false;
        }
        let probe = self.root.join(".cache_test");
        if File::create(&probe).is_ok() {
            let _ = fs::remove_file(&probe);
            true
        } else {
            false
        }
    }
}
