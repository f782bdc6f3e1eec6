//! # Engine Configuration
//!
//! Loaded from a small TOML file:
//!
//! ```toml
//! content_path = "content.toml"
//! wal_path = "state/players.wal"   # optional, enables the durable store
//! rng_seed = 42                    # optional, OS entropy otherwise
//! log_filter = "ascendant_economy=debug"
//! ```
//!
//! Relative paths resolve against the directory of the config file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ContentError, ContentResult, StoreError, StoreResult};
use crate::rng::SeededRng;
use crate::store::{ConfiguredStore, MemoryStore};
use crate::wal::DurableStore;

fn default_log_filter() -> String {
    "info".to_owned()
}

/// Engine settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Content catalog file.
    pub content_path: PathBuf,
    /// Write-ahead log for the durable store; in-memory when absent.
    #[serde(default)]
    pub wal_path: Option<PathBuf>,
    /// Fixed seed for reproducible runs.
    #[serde(default)]
    pub rng_seed: Option<u64>,
    /// `tracing` env-filter directive.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl EngineConfig {
    /// Settings pointing at `content_path`, with everything else defaulted.
    #[must_use]
    pub fn new(content_path: impl Into<PathBuf>) -> Self {
        Self {
            content_path: content_path.into(),
            wal_path: None,
            rng_seed: None,
            log_filter: default_log_filter(),
        }
    }

    /// Parses settings from TOML text. Paths are left as written.
    ///
    /// # Errors
    ///
    /// `Parse` for malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> ContentResult<Self> {
        toml::from_str(text).map_err(|e| ContentError::Parse(e.to_string()))
    }

    /// Serializes the settings back to TOML.
    ///
    /// # Errors
    ///
    /// `Invalid` if a path is not valid UTF-8.
    pub fn to_toml(&self) -> ContentResult<String> {
        toml::to_string_pretty(self).map_err(|e| ContentError::Invalid(e.to_string()))
    }

    /// Loads settings from a file and resolves relative paths against its
    /// directory.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `Parse` if it is malformed.
    pub fn load(path: impl AsRef<Path>) -> ContentResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ContentError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::from_toml_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.resolved_against(base))
    }

    /// Returns a copy with relative paths joined onto `base`.
    #[must_use]
    pub fn resolved_against(mut self, base: &Path) -> Self {
        if self.content_path.is_relative() {
            self.content_path = base.join(&self.content_path);
        }
        if let Some(wal) = self.wal_path.as_mut() {
            if wal.is_relative() {
                *wal = base.join(&*wal);
            }
        }
        self
    }

    /// Opens the player store these settings call for: a [`DurableStore`]
    /// over `wal_path` when set, creating its directory if needed, or an
    /// empty [`MemoryStore`].
    ///
    /// # Errors
    ///
    /// As [`DurableStore::open`], or `Unavailable` if the WAL directory
    /// cannot be created.
    pub fn open_store(&self) -> StoreResult<ConfiguredStore> {
        let Some(path) = &self.wal_path else {
            return Ok(ConfiguredStore::Memory(MemoryStore::new()));
        };
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                StoreError::Unavailable(format!("failed to create {}: {e}", dir.display()))
            })?;
        }
        Ok(ConfiguredStore::Durable(DurableStore::open(path)?))
    }

    /// The random source these settings call for.
    #[must_use]
    pub fn rng(&self) -> SeededRng {
        self.rng_seed
            .map_or_else(SeededRng::from_entropy, SeededRng::from_seed)
    }
}
