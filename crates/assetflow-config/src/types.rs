//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [api]                        # remote generation API connection
//! [definitions]                # task / pipeline definition directories
//! [lookups.ANIMATION_IDS]      # named lookup tables loaded from JSON files
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.meshy.ai/openapi";

/// Default environment variable holding the API key.
pub const DEFAULT_API_KEY_ENV: &str = "MESHY_API_KEY";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Remote API connection settings.
    pub api: Option<ApiConfig>,

    /// Definition directories.
    pub definitions: Option<DefinitionsConfig>,

    /// Named lookup tables (`[lookups.NAME]`).
    pub lookups: BTreeMap<String, LookupSource>,
}

impl EngineConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: EngineConfig) {
        if other.api.is_some() {
            self.api = other.api;
        }

        if other.definitions.is_some() {
            self.definitions = other.definitions;
        }

        for (name, source) in other.lookups {
            self.lookups.insert(name, source);
        }
    }

    /// API settings, falling back to defaults when the section is absent.
    pub fn api(&self) -> ApiConfig {
        self.api.clone().unwrap_or_default()
    }

    /// Definition directories, falling back to defaults when absent.
    pub fn definitions(&self) -> DefinitionsConfig {
        self.definitions.clone().unwrap_or_default()
    }

    /// Rewrite every relative path in the config against `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        if let Some(ref mut defs) = self.definitions {
            defs.pipelines_dir = absolutize(base_dir, &defs.pipelines_dir);
            defs.tasks_dir = absolutize(base_dir, &defs.tasks_dir);
        }
        for source in self.lookups.values_mut() {
            source.path = absolutize(base_dir, &source.path);
        }
    }
}

fn absolutize(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Remote generation API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL; the API version segment is appended per task.
    pub base_url: String,
    /// Environment variable consulted for the API key.
    pub api_key_env: String,
    /// Plaintext API key (discouraged, produces a load warning).
    pub api_key: Option<String>,
    /// Timeout for plain request/response calls.
    pub timeout_secs: u64,
    /// Absolute timeout for one progress stream.
    pub stream_timeout_secs: u64,
    /// Retries for rate-limited requests.
    pub max_retries: u32,
    /// Base delay for linear backoff between retries.
    pub retry_delay_ms: u64,
    /// Default interval for poll-strategy tasks.
    pub poll_interval_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            api_key: None,
            timeout_secs: 30,
            stream_timeout_secs: 600,
            max_retries: 3,
            retry_delay_ms: 1000,
            poll_interval_ms: 5000,
        }
    }
}

impl ApiConfig {
    /// Whether the API key is stored in plaintext in the config file.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Definitions / Lookups
// ─────────────────────────────────────────────────────────────────────────────

/// Directories holding task and pipeline definition documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefinitionsConfig {
    /// Directory of `*.pipeline.json` files.
    pub pipelines_dir: PathBuf,
    /// Directory of task definition `*.json` files.
    pub tasks_dir: PathBuf,
}

impl Default for DefinitionsConfig {
    fn default() -> Self {
        Self {
            pipelines_dir: PathBuf::from("pipelines/definitions"),
            tasks_dir: PathBuf::from("tasks/definitions"),
        }
    }
}

/// Where a named lookup table is read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupSource {
    /// JSON file containing the table.
    pub path: PathBuf,
    /// Optional JSON pointer (e.g. `/byPath`) selecting the table inside the file.
    #[serde(default)]
    pub pointer: Option<String>,
}
