//! The persisted run record for one asset.

use std::path::{Path, PathBuf};

use assetflow_client::TaskStatus;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Manifest filename inside an asset directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Recorded state of one remote task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    /// Remote job id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "known_status"
    )]
    pub status: Option<TaskStatus>,

    #[serde(default)]
    pub outputs: Map<String, Value>,

    /// Artifact name → path relative to the asset directory.
    #[serde(default)]
    pub artifacts: IndexMap<String, String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reject status strings the engine can't write back unchanged.
fn known_status<'de, D>(deserializer: D) -> std::result::Result<Option<TaskStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let status = TaskStatus::deserialize(Value::String(raw.clone()))
        .map_err(serde::de::Error::custom)?;
    if status == TaskStatus::Unknown {
        return Err(serde::de::Error::custom(format!(
            "unknown task status '{raw}'"
        )));
    }
    Ok(Some(status))
}

/// `manifest.json`: identity, seed and per-task state of one run.
///
/// Fields the engine does not model are preserved as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Fixed once generated; drives every templated `{{seed}}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,

    /// Task state keyed by task definition id.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub tasks: IndexMap<String, TaskState>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssetManifest {
    /// A fresh manifest with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind: None,
            seed: None,
            tasks: IndexMap::new(),
            extra: Map::new(),
        }
    }

    /// Path of the manifest inside an asset directory.
    pub fn path_in(asset_dir: &Path) -> PathBuf {
        asset_dir.join(MANIFEST_FILE)
    }

    /// Read and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PipelineError::ManifestNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| PipelineError::InvalidManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Validate an in-memory JSON document.
    pub fn from_value(value: &Value) -> std::result::Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// The manifest as a JSON document, for path lookups.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Write the manifest as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        debug!(path = %path.display(), "Manifest persisted");
        Ok(())
    }
}
