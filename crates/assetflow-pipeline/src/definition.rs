//! Task and pipeline definition types.
//!
//! Definitions are JSON documents. A task describes one remote operation
//! (endpoint, inputs, outputs); a pipeline is an ordered list of steps that
//! each invoke a task.
//!
//! ```json
//! {
//!   "name": "character",
//!   "stateMapping": { "model.glb": "modelUrl" },
//!   "steps": [
//!     { "id": "preview", "task": "text-to-3d-preview" },
//!     {
//!       "id": "animate",
//!       "task": "animation",
//!       "dependsOn": ["preview"],
//!       "forEach": { "source": "lookup", "table": "ANIMATION_IDS", "as": "anim" },
//!       "inputs": [
//!         { "name": "rig_task_id", "source": "step", "step": "preview", "path": "taskId" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PipelineError;

/// Default API version prefix for task endpoints.
const DEFAULT_API_VERSION: &str = "v1";

// ─────────────────────────────────────────────────────────────────────────────
// Bindings
// ─────────────────────────────────────────────────────────────────────────────

/// Where a binding reads its value from, with the fields each source uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum BindingSource {
    /// A constant. String values are template-interpolated.
    Literal {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    /// An environment variable named by `path`.
    Env {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    /// A dot/bracket path into the manifest.
    Manifest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    /// An output of an earlier step.
    Step {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    /// A key in a host-supplied lookup table. `path` stands in for a
    /// missing `key`.
    Lookup {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

impl BindingSource {
    /// Source name as written in definitions.
    pub fn kind(&self) -> &'static str {
        match self {
            BindingSource::Literal { .. } => "literal",
            BindingSource::Env { .. } => "env",
            BindingSource::Manifest { .. } => "manifest",
            BindingSource::Step { .. } => "step",
            BindingSource::Lookup { .. } => "lookup",
        }
    }

    /// Whether an unresolved value from this source would fail at runtime.
    pub fn is_required(&self) -> bool {
        matches!(
            self,
            BindingSource::Env { .. } | BindingSource::Manifest { .. } | BindingSource::Lookup { .. }
        )
    }
}

/// A named task input and where its value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBinding {
    pub name: String,

    #[serde(flatten)]
    pub source: BindingSource,

    /// Used when the source yields nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A named task output extracted from the remote response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputBinding {
    pub name: String,

    /// Path into the response payload.
    pub response_path: String,

    /// Filename template; when set, the output is a URL to download.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP method a task is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Delete,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Delete => write!(f, "DELETE"),
        }
    }
}

/// How task completion is awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStrategy {
    /// Follow the server-sent progress stream.
    #[default]
    Stream,
    /// Fetch the task status at a fixed interval.
    Poll,
}

/// Completion settings for a task.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollConfig {
    #[serde(default)]
    pub strategy: PollStrategy,

    /// Status path override; `{{taskId}}` is interpolated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// A remote operation contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Endpoint path under the API version; defaults to the task id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub method: HttpMethod,

    #[serde(default)]
    pub inputs: Vec<InputBinding>,

    #[serde(default)]
    pub outputs: Vec<OutputBinding>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollConfig>,
}

impl TaskDefinition {
    /// Parse a task definition from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json)
            .map_err(|e| PipelineError::InvalidDefinition(format!("Failed to parse task: {}", e)))
    }

    pub fn api_version(&self) -> &str {
        self.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION)
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(&self.id)
    }

    /// `/{apiVersion}/{endpoint}`: where tasks are created.
    pub fn create_path(&self) -> String {
        format!(
            "/{}/{}",
            self.api_version().trim_matches('/'),
            self.endpoint().trim_matches('/')
        )
    }

    /// Where a created task's current state is fetched.
    pub fn task_path(&self, task_id: &str) -> String {
        if let Some(ref poll) = self.poll
            && let Some(ref path) = poll.path
        {
            return path.replace("{{taskId}}", task_id);
        }
        format!("{}/{}", self.create_path(), task_id)
    }

    /// Where a created task's progress stream is read.
    pub fn stream_path(&self, task_id: &str) -> String {
        format!("{}/{}/stream", self.create_path(), task_id)
    }

    /// The configured completion strategy.
    pub fn poll_strategy(&self) -> PollStrategy {
        self.poll.as_ref().map(|p| p.strategy).unwrap_or_default()
    }

    /// Outputs that name an artifact file.
    pub fn artifact_outputs(&self) -> impl Iterator<Item = (&OutputBinding, &str)> {
        self.outputs
            .iter()
            .filter_map(|o| o.artifact.as_deref().map(|a| (o, a)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipelines
// ─────────────────────────────────────────────────────────────────────────────

/// Fan-out specification: run the step once per element of the source array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForEachSpec {
    #[serde(flatten)]
    pub source: BindingSource,

    /// Iteration variable name; `<as>_index` holds the position.
    #[serde(rename = "as")]
    pub var: String,
}

impl ForEachSpec {
    pub fn index_var(&self) -> String {
        format!("{}_index", self.var)
    }
}

/// One entry in a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    pub id: String,

    /// Task definition id.
    pub task: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_each: Option<ForEachSpec>,

    /// Bindings that override or extend the task's own inputs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputBinding>,

    /// Manifest path → output path, merged over the pipeline mapping.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub state_mapping: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_artifacts: bool,
}

/// A named, ordered composition of task invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub steps: Vec<PipelineStep>,

    /// Manifest path → output path, applied after every step.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub state_mapping: IndexMap<String, String>,
}

impl PipelineDefinition {
    /// Parse a pipeline definition from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json).map_err(|e| {
            PipelineError::InvalidDefinition(format!("Failed to parse pipeline: {}", e))
        })
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn has_step(&self, id: &str) -> bool {
        self.step(id).is_some()
    }

    /// Structural problems: duplicate step ids and dependencies on
    /// undeclared steps.
    pub fn structural_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        let mut seen_ids = HashSet::new();
        for step in &self.steps {
            if !seen_ids.insert(step.id.as_str()) {
                issues.push(format!(
                    "Duplicate step id '{}' in pipeline '{}'.",
                    step.id, self.name
                ));
            }
        }

        for step in &self.steps {
            for dep in &step.depends_on {
                if !seen_ids.contains(dep.as_str()) {
                    issues.push(format!(
                        "Step '{}' depends on missing step '{}'.",
                        step.id, dep
                    ));
                }
            }
        }

        issues
    }

    /// State mapping for a step: the pipeline mapping with the step's
    /// entries taking precedence.
    pub fn state_mapping_for(&self, step: &PipelineStep) -> IndexMap<String, String> {
        let mut mapping = self.state_mapping.clone();
        for (manifest_path, output_path) in &step.state_mapping {
            mapping.insert(manifest_path.clone(), output_path.clone());
        }
        mapping
    }
}

/// The bindings in effect for a step: task inputs, overridden by step
/// inputs of the same name, in first-declaration order.
pub fn effective_bindings<'a>(
    task: &'a TaskDefinition,
    step: &'a PipelineStep,
) -> Vec<&'a InputBinding> {
    let mut bindings: IndexMap<&str, &InputBinding> = IndexMap::new();
    for input in task.inputs.iter().chain(step.inputs.iter()) {
        bindings.insert(input.name.as_str(), input);
    }
    bindings.into_values().collect()
}

/// Read a JSON file as a definition document.
pub(crate) fn read_definition(path: &Path) -> Result<Value, PipelineError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::InvalidDefinition(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        PipelineError::InvalidDefinition(format!("Failed to parse {}: {}", path.display(), e))
    })
}
