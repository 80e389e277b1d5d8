//! Error types for the pipeline engine.

use std::path::PathBuf;

use assetflow_client::{ApiError, TaskStatus};
use assetflow_config::ConfigError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while loading definitions or running a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No pipeline with this name was loaded.
    #[error("Pipeline definition not found: {0}")]
    PipelineNotFound(String),

    /// No task with this id was loaded.
    #[error("Task definition not found: {0}")]
    TaskNotFound(String),

    /// The selected step id is not part of the pipeline.
    #[error("Step '{step}' not found in pipeline '{pipeline}'")]
    StepNotFound { pipeline: String, step: String },

    /// The asset directory has no manifest.
    #[error("Manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    /// The manifest exists but does not match the expected shape.
    #[error("Invalid manifest {}: {reason}", path.display())]
    InvalidManifest { path: PathBuf, reason: String },

    /// A definition document or pipeline structure is malformed.
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// A `dependsOn` step has no recorded result.
    #[error("Dependency '{dependency}' not completed for step '{step}'")]
    DependencyNotMet { step: String, dependency: String },

    /// A `forEach` source resolved to something other than an array.
    #[error("forEach source for step '{0}' did not resolve to an array")]
    ForEachNotArray(String),

    /// The task declares an HTTP method the runner cannot execute.
    #[error("Unsupported method '{method}' for task '{task}'")]
    UnsupportedMethod { task: String, method: String },

    /// Task creation returned no remote task id.
    #[error("Task creation failed for {task}: {response}")]
    TaskCreationFailed { task: String, response: String },

    /// The remote task finished unsuccessfully.
    #[error("Task '{task}' ({task_id}) finished with status {status}: {message}")]
    TaskFailed {
        task: String,
        task_id: String,
        status: TaskStatus,
        message: String,
    },

    /// A lookup table file could not be loaded.
    #[error("Failed to load lookup table {}: {reason}", path.display())]
    LookupTable { path: PathBuf, reason: String },

    /// Remote API failure.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Returns true for errors caused by definitions, manifests or selection
    /// rather than by the remote API. These are raised before any remote call
    /// for the step they concern.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PipelineError::PipelineNotFound(_)
                | PipelineError::TaskNotFound(_)
                | PipelineError::StepNotFound { .. }
                | PipelineError::ManifestNotFound(_)
                | PipelineError::InvalidManifest { .. }
                | PipelineError::InvalidDefinition(_)
                | PipelineError::DependencyNotMet { .. }
                | PipelineError::ForEachNotArray(_)
                | PipelineError::UnsupportedMethod { .. }
                | PipelineError::LookupTable { .. }
                | PipelineError::Config(_)
        )
    }

    /// The underlying API error, if this is a remote failure.
    pub fn as_api_error(&self) -> Option<&ApiError> {
        match self {
            PipelineError::Api(e) => Some(e),
            _ => None,
        }
    }
}
