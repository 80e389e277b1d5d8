//! Loading task and pipeline definitions from disk.
//!
//! Pipelines live in `*.pipeline.json` files; tasks in any `*.json` file of
//! the tasks directory that has an `id` key. Files are read in name order
//! and a malformed document aborts the load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::definition::{PipelineDefinition, TaskDefinition, read_definition};
use crate::error::{PipelineError, Result};

/// Suffix identifying pipeline definition files.
const PIPELINE_SUFFIX: &str = ".pipeline.json";

/// Task and pipeline definitions indexed by task id and pipeline name.
///
/// Read-only once built; share it behind an `Arc` across runs.
#[derive(Debug, Clone, Default)]
pub struct DefinitionBundle {
    pipelines: HashMap<String, PipelineDefinition>,
    tasks: HashMap<String, TaskDefinition>,
}

impl DefinitionBundle {
    /// An empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every definition from the two directories.
    pub fn load(pipelines_dir: &Path, tasks_dir: &Path) -> Result<Self> {
        let mut bundle = Self::new();

        for path in list_files(pipelines_dir)? {
            if !Self::is_pipeline_file(&path) {
                continue;
            }
            debug!("Loading pipeline file: {}", path.display());
            let value = read_definition(&path)?;
            let pipeline: PipelineDefinition = serde_json::from_value(value).map_err(|e| {
                PipelineError::InvalidDefinition(format!(
                    "Invalid pipeline definition {}: {}",
                    path.display(),
                    e
                ))
            })?;
            if let Some(previous) = bundle.insert_pipeline(pipeline) {
                warn!(
                    "Pipeline '{}' redefined by {}",
                    previous.name,
                    path.display()
                );
            }
        }

        for path in list_files(tasks_dir)? {
            if !Self::is_task_file(&path) {
                continue;
            }
            let value = read_definition(&path)?;
            if value.get("id").is_none() {
                debug!("Skipping {}: no task id", path.display());
                continue;
            }
            let task: TaskDefinition = serde_json::from_value(value).map_err(|e| {
                PipelineError::InvalidDefinition(format!(
                    "Invalid task definition {}: {}",
                    path.display(),
                    e
                ))
            })?;
            if let Some(previous) = bundle.insert_task(task) {
                warn!("Task '{}' redefined by {}", previous.id, path.display());
            }
        }

        info!(
            "Loaded {} pipelines from {} and {} tasks from {}",
            bundle.pipelines.len(),
            pipelines_dir.display(),
            bundle.tasks.len(),
            tasks_dir.display()
        );

        Ok(bundle)
    }

    /// Add a pipeline, returning any previous definition with the same name.
    pub fn insert_pipeline(&mut self, pipeline: PipelineDefinition) -> Option<PipelineDefinition> {
        self.pipelines.insert(pipeline.name.clone(), pipeline)
    }

    /// Add a task, returning any previous definition with the same id.
    pub fn insert_task(&mut self, task: TaskDefinition) -> Option<TaskDefinition> {
        self.tasks.insert(task.id.clone(), task)
    }

    pub fn with_pipeline(mut self, pipeline: PipelineDefinition) -> Self {
        self.insert_pipeline(pipeline);
        self
    }

    pub fn with_task(mut self, task: TaskDefinition) -> Self {
        self.insert_task(task);
        self
    }

    /// Look up a pipeline by name.
    pub fn pipeline(&self, name: &str) -> Result<&PipelineDefinition> {
        self.pipelines
            .get(name)
            .ok_or_else(|| PipelineError::PipelineNotFound(name.to_string()))
    }

    /// Look up a task by id.
    pub fn task(&self, id: &str) -> Result<&TaskDefinition> {
        self.tasks
            .get(id)
            .ok_or_else(|| PipelineError::TaskNotFound(id.to_string()))
    }

    pub fn get_pipeline(&self, name: &str) -> Option<&PipelineDefinition> {
        self.pipelines.get(name)
    }

    pub fn get_task(&self, id: &str) -> Option<&TaskDefinition> {
        self.tasks.get(id)
    }

    /// Pipeline names, sorted.
    pub fn pipeline_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.pipelines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Task ids, sorted.
    pub fn task_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Check if a path looks like a pipeline definition.
    fn is_pipeline_file(path: &Path) -> bool {
        path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(PIPELINE_SUFFIX))
    }

    /// Check if a path looks like a task definition.
    fn is_task_file(path: &Path) -> bool {
        path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json")
    }
}

/// Directory entries sorted by file name.
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        PipelineError::InvalidDefinition(format!(
            "Failed to read definition directory {}: {}",
            dir.display(),
            e
        ))
    })?;
    let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
    paths.sort();
    Ok(paths)
}
