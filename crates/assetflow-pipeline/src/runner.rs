//! Pipeline execution against an asset manifest.
//!
//! A run walks the pipeline's steps in declaration order. Each step resolves
//! its inputs, creates a remote task, waits for it to finish, maps the
//! response into named outputs, downloads artifacts and records the task
//! state in the manifest. The manifest is written after every step, so an
//! interrupted run resumes where it stopped:
//!
//! - a step whose task already `SUCCEEDED` with a recorded remote id is not
//!   re-run; missing artifact files are re-downloaded instead (backfill)
//! - a step is never started before the steps it `dependsOn` have results

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use assetflow_client::{GenerationApi, TaskRecord, TaskStatus};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::definition::{
    ForEachSpec, HttpMethod, OutputBinding, PipelineDefinition, PipelineStep, PollStrategy,
    TaskDefinition, effective_bindings,
};
use crate::error::{PipelineError, Result};
use crate::loader::DefinitionBundle;
use crate::lookup::{LookupTable, LookupTables};
use crate::manifest::{AssetManifest, TaskState};
use crate::path::{get_path, set_path};
use crate::resolve::{
    ResolveContext, Resolution, StepOutputs, resolve_binding, resolve_for_each, template_vars,
};
use crate::template::{TemplateVars, apply_template};

/// Default interval between status polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on polling a single task.
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(600);

/// What to run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Pipeline definition name.
    pub pipeline_name: String,
    /// Directory holding `manifest.json`; artifacts are written here.
    pub asset_dir: PathBuf,
    /// Run only this step.
    pub step: Option<String>,
}

impl RunOptions {
    pub fn new(pipeline_name: impl Into<String>, asset_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            asset_dir: asset_dir.into(),
            step: None,
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }
}

/// Outcome of one task execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub task_id: Option<String>,
    pub status: TaskStatus,
    pub outputs: Map<String, Value>,
    pub artifacts: IndexMap<String, String>,
}

impl StepResult {
    fn from_state(state: &TaskState) -> Self {
        Self {
            task_id: state.task_id.clone(),
            status: state.status.unwrap_or_default(),
            outputs: state.outputs.clone(),
            artifacts: state.artifacts.clone(),
        }
    }

    /// Succeeded remotely with a known job id.
    pub fn is_complete(&self) -> bool {
        self.status == TaskStatus::Succeeded && self.task_id.is_some()
    }
}

/// Recorded result(s) of a step within a run.
#[derive(Debug, Clone)]
enum StepRecord {
    Single(StepResult),
    /// One result per `forEach` element, in order.
    FanOut(Vec<StepResult>),
}

impl StepRecord {
    fn first_mut(&mut self) -> Option<&mut StepResult> {
        match self {
            StepRecord::Single(r) => Some(r),
            StepRecord::FanOut(rs) => rs.first_mut(),
        }
    }

    fn first(&self) -> Option<&StepResult> {
        match self {
            StepRecord::Single(r) => Some(r),
            StepRecord::FanOut(rs) => rs.first(),
        }
    }

    fn latest(&self) -> Option<&StepResult> {
        match self {
            StepRecord::Single(r) => Some(r),
            StepRecord::FanOut(rs) => rs.last(),
        }
    }
}

/// Runtime state of one `run()` call.
struct ExecutionContext {
    manifest: AssetManifest,
    manifest_path: PathBuf,
    asset_dir: PathBuf,
    step_results: HashMap<String, StepRecord>,
    /// Fan-out variables currently in scope.
    iteration_vars: Map<String, Value>,
    seed: u32,
}

impl ExecutionContext {
    fn template_vars(&self) -> TemplateVars {
        template_vars(&self.iteration_vars, self.seed, &self.manifest.id)
    }
}

/// Step outputs recorded so far in this run.
struct RecordedOutputs<'a>(&'a HashMap<String, StepRecord>);

impl StepOutputs for RecordedOutputs<'_> {
    fn step_output(&self, step: &str, path: &str) -> Resolution {
        let Some(latest) = self.0.get(step).and_then(StepRecord::latest) else {
            return Resolution::Missing;
        };
        let outputs = Value::Object(latest.outputs.clone());
        match get_path(&outputs, path) {
            Some(v) if !v.is_null() => Resolution::Value(v.clone()),
            _ => Resolution::Missing,
        }
    }
}

/// Executes pipelines against asset manifests.
pub struct PipelineRunner {
    definitions: Arc<DefinitionBundle>,
    api: Arc<dyn GenerationApi>,
    lookups: LookupTables,
    env: HashMap<String, String>,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("pipelines", &self.definitions.pipeline_names())
            .field("tasks", &self.definitions.task_ids())
            .field("lookups", &self.lookups.len())
            .field("poll_interval", &self.poll_interval)
            .field("poll_timeout", &self.poll_timeout)
            .finish_non_exhaustive()
    }
}

impl PipelineRunner {
    /// Create a runner. The environment defaults to a snapshot of the
    /// process environment.
    pub fn new(definitions: impl Into<Arc<DefinitionBundle>>, api: Arc<dyn GenerationApi>) -> Self {
        Self {
            definitions: definitions.into(),
            api,
            lookups: LookupTables::new(),
            env: std::env::vars().collect(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    /// Replace all lookup tables.
    pub fn with_lookups(mut self, lookups: LookupTables) -> Self {
        self.lookups = lookups;
        self
    }

    /// Add one lookup table.
    pub fn with_lookup(mut self, name: impl Into<String>, table: LookupTable) -> Self {
        self.lookups.insert(name.into(), table);
        self
    }

    /// Replace the environment `env` bindings read from.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Poll interval for tasks that don't set `poll.intervalMs`.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Poll timeout for tasks that don't set `poll.timeoutMs`.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn definitions(&self) -> &DefinitionBundle {
        &self.definitions
    }

    /// Run a pipeline against the manifest in `options.asset_dir`.
    ///
    /// Returns the updated manifest, which has also been written to disk.
    pub async fn run(&self, options: &RunOptions) -> Result<AssetManifest> {
        let pipeline = self.definitions.pipeline(&options.pipeline_name)?;
        self.check_pipeline(pipeline)?;

        let steps: Vec<&PipelineStep> = match options.step {
            Some(ref id) => {
                let step = pipeline.step(id).ok_or_else(|| PipelineError::StepNotFound {
                    pipeline: pipeline.name.clone(),
                    step: id.clone(),
                })?;
                vec![step]
            }
            None => pipeline.steps.iter().collect(),
        };

        let manifest_path = AssetManifest::path_in(&options.asset_dir);
        let mut manifest = AssetManifest::load(&manifest_path)?;
        let seed = ensure_seed(&mut manifest, &manifest_path)?;

        let mut ctx = ExecutionContext {
            manifest,
            manifest_path,
            asset_dir: options.asset_dir.clone(),
            step_results: HashMap::new(),
            iteration_vars: Map::new(),
            seed,
        };
        load_existing_results(pipeline, &mut ctx);

        info!(
            pipeline = %pipeline.name,
            asset = %ctx.manifest.id,
            steps = steps.len(),
            "Running pipeline"
        );

        for step in steps {
            self.execute_step(step, pipeline, &mut ctx).await?;
            ctx.manifest.save(&ctx.manifest_path)?;
        }

        info!(pipeline = %pipeline.name, asset = %ctx.manifest.id, "Pipeline complete");
        Ok(ctx.manifest)
    }

    /// Reject structurally broken pipelines before anything runs.
    fn check_pipeline(&self, pipeline: &PipelineDefinition) -> Result<()> {
        let issues = pipeline.structural_issues();
        if !issues.is_empty() {
            return Err(PipelineError::InvalidDefinition(issues.join(" ")));
        }
        for step in &pipeline.steps {
            self.definitions.task(&step.task)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Steps
    // ─────────────────────────────────────────────────────────────────────────

    async fn execute_step(
        &self,
        step: &PipelineStep,
        pipeline: &PipelineDefinition,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        for dep in &step.depends_on {
            if !ctx.step_results.contains_key(dep) {
                return Err(PipelineError::DependencyNotMet {
                    step: step.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        if let Some(ref for_each) = step.for_each {
            return self.execute_for_each(step, for_each, pipeline, ctx).await;
        }

        let result = self.execute_task(step, ctx).await?;
        apply_state_mapping(pipeline, step, ctx, &result)?;
        ctx.step_results
            .insert(step.id.clone(), StepRecord::Single(result));
        Ok(())
    }

    async fn execute_for_each(
        &self,
        step: &PipelineStep,
        for_each: &ForEachSpec,
        pipeline: &PipelineDefinition,
        ctx: &mut ExecutionContext,
    ) -> Result<()> {
        let resolution = {
            let manifest_doc = ctx.manifest.to_value()?;
            let vars = ctx.template_vars();
            let steps = RecordedOutputs(&ctx.step_results);
            let rc = ResolveContext {
                manifest: &manifest_doc,
                env: &self.env,
                lookups: &self.lookups,
                vars: &vars,
                steps: &steps,
            };
            resolve_for_each(&for_each.source, &rc)
        };
        let Resolution::Value(Value::Array(items)) = resolution else {
            return Err(PipelineError::ForEachNotArray(step.id.clone()));
        };

        info!(step = %step.id, iterations = items.len(), "Fanning out");

        let index_var = for_each.index_var();
        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            ctx.iteration_vars.insert(for_each.var.clone(), item);
            ctx.iteration_vars
                .insert(index_var.clone(), Value::from(index));
            let outcome = self.execute_task(step, ctx).await;
            if outcome.is_err() {
                ctx.iteration_vars.remove(&for_each.var);
                ctx.iteration_vars.remove(&index_var);
            }
            results.push(outcome?);
        }
        ctx.iteration_vars.remove(&for_each.var);
        ctx.iteration_vars.remove(&index_var);

        if let Some(latest) = results.last() {
            apply_state_mapping(pipeline, step, ctx, latest)?;
        }
        ctx.step_results
            .insert(step.id.clone(), StepRecord::FanOut(results));
        Ok(())
    }

    /// Run the step's task once, or skip it if it already succeeded.
    async fn execute_task(
        &self,
        step: &PipelineStep,
        ctx: &mut ExecutionContext,
    ) -> Result<StepResult> {
        let task = self.definitions.task(&step.task)?;
        let download = !step.skip_artifacts;

        let existing = ctx
            .step_results
            .get(&step.id)
            .and_then(StepRecord::first)
            .filter(|r| r.is_complete())
            .cloned();
        if let Some(mut existing) = existing {
            info!(
                step = %step.id,
                task = %task.id,
                "Step already succeeded, {}",
                if download { "checking artifacts" } else { "skipping artifacts" }
            );
            if download {
                let recovered = self.backfill_artifacts(task, &existing, ctx).await;
                // A fan-out step records only its last iteration, so files
                // restored for earlier iterations stay off the record.
                if !recovered.is_empty() && ctx.iteration_vars.is_empty() {
                    existing.artifacts.extend(recovered.clone());
                    if let Some(record) = ctx
                        .step_results
                        .get_mut(&step.id)
                        .and_then(StepRecord::first_mut)
                    {
                        record.artifacts.extend(recovered.clone());
                    }
                    if let Some(state) = ctx.manifest.tasks.get_mut(&task.id) {
                        state.artifacts.extend(recovered);
                    }
                }
            }
            return Ok(existing);
        }

        let inputs = self.resolve_inputs(task, step, ctx)?;

        info!(step = %step.id, task = %task.id, "Running step");
        let (task_id, record) = self.run_remote_task(task, inputs).await?;

        if record.status.is_failure() {
            return Err(PipelineError::TaskFailed {
                task: task.id.clone(),
                task_id,
                status: record.status,
                message: record
                    .error_message()
                    .unwrap_or("no error message")
                    .to_string(),
            });
        }

        let mut outputs = map_outputs(task, &record.payload());
        outputs.insert("taskId".to_string(), Value::String(task_id.clone()));

        let artifacts = if download {
            self.download_artifacts(task, &outputs, ctx).await?
        } else {
            IndexMap::new()
        };

        ctx.manifest.tasks.insert(
            task.id.clone(),
            TaskState {
                task_id: Some(task_id.clone()),
                status: Some(record.status),
                outputs: outputs.clone(),
                artifacts: artifacts.clone(),
                extra: Map::new(),
            },
        );

        Ok(StepResult {
            task_id: Some(task_id),
            status: record.status,
            outputs,
            artifacts,
        })
    }

    /// Resolve the effective bindings. Unresolved bindings without a
    /// default are left out.
    fn resolve_inputs(
        &self,
        task: &TaskDefinition,
        step: &PipelineStep,
        ctx: &ExecutionContext,
    ) -> Result<Map<String, Value>> {
        let manifest_doc = ctx.manifest.to_value()?;
        let vars = ctx.template_vars();
        let steps = RecordedOutputs(&ctx.step_results);
        let rc = ResolveContext {
            manifest: &manifest_doc,
            env: &self.env,
            lookups: &self.lookups,
            vars: &vars,
            steps: &steps,
        };

        let mut resolved = Map::new();
        for binding in effective_bindings(task, step) {
            let value = match resolve_binding(&binding.source, &rc) {
                Resolution::Value(v) => Some(v),
                Resolution::Invalid(reason) => {
                    debug!(step = %step.id, input = %binding.name, %reason, "Binding not resolvable");
                    binding.default.clone()
                }
                Resolution::Missing | Resolution::Deferred { .. } => binding.default.clone(),
            };
            if let Some(value) = value {
                resolved.insert(binding.name.clone(), value);
            }
        }
        Ok(resolved)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Remote tasks
    // ─────────────────────────────────────────────────────────────────────────

    /// Create the remote task and wait for it to finish.
    async fn run_remote_task(
        &self,
        task: &TaskDefinition,
        inputs: Map<String, Value>,
    ) -> Result<(String, TaskRecord)> {
        if task.method != HttpMethod::Post {
            return Err(PipelineError::UnsupportedMethod {
                task: task.id.clone(),
                method: task.method.to_string(),
            });
        }

        let payload: Map<String, Value> = inputs
            .into_iter()
            .filter(|(_, v)| !matches!(v, Value::String(s) if s.is_empty()))
            .collect();

        let created = self
            .api
            .post(&task.create_path(), &Value::Object(payload))
            .await?;
        let task_id = ["result", "id"]
            .iter()
            .find_map(|key| created.get(*key).and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| PipelineError::TaskCreationFailed {
                task: task.id.clone(),
                response: created.to_string(),
            })?;
        info!(task = %task.id, task_id = %task_id, "Remote task created");

        let mut record = match task.poll_strategy() {
            PollStrategy::Stream => {
                self.api
                    .stream_until_complete(&task.stream_path(&task_id))
                    .await?
            }
            PollStrategy::Poll => {
                let (interval, timeout) = self.poll_settings(task);
                self.api
                    .poll_until_complete(&task.task_path(&task_id), interval, timeout)
                    .await?
            }
        };
        info!(task = %task.id, task_id = %task_id, status = %record.status, "Remote task finished");

        if record.result.is_none() {
            debug!(task_id = %task_id, "No result payload, fetching task");
            let fetched = self.api.get(&task.task_path(&task_id)).await?;
            record = merge_fetched(&record, &fetched)?;
        }
        record.id = Some(task_id.clone());

        Ok((task_id, record))
    }

    fn poll_settings(&self, task: &TaskDefinition) -> (Duration, Duration) {
        let poll = task.poll.as_ref();
        let interval = poll
            .and_then(|p| p.interval_ms)
            .map(Duration::from_millis)
            .unwrap_or(self.poll_interval);
        let timeout = poll
            .and_then(|p| p.timeout_ms)
            .map(Duration::from_millis)
            .unwrap_or(self.poll_timeout);
        (interval, timeout)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Artifacts
    // ─────────────────────────────────────────────────────────────────────────

    /// Download every artifact output of a fresh execution.
    async fn download_artifacts(
        &self,
        task: &TaskDefinition,
        outputs: &Map<String, Value>,
        ctx: &ExecutionContext,
    ) -> Result<IndexMap<String, String>> {
        let vars = ctx.template_vars();
        let mut artifacts = IndexMap::new();

        for (output, template) in task.artifact_outputs() {
            match outputs.get(&output.name) {
                Some(Value::String(url)) => {
                    if url.trim().is_empty() {
                        continue;
                    }
                    let filename = apply_template(template, &vars);
                    self.fetch_artifact(url, &filename, &ctx.asset_dir).await?;
                    artifacts.insert(output.name.clone(), filename);
                }
                Some(Value::Array(items)) => {
                    for (index, item) in items.iter().enumerate() {
                        let Some(url) = item.as_str().filter(|u| !u.trim().is_empty()) else {
                            continue;
                        };
                        let filename = indexed_filename(template, &vars, index);
                        self.fetch_artifact(url, &filename, &ctx.asset_dir).await?;
                        artifacts.insert(format!("{}.{}", output.name, index), filename);
                    }
                }
                _ => {}
            }
        }

        Ok(artifacts)
    }

    /// Re-download artifacts of a completed task that are missing on disk.
    ///
    /// Failures are logged; whatever could be recovered is returned.
    async fn backfill_artifacts(
        &self,
        task: &TaskDefinition,
        existing: &StepResult,
        ctx: &ExecutionContext,
    ) -> IndexMap<String, String> {
        let vars = ctx.template_vars();
        let mut recovered = IndexMap::new();

        let missing: Vec<(&OutputBinding, &str)> = task
            .artifact_outputs()
            .filter(|(output, template)| {
                let present = artifact_on_disk(output, template, existing, &ctx.asset_dir, &vars);
                if present {
                    debug!(output = %output.name, "Artifact already exists");
                }
                !present
            })
            .collect();
        if missing.is_empty() {
            return recovered;
        }

        let Some(task_id) = existing.task_id.as_deref() else {
            return recovered;
        };

        // Download URLs are not cached reliably, so ask for them again.
        let details = match self.api.get(&task.task_path(task_id)).await {
            Ok(details) => details,
            Err(e) => {
                warn!(task = %task.id, task_id, error = %e, "Failed to fetch task details");
                return recovered;
            }
        };
        let has_result = details.get("result").is_some();
        let wrapped = if has_result {
            Value::Null
        } else {
            let mut map = Map::new();
            map.insert("result".to_string(), details.clone());
            Value::Object(map)
        };

        for (output, template) in missing {
            let source = if output.response_path.starts_with("result.") && !has_result {
                &wrapped
            } else {
                &details
            };

            match get_path(source, &output.response_path) {
                Some(Value::String(url)) if !url.trim().is_empty() => {
                    let filename = apply_template(template, &vars);
                    match self.fetch_artifact(url, &filename, &ctx.asset_dir).await {
                        Ok(()) => {
                            recovered.insert(output.name.clone(), filename);
                        }
                        Err(e) => warn!(artifact = %filename, error = %e, "Backfill download failed"),
                    }
                }
                Some(Value::Array(items)) => {
                    for (index, item) in items.iter().enumerate() {
                        let Some(url) = item.as_str().filter(|u| !u.trim().is_empty()) else {
                            continue;
                        };
                        let filename = indexed_filename(template, &vars, index);
                        let key = format!("{}.{}", output.name, index);
                        if ctx.asset_dir.join(&filename).exists() {
                            recovered.insert(key, filename);
                            continue;
                        }
                        match self.fetch_artifact(url, &filename, &ctx.asset_dir).await {
                            Ok(()) => {
                                recovered.insert(key, filename);
                            }
                            Err(e) => {
                                warn!(artifact = %filename, error = %e, "Backfill download failed")
                            }
                        }
                    }
                }
                _ => warn!(output = %output.name, "No URL for artifact output"),
            }
        }

        recovered
    }

    async fn fetch_artifact(&self, url: &str, filename: &str, asset_dir: &Path) -> Result<()> {
        let target = asset_dir.join(filename);
        info!(artifact = %filename, "Downloading artifact");
        self.api.download(url, &target).await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Give the manifest a seed if it has none, persisting it right away.
fn ensure_seed(manifest: &mut AssetManifest, path: &Path) -> Result<u32> {
    if let Some(seed) = manifest.seed {
        return Ok(seed);
    }
    let seed = rand::random::<u32>();
    manifest.seed = Some(seed);
    manifest.save(path)?;
    info!(seed, asset = %manifest.id, "Assigned run seed");
    Ok(seed)
}

/// Seed the context with task state already in the manifest.
fn load_existing_results(pipeline: &PipelineDefinition, ctx: &mut ExecutionContext) {
    for step in &pipeline.steps {
        if let Some(state) = ctx.manifest.tasks.get(&step.task) {
            ctx.step_results.insert(
                step.id.clone(),
                StepRecord::Single(StepResult::from_state(state)),
            );
        }
    }
}

/// Combine a finished record that lacked `result` with a fresh task fetch.
fn merge_fetched(record: &TaskRecord, fetched: &Value) -> Result<TaskRecord> {
    let fetched_result = match fetched {
        Value::Object(map) if map.contains_key("result") => {
            map.get("result").filter(|v| !v.is_null()).cloned()
        }
        Value::Null => None,
        other => Some(other.clone()),
    };

    let mut combined = record.to_value();
    if let (Value::Object(base), Value::Object(extra)) = (&mut combined, fetched) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }

    let mut merged = TaskRecord::from_value(combined)?;
    merged.result = fetched_result.or_else(|| record.result.clone());
    Ok(merged)
}

/// Extract declared outputs from a response payload.
fn map_outputs(task: &TaskDefinition, payload: &Value) -> Map<String, Value> {
    let mut outputs = Map::new();
    for output in &task.outputs {
        if let Some(value) = get_path(payload, &output.response_path) {
            outputs.insert(output.name.clone(), value.clone());
        }
    }
    outputs
}

fn indexed_filename(template: &str, vars: &TemplateVars, index: usize) -> String {
    let mut vars = vars.clone();
    vars.insert("index".to_string(), Value::from(index));
    apply_template(template, &vars)
}

/// Whether an artifact output is fully present on disk. Array outputs are
/// checked through their recorded `<output>.<index>` files; everything else
/// through the filename templated with the current iteration's variables.
fn artifact_on_disk(
    output: &OutputBinding,
    template: &str,
    existing: &StepResult,
    asset_dir: &Path,
    vars: &TemplateVars,
) -> bool {
    let prefix = format!("{}.", output.name);
    let indexed: Vec<&String> = existing
        .artifacts
        .iter()
        .filter(|(name, _)| {
            name.strip_prefix(&prefix)
                .is_some_and(|rest| rest.parse::<usize>().is_ok())
        })
        .map(|(_, file)| file)
        .collect();

    if indexed.is_empty() {
        asset_dir.join(apply_template(template, vars)).exists()
    } else {
        indexed.iter().all(|file| asset_dir.join(file).exists())
    }
}

/// Write the step's mapped outputs into the manifest.
fn apply_state_mapping(
    pipeline: &PipelineDefinition,
    step: &PipelineStep,
    ctx: &mut ExecutionContext,
    result: &StepResult,
) -> Result<()> {
    let mapping = pipeline.state_mapping_for(step);
    if mapping.is_empty() {
        return Ok(());
    }

    let outputs = Value::Object(result.outputs.clone());
    let mut doc = ctx.manifest.to_value()?;
    let mut changed = false;
    for (manifest_path, output_path) in &mapping {
        if let Some(value) = get_path(&outputs, output_path) {
            changed |= set_path(&mut doc, manifest_path, value.clone());
        }
    }

    if changed {
        ctx.manifest =
            AssetManifest::from_value(&doc).map_err(|e| PipelineError::InvalidManifest {
                path: ctx.manifest_path.clone(),
                reason: format!("state mapping produced an invalid manifest: {}", e),
            })?;
    }
    Ok(())
}
