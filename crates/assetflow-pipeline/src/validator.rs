//! Static checks of a pipeline against a candidate manifest.
//!
//! Validation performs no network I/O. It resolves every binding the way
//! the runner would, except that step outputs cannot be known ahead of time:
//! step-sourced bindings only have their reference checked and are reported
//! as warnings.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::definition::{
    BindingSource, InputBinding, PipelineDefinition, PipelineStep, TaskDefinition,
    effective_bindings,
};
use crate::loader::DefinitionBundle;
use crate::lookup::LookupTables;
use crate::manifest::AssetManifest;
use crate::resolve::{
    ResolveContext, Resolution, StepOutputs, resolve_binding, resolve_for_each, template_vars,
};

/// Inputs to [`validate`].
#[derive(Debug, Clone, Copy)]
pub struct ValidationOptions<'a> {
    pub definitions: &'a DefinitionBundle,
    pub pipeline_name: &'a str,
    /// Candidate manifest document.
    pub manifest: &'a Value,
    pub env: &'a HashMap<String, String>,
    pub lookups: &'a LookupTables,
}

/// Errors would fail a run; warnings are things that cannot be checked
/// statically or may be intentional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// No errors were found.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: String) {
        if !self.errors.contains(&message) {
            self.errors.push(message);
        }
    }

    fn warning(&mut self, message: String) {
        if !self.warnings.contains(&message) {
            self.warnings.push(message);
        }
    }
}

/// Step references are checked against the pipeline's declared steps.
struct DeclaredSteps<'a>(&'a PipelineDefinition);

impl StepOutputs for DeclaredSteps<'_> {
    fn step_output(&self, step: &str, _path: &str) -> Resolution {
        if self.0.has_step(step) {
            Resolution::Deferred {
                step: step.to_string(),
            }
        } else {
            Resolution::Invalid(format!("Step binding references missing step '{}'", step))
        }
    }
}

/// Validate a pipeline against a manifest.
pub fn validate(options: &ValidationOptions<'_>) -> ValidationReport {
    let mut report = ValidationReport::default();

    if let Err(e) = AssetManifest::from_value(options.manifest) {
        report.error(format!("Manifest schema invalid: {}", e));
        return report;
    }

    let Some(pipeline) = options.definitions.get_pipeline(options.pipeline_name) else {
        report.error(format!(
            "Pipeline definition not found: {}",
            options.pipeline_name
        ));
        return report;
    };

    for issue in pipeline.structural_issues() {
        report.error(issue);
    }

    let seed = options
        .manifest
        .get("seed")
        .and_then(Value::as_u64)
        .and_then(|s| u32::try_from(s).ok())
        .unwrap_or(0);
    let asset_id = options
        .manifest
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let steps = DeclaredSteps(pipeline);

    for step in &pipeline.steps {
        let Some(task) = options.definitions.get_task(&step.task) else {
            report.error(format!(
                "Task definition not found for step '{}': {}",
                step.id, step.task
            ));
            continue;
        };

        let check = StepCheck {
            options,
            steps: &steps,
            task,
            step,
            seed,
            asset_id,
        };

        let Some(ref for_each) = step.for_each else {
            check.bindings(&Map::new(), false, &mut report);
            continue;
        };

        let source = check.with_context(&Map::new(), |ctx| resolve_for_each(&for_each.source, ctx));
        match source {
            Resolution::Deferred { step: from } => {
                report.warning(format!(
                    "forEach source uses step '{}' and cannot be resolved at validate-time.",
                    from
                ));
                let mut iteration = Map::new();
                iteration.insert(for_each.var.clone(), Value::Null);
                iteration.insert(for_each.index_var(), Value::from(0));
                check.bindings(&iteration, true, &mut report);
            }
            Resolution::Invalid(reason) => {
                report.error(format!("{} for forEach of step '{}'.", reason, step.id));
            }
            Resolution::Value(Value::Array(items)) => {
                for (index, item) in items.into_iter().enumerate() {
                    let mut iteration = Map::new();
                    iteration.insert(for_each.var.clone(), item);
                    iteration.insert(for_each.index_var(), Value::from(index));
                    check.bindings(&iteration, false, &mut report);
                }
            }
            Resolution::Value(_) | Resolution::Missing => {
                report.error(format!(
                    "forEach source for step '{}' did not resolve to an array.",
                    step.id
                ));
            }
        }
    }

    report
}

/// Binding checks for one step.
struct StepCheck<'a> {
    options: &'a ValidationOptions<'a>,
    steps: &'a DeclaredSteps<'a>,
    task: &'a TaskDefinition,
    step: &'a PipelineStep,
    seed: u32,
    asset_id: &'a str,
}

impl StepCheck<'_> {
    fn with_context<T>(
        &self,
        iteration: &Map<String, Value>,
        f: impl FnOnce(&ResolveContext<'_>) -> T,
    ) -> T {
        let vars = template_vars(iteration, self.seed, self.asset_id);
        let ctx = ResolveContext {
            manifest: self.options.manifest,
            env: self.options.env,
            lookups: self.options.lookups,
            vars: &vars,
            steps: self.steps,
        };
        f(&ctx)
    }

    /// Check every effective binding. With `relaxed`, unresolved required
    /// inputs are warnings: the iteration value they depend on is unknown.
    fn bindings(&self, iteration: &Map<String, Value>, relaxed: bool, report: &mut ValidationReport) {
        self.with_context(iteration, |ctx| {
            for binding in effective_bindings(self.task, self.step) {
                self.binding(binding, ctx, relaxed, report);
            }
        });
    }

    fn binding(
        &self,
        binding: &InputBinding,
        ctx: &ResolveContext<'_>,
        relaxed: bool,
        report: &mut ValidationReport,
    ) {
        match resolve_binding(&binding.source, ctx) {
            Resolution::Value(_) => {}
            Resolution::Deferred { step } => report.warning(format!(
                "Step binding '{}' resolved at runtime from step '{}'.",
                binding.name, step
            )),
            Resolution::Invalid(reason) => {
                report.error(format!("{} for '{}'.", reason, binding.name));
            }
            Resolution::Missing if binding.default.is_some() => {}
            Resolution::Missing if binding.source.is_required() => {
                let message = format!(
                    "Missing required input '{}' for step '{}' (task '{}').",
                    binding.name, self.step.id, self.task.id
                );
                if relaxed {
                    report.warning(message);
                } else {
                    report.error(message);
                }
            }
            Resolution::Missing => {
                if matches!(binding.source, BindingSource::Literal { .. }) {
                    report.warning(format!(
                        "Optional literal input '{}' has no value for step '{}'.",
                        binding.name, self.step.id
                    ));
                }
            }
        }
    }
}
