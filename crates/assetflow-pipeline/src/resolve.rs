//! Binding resolution shared by the runner and the validator.
//!
//! Literal, env, manifest and lookup sources resolve the same way in both
//! places. Step outputs only exist at runtime, so they go through the
//! [`StepOutputs`] capability: the runner reads recorded results, the
//! validator answers [`Resolution::Deferred`].

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::definition::BindingSource;
use crate::lookup::LookupTables;
use crate::path::get_present;
use crate::template::{TemplateVars, apply_template};

/// Outcome of resolving one binding source.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A concrete value.
    Value(Value),
    /// Well-formed, but nothing is there.
    Missing,
    /// Only knowable at runtime, from the named step.
    Deferred { step: String },
    /// The binding itself is incomplete or references something undeclared.
    Invalid(String),
}

impl Resolution {
    fn from_found(value: Option<&Value>) -> Self {
        match value {
            Some(v) if !v.is_null() => Resolution::Value(v.clone()),
            _ => Resolution::Missing,
        }
    }

    /// The resolved value, if any.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Resolution::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Access to outputs of steps that have already run.
pub trait StepOutputs {
    /// Read `path` from the outputs of `step`. For fan-out steps only the
    /// last iteration is visible.
    fn step_output(&self, step: &str, path: &str) -> Resolution;
}

/// Everything a binding may read from.
pub struct ResolveContext<'a> {
    /// The manifest as a JSON document.
    pub manifest: &'a Value,
    pub env: &'a HashMap<String, String>,
    pub lookups: &'a LookupTables,
    pub vars: &'a TemplateVars,
    pub steps: &'a dyn StepOutputs,
}

/// Template variables for a step: iteration variables, then `seed` and
/// `assetId`.
pub fn template_vars(iteration_vars: &Map<String, Value>, seed: u32, asset_id: &str) -> TemplateVars {
    let mut vars = iteration_vars.clone();
    vars.insert("seed".to_string(), Value::from(seed));
    vars.insert("assetId".to_string(), Value::String(asset_id.to_string()));
    vars
}

/// Interpolate an optional path-like field. A blank field counts as absent;
/// a field that interpolates to nothing finds nothing.
fn templated(raw: Option<&String>, vars: &TemplateVars) -> Option<String> {
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| apply_template(s, vars))
}

/// Resolve one input binding source.
pub fn resolve_binding(source: &BindingSource, ctx: &ResolveContext<'_>) -> Resolution {
    match source {
        BindingSource::Literal { value, .. } => match value {
            Some(Value::String(s)) => Resolution::Value(Value::String(apply_template(s, ctx.vars))),
            other => Resolution::from_found(other.as_ref()),
        },
        BindingSource::Env { path } => match templated(path.as_ref(), ctx.vars) {
            Some(key) => match ctx.env.get(&key) {
                Some(v) => Resolution::Value(Value::String(v.clone())),
                None => Resolution::Missing,
            },
            None => Resolution::Invalid("Env binding missing key".to_string()),
        },
        BindingSource::Manifest { path } => match templated(path.as_ref(), ctx.vars) {
            Some(p) => Resolution::from_found(get_present(ctx.manifest, &p)),
            None => Resolution::Invalid("Manifest binding missing path".to_string()),
        },
        BindingSource::Step { step, path } => match (step, templated(path.as_ref(), ctx.vars)) {
            (Some(step), Some(p)) if !step.is_empty() => ctx.steps.step_output(step, &p),
            _ => Resolution::Invalid("Step binding missing step/path".to_string()),
        },
        BindingSource::Lookup { table, key, path } => {
            let table = match lookup_table(table.as_deref(), ctx) {
                Ok(t) => t,
                Err(invalid) => return invalid,
            };
            match templated(key.as_ref().or(path.as_ref()), ctx.vars) {
                Some(k) => Resolution::from_found(table.get(&k)),
                None => Resolution::Invalid("Lookup binding missing key".to_string()),
            }
        }
    }
}

/// Resolve a `forEach` source. The caller checks that the value is an array.
///
/// Differences from [`resolve_binding`]: a literal may give its array in
/// `value` or as a JSON string in `path`; env values holding a JSON array
/// are parsed; a lookup without a key yields every table value in order.
pub fn resolve_for_each(source: &BindingSource, ctx: &ResolveContext<'_>) -> Resolution {
    match source {
        BindingSource::Literal { value, path } => match (value, path) {
            (Some(Value::String(s)), _) => Resolution::Value(parse_array(&apply_template(s, ctx.vars))),
            (Some(v), _) if !v.is_null() => Resolution::Value(v.clone()),
            (_, Some(p)) => Resolution::Value(parse_array(&apply_template(p, ctx.vars))),
            _ => Resolution::Missing,
        },
        BindingSource::Env { path } => match templated(path.as_ref(), ctx.vars) {
            Some(key) => match ctx.env.get(&key) {
                Some(v) => Resolution::Value(parse_array(v)),
                None => Resolution::Missing,
            },
            None => Resolution::Invalid("Env binding missing key".to_string()),
        },
        BindingSource::Lookup { table, key, path } => {
            let table = match lookup_table(table.as_deref(), ctx) {
                Ok(t) => t,
                Err(invalid) => return invalid,
            };
            match templated(key.as_ref().or(path.as_ref()), ctx.vars) {
                Some(k) => Resolution::from_found(table.get(&k)),
                None => Resolution::Value(Value::Array(table.values().cloned().collect())),
            }
        }
        BindingSource::Manifest { .. } | BindingSource::Step { .. } => resolve_binding(source, ctx),
    }
}

fn lookup_table<'a>(
    table: Option<&str>,
    ctx: &ResolveContext<'a>,
) -> std::result::Result<&'a crate::lookup::LookupTable, Resolution> {
    let Some(name) = table.filter(|t| !t.is_empty()) else {
        return Err(Resolution::Invalid("Lookup binding missing table".to_string()));
    };
    ctx.lookups
        .get(name)
        .ok_or_else(|| Resolution::Invalid(format!("Lookup table '{}' missing", name)))
}

/// A string holding a JSON array becomes that array; anything else stays a
/// string.
fn parse_array(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => Value::Array(items),
        _ => Value::String(raw.to_string()),
    }
}
