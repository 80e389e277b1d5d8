//! Wiring a runner from configuration.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use assetflow_client::GenerationClient;
use assetflow_config::{EngineConfig, resolve_api_key};
use tracing::info;

use crate::error::Result;
use crate::loader::DefinitionBundle;
use crate::lookup::{LookupTables, load_lookup_table};
use crate::runner::PipelineRunner;

/// Build a [`PipelineRunner`] from an engine config.
///
/// Relative paths resolve against `base_dir`. `env` supplies the API key and
/// becomes the runner's environment for `env` bindings.
pub fn build_runner(
    config: &EngineConfig,
    base_dir: &Path,
    env: HashMap<String, String>,
) -> Result<PipelineRunner> {
    let mut config = config.clone();
    config.definitions.get_or_insert_with(Default::default);
    config.resolve_paths(base_dir);

    let api = config.api();
    let secret = resolve_api_key(&api, &env)?;
    info!(source = %secret.source, "Resolved API key");

    let client = GenerationClient::builder()
        .base_url(api.base_url.clone())
        .api_key(secret.value)
        .timeout(Duration::from_secs(api.timeout_secs))
        .stream_timeout(Duration::from_secs(api.stream_timeout_secs))
        .max_retries(api.max_retries)
        .retry_delay(Duration::from_millis(api.retry_delay_ms))
        .build()?;

    let dirs = config.definitions();
    let definitions = DefinitionBundle::load(&dirs.pipelines_dir, &dirs.tasks_dir)?;

    let mut lookups = LookupTables::new();
    for (name, source) in &config.lookups {
        let table = load_lookup_table(&source.path, source.pointer.as_deref())?;
        lookups.insert(name.clone(), table);
    }

    Ok(PipelineRunner::new(definitions, Arc::new(client))
        .with_lookups(lookups)
        .with_env(env)
        .with_poll_interval(Duration::from_millis(api.poll_interval_ms)))
}
