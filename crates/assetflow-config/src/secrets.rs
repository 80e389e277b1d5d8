//! API key resolution.
//!
//! Resolution order:
//! 1. Environment variable named by `api.api_key_env`
//! 2. Config file (with warning at load time)
//!
//! The environment is passed in explicitly so callers can substitute a
//! hypothetical one.

use std::collections::HashMap;

use crate::{ApiConfig, ConfigError, Result};

/// Result of API key resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Environment variable.
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve the API key for the configured API.
pub fn resolve_api_key(api: &ApiConfig, env: &HashMap<String, String>) -> Result<ResolvedSecret> {
    if let Some(value) = env.get(&api.api_key_env)
        && !value.is_empty()
    {
        return Ok(ResolvedSecret {
            value: value.clone(),
            source: SecretSource::EnvVar(api.api_key_env.clone()),
        });
    }

    if let Some(ref value) = api.api_key
        && !value.is_empty()
    {
        return Ok(ResolvedSecret {
            value: value.clone(),
            source: SecretSource::ConfigFile,
        });
    }

    Err(ConfigError::ApiKeyNotFound {
        env_var: api.api_key_env.clone(),
    })
}
