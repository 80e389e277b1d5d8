//! Configuration system for the assetflow pipeline engine.
//!
//! Provides TOML-based configuration with:
//! - Remote API connection settings (`[api]`)
//! - Definition directories (`[definitions]`)
//! - Named lookup table sources (`[lookups.NAME]`)
//! - Config file layering (user config + project-local overrides)
//! - API key resolution (env var → config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    load_config, load_config_file, load_config_with_options, save_config, user_config_dir,
    user_config_path, ConfigSource, LoadedConfig,
};
pub use error::{ConfigError, Result};
pub use secrets::{resolve_api_key, ResolvedSecret, SecretSource};
pub use types::*;
