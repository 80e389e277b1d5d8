//! Declarative, resumable content-generation pipelines.
//!
//! Pipelines are JSON documents composing remote generation tasks. The
//! [`PipelineRunner`] executes one pipeline against one asset directory,
//! recording every step in the asset's `manifest.json` so an interrupted run
//! can be resumed without repeating remote work.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  PipelineRunner                                         │
//! │  - DefinitionBundle (tasks + pipelines)                 │
//! │  - GenerationApi (create, stream/poll, download)        │
//! │  - Lookup tables + environment for bindings             │
//! └──────────────┬──────────────────────────┬───────────────┘
//!                │ run(RunOptions)          │ validate()
//!                ▼                          ▼
//!   asset_dir/manifest.json        ValidationReport
//!   asset_dir/<artifacts>          (errors, warnings)
//! ```

pub mod definition;
pub mod error;
pub mod loader;
pub mod lookup;
pub mod manifest;
pub mod path;
pub mod resolve;
pub mod runner;
pub mod setup;
pub mod template;
pub mod validator;

pub use definition::{
    BindingSource, ForEachSpec, HttpMethod, InputBinding, OutputBinding, PipelineDefinition,
    PipelineStep, PollConfig, PollStrategy, TaskDefinition, effective_bindings,
};
pub use error::{PipelineError, Result};
pub use loader::DefinitionBundle;
pub use lookup::{LookupTable, LookupTables, load_lookup_table};
pub use manifest::{AssetManifest, MANIFEST_FILE, TaskState};
pub use resolve::{Resolution, ResolveContext, StepOutputs, resolve_binding, resolve_for_each};
pub use runner::{PipelineRunner, RunOptions, StepResult};
pub use setup::build_runner;
pub use template::{TemplateVars, apply_template};
pub use validator::{ValidationOptions, ValidationReport, validate};
