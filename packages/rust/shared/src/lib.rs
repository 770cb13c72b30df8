//! Shared types, error model, and configuration for labbuild.
//!
//! This crate is the foundation depended on by all other labbuild crates.
//! It provides:
//! - [`LabBuildError`]: the unified error type
//! - Domain types ([`ExperimentDescriptor`], [`UnitSpec`], [`BuildOptions`], [`PluginScope`])
//! - Configuration ([`AppConfig`], [`ExperimentConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ExperimentConfig, PluginEntry, ValidationConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{LabBuildError, Result};
pub use types::{BuildOptions, ContentType, ExperimentDescriptor, PluginScope, UnitSpec, UnitType};
