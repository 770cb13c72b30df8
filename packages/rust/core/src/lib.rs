//! Core build orchestration for labbuild.
//!
//! This crate ties together staging, the unit tree renderer, the plugin
//! host, and the validation runner into the experiment build lifecycle
//! (`init` → `validate` → `build`).

pub mod context;
pub mod experiment;
pub mod plugin;
pub mod staging;
pub mod template;
pub mod unit_tree;
pub mod validation;

pub use context::BuildContext;
pub use experiment::{BuildOutcome, Experiment, ProgressReporter, SilentProgress};
pub use plugin::{ExperimentPlugin, Plugin, PluginHost, PostBuildPlugin};
pub use template::{TemplateHost, Templates};
pub use unit_tree::{MenuItem, MenuLink, RenderedPage, UnitTree};
pub use validation::{CommandValidator, ValidationReport, ValidationRunner};
