//! Plugin host: scoped extension points and the built-in plugins.
//!
//! Each scope has its own trait and contract:
//! - [`PluginScope::Experiment`]: runs before unit rendering; returns a JSON
//!   value that the orchestrator stores in `BuildContext::plugins` under the
//!   plugin's name.
//! - [`PluginScope::PostBuild`]: runs after unit rendering, for side effects
//!   on the staged output.
//!
//! Plugins run synchronously in registration order.

mod build_info;
mod extra_links;
mod iframe_resizer;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use labbuild_shared::{BuildOptions, LabBuildError, PluginEntry, PluginScope, Result};

use crate::context::BuildContext;
use crate::template::TemplateHost;

pub use build_info::BuildInfoPlugin;
pub use extra_links::ExtraLinksPlugin;
pub use iframe_resizer::IframeResizerPlugin;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Plugin invoked before unit rendering.
pub trait ExperimentPlugin: Send + Sync {
    /// Name used as the key of this plugin's output.
    fn name(&self) -> &str;

    /// Produce data for the unit renderer. Must not depend on other plugins'
    /// output of the same build.
    fn run(
        &self,
        ctx: &BuildContext,
        templates: &dyn TemplateHost,
        lab_data: &Value,
        options: &BuildOptions,
    ) -> Result<Value>;
}

/// Plugin invoked after unit rendering, for side effects only.
pub trait PostBuildPlugin: Send + Sync {
    /// Human-readable plugin name for tracing and errors.
    fn name(&self) -> &str;

    /// Post-process the staged build at `ctx.build_path`.
    fn run(&self, ctx: &BuildContext, options: &BuildOptions) -> Result<()>;
}

/// A registered plugin, tagged by scope.
pub enum Plugin {
    Experiment(Box<dyn ExperimentPlugin>),
    PostBuild(Box<dyn PostBuildPlugin>),
}

impl Plugin {
    pub fn scope(&self) -> PluginScope {
        match self {
            Self::Experiment(_) => PluginScope::Experiment,
            Self::PostBuild(_) => PluginScope::PostBuild,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Experiment(p) => p.name(),
            Self::PostBuild(p) => p.name(),
        }
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// Holds registered plugins in invocation order.
#[derive(Default)]
pub struct PluginHost {
    plugins: Vec<Plugin>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve configured entries against the built-in plugins.
    ///
    /// Unknown names and scope mismatches are configuration errors.
    pub fn from_config(entries: &[PluginEntry]) -> Result<Self> {
        let mut host = Self::new();
        for entry in entries {
            let plugin = builtin(entry)?;
            if plugin.scope() != entry.scope {
                return Err(LabBuildError::config(format!(
                    "plugin '{}' runs in scope '{}', not '{}'",
                    entry.name,
                    plugin.scope(),
                    entry.scope
                )));
            }
            host.register(plugin);
        }
        Ok(host)
    }

    pub fn register(&mut self, plugin: Plugin) {
        debug!(plugin = plugin.name(), scope = %plugin.scope(), "registered plugin");
        self.plugins.push(plugin);
    }

    pub fn register_experiment(&mut self, plugin: impl ExperimentPlugin + 'static) {
        self.register(Plugin::Experiment(Box::new(plugin)));
    }

    pub fn register_post_build(&mut self, plugin: impl PostBuildPlugin + 'static) {
        self.register(Plugin::PostBuild(Box::new(plugin)));
    }

    /// Names of the plugins registered for `scope`, in order.
    pub fn names(&self, scope: PluginScope) -> Vec<&str> {
        self.plugins
            .iter()
            .filter(|p| p.scope() == scope)
            .map(Plugin::name)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run every experiment-scope plugin and collect outputs keyed by name.
    ///
    /// Does not touch `ctx`; the caller assigns the returned value.
    #[instrument(skip_all, fields(scope = "experiment"))]
    pub fn run_experiment_scope(
        &self,
        ctx: &BuildContext,
        templates: &dyn TemplateHost,
        lab_data: &Value,
        options: &BuildOptions,
    ) -> Result<Value> {
        let mut outputs = Map::new();
        for plugin in &self.plugins {
            let Plugin::Experiment(plugin) = plugin else {
                continue;
            };
            let name = plugin.name();
            let output = plugin
                .run(ctx, templates, lab_data, options)
                .map_err(|e| attribute(name, e))?;
            info!(plugin = name, "experiment plugin finished");
            outputs.insert(name.to_string(), output);
        }
        Ok(Value::Object(outputs))
    }

    /// Run every post-build plugin for its side effects.
    #[instrument(skip_all, fields(scope = "post-build"))]
    pub fn run_post_build_scope(&self, ctx: &BuildContext, options: &BuildOptions) -> Result<()> {
        for plugin in &self.plugins {
            let Plugin::PostBuild(plugin) = plugin else {
                continue;
            };
            let name = plugin.name();
            plugin.run(ctx, options).map_err(|e| attribute(name, e))?;
            info!(plugin = name, "post-build plugin finished");
        }
        Ok(())
    }
}

/// Attach the plugin name to errors that do not already carry one.
fn attribute(name: &str, err: LabBuildError) -> LabBuildError {
    match err {
        LabBuildError::Plugin { .. } => err,
        other => LabBuildError::plugin(name, other.to_string()),
    }
}

/// Instantiate a built-in plugin from its config entry.
fn builtin(entry: &PluginEntry) -> Result<Plugin> {
    let settings = entry.settings.as_ref();
    let plugin = match entry.name.as_str() {
        BuildInfoPlugin::NAME => Plugin::Experiment(Box::new(BuildInfoPlugin::new(
            env!("CARGO_PKG_VERSION"),
        ))),
        ExtraLinksPlugin::NAME => {
            Plugin::Experiment(Box::new(ExtraLinksPlugin::from_settings(settings)?))
        }
        IframeResizerPlugin::NAME => Plugin::PostBuild(Box::new(IframeResizerPlugin)),
        other => {
            return Err(LabBuildError::config(format!("unknown plugin '{other}'")));
        }
    };
    Ok(plugin)
}
