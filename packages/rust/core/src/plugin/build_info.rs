//! `build-info`: stamps build metadata into the context.

use chrono::Utc;
use serde_json::{Value, json};

use labbuild_shared::{BuildOptions, Result};

use super::ExperimentPlugin;
use crate::context::BuildContext;
use crate::template::TemplateHost;

/// Exposes `built_at`, `tool_version`, and `unit_count` to page templates
/// as `plugins.build-info.*`.
pub struct BuildInfoPlugin {
    tool_version: String,
}

impl BuildInfoPlugin {
    pub const NAME: &'static str = "build-info";

    pub fn new(tool_version: impl Into<String>) -> Self {
        Self {
            tool_version: tool_version.into(),
        }
    }
}

impl ExperimentPlugin for BuildInfoPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(
        &self,
        ctx: &BuildContext,
        _templates: &dyn TemplateHost,
        _lab_data: &Value,
        _options: &BuildOptions,
    ) -> Result<Value> {
        fn count(items: &[crate::unit_tree::MenuItem]) -> usize {
            items.iter().map(|i| 1 + count(&i.children)).sum()
        }

        Ok(json!({
            "built_at": Utc::now().to_rfc3339(),
            "tool_version": self.tool_version,
            "unit_count": count(&ctx.menu),
        }))
    }
}
