//! `extra-links`: adds configured links after the unit entries of the menu.

use serde::Deserialize;
use serde_json::{Value, json};

use labbuild_shared::{BuildOptions, LabBuildError, Result};

use super::ExperimentPlugin;
use crate::context::BuildContext;
use crate::template::TemplateHost;
use crate::unit_tree::MenuLink;

#[derive(Debug, Default, Deserialize)]
struct Settings {
    #[serde(default)]
    links: Vec<MenuLink>,
}

/// Contributes `menu: [{label, href}]`, which the unit renderer appends to
/// every page's menu.
pub struct ExtraLinksPlugin {
    links: Vec<MenuLink>,
}

impl ExtraLinksPlugin {
    pub const NAME: &'static str = "extra-links";

    pub fn new(links: Vec<MenuLink>) -> Self {
        Self { links }
    }

    /// Parse `{ links = [{ label, href }] }` from plugin settings.
    pub fn from_settings(settings: Option<&Value>) -> Result<Self> {
        let settings = match settings {
            Some(value) => serde_json::from_value::<Settings>(value.clone()).map_err(|e| {
                LabBuildError::config(format!("invalid settings for '{}': {e}", Self::NAME))
            })?,
            None => Settings::default(),
        };
        Ok(Self::new(settings.links))
    }
}

impl ExperimentPlugin for ExtraLinksPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(
        &self,
        _ctx: &BuildContext,
        _templates: &dyn TemplateHost,
        _lab_data: &Value,
        _options: &BuildOptions,
    ) -> Result<Value> {
        Ok(json!({ "menu": self.links }))
    }
}
