//! Core domain types for labbuild experiments.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LabBuildError, Result};

// ---------------------------------------------------------------------------
// Unit enums
// ---------------------------------------------------------------------------

/// Structural role of a descriptor entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Module,
    Unit,
    Task,
}

/// Kind of content a descriptor entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    /// Quiz content. Older descriptors spell it `assesment`.
    #[serde(alias = "assesment")]
    Assessment,
    Simulation,
    Video,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Assessment => "assessment",
            Self::Simulation => "simulation",
            Self::Video => "video",
        }
    }
}

// ---------------------------------------------------------------------------
// UnitSpec
// ---------------------------------------------------------------------------

/// One descriptor entry: a single piece of content and where it renders to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnitSpec {
    pub unit_type: UnitType,
    #[serde(default)]
    pub content_type: ContentType,
    /// Display label used in the menu and page title.
    pub label: String,
    /// Path of the content file, relative to the experiment content directory.
    #[serde(default)]
    pub source: String,
    /// Output filename, relative to the build root.
    #[serde(default)]
    pub target: String,
    /// Nested entries of a `module` or `unit`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub units: Vec<UnitSpec>,
}

impl UnitSpec {
    /// A text task pointing at `source`, rendered to `target`.
    pub fn text_task(label: &str, source: &str, target: &str) -> Self {
        Self {
            unit_type: UnitType::Task,
            content_type: ContentType::Text,
            label: label.into(),
            source: source.into(),
            target: target.into(),
            units: Vec::new(),
        }
    }

    pub fn is_assessment(&self) -> bool {
        self.content_type == ContentType::Assessment
    }
}

// ---------------------------------------------------------------------------
// ExperimentDescriptor
// ---------------------------------------------------------------------------

/// The experiment descriptor: an ordered list of units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDescriptor {
    pub units: Vec<UnitSpec>,
}

impl ExperimentDescriptor {
    /// Read and parse a descriptor file.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| LabBuildError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            LabBuildError::descriptor(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Append the feedback page. Calling this twice appends two entries.
    pub fn with_feedback(mut self) -> Self {
        self.units
            .push(UnitSpec::text_task("Feedback", "feedback.md", "feedback.html"));
        self
    }

    /// Append the contributors page. Calling this twice appends two entries.
    pub fn with_contributors(mut self) -> Self {
        self.units.push(UnitSpec::text_task(
            "Contributors",
            "contributors.md",
            "contributors.html",
        ));
        self
    }

    /// All units, depth-first in descriptor order.
    pub fn flatten(&self) -> Vec<&UnitSpec> {
        fn walk<'a>(units: &'a [UnitSpec], out: &mut Vec<&'a UnitSpec>) {
            for unit in units {
                out.push(unit);
                walk(&unit.units, out);
            }
        }

        let mut out = Vec::new();
        walk(&self.units, &mut out);
        out
    }
}

// ---------------------------------------------------------------------------
// Build options and plugin scopes
// ---------------------------------------------------------------------------

/// Flags consumed by the orchestrator.
///
/// Serialized names match the keys used by existing build scripts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Run the external linter over the content directory.
    #[serde(rename = "isESLINT", default)]
    pub lint: bool,
    /// Validate the descriptor and every assessment file.
    #[serde(rename = "isExpDesc", default)]
    pub validate_descriptor: bool,
    /// Invoke the plugin host at both scopes.
    #[serde(default)]
    pub plugins: bool,
}

/// Invocation point of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginScope {
    /// Before unit rendering; output is merged into the build context.
    Experiment,
    /// After unit rendering; run for side effects only.
    PostBuild,
}

impl PluginScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Experiment => "experiment",
            Self::PostBuild => "post-build",
        }
    }
}

impl std::fmt::Display for PluginScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PluginScope {
    type Err = LabBuildError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "experiment" => Ok(Self::Experiment),
            "post-build" => Ok(Self::PostBuild),
            other => Err(LabBuildError::config(format!(
                "unknown plugin scope '{other}': expected 'experiment' or 'post-build'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"{
        "units": [
            {
                "unit-type": "task",
                "content-type": "text",
                "label": "Introduction",
                "source": "intro.md",
                "target": "intro.html"
            },
            {
                "unit-type": "unit",
                "label": "Quizzes",
                "source": "quizzes.md",
                "target": "quizzes.html",
                "units": [
                    {
                        "unit-type": "task",
                        "content-type": "assesment",
                        "label": "Pretest",
                        "source": "pretest.json",
                        "target": "pretest.html"
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn descriptor_parses_kebab_case_fields() {
        let desc: ExperimentDescriptor = serde_json::from_str(DESCRIPTOR).expect("parse");
        assert_eq!(desc.units.len(), 2);
        assert_eq!(desc.units[0].unit_type, UnitType::Task);
        assert_eq!(desc.units[0].target, "intro.html");
        assert_eq!(desc.units[1].content_type, ContentType::Text);
        assert!(desc.units[1].units[0].is_assessment());
    }

    #[test]
    fn flatten_is_depth_first() {
        let desc: ExperimentDescriptor = serde_json::from_str(DESCRIPTOR).expect("parse");
        let sources: Vec<_> = desc.flatten().iter().map(|u| u.source.as_str()).collect();
        assert_eq!(sources, ["intro.md", "quizzes.md", "pretest.json"]);
    }

    #[test]
    fn feedback_then_contributors_order() {
        let desc: ExperimentDescriptor = serde_json::from_str(DESCRIPTOR).expect("parse");
        let desc = desc.with_feedback().with_contributors();
        let n = desc.units.len();
        assert_eq!(desc.units[n - 2].target, "feedback.html");
        assert_eq!(desc.units[n - 1].target, "contributors.html");
        assert_eq!(desc.units[n - 1].label, "Contributors");
    }

    #[test]
    fn feedback_is_not_idempotent() {
        let desc = ExperimentDescriptor::default().with_feedback().with_feedback();
        assert_eq!(desc.units.len(), 2);
        assert_eq!(desc.units[0], desc.units[1]);
    }

    #[test]
    fn build_options_use_script_keys() {
        let opts: BuildOptions =
            serde_json::from_str(r#"{"isESLINT": true, "plugins": true}"#).expect("parse");
        assert!(opts.lint);
        assert!(!opts.validate_descriptor);
        assert!(opts.plugins);
    }

    #[test]
    fn plugin_scope_parsing() {
        assert_eq!("post-build".parse::<PluginScope>().unwrap(), PluginScope::PostBuild);
        assert!("pre-build".parse::<PluginScope>().is_err());

        let scope: PluginScope = serde_json::from_str("\"experiment\"").unwrap();
        assert_eq!(scope, PluginScope::Experiment);
        assert!(serde_json::from_str::<PluginScope>("\"render\"").is_err());
    }

    #[test]
    fn load_reports_parse_errors() {
        let path = std::env::temp_dir().join(format!(
            "lb-descriptor-{}.json",
            uuid::Uuid::now_v7()
        ));
        std::fs::write(&path, "{ not json").unwrap();

        let err = ExperimentDescriptor::load(&path).unwrap_err();
        assert!(err.to_string().contains("descriptor error"));

        let _ = std::fs::remove_file(&path);
    }
}
