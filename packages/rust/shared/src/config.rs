//! Application configuration for labbuild.
//!
//! User config lives at `~/.labbuild/labbuild.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LabBuildError, Result};
use crate::types::PluginScope;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "labbuild.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".labbuild";

// ---------------------------------------------------------------------------
// Config structs (matching labbuild.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Experiment layout and template locations.
    #[serde(default)]
    pub experiment: ExperimentConfig,

    /// External validation tools.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Enabled plugins, in invocation order.
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

/// `[experiment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Descriptor filename inside the experiment source directory.
    #[serde(default = "default_descriptor_name")]
    pub descriptor_name: String,

    /// Content directory inside the experiment source directory.
    #[serde(default = "default_exp_dir")]
    pub exp_dir: String,

    /// Canonical build directory inside the experiment source directory.
    #[serde(default = "default_build_dir")]
    pub build_dir: String,

    /// Staging directory, a sibling of the build directory.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: String,

    /// UI template root (holds `assets/` and `partials/`).
    #[serde(default = "default_ui_template_path")]
    pub ui_template_path: PathBuf,

    /// Directory holding fixed content such as `feedback.md`.
    #[serde(default = "default_static_content_path")]
    pub static_content_path: PathBuf,

    /// Math-rendering distribution (holds `katex.min.css` and `fonts/`).
    #[serde(default = "default_math_assets_path")]
    pub math_assets_path: PathBuf,

    /// Partials as `[name, file]` pairs; files live under `partials/` with a
    /// `.handlebars` extension.
    #[serde(default = "default_partials")]
    pub partials: Vec<(String, String)>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            descriptor_name: default_descriptor_name(),
            exp_dir: default_exp_dir(),
            build_dir: default_build_dir(),
            staging_dir: default_staging_dir(),
            ui_template_path: default_ui_template_path(),
            static_content_path: default_static_content_path(),
            math_assets_path: default_math_assets_path(),
            partials: default_partials(),
        }
    }
}

fn default_descriptor_name() -> String {
    "experiment-descriptor.json".into()
}
fn default_exp_dir() -> String {
    "experiment".into()
}
fn default_build_dir() -> String {
    "build".into()
}
fn default_staging_dir() -> String {
    ".build-staging".into()
}
fn default_ui_template_path() -> PathBuf {
    PathBuf::from("templates/ui")
}
fn default_static_content_path() -> PathBuf {
    PathBuf::from("templates/static")
}
fn default_math_assets_path() -> PathBuf {
    PathBuf::from("node_modules/katex/dist")
}
fn default_partials() -> Vec<(String, String)> {
    [
        ("page", "page"),
        ("meta", "meta"),
        ("header", "header"),
        ("sidebar", "sidebar"),
        ("footer", "footer"),
    ]
    .into_iter()
    .map(|(name, file)| (name.to_string(), file.to_string()))
    .collect()
}

/// `[validation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Linter executable.
    #[serde(default = "default_lint_cmd")]
    pub lint_cmd: String,

    /// Arguments placed before the target directory.
    #[serde(default = "default_lint_args")]
    pub lint_args: Vec<String>,

    /// Schema validator executable.
    #[serde(default = "default_validator_cmd")]
    pub validator_cmd: String,

    /// Arguments placed before the file being validated.
    #[serde(default = "default_validator_args")]
    pub validator_args: Vec<String>,

    /// Upper bound on a single tool invocation.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            lint_cmd: default_lint_cmd(),
            lint_args: default_lint_args(),
            validator_cmd: default_validator_cmd(),
            validator_args: default_validator_args(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_lint_cmd() -> String {
    "npx".into()
}
fn default_lint_args() -> Vec<String> {
    vec!["eslint".into(), "-c".into(), ".eslintrc.js".into()]
}
fn default_validator_cmd() -> String {
    "node".into()
}
fn default_validator_args() -> Vec<String> {
    vec!["validation/validate.js".into(), "-f".into()]
}
fn default_timeout_secs() -> u64 {
    120
}

/// `[[plugins]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEntry {
    /// Built-in plugin name (e.g. `build-info`).
    pub name: String,
    /// Invocation point; must match the plugin's own scope.
    pub scope: PluginScope,
    /// Plugin-specific settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.labbuild/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LabBuildError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.labbuild/labbuild.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LabBuildError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LabBuildError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LabBuildError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LabBuildError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LabBuildError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("descriptor_name"));
        assert!(toml_str.contains("experiment-descriptor.json"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.experiment.build_dir, "build");
        assert_eq!(parsed.validation.timeout_secs, 120);
        assert_eq!(parsed.experiment.partials.len(), 5);
    }

    #[test]
    fn config_with_plugins() {
        let toml_str = r#"
[experiment]
build_dir = "dist"

[[plugins]]
name = "build-info"
scope = "experiment"

[[plugins]]
name = "extra-links"
scope = "experiment"
settings = { links = [{ label = "Forum", href = "https://example.org" }] }
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.experiment.build_dir, "dist");
        assert_eq!(config.experiment.exp_dir, "experiment");
        assert_eq!(config.plugins.len(), 2);
        assert_eq!(config.plugins[0].scope, PluginScope::Experiment);
        let settings = config.plugins[1].settings.as_ref().expect("settings");
        assert_eq!(settings["links"][0]["label"], "Forum");
    }

    #[test]
    fn unknown_plugin_scope_rejected() {
        let toml_str = r#"
[[plugins]]
name = "build-info"
scope = "pre-render"
"#;
        assert!(toml::from_str::<AppConfig>(toml_str).is_err());
    }

    #[test]
    fn load_config_from_missing_file() {
        let err = load_config_from(Path::new("/nonexistent/labbuild.toml")).unwrap_err();
        assert!(matches!(err, LabBuildError::Io { .. }));
    }
}
