//! Per-build context shared with plugins and the unit tree renderer.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use crate::unit_tree::MenuItem;

/// State assembled fresh by each `build` call and dropped when it returns.
#[derive(Debug, Clone, Serialize)]
pub struct BuildContext {
    /// Rendered experiment name (HTML fragment).
    pub name: String,
    /// Menu derived from the unit tree, in descriptor order.
    pub menu: Vec<MenuItem>,
    /// Experiment source directory.
    pub src: PathBuf,
    /// Staging root that pages are rendered into.
    pub build_path: PathBuf,
    /// Experiment-scope plugin output keyed by plugin name. `None` when
    /// plugins are disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Value>,
}
