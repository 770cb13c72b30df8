//! `iframe-resizer`: lets the embedded simulation report its height.
//!
//! When the staged build has `simulation/index.html`, a script tag for
//! `iframeResize.js` is appended to its body and the script is copied next
//! to it from `assets/js/`.

use std::path::Path;

use scraper::{Html, Selector};
use tracing::debug;

use labbuild_shared::{BuildOptions, LabBuildError, Result};

use super::PostBuildPlugin;
use crate::context::BuildContext;

const SCRIPT_NAME: &str = "iframeResize.js";

pub struct IframeResizerPlugin;

impl IframeResizerPlugin {
    pub const NAME: &'static str = "iframe-resizer";
}

impl PostBuildPlugin for IframeResizerPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, ctx: &BuildContext, _options: &BuildOptions) -> Result<()> {
        let sim_dir = ctx.build_path.join("simulation");
        let index = sim_dir.join("index.html");
        if !index.is_file() {
            debug!(path = %index.display(), "no simulation page, skipping");
            return Ok(());
        }

        let html = std::fs::read_to_string(&index).map_err(|e| LabBuildError::io(&index, e))?;
        if has_resizer_script(&html) {
            debug!("simulation page already loads the resizer");
        } else {
            let updated = inject_script(&html);
            std::fs::write(&index, updated).map_err(|e| LabBuildError::io(&index, e))?;
        }

        copy_script(&ctx.build_path, &sim_dir)
    }
}

fn has_resizer_script(html: &str) -> bool {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse("script[src]") else {
        return false;
    };
    doc.select(&sel).any(|el| {
        el.value()
            .attr("src")
            .is_some_and(|src| src.ends_with(SCRIPT_NAME))
    })
}

/// Insert the script tag before the last `</body>`, or append it.
fn inject_script(html: &str) -> String {
    let tag = format!("<script src=\"./{SCRIPT_NAME}\"></script>");
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => format!("{}{tag}\n{}", &html[..pos], &html[pos..]),
        None => format!("{html}\n{tag}\n"),
    }
}

fn copy_script(build_path: &Path, sim_dir: &Path) -> Result<()> {
    let from = build_path.join("assets").join("js").join(SCRIPT_NAME);
    let to = sim_dir.join(SCRIPT_NAME);
    std::fs::copy(&from, &to).map_err(|e| LabBuildError::io(&from, e))?;
    debug!(to = %to.display(), "copied resizer script");
    Ok(())
}
