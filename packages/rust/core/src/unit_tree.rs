//! Unit tree: the in-memory hierarchy built from descriptor units.
//!
//! Every unit with a `target` renders exactly one page into the staging
//! root, through the `page` partial of the templating host. Pages are
//! written in descriptor order (depth-first).

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use labbuild_markdown::RenderResult;
use labbuild_shared::{
    BuildOptions, ContentType, ExperimentDescriptor, LabBuildError, Result, UnitSpec, UnitType,
};

use crate::context::BuildContext;
use crate::experiment::ProgressReporter;
use crate::template::{TemplateHost, escape_html};

/// Template every page is rendered through.
const PAGE_TEMPLATE: &str = "{{> page}}";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Menu entry mirroring one unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuItem {
    pub label: String,
    pub target: String,
    pub unit_type: UnitType,
    pub content_type: ContentType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuItem>,
}

/// Extra menu link contributed by an experiment-scope plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuLink {
    pub label: String,
    pub href: String,
}

/// A page written to the staging root.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedPage {
    /// Output path relative to the build root.
    pub target: String,
    /// SHA-256 of the written HTML.
    pub sha256: String,
    pub size_bytes: usize,
    /// Words of authored Markdown; zero for non-text pages.
    pub word_count: usize,
}

#[derive(Debug, Clone)]
struct UnitNode {
    spec: UnitSpec,
    children: Vec<UnitNode>,
}

impl UnitNode {
    fn from_spec(spec: &UnitSpec) -> Self {
        let children = spec.units.iter().map(Self::from_spec).collect();
        let mut spec = spec.clone();
        spec.units.clear();
        Self { spec, children }
    }

    fn menu_item(&self) -> MenuItem {
        MenuItem {
            label: self.spec.label.clone(),
            target: self.spec.target.clone(),
            unit_type: self.spec.unit_type,
            content_type: self.spec.content_type,
            children: self.children.iter().map(Self::menu_item).collect(),
        }
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(Self::count).sum::<usize>()
    }
}

// ---------------------------------------------------------------------------
// UnitTree
// ---------------------------------------------------------------------------

/// Hierarchy of units ready to render.
#[derive(Debug, Clone)]
pub struct UnitTree {
    roots: Vec<UnitNode>,
}

/// Shared inputs for rendering one build.
struct RenderEnv<'a> {
    ctx: &'a BuildContext,
    templates: &'a dyn TemplateHost,
    lab_data: &'a Value,
    options: &'a BuildOptions,
    extra_links: Vec<MenuLink>,
    progress: &'a dyn ProgressReporter,
    total: usize,
}

impl UnitTree {
    /// Build the tree from the descriptor's units.
    pub fn from_descriptor(descriptor: &ExperimentDescriptor) -> Self {
        Self {
            roots: descriptor.units.iter().map(UnitNode::from_spec).collect(),
        }
    }

    /// Menu entries in descriptor order.
    pub fn menu(&self) -> Vec<MenuItem> {
        self.roots.iter().map(UnitNode::menu_item).collect()
    }

    /// Total number of units, nested ones included.
    pub fn len(&self) -> usize {
        self.roots.iter().map(UnitNode::count).sum()
    }

    /// True when the descriptor has no units at all.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Render every unit into `ctx.build_path`.
    #[instrument(skip_all, fields(units = self.len(), build_path = %ctx.build_path.display()))]
    pub fn render(
        &self,
        ctx: &BuildContext,
        templates: &dyn TemplateHost,
        lab_data: &Value,
        options: &BuildOptions,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<RenderedPage>> {
        let env = RenderEnv {
            ctx,
            templates,
            lab_data,
            options,
            extra_links: plugin_menu_links(ctx.plugins.as_ref()),
            progress,
            total: self.len(),
        };

        let mut pages = Vec::with_capacity(env.total);
        for node in &self.roots {
            render_node(node, &env, &mut pages)?;
        }

        debug!(pages = pages.len(), "unit tree rendered");
        Ok(pages)
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_node(node: &UnitNode, env: &RenderEnv<'_>, pages: &mut Vec<RenderedPage>) -> Result<()> {
    let spec = &node.spec;

    if spec.target.is_empty() {
        if spec.unit_type == UnitType::Task {
            return Err(LabBuildError::Render(format!(
                "task '{}' has no target",
                spec.label
            )));
        }
        debug!(label = %spec.label, "container without target, rendering children only");
    } else {
        let page = render_page(node, env)?;
        env.progress
            .page_rendered(&page.target, pages.len() + 1, env.total);
        pages.push(page);
    }

    for child in &node.children {
        render_node(child, env, pages)?;
    }
    Ok(())
}

fn render_page(node: &UnitNode, env: &RenderEnv<'_>) -> Result<RenderedPage> {
    let spec = &node.spec;
    let output = resolve_relative(&env.ctx.build_path, &spec.target)?;
    let root = root_prefix(&spec.target);
    let body = page_body(node, &env.ctx.build_path, &root)?;

    let title = match (spec.label.is_empty(), &body.title) {
        (true, Some(heading)) => heading.clone(),
        _ => spec.label.clone(),
    };

    let data = json!({
        "title": title,
        "name": env.ctx.name,
        "root": root,
        "menu": menu_html(&env.ctx.menu, &env.extra_links, &spec.target, &root),
        "content": body.html,
        "target": spec.target,
        "unit_type": spec.unit_type,
        "content_type": spec.content_type,
        "plugins": env.ctx.plugins,
        "lab": env.lab_data,
        "options": env.options,
    });

    let html = env.templates.render(PAGE_TEMPLATE, &data)?;

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LabBuildError::io(parent, e))?;
    }
    std::fs::write(&output, &html).map_err(|e| LabBuildError::io(&output, e))?;

    let mut hasher = Sha256::new();
    hasher.update(html.as_bytes());

    debug!(target = %spec.target, title = %title, words = body.word_count, "wrote page");

    Ok(RenderedPage {
        target: spec.target.clone(),
        sha256: format!("{:x}", hasher.finalize()),
        size_bytes: html.len(),
        word_count: body.word_count,
    })
}

/// Body for one unit, by content type. Only text pages carry a title and words.
fn page_body(node: &UnitNode, build_root: &Path, root: &str) -> Result<RenderResult> {
    let spec = &node.spec;
    let markup = |html: String| RenderResult {
        html,
        title: None,
        word_count: 0,
    };

    if spec.source.is_empty() {
        return Ok(markup(children_index(&node.children, root)));
    }

    let source_path = resolve_relative(build_root, &spec.source)?;
    let source = escape_html(&spec.source);

    match spec.content_type {
        ContentType::Text => {
            let text = std::fs::read_to_string(&source_path)
                .map_err(|e| LabBuildError::io(&source_path, e))?;
            Ok(labbuild_markdown::render(&text))
        }
        ContentType::Assessment => {
            ensure_exists(&source_path)?;
            Ok(markup(format!(
                "<div class=\"assessment\" data-src=\"{root}{source}\"></div>\n\
                 <script src=\"{root}assets/js/assessment.js\"></script>\n"
            )))
        }
        ContentType::Simulation => {
            ensure_exists(&source_path)?;
            Ok(markup(format!(
                "<iframe class=\"simulation\" src=\"{root}{source}\" title=\"{}\"></iframe>\n",
                escape_html(&spec.label)
            )))
        }
        ContentType::Video => {
            let url = std::fs::read_to_string(&source_path)
                .map_err(|e| LabBuildError::io(&source_path, e))?;
            Ok(markup(format!(
                "<div class=\"video\"><iframe src=\"{}\" allowfullscreen></iframe></div>\n",
                escape_html(url.trim())
            )))
        }
    }
}

/// `../` once per directory level of `target`, so links resolve from the build root.
fn root_prefix(target: &str) -> String {
    let depth = Path::new(target)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();
    "../".repeat(depth.saturating_sub(1))
}

fn ensure_exists(path: &Path) -> Result<()> {
    std::fs::metadata(path)
        .map(|_| ())
        .map_err(|e| LabBuildError::io(path, e))
}

/// Join a descriptor-relative path onto `root`, rejecting escapes.
pub(crate) fn resolve_relative(root: &Path, relative: &str) -> Result<PathBuf> {
    let rel = Path::new(relative);
    let escapes = rel
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(LabBuildError::Render(format!(
            "path '{relative}' must stay inside {}",
            root.display()
        )));
    }
    Ok(root.join(rel))
}

fn children_index(children: &[UnitNode], root: &str) -> String {
    let mut out = String::from("<ul class=\"unit-index\">\n");
    for child in children.iter().filter(|c| !c.spec.target.is_empty()) {
        out.push_str(&format!(
            "<li><a href=\"{root}{}\">{}</a></li>\n",
            escape_html(&child.spec.target),
            escape_html(&child.spec.label)
        ));
    }
    out.push_str("</ul>\n");
    out
}

/// Menu markup with the active page marked. Unit links are prefixed with `root`.
fn menu_html(items: &[MenuItem], extra: &[MenuLink], active: &str, root: &str) -> String {
    fn push_items(out: &mut String, items: &[MenuItem], active: &str, root: &str) {
        for item in items {
            let class = if item.target == active {
                "menu-item active"
            } else {
                "menu-item"
            };
            out.push_str(&format!("<li class=\"{class}\">"));
            if item.target.is_empty() {
                out.push_str(&format!("<span>{}</span>", escape_html(&item.label)));
            } else {
                out.push_str(&format!(
                    "<a href=\"{root}{}\">{}</a>",
                    escape_html(&item.target),
                    escape_html(&item.label)
                ));
            }
            if !item.children.is_empty() {
                out.push_str("<ul>");
                push_items(out, &item.children, active, root);
                out.push_str("</ul>");
            }
            out.push_str("</li>\n");
        }
    }

    let mut out = String::from("<ul class=\"menu\">\n");
    push_items(&mut out, items, active, root);
    for link in extra {
        out.push_str(&format!(
            "<li class=\"menu-item menu-extra\"><a href=\"{}\">{}</a></li>\n",
            escape_html(&link.href),
            escape_html(&link.label)
        ));
    }
    out.push_str("</ul>");
    out
}

/// Collect `menu` arrays from every experiment-scope plugin output.
fn plugin_menu_links(plugins: Option<&Value>) -> Vec<MenuLink> {
    let Some(Value::Object(outputs)) = plugins else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for (plugin, output) in outputs {
        let Some(menu) = output.get("menu") else {
            continue;
        };
        match serde_json::from_value::<Vec<MenuLink>>(menu.clone()) {
            Ok(mut entries) => links.append(&mut entries),
            Err(e) => warn!(plugin = %plugin, error = %e, "ignoring malformed plugin menu"),
        }
    }
    links
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::SilentProgress;
    use crate::template::Templates;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lb-unit-tree-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn templates() -> Templates {
        let mut t = Templates::new();
        t.register_partial(
            "page",
            "<title>{{title}}</title><nav>{{{menu}}}</nav><main>{{{content}}}</main>".into(),
        );
        t
    }

    fn context(build_path: &Path, tree: &UnitTree, plugins: Option<Value>) -> BuildContext {
        BuildContext {
            name: "Pendulum".into(),
            menu: tree.menu(),
            src: build_path.to_path_buf(),
            build_path: build_path.to_path_buf(),
            plugins,
        }
    }

    fn descriptor() -> ExperimentDescriptor {
        serde_json::from_value(json!({
            "units": [
                { "unit-type": "task", "content-type": "text", "label": "Aim",
                  "source": "aim.md", "target": "index.html" },
                { "unit-type": "unit", "label": "Practice", "target": "practice.html",
                  "units": [
                      { "unit-type": "task", "content-type": "assessment", "label": "Quiz",
                        "source": "quiz.json", "target": "quiz.html" },
                      { "unit-type": "task", "content-type": "simulation", "label": "Simulation",
                        "source": "simulation/index.html", "target": "simulation.html" }
                  ] }
            ]
        }))
        .unwrap()
    }

    fn seed_sources(dir: &Path) {
        std::fs::write(dir.join("aim.md"), "# Aim\n\nFind *g*.").unwrap();
        std::fs::write(dir.join("quiz.json"), "{}").unwrap();
        std::fs::create_dir_all(dir.join("simulation")).unwrap();
        std::fs::write(dir.join("simulation/index.html"), "<html></html>").unwrap();
    }

    #[test]
    fn menu_follows_descriptor_order() {
        let tree = UnitTree::from_descriptor(&descriptor());
        let menu = tree.menu();
        assert_eq!(menu.len(), 2);
        assert_eq!(menu[0].label, "Aim");
        assert_eq!(menu[1].children[1].target, "simulation.html");
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn renders_one_page_per_unit_in_order() {
        let dir = temp_dir();
        seed_sources(&dir);
        let tree = UnitTree::from_descriptor(&descriptor());
        let ctx = context(&dir, &tree, None);

        let pages = tree
            .render(&ctx, &templates(), &json!({}), &BuildOptions::default(), &SilentProgress)
            .unwrap();

        let targets: Vec<_> = pages.iter().map(|p| p.target.as_str()).collect();
        assert_eq!(targets, ["index.html", "practice.html", "quiz.html", "simulation.html"]);
        assert!(pages.iter().all(|p| p.sha256.len() == 64));
        assert_eq!(pages[0].word_count, 3);
        assert_eq!(pages[2].word_count, 0);

        let index = std::fs::read_to_string(dir.join("index.html")).unwrap();
        assert!(index.contains("<title>Aim</title>"));
        assert!(index.contains("<em>g</em>"));
        assert!(index.contains("<li class=\"menu-item active\"><a href=\"index.html\">Aim</a>"));

        let practice = std::fs::read_to_string(dir.join("practice.html")).unwrap();
        assert!(practice.contains("<a href=\"quiz.html\">Quiz</a>"));

        let quiz = std::fs::read_to_string(dir.join("quiz.html")).unwrap();
        assert!(quiz.contains("data-src=\"quiz.json\""));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_text_source_is_a_read_failure() {
        let dir = temp_dir();
        let desc = ExperimentDescriptor {
            units: vec![UnitSpec::text_task("Theory", "theory.md", "theory.html")],
        };
        let tree = UnitTree::from_descriptor(&desc);
        let ctx = context(&dir, &tree, None);

        let err = tree
            .render(&ctx, &templates(), &json!({}), &BuildOptions::default(), &SilentProgress)
            .unwrap_err();
        assert!(matches!(err, LabBuildError::Io { .. }));
        assert!(!dir.join("theory.html").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn target_outside_build_root_is_rejected() {
        let dir = temp_dir();
        std::fs::write(dir.join("aim.md"), "x").unwrap();
        let desc = ExperimentDescriptor {
            units: vec![UnitSpec::text_task("Aim", "aim.md", "../escape.html")],
        };
        let tree = UnitTree::from_descriptor(&desc);
        let ctx = context(&dir, &tree, None);

        let err = tree
            .render(&ctx, &templates(), &json!({}), &BuildOptions::default(), &SilentProgress)
            .unwrap_err();
        assert!(err.to_string().contains("must stay inside"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn plugin_menu_links_are_appended() {
        let dir = temp_dir();
        std::fs::write(dir.join("aim.md"), "# Aim").unwrap();
        let desc = ExperimentDescriptor {
            units: vec![UnitSpec::text_task("Aim", "aim.md", "index.html")],
        };
        let tree = UnitTree::from_descriptor(&desc);
        let plugins = json!({
            "extra-links": { "menu": [{ "label": "Forum", "href": "https://forum.example.org" }] },
            "broken": { "menu": "not a list" }
        });
        let ctx = context(&dir, &tree, Some(plugins));

        tree.render(&ctx, &templates(), &json!({}), &BuildOptions::default(), &SilentProgress)
            .unwrap();

        let index = std::fs::read_to_string(dir.join("index.html")).unwrap();
        assert!(index.contains("menu-extra\"><a href=\"https://forum.example.org\">Forum</a>"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn task_without_target_fails() {
        let dir = temp_dir();
        let desc = ExperimentDescriptor {
            units: vec![UnitSpec::text_task("Aim", "aim.md", "")],
        };
        let tree = UnitTree::from_descriptor(&desc);
        let ctx = context(&dir, &tree, None);

        let err = tree
            .render(&ctx, &templates(), &json!({}), &BuildOptions::default(), &SilentProgress)
            .unwrap_err();
        assert!(err.to_string().contains("has no target"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn nested_target_links_back_to_build_root() {
        let dir = temp_dir();
        seed_sources(&dir);
        let desc: ExperimentDescriptor = serde_json::from_value(json!({
            "units": [
                { "unit-type": "task", "content-type": "text", "label": "Aim",
                  "source": "aim.md", "target": "index.html" },
                { "unit-type": "task", "content-type": "assessment", "label": "Quiz",
                  "source": "quiz.json", "target": "sub/quiz.html" }
            ]
        }))
        .unwrap();
        let tree = UnitTree::from_descriptor(&desc);
        let ctx = context(&dir, &tree, None);
        let mut t = templates();
        t.register_partial(
            "page",
            "<link href=\"{{root}}assets/css/main.css\"><nav>{{{menu}}}</nav>{{{content}}}".into(),
        );

        tree.render(&ctx, &t, &json!({}), &BuildOptions::default(), &SilentProgress)
            .unwrap();

        let quiz = std::fs::read_to_string(dir.join("sub/quiz.html")).unwrap();
        assert!(quiz.contains("<link href=\"../assets/css/main.css\">"));
        assert!(quiz.contains("<script src=\"../assets/js/assessment.js\"></script>"));
        assert!(quiz.contains("data-src=\"../quiz.json\""));
        assert!(quiz.contains("<a href=\"../index.html\">Aim</a>"));

        let index = std::fs::read_to_string(dir.join("index.html")).unwrap();
        assert!(index.contains("<link href=\"assets/css/main.css\">"));
        assert!(index.contains("<a href=\"sub/quiz.html\">Quiz</a>"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn root_prefix_counts_directories() {
        assert_eq!(root_prefix("index.html"), "");
        assert_eq!(root_prefix("./index.html"), "");
        assert_eq!(root_prefix("sub/quiz.html"), "../");
        assert_eq!(root_prefix("a/b/c.html"), "../../");
    }

    #[test]
    fn unlabeled_text_page_takes_heading_as_title() {
        let dir = temp_dir();
        std::fs::write(dir.join("aim.md"), "# Measuring g\n\nSwing it.").unwrap();
        let desc = ExperimentDescriptor {
            units: vec![
                UnitSpec::text_task("", "aim.md", "index.html"),
                UnitSpec::text_task("Aim", "aim.md", "aim.html"),
            ],
        };
        let tree = UnitTree::from_descriptor(&desc);
        let ctx = context(&dir, &tree, None);

        let pages = tree
            .render(&ctx, &templates(), &json!({}), &BuildOptions::default(), &SilentProgress)
            .unwrap();
        assert_eq!(pages[0].word_count, 4);

        let index = std::fs::read_to_string(dir.join("index.html")).unwrap();
        assert!(index.contains("<title>Measuring g</title>"));
        let aim = std::fs::read_to_string(dir.join("aim.html")).unwrap();
        assert!(aim.contains("<title>Aim</title>"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
