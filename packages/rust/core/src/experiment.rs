//! Experiment orchestrator: staging, validation, and the build pipeline.
//!
//! Lifecycle: [`Experiment::init`] stages content and registers partials,
//! [`Experiment::validate`] optionally checks staged content, and
//! [`Experiment::build`] renders every unit into the staging root and
//! promotes it to the canonical build directory.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use labbuild_shared::{
    BuildOptions, ExperimentConfig, ExperimentDescriptor, LabBuildError, PluginScope, Result,
};

use crate::context::BuildContext;
use crate::plugin::PluginHost;
use crate::staging::{copy_dir_all, copy_file, prepare_staging, promote};
use crate::template::TemplateHost;
use crate::unit_tree::{RenderedPage, UnitTree, resolve_relative};
use crate::validation::{ValidationReport, ValidationRunner};

const NAME_FILE: &str = "experiment-name.md";
const FEEDBACK_FILE: &str = "feedback.md";
const CONTRIBUTORS_FILE: &str = "contributors.md";
const MANIFEST_FILE: &str = "build-manifest.json";

const LINT_LOG: &str = "eslint.log";
const VALIDATE_LOG: &str = "validate.log";
const ASSESSMENT_LOG: &str = "assesment.log";

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting build status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each page is written.
    fn page_rendered(&self, target: &str, current: usize, total: usize);
    /// Called when the build has been promoted.
    fn done(&self, outcome: &BuildOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_rendered(&self, _target: &str, _current: usize, _total: usize) {}
    fn done(&self, _outcome: &BuildOutcome) {}
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Result of a successful `build`.
#[derive(Debug)]
pub struct BuildOutcome {
    /// Context the pages were rendered with.
    pub context: BuildContext,
    /// Pages written, in descriptor order.
    pub pages: Vec<RenderedPage>,
    /// Canonical build directory.
    pub build_path: PathBuf,
    pub elapsed: Duration,
}

/// Contents of `build-manifest.json`.
#[derive(Debug, Serialize)]
struct BuildManifest<'a> {
    tool_version: &'static str,
    built_at: String,
    plugins_enabled: bool,
    page_count: usize,
    pages: &'a [RenderedPage],
}

/// One descriptor bound to one source directory.
#[derive(Debug, Clone)]
pub struct Experiment {
    src: PathBuf,
    descriptor: ExperimentDescriptor,
    config: ExperimentConfig,
}

impl Experiment {
    pub fn new(
        src: impl Into<PathBuf>,
        descriptor: ExperimentDescriptor,
        config: ExperimentConfig,
    ) -> Self {
        Self {
            src: src.into(),
            descriptor,
            config,
        }
    }

    /// Load the descriptor from its conventional location under `src`.
    pub fn load(src: impl Into<PathBuf>, config: ExperimentConfig) -> Result<Self> {
        let src = src.into();
        let descriptor = ExperimentDescriptor::load(&Self::descriptor_path(&src, &config))?;
        Ok(Self::new(src, descriptor, config))
    }

    pub fn descriptor_path(src: &Path, config: &ExperimentConfig) -> PathBuf {
        src.join(&config.descriptor_name)
    }

    pub fn contributors_path(src: &Path, config: &ExperimentConfig) -> PathBuf {
        src.join(&config.exp_dir).join(CONTRIBUTORS_FILE)
    }

    pub fn src(&self) -> &Path {
        &self.src
    }

    pub fn descriptor(&self) -> &ExperimentDescriptor {
        &self.descriptor
    }

    /// Raw experiment content directory.
    pub fn content_path(&self) -> PathBuf {
        self.src.join(&self.config.exp_dir)
    }

    /// Staging root that pages are rendered into.
    pub fn staging_path(&self) -> PathBuf {
        self.src.join(&self.config.staging_dir)
    }

    /// Canonical build directory consumers read from.
    pub fn build_path(&self) -> PathBuf {
        self.src.join(&self.config.build_dir)
    }

    // -----------------------------------------------------------------------
    // init
    // -----------------------------------------------------------------------

    /// Stage raw content and fixed assets, then register partials.
    ///
    /// Any error leaves an incomplete staging root; callers treat it as fatal.
    #[instrument(skip_all, fields(src = %self.src.display()))]
    pub fn init(&self, templates: &mut dyn TemplateHost) -> Result<()> {
        let staging = self.staging_path();
        prepare_staging(&staging)?;

        let files = copy_dir_all(&self.content_path(), &staging)?;
        debug!(files, "staged experiment content");

        let ui = &self.config.ui_template_path;
        copy_dir_all(&ui.join("assets"), &staging.join("assets"))?;

        let math = &self.config.math_assets_path;
        let katex = staging.join("assets").join("katex_assets");
        copy_file(&math.join("katex.min.css"), &katex.join("katex.min.css"))?;
        copy_dir_all(&math.join("fonts"), &katex.join("fonts"))?;

        copy_file(
            &self.config.static_content_path.join(FEEDBACK_FILE),
            &staging.join(FEEDBACK_FILE),
        )?;

        let partials = self.register_partials(templates)?;

        info!(staging = %staging.display(), partials, "staging initialized");
        Ok(())
    }

    fn register_partials(&self, templates: &mut dyn TemplateHost) -> Result<usize> {
        let dir = self.config.ui_template_path.join("partials");
        for (name, file) in &self.config.partials {
            let path = dir.join(format!("{file}.handlebars"));
            let source = std::fs::read_to_string(&path).map_err(|e| LabBuildError::io(&path, e))?;
            templates.register_partial(name, source);
        }
        Ok(self.config.partials.len())
    }

    // -----------------------------------------------------------------------
    // validate
    // -----------------------------------------------------------------------

    /// Run the requested checks and append their output to the staging logs.
    ///
    /// Never fails: tool errors and missing files are recorded in the report.
    #[instrument(skip_all, fields(src = %self.src.display(), lint = options.lint, descriptor = options.validate_descriptor))]
    pub async fn validate(
        &self,
        options: &BuildOptions,
        runner: &dyn ValidationRunner,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();
        let staging = self.staging_path();
        if !staging.is_dir() {
            let msg = format!("staging root {} does not exist", staging.display());
            warn!("{msg}");
            report.errors.push(msg);
            return report;
        }
        let content = self.content_path();

        if options.lint {
            let result = match runner.run_linter(&content).await {
                Ok(log) => write_log(&staging.join(LINT_LOG), &log),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => report.lint_ran = true,
                Err(e) => record(&mut report, e),
            }
        }

        if options.validate_descriptor {
            let descriptor = Self::descriptor_path(&self.src, &self.config);
            let result = match runner.run_schema_validator(&descriptor).await {
                Ok(log) => append_log(&staging.join(VALIDATE_LOG), &log),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => report.descriptor_validated = true,
                Err(e) => record(&mut report, e),
            }

            let log_path = staging.join(ASSESSMENT_LOG);
            for unit in self.descriptor.flatten() {
                if !unit.is_assessment() {
                    continue;
                }
                let path = match resolve_relative(&content, &unit.source) {
                    Ok(path) => path,
                    Err(e) => {
                        record(&mut report, e);
                        continue;
                    }
                };
                if !path.is_file() {
                    warn!(source = %unit.source, path = %path.display(), "assessment file does not exist");
                    let line = format!("!{}: not found ({})\n", unit.source, path.display());
                    if let Err(e) = append_log(&log_path, &line) {
                        record(&mut report, e);
                    }
                    report.missing_assessments.push(path);
                    continue;
                }

                let result = async {
                    append_log(&log_path, &format!("={}\n", unit.source))?;
                    let log = runner.run_schema_validator(&path).await?;
                    append_log(&log_path, &log)
                }
                .await;
                match result {
                    Ok(()) => report.assessments_validated.push(unit.source.clone()),
                    Err(e) => record(&mut report, e),
                }
            }
        }

        info!(
            lint_ran = report.lint_ran,
            descriptor_validated = report.descriptor_validated,
            assessments = report.assessments_validated.len(),
            missing = report.missing_assessments.len(),
            errors = report.errors.len(),
            "validation complete"
        );
        report
    }

    // -----------------------------------------------------------------------
    // build
    // -----------------------------------------------------------------------

    /// Rendered experiment name from the staged name fragment.
    pub fn name(&self) -> Result<String> {
        let path = self.staging_path().join(NAME_FILE);
        let markdown = std::fs::read_to_string(&path).map_err(|e| LabBuildError::io(&path, e))?;
        Ok(labbuild_markdown::render_inline(&markdown))
    }

    /// Render every unit and promote the staging root.
    ///
    /// 1. Build the unit tree and context
    /// 2. Experiment-scope plugins (when enabled)
    /// 3. Render units into staging
    /// 4. Post-build plugins (when enabled)
    /// 5. Write the build manifest
    /// 6. Promote staging to the canonical directory
    ///
    /// Any failure propagates before step 6, so the previous canonical build
    /// is left untouched.
    #[instrument(skip_all, fields(src = %self.src.display(), plugins = options.plugins))]
    pub fn build(
        &self,
        templates: &dyn TemplateHost,
        lab_data: &Value,
        options: &BuildOptions,
        plugins: &PluginHost,
        progress: &dyn ProgressReporter,
    ) -> Result<BuildOutcome> {
        let start = Instant::now();
        let staging = self.staging_path();
        if !staging.is_dir() {
            return Err(LabBuildError::validation(format!(
                "staging root {} does not exist; run init before build",
                staging.display()
            )));
        }

        info!(units = self.descriptor.units.len(), "starting build");

        // --- Phase 1: Unit tree ---
        progress.phase("Preparing unit tree");
        let tree = UnitTree::from_descriptor(&self.descriptor);
        if tree.is_empty() {
            warn!("descriptor has no units, build will contain no pages");
        }
        let mut ctx = BuildContext {
            name: self.name()?,
            menu: tree.menu(),
            src: self.src.clone(),
            build_path: staging.clone(),
            plugins: None,
        };

        // --- Phase 2: Experiment-scope plugins ---
        if options.plugins {
            info!(
                experiment = ?plugins.names(PluginScope::Experiment),
                post_build = ?plugins.names(PluginScope::PostBuild),
                "plugins enabled"
            );
            progress.phase("Running experiment plugins");
            let data = plugins.run_experiment_scope(&ctx, templates, lab_data, options)?;
            ctx.plugins = Some(data);
        }

        // --- Phase 3: Render ---
        progress.phase("Rendering units");
        let pages = tree.render(&ctx, templates, lab_data, options, progress)?;

        // --- Phase 4: Post-build plugins ---
        if options.plugins {
            progress.phase("Running post-build plugins");
            plugins.run_post_build_scope(&ctx, options)?;
        }

        // --- Phase 5: Manifest ---
        let manifest = BuildManifest {
            tool_version: env!("CARGO_PKG_VERSION"),
            built_at: chrono::Utc::now().to_rfc3339(),
            plugins_enabled: options.plugins,
            page_count: pages.len(),
            pages: &pages,
        };
        write_json(&staging.join(MANIFEST_FILE), &manifest)?;

        // --- Phase 6: Promote ---
        progress.phase("Promoting build");
        let build_path = self.build_path();
        promote(&staging, &build_path)?;

        let outcome = BuildOutcome {
            context: ctx,
            pages,
            build_path,
            elapsed: start.elapsed(),
        };

        progress.done(&outcome);

        info!(
            pages = outcome.pages.len(),
            build_path = %outcome.build_path.display(),
            elapsed_ms = outcome.elapsed.as_millis(),
            "build complete"
        );

        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn record(report: &mut ValidationReport, err: LabBuildError) {
    warn!(error = %err, "validation step failed");
    report.errors.push(err.to_string());
}

/// Replace a log file's content.
fn write_log(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).map_err(|e| LabBuildError::io(path, e))
}

/// Append to a log file, creating it if needed.
fn append_log(path: &Path, text: &str) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LabBuildError::io(path, e))?;
    file.write_all(text.as_bytes())
        .map_err(|e| LabBuildError::io(path, e))
}

/// Write a JSON file (pretty-printed).
fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| LabBuildError::validation(format!("JSON serialization failed: {e}")))?;
    std::fs::write(path, json).map_err(|e| LabBuildError::io(path, e))?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
