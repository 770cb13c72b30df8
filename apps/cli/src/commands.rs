//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};
use tracing::{error, info};

use labbuild_core::{
    BuildOutcome, CommandValidator, Experiment, PluginHost, ProgressReporter, Templates,
    ValidationReport,
};
use labbuild_shared::{
    AppConfig, BuildOptions, ExperimentDescriptor, init_config, load_config, load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// labbuild: build static experiment sites from a descriptor.
#[derive(Parser)]
#[command(
    name = "labbuild",
    version,
    about = "Build self-contained experiment content packages from a descriptor.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.labbuild/labbuild.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Stage, optionally validate, and build an experiment.
    Build {
        /// Experiment source directory.
        src: PathBuf,

        /// Run the linter over the content directory.
        #[arg(long)]
        lint: bool,

        /// Validate the descriptor and assessment files.
        #[arg(long)]
        validate: bool,

        /// Run configured plugins.
        #[arg(long)]
        plugins: bool,

        /// Do not append the feedback page.
        #[arg(long)]
        no_feedback: bool,

        /// JSON file with lab-wide data passed to templates and plugins.
        #[arg(long)]
        lab_data: Option<PathBuf>,
    },

    /// Stage an experiment and run validation only.
    Validate {
        /// Experiment source directory.
        src: PathBuf,

        /// Run the linter over the content directory.
        #[arg(long)]
        lint: bool,

        /// Validate the descriptor and assessment files.
        #[arg(long)]
        validate: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "labbuild=info",
        1 => "labbuild=debug",
        _ => "labbuild=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Build {
            src,
            lint,
            validate,
            plugins,
            no_feedback,
            lab_data,
        } => {
            let options = BuildOptions {
                lint,
                validate_descriptor: validate,
                plugins,
            };
            cmd_build(config_path, &src, options, !no_feedback, lab_data.as_deref()).await
        }
        Command::Validate {
            src,
            lint,
            validate,
        } => {
            let options = BuildOptions {
                lint,
                validate_descriptor: validate,
                plugins: false,
            };
            cmd_validate(config_path, &src, options).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_build(
    config_path: Option<&Path>,
    src: &Path,
    options: BuildOptions,
    feedback: bool,
    lab_data: Option<&Path>,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let exp_config = config.experiment.clone();

    let mut descriptor =
        ExperimentDescriptor::load(&Experiment::descriptor_path(src, &exp_config))?;
    if feedback {
        descriptor = descriptor.with_feedback();
    }
    if Experiment::contributors_path(src, &exp_config).is_file() {
        descriptor = descriptor.with_contributors();
    }

    let lab_data = load_lab_data(lab_data)?;
    let plugin_host = if options.plugins {
        PluginHost::from_config(&config.plugins)?
    } else {
        PluginHost::new()
    };

    let experiment = Experiment::new(src, descriptor, exp_config);

    info!(
        src = %src.display(),
        units = experiment.descriptor().units.len(),
        plugins = plugin_host.len(),
        "building experiment"
    );

    let mut templates = Templates::new();
    init_or_exit(&experiment, &mut templates);

    if options.lint || options.validate_descriptor {
        let runner = CommandValidator::new(config.validation.clone());
        let report = experiment.validate(&options, &runner).await;
        print_report(&report);
    }

    let reporter = CliProgress::new();
    let outcome = experiment.build(&templates, &lab_data, &options, &plugin_host, &reporter)?;

    println!();
    println!("  Experiment built successfully!");
    println!("  Name:   {}", outcome.context.name);
    println!("  Pages:  {}", outcome.pages.len());
    println!("  Path:   {}", outcome.build_path.display());
    println!("  Time:   {:.1}s", outcome.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_validate(config_path: Option<&Path>, src: &Path, options: BuildOptions) -> Result<()> {
    if !options.lint && !options.validate_descriptor {
        return Err(eyre!("nothing to validate: pass --lint and/or --validate"));
    }

    let config = resolve_config(config_path)?;
    let experiment = Experiment::load(src, config.experiment.clone())?;

    let mut templates = Templates::new();
    init_or_exit(&experiment, &mut templates);

    let runner = CommandValidator::new(config.validation.clone());
    let report = experiment.validate(&options, &runner).await;
    print_report(&report);

    println!("  Logs:   {}", experiment.staging_path().display());
    println!();
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

fn load_lab_data(path: Option<&Path>) -> Result<Value> {
    let Some(path) = path else {
        return Ok(json!({}));
    };
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read lab data '{}': {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| eyre!("invalid lab data '{}': {e}", path.display()))
}

/// A failed `init` leaves nothing trustworthy to build from.
fn init_or_exit(experiment: &Experiment, templates: &mut Templates) {
    if let Err(e) = experiment.init(templates) {
        error!(error = %e, src = %experiment.src().display(), "failed to initialize build");
        std::process::exit(1);
    }
}

fn print_report(report: &ValidationReport) {
    println!();
    println!("  Validation {}", if report.is_clean() { "passed" } else { "finished with problems" });
    println!("  Lint:        {}", if report.lint_ran { "ran" } else { "skipped" });
    println!(
        "  Descriptor:  {}",
        if report.descriptor_validated { "validated" } else { "skipped" }
    );
    println!("  Assessments: {}", report.assessments_validated.len());
    for path in &report.missing_assessments {
        println!("  Missing:     {}", path.display());
    }
    for err in &report.errors {
        println!("  Error:       {err}");
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_rendered(&self, target: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Rendering [{current}/{total}] {target}"));
    }

    fn done(&self, _outcome: &BuildOutcome) {
        self.spinner.finish_and_clear();
    }
}
