//! Validation runner: external linter and schema validator invocation.
//!
//! The runner only produces log text. Deciding which files are validated,
//! in what order, and where the text is appended belongs to
//! [`Experiment::validate`](crate::experiment::Experiment::validate).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, warn};

use labbuild_shared::{LabBuildError, Result, ValidationConfig};

/// External tools used by `validate`.
#[async_trait]
pub trait ValidationRunner: Send + Sync {
    /// Lint a content directory; returns the tool's combined output.
    async fn run_linter(&self, target_dir: &Path) -> Result<String>;

    /// Validate one file against its schema; returns the tool's combined output.
    async fn run_schema_validator(&self, file: &Path) -> Result<String>;
}

/// Outcome of one `validate` call. Failures are recorded here, never raised.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// The linter ran and its log was written.
    pub lint_ran: bool,
    /// The descriptor was passed to the schema validator.
    pub descriptor_validated: bool,
    /// Sources of assessment units that were validated, in descriptor order.
    pub assessments_validated: Vec<String>,
    /// Assessment files that did not exist.
    pub missing_assessments: Vec<PathBuf>,
    /// Tool or log-file failures.
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.missing_assessments.is_empty() && self.errors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Command-backed runner
// ---------------------------------------------------------------------------

/// Runs the configured linter and validator as child processes.
///
/// Each invocation is bounded by a timeout; a timed-out tool is killed and
/// its log text records the timeout.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    config: ValidationConfig,
    timeout: Duration,
}

impl CommandValidator {
    pub fn new(config: ValidationConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self {
            config,
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, program: &str, args: &[String], target: &Path) -> Result<String> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            LabBuildError::validation(format!("failed to spawn `{program}`: {e}"))
        })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                debug!(
                    program,
                    target = %target.display(),
                    status = ?output.status.code(),
                    "tool finished"
                );
                let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
                log.push_str(&String::from_utf8_lossy(&output.stderr));
                Ok(log)
            }
            Ok(Err(e)) => Err(LabBuildError::validation(format!(
                "failed to wait for `{program}`: {e}"
            ))),
            Err(_) => {
                warn!(
                    program,
                    target = %target.display(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "tool timed out, killed"
                );
                Ok(format!(
                    "{program} timed out after {}ms on {}\n",
                    self.timeout.as_millis(),
                    target.display()
                ))
            }
        }
    }
}

#[async_trait]
impl ValidationRunner for CommandValidator {
    async fn run_linter(&self, target_dir: &Path) -> Result<String> {
        self.run(&self.config.lint_cmd, &self.config.lint_args, target_dir)
            .await
    }

    async fn run_schema_validator(&self, file: &Path) -> Result<String> {
        self.run(&self.config.validator_cmd, &self.config.validator_args, file)
            .await
    }
}
