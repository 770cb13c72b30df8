//! Error types for labbuild.
//!
//! Library crates use [`LabBuildError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all labbuild operations.
#[derive(Debug, thiserror::Error)]
pub enum LabBuildError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Experiment descriptor could not be read or parsed.
    #[error("descriptor error: {message}")]
    Descriptor { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Template lookup or rendering error.
    #[error("template error: {message}")]
    Template { message: String },

    /// A plugin failed while running.
    #[error("plugin '{plugin}' failed: {message}")]
    Plugin { plugin: String, message: String },

    /// Unit rendering error.
    #[error("render error: {0}")]
    Render(String),

    /// Build precondition or staging state error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LabBuildError>;

impl LabBuildError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a descriptor error from any displayable message.
    pub fn descriptor(msg: impl Into<String>) -> Self {
        Self::Descriptor {
            message: msg.into(),
        }
    }

    /// Create a template error from any displayable message.
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template {
            message: msg.into(),
        }
    }

    /// Create a plugin error attributed to the named plugin.
    pub fn plugin(plugin: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LabBuildError::config("unknown plugin 'foo'");
        assert_eq!(err.to_string(), "config error: unknown plugin 'foo'");

        let err = LabBuildError::plugin("build-info", "boom");
        assert_eq!(err.to_string(), "plugin 'build-info' failed: boom");
    }

    #[test]
    fn io_error_carries_path() {
        let err = LabBuildError::io(
            "/tmp/missing.md",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("missing.md"));
    }
}
