//! Error types for watches, reload cycles and coordinator configuration.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;
use warpgrid_keys::TemplateError;
use warpgrid_registry::RegistryError;
use warpgrid_tree::TreeError;

/// Result type alias for watch and reload operations.
pub type ReloadResult<T> = Result<T, ReloadError>;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("no reload rule registered for {0}")]
    NoRule(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("rendering {template} failed: {source}")]
    Render {
        template: String,
        #[source]
        source: TemplateError,
    },

    #[error("writing {} failed: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("running {command} failed: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Command {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("installing watch on {key} failed: {source}")]
    Watch {
        key: String,
        #[source]
        source: TreeError,
    },
}

/// Errors loading or validating a coordinator configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("reload rule {index} ({watch}): {reason}")]
    InvalidRule {
        index: usize,
        watch: String,
        reason: String,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),
}
