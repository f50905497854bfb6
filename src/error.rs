//! Error types shared across the engine.
//!
//! Low-level failures carry the file or operation they came from. Only the
//! registry's callers decide whether something is worth showing to a user.

use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to the terminal multiplexer.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("multiplexer binary '{binary}' is not available")]
    BinaryMissing { binary: String },

    #[error("session '{0}' already exists")]
    SessionExists(String),

    #[error("tmux {op} failed for '{session}': {stderr}")]
    CommandFailed {
        op: &'static str,
        session: String,
        stderr: String,
    },

    #[error("failed to run tmux {op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Input rejected before any I/O happens.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("session id '{0}' is too short (need at least 8 characters)")]
    SessionIdTooShort(String),

    #[error("instance name must not be empty")]
    EmptyName,

    #[error("an instance named '{0}' already exists")]
    DuplicateName(String),

    #[error("no instance named '{0}'")]
    UnknownInstance(String),

    #[error("working directory must be absolute: {}", .0.display())]
    RelativeWorkdir(PathBuf),

    #[error("working directory does not exist: {}", .0.display())]
    MissingWorkdir(PathBuf),

    #[error("{0} has no auto-approve mode")]
    ModeUnsupported(&'static str),

    #[error("{0} does not take a model override")]
    ModelUnsupported(&'static str),

    #[error("invalid model name '{0}'")]
    InvalidModel(String),

    #[error("cannot {action} an instance that is {status}")]
    InvalidTransition {
        action: &'static str,
        status: &'static str,
    },
}

/// A transcript could not be read or decoded.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read transcript {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse transcript {} (line {line}): {source}", path.display())]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to stat transcript {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}
