use std::path::PathBuf;

use thiserror::Error;

/// Image purge error types
#[derive(Error, Debug)]
pub enum PurgeError {
    /// Missing or invalid option
    #[error("Configuration error: {0}")]
    Config(String),

    /// A supplied regular expression failed to compile
    #[error("Invalid {name} pattern: {source}")]
    Pattern {
        name: &'static str,
        #[source]
        source: regex::Error,
    },

    /// An external command exited with a non-zero status
    #[error("Command failed: {command} ({status})")]
    CommandFailed {
        command: String,
        status: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// An external command could not be started
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The working copy has uncommitted changes
    #[error("Repository has uncommitted changes: {}", .0.display())]
    DirtyRepository(PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_yaml::Error> for PurgeError {
    fn from(err: serde_yaml::Error) -> Self {
        PurgeError::Serialization(err.to_string())
    }
}

/// Result type alias for image purge operations
pub type Result<T> = std::result::Result<T, PurgeError>;
