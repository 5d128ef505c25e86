//! Error types for the compose-to-swarm translator.
//!
//! This module provides the error hierarchy for every stage of a run:
//! loading and merging compose documents, resolving service definitions,
//! translating parameters, and executing external commands.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the translator.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Document merge errors.
    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    /// External command errors.
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Manifest serialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A compose file was not found.
    #[error("Compose file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// A compose file could not be parsed.
    #[error("Failed to parse compose file: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// An `extends` reference names a service that does not exist.
    #[error("Service '{service}' extends unknown service '{target}'{}", file_suffix(.file.as_ref()))]
    UnresolvedExtends {
        /// The extending service.
        service: String,
        /// The referenced service.
        target: String,
        /// The referenced file, if any.
        file: Option<PathBuf>,
    },

    /// `extends` references form a cycle.
    #[error("Circular extends detected: {cycle}")]
    CircularExtends {
        /// Description of the cycle.
        cycle: String,
    },

    /// A service references a network missing from the `networks` section.
    #[error("Network '{network}' used by service '{service}' is not defined in networks")]
    UndeclaredNetwork {
        /// The referencing service.
        service: String,
        /// The missing network.
        network: String,
    },

    /// A service has no `image`.
    #[error("No image specified for service '{service}'")]
    MissingImage {
        /// The service without an image.
        service: String,
    },

    /// A parameter value lies outside the accepted set.
    #[error("Unsupported value '{value}' for '{parameter}' in service '{service}'")]
    UnsupportedValue {
        /// The service being translated.
        service: String,
        /// The parameter name.
        parameter: String,
        /// The rejected value.
        value: String,
    },

    /// A parameter value has the wrong shape.
    #[error("Invalid value for '{parameter}' in service '{service}': {message}")]
    InvalidValue {
        /// The service being translated.
        service: String,
        /// The parameter name.
        parameter: String,
        /// What was wrong with it.
        message: String,
    },

    /// A requested service is not defined.
    #[error("No such service: {name}")]
    UnknownService {
        /// The requested service name.
        name: String,
    },
}

/// Document merge errors.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Two documents disagree on a leaf value and no resolver applies.
    #[error("Conflict at {path}")]
    Conflict {
        /// Dotted path to the conflicting key.
        path: String,
    },
}

/// External command errors.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The process could not be started.
    #[error("Failed to spawn command \"{command}\": {message}")]
    SpawnFailed {
        /// The command line.
        command: String,
        /// Description of the failure.
        message: String,
    },

    /// The process exited with a nonzero status.
    #[error("Command \"{command}\" failed with exit code {exit_code}: {output}")]
    Failed {
        /// The command line.
        command: String,
        /// Exit code reported by the process.
        exit_code: i32,
        /// Combined stdout and stderr.
        output: String,
    },

    /// One or more nodes failed to pull their images.
    #[error("Image pull failed on {failed} of {total} nodes")]
    PullFailed {
        /// Number of failed nodes.
        failed: usize,
        /// Number of nodes attempted.
        total: usize,
    },
}

/// Result type alias for translator operations.
pub type Result<T> = std::result::Result<T, ComposeError>;

fn file_suffix(file: Option<&PathBuf>) -> String {
    file.map(|f| format!(" in {}", f.display())).unwrap_or_default()
}

impl ComposeError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the process exit status this error should terminate with.
    ///
    /// A failed external command propagates its own exit code; every other
    /// error exits with 1.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Command(CommandError::Failed { exit_code, .. }) => {
                u8::try_from(*exit_code).ok().filter(|c| *c != 0).unwrap_or(1)
            }
            _ => 1,
        }
    }
}

impl ConfigError {
    /// Creates an invalid value error for a service parameter.
    #[must_use]
    pub fn invalid_value(
        service: impl Into<String>,
        parameter: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            service: service.into(),
            parameter: parameter.into(),
            message: message.into(),
        }
    }
}

impl CommandError {
    /// Creates a spawn failure error.
    #[must_use]
    pub fn spawn(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            command: command.into(),
            message: message.into(),
        }
    }
}
