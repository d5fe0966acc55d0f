//! Error types for the CLI

use std::path::PathBuf;

use kiln_job::SubmitError;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config file {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("job {name} not found in namespace {namespace}")]
    JobNotFound { name: String, namespace: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("command failed: {message}")]
    CommandFailed { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Error::CommandFailed {
            message: message.into(),
        }
    }

    /// Process exit code: 2 for input the user must fix, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Submit(e) if e.class() == kiln_job::ErrorClass::Validation => 2,
            Error::Validation { .. } | Error::Config { .. } => 2,
            _ => 1,
        }
    }
}
