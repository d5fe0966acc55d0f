//! Error types shared across Kiln crates
//!
//! Errors carry the job name and the offending field where one is known so that
//! a single line of output is enough to fix a rejected submission.

use thiserror::Error;

/// Default context value when no specific job is known yet
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Kiln common operations
#[derive(Debug, Error)]
pub enum Error {
    /// Validation error for job inputs or CRD specs
    #[error("validation error for {job}: {message}")]
    Validation {
        /// Name of the job with invalid configuration
        job: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.runPolicy.activeDeadlineSeconds")
        field: Option<String>,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            job: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with job context and field path
    pub fn validation_for_field(
        job: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            job: job.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// What is wrong, without the job prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. } => message,
        }
    }

    /// The field path attached to a validation error, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => field.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: an operator passes a bad run policy and sees which job and field broke
    #[test]
    fn validation_error_names_job_and_field() {
        let err = Error::validation_for_field(
            "mnist",
            "spec.runPolicy.activeDeadlineSeconds",
            "must be positive",
        );

        let msg = err.to_string();
        assert!(msg.contains("mnist"));
        assert!(msg.contains("must be positive"));
        assert_eq!(err.message(), "must be positive");
        assert_eq!(err.field(), Some("spec.runPolicy.activeDeadlineSeconds"));
    }

    #[test]
    fn validation_without_context_uses_unknown() {
        let err = Error::validation("name is empty");
        assert!(err.to_string().contains(UNKNOWN_CONTEXT));
        assert_eq!(err.message(), "name is empty");
        assert_eq!(err.field(), None);
    }
}
