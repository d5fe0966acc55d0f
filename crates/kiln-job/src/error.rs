//! Submission error types
//!
//! Every way a submission can fail, grouped by [`ErrorClass`] so callers can
//! tell a bad flag from a name clash from a flaky API server.

use kiln_common::crd::{JobMode, RoleType};

/// Broad category of a [`SubmitError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad user input; fix the flags and resubmit
    Validation,
    /// A job with the same name already exists
    Conflict,
    /// The cluster could not be reached or rejected the request
    Transport,
    /// The package could not be rendered
    Render,
}

/// Which cluster call failed during a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStage {
    /// Looking up an existing job with the same name
    DuplicateCheck,
    /// Creating the TrainingJob
    CreateJob,
    /// Creating ConfigMaps for file attachments
    CreateAttachments,
    /// Writing the initial `Created` status
    InitializeStatus,
}

impl std::fmt::Display for SubmitStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateCheck => write!(f, "duplicate check"),
            Self::CreateJob => write!(f, "job creation"),
            Self::CreateAttachments => write!(f, "attachment creation"),
            Self::InitializeStatus => write!(f, "status initialization"),
        }
    }
}

/// Errors from preparing, rendering or submitting a training job
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("invalid {field} request '{value}' for role {role}: {reason}")]
    InvalidResourceQuantity {
        role: RoleType,
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid environment variable '{token}': expected KEY=VALUE with a non-empty key")]
    InvalidEnvToken { token: String },

    #[error("role {role} has replicas but no {missing} request, and no default is configured")]
    IncompleteRoleSpec { role: RoleType, missing: &'static str },

    #[error("unknown option '{key}' for {mode} jobs")]
    UnknownConfigKey { key: String, mode: JobMode },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidConfigValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("job has no roles with replicas")]
    EmptyJobSpecification,

    #[error("model zoo '{zoo}' and model definition '{definition}' are mutually exclusive")]
    AmbiguousModelReference { zoo: String, definition: String },

    #[error("a model zoo or model definition is required")]
    MissingModelReference,

    #[error("{location} data location is required for {mode} jobs")]
    MissingDataLocation {
        location: &'static str,
        mode: JobMode,
    },

    #[error("invalid job name '{name}': {reason}")]
    InvalidJobName { name: String, reason: String },

    #[error("invalid {option} '{value}': {reason}")]
    InvalidOption {
        option: String,
        value: String,
        reason: String,
    },

    #[error("job '{name}' already exists in namespace '{namespace}'")]
    DuplicateJobName { name: String, namespace: String },

    #[error("submission failed during {stage}: {message}")]
    SubmissionTransport { stage: SubmitStage, message: String },

    #[error("failed to render job package: {message}")]
    Render { message: String },

    #[error("failed to read attachment '{path}': {message}")]
    Attachment { path: String, message: String },
}

impl SubmitError {
    /// Create a transport error for the given stage
    pub fn transport(stage: SubmitStage, message: impl Into<String>) -> Self {
        Self::SubmissionTransport {
            stage,
            message: message.into(),
        }
    }

    /// Create a render error
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
        }
    }

    /// Category of this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::DuplicateJobName { .. } => ErrorClass::Conflict,
            Self::SubmissionTransport { .. } => ErrorClass::Transport,
            Self::Render { .. } | Self::Attachment { .. } => ErrorClass::Render,
            _ => ErrorClass::Validation,
        }
    }

    /// Whether resubmitting the same inputs may succeed
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transport
    }

    /// The failed stage of a transport error
    pub fn stage(&self) -> Option<SubmitStage> {
        match self {
            Self::SubmissionTransport { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<kiln_common::template::TemplateError> for SubmitError {
    fn from(err: kiln_common::template::TemplateError) -> Self {
        Self::render(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_follow_taxonomy() {
        let validation = SubmitError::InvalidEnvToken {
            token: "NOPE".into(),
        };
        assert_eq!(validation.class(), ErrorClass::Validation);
        assert!(!validation.is_retryable());

        let conflict = SubmitError::DuplicateJobName {
            name: "mnist".into(),
            namespace: "default".into(),
        };
        assert_eq!(conflict.class(), ErrorClass::Conflict);
        assert!(!conflict.is_retryable());

        let transport = SubmitError::transport(SubmitStage::CreateJob, "connection refused");
        assert_eq!(transport.class(), ErrorClass::Transport);
        assert!(transport.is_retryable());
        assert_eq!(transport.stage(), Some(SubmitStage::CreateJob));

        let render = SubmitError::render("bad template");
        assert_eq!(render.class(), ErrorClass::Render);
        assert!(!render.is_retryable());
    }

    #[test]
    fn messages_name_the_problem() {
        let err = SubmitError::InvalidResourceQuantity {
            role: RoleType::Worker,
            field: "memory",
            value: "2GB".into(),
            reason: "unknown suffix".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("memory"));
        assert!(msg.contains("2GB"));
        assert!(msg.contains("Worker"));

        let err = SubmitError::transport(SubmitStage::InitializeStatus, "timeout");
        assert_eq!(
            err.to_string(),
            "submission failed during status initialization: timeout"
        );
    }
}
