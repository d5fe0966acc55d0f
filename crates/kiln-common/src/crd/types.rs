//! Shared enums and policy types used by the TrainingJob CRD

use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Role
// =============================================================================

/// A replica role inside a distributed training job
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum RoleType {
    /// Coordinates the job and dispatches tasks
    Master,
    /// Holds model parameters
    #[serde(rename = "PS")]
    ParameterServer,
    /// Computes gradients
    Worker,
}

impl RoleType {
    /// Every role, in the order they are processed and rendered
    pub const ALL: [RoleType; 3] = [Self::Master, Self::ParameterServer, Self::Worker];

    /// Name as it appears in the resource (`replicaSpecs` key)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "Master",
            Self::ParameterServer => "PS",
            Self::Worker => "Worker",
        }
    }

    /// Lowercase form used in resource names and labels
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::ParameterServer => "ps",
            Self::Worker => "worker",
        }
    }
}

impl std::fmt::Display for RoleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Mode
// =============================================================================

/// Training-framework variant of a job, fixed per job kind
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum JobMode {
    /// ElasticDL job: master launches parameter servers and workers
    #[default]
    #[serde(rename = "elasticdljob")]
    ElasticDl,
}

impl JobMode {
    /// Name used for `--type` and the mode label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ElasticDl => "elasticdljob",
        }
    }
}

impl std::fmt::Display for JobMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "elasticdljob" | "elasticdl" => Ok(Self::ElasticDl),
            other => Err(crate::Error::validation(format!(
                "unknown job type '{}' (expected 'elasticdljob')",
                other
            ))),
        }
    }
}

// =============================================================================
// Pod policies
// =============================================================================

/// Which pods are removed once the job reaches a terminal condition
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum CleanPodPolicy {
    /// Remove every pod
    All,
    /// Remove pods that are still running or pending
    #[default]
    Running,
    /// Leave every pod in place
    None,
}

impl CleanPodPolicy {
    /// Whether a pod in the given phase must be removed after the job finishes
    pub fn should_clean(&self, pod_phase: &str) -> bool {
        match self {
            Self::All => true,
            Self::Running => matches!(pod_phase, "Running" | "Pending"),
            Self::None => false,
        }
    }
}

impl std::fmt::Display for CleanPodPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "All"),
            Self::Running => write!(f, "Running"),
            Self::None => write!(f, "None"),
        }
    }
}

impl FromStr for CleanPodPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "All" | "all" => Ok(Self::All),
            "Running" | "running" => Ok(Self::Running),
            "None" | "none" => Ok(Self::None),
            other => Err(crate::Error::validation(format!(
                "invalid clean pod policy '{}' (expected All, Running or None)",
                other
            ))),
        }
    }
}

/// Container image pull policy
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ImagePullPolicy {
    /// Pull on every start
    Always,
    /// Pull only when the image is missing
    IfNotPresent,
    /// Never pull
    Never,
}

impl std::fmt::Display for ImagePullPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::IfNotPresent => write!(f, "IfNotPresent"),
            Self::Never => write!(f, "Never"),
        }
    }
}

impl FromStr for ImagePullPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Always" => Ok(Self::Always),
            "IfNotPresent" => Ok(Self::IfNotPresent),
            "Never" => Ok(Self::Never),
            other => Err(crate::Error::validation(format!(
                "invalid image pull policy '{}' (expected Always, IfNotPresent or Never)",
                other
            ))),
        }
    }
}

/// Pod restart policy for job replicas
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never restart on failure
    #[default]
    Never,
    /// Restart on failure
    OnFailure,
    /// Always restart
    Always,
}

impl std::fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Never => write!(f, "Never"),
            Self::OnFailure => write!(f, "OnFailure"),
            Self::Always => write!(f, "Always"),
        }
    }
}

// =============================================================================
// Run policy
// =============================================================================

/// Deadline, retry and cleanup policy applied by the lifecycle contract
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunPolicy {
    /// Seconds after `Created` the job may stay non-terminal before it is
    /// forcibly failed. Must be positive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_deadline_seconds: Option<u64>,

    /// Restart attempts allowed before the job is failed. Absent means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_limit: Option<u32>,

    /// Seconds to retain the job after it finishes. Absent means forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_after_finished: Option<u32>,

    /// Pods removed once the job finishes
    #[serde(default)]
    pub clean_pod_policy: CleanPodPolicy,
}

impl RunPolicy {
    /// Validate the policy for the named job
    pub fn validate(&self, job: &str) -> Result<(), crate::Error> {
        if self.active_deadline_seconds == Some(0) {
            return Err(crate::Error::validation_for_field(
                job,
                "spec.runPolicy.activeDeadlineSeconds",
                "activeDeadlineSeconds must be a positive integer",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_types_serialize_as_replica_keys() {
        assert_eq!(
            serde_json::to_string(&RoleType::ParameterServer).unwrap(),
            "\"PS\""
        );
        assert_eq!(serde_json::to_string(&RoleType::Master).unwrap(), "\"Master\"");
        assert_eq!(RoleType::Worker.short_name(), "worker");
    }

    #[test]
    fn role_order_is_master_ps_worker() {
        let mut roles = vec![RoleType::Worker, RoleType::Master, RoleType::ParameterServer];
        roles.sort();
        assert_eq!(roles, RoleType::ALL.to_vec());
    }

    #[test]
    fn job_mode_parses_type_and_alias() {
        assert_eq!("elasticdljob".parse::<JobMode>().unwrap(), JobMode::ElasticDl);
        assert_eq!("ElasticDL".parse::<JobMode>().unwrap(), JobMode::ElasticDl);
        assert!("tfjob".parse::<JobMode>().is_err());
        assert_eq!(JobMode::ElasticDl.to_string(), "elasticdljob");
    }

    #[test]
    fn clean_pod_policy_selects_pods() {
        assert!(CleanPodPolicy::All.should_clean("Succeeded"));
        assert!(CleanPodPolicy::Running.should_clean("Running"));
        assert!(CleanPodPolicy::Running.should_clean("Pending"));
        assert!(!CleanPodPolicy::Running.should_clean("Failed"));
        assert!(!CleanPodPolicy::None.should_clean("Running"));
        assert_eq!(CleanPodPolicy::default(), CleanPodPolicy::Running);
    }

    #[test]
    fn image_pull_policy_is_case_sensitive() {
        assert_eq!(
            "IfNotPresent".parse::<ImagePullPolicy>().unwrap(),
            ImagePullPolicy::IfNotPresent
        );
        assert!("always".parse::<ImagePullPolicy>().is_err());
    }

    #[test]
    fn run_policy_rejects_zero_deadline() {
        let policy = RunPolicy {
            active_deadline_seconds: Some(0),
            ..Default::default()
        };
        let err = policy.validate("job").unwrap_err();
        assert_eq!(err.field(), Some("spec.runPolicy.activeDeadlineSeconds"));

        let policy = RunPolicy {
            active_deadline_seconds: Some(60),
            backoff_limit: Some(0),
            ttl_seconds_after_finished: Some(0),
            clean_pod_policy: CleanPodPolicy::All,
        };
        assert!(policy.validate("job").is_ok());
    }

    #[test]
    fn run_policy_omits_unset_fields() {
        let json = serde_json::to_value(RunPolicy::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "cleanPodPolicy": "Running" }));
    }
}
