//! TrainingJob CRD types
//!
//! Defines `TrainingJob`, the persisted record of a submitted training job:
//! per-role replica specs plus the run policy in `spec`, and the append-only
//! condition log in `status`. The status is owned by the cluster's reconciler
//! once the job is accepted; see [`crate::lifecycle`] for the rules it follows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{JobMode, RestartPolicy, RoleType, RunPolicy};

// =============================================================================
// Conditions
// =============================================================================

/// Lifecycle condition of a TrainingJob
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum JobConditionType {
    /// Accepted by the cluster, no pods running yet
    Created,
    /// Pods are running
    Running,
    /// A replica failed and the job is being restarted
    Restarting,
    /// All replicas completed successfully
    Succeeded,
    /// The job failed and will not be restarted
    Failed,
}

impl JobConditionType {
    /// Returns true for `Succeeded` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for JobConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::Restarting => write!(f, "Restarting"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// One entry of the condition log
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobCondition {
    /// Lifecycle state entered
    #[serde(rename = "type")]
    pub type_: JobConditionType,

    /// Machine-readable reason for the transition
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// When the transition happened
    pub last_transition_time: DateTime<Utc>,
}

impl JobCondition {
    /// Create a condition entered at `at`
    pub fn new(
        type_: JobConditionType,
        reason: impl Into<String>,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            type_,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: at,
        }
    }
}

// =============================================================================
// Replica spec
// =============================================================================

/// Desired state of one role
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSpec {
    /// Number of pods for this role
    pub replicas: u32,

    /// Pod restart policy
    #[serde(default)]
    pub restart_policy: RestartPolicy,

    /// Pod template, passed through as JSON from the renderer
    pub template: serde_json::Value,
}

/// Observed pod counts for one role
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaStatus {
    /// Pods currently running
    #[serde(default)]
    pub active: u32,
    /// Pods that exited successfully
    #[serde(default)]
    pub succeeded: u32,
    /// Pods that failed
    #[serde(default)]
    pub failed: u32,
}

// =============================================================================
// CRD
// =============================================================================

/// Distributed training job
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kiln.dev",
    version = "v1alpha1",
    kind = "TrainingJob",
    plural = "trainingjobs",
    shortname = "tj",
    namespaced,
    status = "TrainingJobStatus",
    printcolumn = r#"{"name":"Mode","type":"string","jsonPath":".spec.mode"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.conditions[-1:].type"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#,
    printcolumn = r#"{"name":"Finished-TTL","type":"integer","jsonPath":".spec.ttlSecondsAfterFinished"}"#,
    printcolumn = r#"{"name":"Max-Lifetime","type":"integer","jsonPath":".spec.activeDeadlineSeconds"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TrainingJobSpec {
    /// Training-framework variant
    pub mode: JobMode,

    /// Deadline, backoff, TTL and pod cleanup policy
    #[serde(flatten)]
    pub run_policy: RunPolicy,

    /// One entry per role with at least one replica
    pub replica_specs: BTreeMap<RoleType, ReplicaSpec>,
}

impl TrainingJobSpec {
    /// Total pods across all roles
    pub fn total_replicas(&self) -> u32 {
        self.replica_specs.values().map(|r| r.replicas).sum()
    }
}

/// Observed state of a TrainingJob
///
/// The only constructor is [`TrainingJobStatus::created`]; every later change
/// goes through the lifecycle contract so the condition log stays monotonic.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrainingJobStatus {
    /// Append-only condition log; the last entry is the current state
    #[serde(default)]
    pub(crate) conditions: Vec<JobCondition>,

    /// Per-role pod counts
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub replica_statuses: BTreeMap<RoleType, ReplicaStatus>,

    /// Restarts performed so far
    #[serde(default)]
    pub restart_count: u32,

    /// When the first pod started running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// When the job reached a terminal condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
}
