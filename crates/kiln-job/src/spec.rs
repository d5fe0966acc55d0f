//! The built job specification
//!
//! A `JobSpecification` only comes out of [`crate::builder::JobSpecBuilder`],
//! so holding one means every input was validated. It has no setters.

use std::collections::BTreeMap;

use kiln_common::crd::{ImagePullPolicy, JobMode, RoleType, RunPolicy};
use kiln_common::quantity::Quantity;

use crate::options::{DataLocations, Hyperparameters};
use crate::resolve::{ConfigFileAttachment, ConfigKey};

/// Validated resources for one role
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleSpec {
    /// Replica count, always positive
    pub replicas: u32,
    /// Priority class name
    pub priority_class: Option<String>,
    /// CPU request
    pub cpu: Quantity,
    /// Memory request
    pub memory: Quantity,
}

/// Which model the job trains
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelReference {
    /// Model zoo location
    pub zoo: Option<String>,
    /// Mount path of the model definition attachment
    pub definition: Option<String>,
}

/// Immutable, validated description of a training job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSpecification {
    pub(crate) job_name: String,
    pub(crate) namespace: String,
    pub(crate) mode: JobMode,
    pub(crate) roles: BTreeMap<RoleType, RoleSpec>,
    pub(crate) data: DataLocations,
    pub(crate) model: ModelReference,
    pub(crate) hyperparameters: Hyperparameters,
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) attachments: Vec<ConfigFileAttachment>,
    pub(crate) image: String,
    pub(crate) image_pull_policy: ImagePullPolicy,
    pub(crate) run_policy: RunPolicy,
    pub(crate) args: Vec<String>,
}

impl JobSpecification {
    /// Job name, unique in the namespace
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Target namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Job kind
    pub fn mode(&self) -> JobMode {
        self.mode
    }

    /// Roles with at least one replica, in Master, PS, Worker order
    pub fn roles(&self) -> &BTreeMap<RoleType, RoleSpec> {
        &self.roles
    }

    /// One role, if present
    pub fn role(&self, role: RoleType) -> Option<&RoleSpec> {
        self.roles.get(&role)
    }

    /// Replica count of a role, 0 when absent
    pub fn replicas(&self, role: RoleType) -> u32 {
        self.role(role).map(|r| r.replicas).unwrap_or(0)
    }

    /// Data locations
    pub fn data(&self) -> &DataLocations {
        &self.data
    }

    /// Model reference
    pub fn model(&self) -> &ModelReference {
        &self.model
    }

    /// Hyperparameters
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    /// Environment for every container
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Resolved attachments, in resolution order
    pub fn attachments(&self) -> &[ConfigFileAttachment] {
        &self.attachments
    }

    /// Attachments for one option key
    pub fn attachments_for(&self, key: ConfigKey) -> impl Iterator<Item = &ConfigFileAttachment> {
        self.attachments.iter().filter(move |a| a.key == key)
    }

    /// Container image
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Image pull policy
    pub fn image_pull_policy(&self) -> ImagePullPolicy {
        self.image_pull_policy
    }

    /// Deadline, backoff, TTL and cleanup policy
    pub fn run_policy(&self) -> &RunPolicy {
        &self.run_policy
    }

    /// Trailing user arguments
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Total pods across all roles
    pub fn total_replicas(&self) -> u32 {
        self.roles.values().map(|r| r.replicas).sum()
    }
}
