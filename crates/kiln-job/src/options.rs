//! Raw submission inputs
//!
//! `SubmitOptions` is the immutable value a front end (the CLI, a test)
//! hands to the pipeline. Nothing here is validated yet; unset values are
//! `None` and only get their defaults during transformation and building.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use kiln_common::crd::{JobMode, RoleType};

/// Per-role inputs as typed by the user
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoleInput {
    /// Replica count; unset or 0 means the role is absent
    pub count: Option<u32>,
    /// Priority class name
    pub priority: Option<String>,
    /// CPU request
    pub cpu: Option<String>,
    /// Memory request
    pub memory: Option<String>,
}

impl RoleInput {
    /// Role with `count` replicas and the given requests
    pub fn new(count: u32, cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            count: Some(count),
            priority: None,
            cpu: Some(cpu.into()),
            memory: Some(memory.into()),
        }
    }

    /// Replica count, 0 when unset
    pub fn replicas(&self) -> u32 {
        self.count.unwrap_or(0)
    }
}

/// Inputs for every role of a job
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoleInputs {
    /// Master inputs
    pub master: RoleInput,
    /// Parameter server inputs
    pub ps: RoleInput,
    /// Worker inputs
    pub worker: RoleInput,
}

impl RoleInputs {
    /// Inputs for one role
    pub fn get(&self, role: RoleType) -> &RoleInput {
        match role {
            RoleType::Master => &self.master,
            RoleType::ParameterServer => &self.ps,
            RoleType::Worker => &self.worker,
        }
    }

    /// Mutable inputs for one role
    pub fn get_mut(&mut self, role: RoleType) -> &mut RoleInput {
        match role {
            RoleType::Master => &mut self.master,
            RoleType::ParameterServer => &mut self.ps,
            RoleType::Worker => &mut self.worker,
        }
    }
}

/// Default CPU and memory for one role
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefaults {
    /// Default CPU request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Default memory request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Per-role resource defaults applied when a role has replicas but no request
///
/// Loaded from the user config file, keyed by role (`Master`, `PS`, `Worker`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceDefaults {
    roles: BTreeMap<RoleType, RoleDefaults>,
}

impl ResourceDefaults {
    /// Set the defaults for one role
    pub fn with_role(
        mut self,
        role: RoleType,
        cpu: impl Into<String>,
        memory: impl Into<String>,
    ) -> Self {
        self.roles.insert(
            role,
            RoleDefaults {
                cpu: Some(cpu.into()),
                memory: Some(memory.into()),
            },
        );
        self
    }

    /// Default CPU request for a role
    pub fn cpu(&self, role: RoleType) -> Option<&str> {
        self.roles.get(&role).and_then(|d| d.cpu.as_deref())
    }

    /// Default memory request for a role
    pub fn memory(&self, role: RoleType) -> Option<&str> {
        self.roles.get(&role).and_then(|d| d.memory.as_deref())
    }
}

/// A mode-specific `key=value` option that references files or volumes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtendedOption {
    /// Option key, e.g. `modelDef`
    pub key: String,
    /// Raw value
    pub value: String,
}

impl ExtendedOption {
    /// Create an extended option
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Training, validation and output locations, passed through as opaque URIs
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataLocations {
    /// Training data
    pub training: Option<String>,
    /// Validation data
    pub validation: Option<String>,
    /// Output location
    pub output: Option<String>,
}

/// Training hyperparameters; zero means the framework default
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Hyperparameters {
    /// Number of epochs
    pub epoch_count: u32,
    /// Minibatch size
    pub minibatch_size: u32,
    /// Minibatches per task
    pub minibatches_per_task: u32,
    /// Steps between evaluations
    pub evaluation_steps: u32,
}

impl Hyperparameters {
    /// Non-default values as launch flag names
    pub fn explicit(&self) -> Vec<(&'static str, u32)> {
        [
            ("num_epochs", self.epoch_count),
            ("minibatch_size", self.minibatch_size),
            ("num_minibatches_per_task", self.minibatches_per_task),
            ("evaluation_steps", self.evaluation_steps),
        ]
        .into_iter()
        .filter(|(_, v)| *v > 0)
        .collect()
    }
}

/// Fields shared by every job kind
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommonJobOptions {
    /// Job name; must be a DNS-1123 label
    pub name: String,
    /// Target namespace; falls back to `default`
    pub namespace: Option<String>,
    /// Container image for every role
    pub image: Option<String>,
    /// Image pull policy (`Always`, `IfNotPresent`, `Never`)
    pub image_pull_policy: Option<String>,
    /// `KEY=VALUE` environment tokens
    pub env: Vec<String>,
    /// Seconds after creation before the job is forcibly failed
    pub active_deadline_seconds: Option<u64>,
    /// Restarts allowed before failing
    pub backoff_limit: Option<u32>,
    /// Seconds to retain the job after it finishes
    pub ttl_seconds_after_finished: Option<u32>,
    /// Pod cleanup policy (`All`, `Running`, `None`)
    pub clean_pod_policy: Option<String>,
    /// Trailing arguments appended to every role's launch command
    pub args: Vec<String>,
}

/// Complete raw input for one submission
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Shared job fields
    pub common: CommonJobOptions,
    /// Job kind
    pub mode: JobMode,
    /// Per-role inputs
    pub roles: RoleInputs,
    /// Data locations
    pub data: DataLocations,
    /// Model zoo reference
    pub model_zoo: Option<String>,
    /// Hyperparameters
    pub hyperparameters: Hyperparameters,
    /// Mode-specific file and volume options
    pub extended: Vec<ExtendedOption>,
}
