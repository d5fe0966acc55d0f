//! Common types for Kiln: the TrainingJob CRD, resource quantities, the job
//! lifecycle contract, and the template engine used to render job packages.

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod lifecycle;
pub mod quantity;
pub mod template;

pub use error::Error;

/// Namespace used when neither the caller nor the config file names one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Field manager name used for every write Kiln makes to the cluster
pub const FIELD_MANAGER: &str = "kiln-submit";

/// Label key carrying the job name on every resource Kiln creates
pub const JOB_NAME_LABEL: &str = "kiln.dev/job-name";

/// Label key carrying the job mode on every resource Kiln creates
pub const JOB_MODE_LABEL: &str = "kiln.dev/mode";

/// Label key carrying the replica role on pod templates
pub const ROLE_LABEL: &str = "kiln.dev/role";

/// Standard managed-by label key
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label
pub const MANAGED_BY: &str = "kiln";
