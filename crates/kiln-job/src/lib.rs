//! Training job submission pipeline
//!
//! Turns raw submit options into a running `TrainingJob`:
//! - `ArgumentTransformer` normalizes per-role resources and environment
//! - `ConfigFileResolver` turns extended options into attachments
//! - `JobSpecBuilder` validates everything into a `JobSpecification`
//! - `ManifestRenderer` renders the deployment package
//! - `DeploymentSubmitter` creates it in the cluster exactly once

pub mod builder;
pub mod error;
pub mod options;
pub mod render;
pub mod resolve;
pub mod spec;
pub mod store;
pub mod submit;
pub mod transform;

pub use builder::{JobSpecBuilder, DEFAULT_IMAGE};
pub use error::{ErrorClass, SubmitError, SubmitStage};
pub use options::{
    CommonJobOptions, DataLocations, ExtendedOption, Hyperparameters, ResourceDefaults,
    RoleDefaults, RoleInput, RoleInputs, SubmitOptions,
};
pub use render::{DeploymentPackage, ManifestRenderer, PackageRenderer};
pub use resolve::{ConfigFileAttachment, ConfigFileResolver, ConfigKey};
pub use spec::{JobSpecification, ModelReference, RoleSpec};
pub use store::{JobStore, KubeJobStore, StoreError};
pub use submit::{DeploymentSubmitter, SubmissionReceipt};
pub use transform::{ArgumentTransformer, TransformedArguments};

/// Run the pre-submission stages: transform, resolve, build
///
/// Fails on the first invalid input. Nothing here touches the cluster, so the
/// result can be rendered for a dry run or handed to a submitter.
pub fn prepare_job(
    options: &SubmitOptions,
    defaults: &ResourceDefaults,
) -> Result<JobSpecification, SubmitError> {
    let args = ArgumentTransformer::new(defaults).transform(&options.roles, &options.common.env)?;
    let attachments = ConfigFileResolver::new(options.mode).resolve(&options.extended)?;
    JobSpecBuilder::new(options).build(args, attachments)
}
