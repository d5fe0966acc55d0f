//! Job specification builder
//!
//! Merges transformed arguments and resolved attachments with the shared job
//! options into one [`JobSpecification`]. Validation is fail-fast, in a fixed
//! order: job name, image pull policy, run policy, roles, model reference,
//! data locations.

use tracing::debug;

use kiln_common::crd::{validate_dns_label, CleanPodPolicy, ImagePullPolicy, JobMode, RunPolicy};
use kiln_common::DEFAULT_NAMESPACE;

use crate::error::SubmitError;
use crate::options::{DataLocations, SubmitOptions};
use crate::resolve::{ConfigFileAttachment, ConfigKey};
use crate::spec::{JobSpecification, ModelReference};
use crate::transform::TransformedArguments;

/// Image used when neither the flags nor the config file name one
pub const DEFAULT_IMAGE: &str = "elasticdl/elasticdl:latest";

/// What a mode demands of the model reference and data locations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeRequirements {
    /// Zoo and definition may not both be given
    pub exclusive_model: bool,
    /// Training data must be given
    pub requires_training_data: bool,
}

impl ModeRequirements {
    /// Requirements for a mode
    pub fn for_mode(mode: JobMode) -> Self {
        match mode {
            JobMode::ElasticDl => Self {
                exclusive_model: true,
                requires_training_data: true,
            },
        }
    }
}

/// Builds a [`JobSpecification`] from raw options plus pipeline outputs
pub struct JobSpecBuilder<'a> {
    options: &'a SubmitOptions,
}

impl<'a> JobSpecBuilder<'a> {
    /// Builder over `options`
    pub fn new(options: &'a SubmitOptions) -> Self {
        Self { options }
    }

    /// Validate and assemble the specification
    pub fn build(
        self,
        args: TransformedArguments,
        attachments: Vec<ConfigFileAttachment>,
    ) -> Result<JobSpecification, SubmitError> {
        let common = &self.options.common;
        let mode = self.options.mode;

        validate_dns_label(&common.name).map_err(|reason| SubmitError::InvalidJobName {
            name: common.name.clone(),
            reason,
        })?;

        let namespace = non_empty(common.namespace.as_deref())
            .unwrap_or(DEFAULT_NAMESPACE)
            .to_string();
        validate_dns_label(&namespace).map_err(|reason| SubmitError::InvalidOption {
            option: "namespace".to_string(),
            value: namespace.clone(),
            reason,
        })?;

        let image_pull_policy = image_pull_policy(common.image_pull_policy.as_deref())?;
        let run_policy = self.run_policy()?;

        if args.roles.is_empty() {
            return Err(SubmitError::EmptyJobSpecification);
        }

        let requirements = ModeRequirements::for_mode(mode);
        let model = model_reference(
            non_empty(self.options.model_zoo.as_deref()),
            &attachments,
            requirements,
        )?;
        let data = data_locations(&self.options.data, mode, requirements)?;

        let image = non_empty(common.image.as_deref())
            .unwrap_or(DEFAULT_IMAGE)
            .to_string();

        debug!(
            job = %common.name,
            namespace = %namespace,
            roles = args.roles.len(),
            attachments = attachments.len(),
            "built job specification"
        );

        Ok(JobSpecification {
            job_name: common.name.clone(),
            namespace,
            mode,
            roles: args.roles,
            data,
            model,
            hyperparameters: self.options.hyperparameters,
            env: args.env,
            attachments,
            image,
            image_pull_policy,
            run_policy,
            args: common.args.clone(),
        })
    }

    fn run_policy(&self) -> Result<RunPolicy, SubmitError> {
        let common = &self.options.common;

        let clean_pod_policy = match non_empty(common.clean_pod_policy.as_deref()) {
            Some(v) => v
                .parse::<CleanPodPolicy>()
                .map_err(|e| invalid_option("cleanPodPolicy", v, &e))?,
            None => CleanPodPolicy::default(),
        };

        let policy = RunPolicy {
            active_deadline_seconds: common.active_deadline_seconds,
            backoff_limit: common.backoff_limit,
            ttl_seconds_after_finished: common.ttl_seconds_after_finished,
            clean_pod_policy,
        };
        policy.validate(&common.name).map_err(|e| {
            // Field paths end in the camelCase policy key, which is also the option name
            let option = e
                .field()
                .and_then(|f| f.rsplit('.').next())
                .unwrap_or("runPolicy");
            let value = serde_json::to_value(&policy)
                .ok()
                .and_then(|v| v.get(option).map(|v| v.to_string()))
                .unwrap_or_default();
            invalid_option(option, &value, &e)
        })?;
        Ok(policy)
    }
}

fn invalid_option(option: &str, value: &str, err: &kiln_common::Error) -> SubmitError {
    SubmitError::InvalidOption {
        option: option.to_string(),
        value: value.to_string(),
        reason: err.message().to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn image_pull_policy(value: Option<&str>) -> Result<ImagePullPolicy, SubmitError> {
    match non_empty(value) {
        None => Ok(ImagePullPolicy::IfNotPresent),
        Some(v) => v
            .parse::<ImagePullPolicy>()
            .map_err(|e| invalid_option("imagePullPolicy", v, &e)),
    }
}

fn model_reference(
    zoo: Option<&str>,
    attachments: &[ConfigFileAttachment],
    requirements: ModeRequirements,
) -> Result<ModelReference, SubmitError> {
    let definition = attachments
        .iter()
        .find(|a| a.key == ConfigKey::ModelDef)
        .map(|a| a.mount_path.clone());

    match (zoo, definition) {
        (None, None) => Err(SubmitError::MissingModelReference),
        (Some(zoo), Some(definition)) if requirements.exclusive_model => {
            Err(SubmitError::AmbiguousModelReference {
                zoo: zoo.to_string(),
                definition,
            })
        }
        (zoo, definition) => Ok(ModelReference {
            zoo: zoo.map(str::to_string),
            definition,
        }),
    }
}

fn data_locations(
    data: &DataLocations,
    mode: JobMode,
    requirements: ModeRequirements,
) -> Result<DataLocations, SubmitError> {
    let cleaned = DataLocations {
        training: non_empty(data.training.as_deref()).map(str::to_string),
        validation: non_empty(data.validation.as_deref()).map(str::to_string),
        output: non_empty(data.output.as_deref()).map(str::to_string),
    };
    if requirements.requires_training_data && cleaned.training.is_none() {
        return Err(SubmitError::MissingDataLocation {
            location: "training",
            mode,
        });
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{CommonJobOptions, ExtendedOption, ResourceDefaults, RoleInput, RoleInputs};
    use crate::resolve::ConfigFileResolver;
    use crate::transform::ArgumentTransformer;
    use kiln_common::crd::RoleType;

    fn options() -> SubmitOptions {
        SubmitOptions {
            common: CommonJobOptions {
                name: "mnist".into(),
                ..Default::default()
            },
            mode: JobMode::ElasticDl,
            roles: RoleInputs {
                master: RoleInput::new(1, "1", "1Gi"),
                worker: RoleInput::new(2, "2", "4Gi"),
                ..Default::default()
            },
            data: DataLocations {
                training: Some("/data/mnist/train".into()),
                ..Default::default()
            },
            model_zoo: Some("model_zoo".into()),
            ..Default::default()
        }
    }

    fn build(options: &SubmitOptions) -> Result<JobSpecification, SubmitError> {
        let defaults = ResourceDefaults::default();
        let args = ArgumentTransformer::new(&defaults)
            .transform(&options.roles, &options.common.env)?;
        let attachments = ConfigFileResolver::new(options.mode).resolve(&options.extended)?;
        JobSpecBuilder::new(options).build(args, attachments)
    }

    #[test]
    fn builds_with_defaults() {
        let spec = build(&options()).unwrap();
        assert_eq!(spec.job_name(), "mnist");
        assert_eq!(spec.namespace(), DEFAULT_NAMESPACE);
        assert_eq!(spec.mode(), JobMode::ElasticDl);
        assert_eq!(spec.image(), DEFAULT_IMAGE);
        assert_eq!(spec.image_pull_policy(), ImagePullPolicy::IfNotPresent);
        assert_eq!(spec.replicas(RoleType::Worker), 2);
        assert_eq!(spec.replicas(RoleType::ParameterServer), 0);
        assert_eq!(spec.total_replicas(), 3);
        assert_eq!(spec.model().zoo.as_deref(), Some("model_zoo"));
        assert_eq!(spec.run_policy().clean_pod_policy, CleanPodPolicy::Running);
    }

    #[test]
    fn building_twice_is_equal() {
        let opts = options();
        assert_eq!(build(&opts).unwrap(), build(&opts).unwrap());
    }

    #[test]
    fn invalid_name_is_checked_first() {
        let mut opts = options();
        opts.common.name = "MNIST_job".into();
        opts.common.image_pull_policy = Some("sometimes".into());
        opts.model_zoo = None;
        assert!(matches!(build(&opts), Err(SubmitError::InvalidJobName { .. })));
    }

    #[test]
    fn pull_policy_before_run_policy() {
        let mut opts = options();
        opts.common.image_pull_policy = Some("always".into());
        opts.common.active_deadline_seconds = Some(0);
        assert!(matches!(
            build(&opts),
            Err(SubmitError::InvalidOption { ref option, .. }) if option == "imagePullPolicy"
        ));
    }

    #[test]
    fn zero_deadline_is_rejected() {
        let mut opts = options();
        opts.common.active_deadline_seconds = Some(0);
        match build(&opts) {
            Err(SubmitError::InvalidOption {
                option,
                value,
                reason,
            }) => {
                assert_eq!(option, "activeDeadlineSeconds");
                assert_eq!(value, "0");
                assert_eq!(reason, "activeDeadlineSeconds must be a positive integer");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn bad_clean_pod_policy_is_rejected() {
        let mut opts = options();
        opts.common.clean_pod_policy = Some("Sometimes".into());
        let err = build(&opts).unwrap_err();
        assert!(matches!(
            err,
            SubmitError::InvalidOption { ref option, .. } if option == "cleanPodPolicy"
        ));
        assert!(err.to_string().contains("expected All, Running or None"), "{err}");
    }

    #[test]
    fn empty_roles_are_rejected() {
        let mut opts = options();
        opts.roles = RoleInputs::default();
        assert!(matches!(build(&opts), Err(SubmitError::EmptyJobSpecification)));
    }

    #[test]
    fn zoo_and_definition_are_ambiguous() {
        let mut opts = options();
        opts.extended = vec![ExtendedOption::new("modelDef", "mnist.py")];
        match build(&opts) {
            Err(SubmitError::AmbiguousModelReference { zoo, definition }) => {
                assert_eq!(zoo, "model_zoo");
                assert_eq!(definition, "/kiln/model/mnist.py");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn definition_alone_is_the_mount_path() {
        let mut opts = options();
        opts.model_zoo = Some("  ".into());
        opts.extended = vec![ExtendedOption::new("modelDef", "src/mnist.py")];
        let spec = build(&opts).unwrap();
        assert_eq!(spec.model().zoo, None);
        assert_eq!(spec.model().definition.as_deref(), Some("/kiln/model/mnist.py"));
        assert_eq!(spec.attachments_for(ConfigKey::ModelDef).count(), 1);
    }

    #[test]
    fn missing_model_is_rejected() {
        let mut opts = options();
        opts.model_zoo = None;
        assert!(matches!(build(&opts), Err(SubmitError::MissingModelReference)));
    }

    #[test]
    fn training_data_is_required() {
        let mut opts = options();
        opts.data.training = Some("".into());
        assert!(matches!(
            build(&opts),
            Err(SubmitError::MissingDataLocation {
                location: "training",
                ..
            })
        ));
    }

    #[test]
    fn explicit_namespace_and_image_are_kept() {
        let mut opts = options();
        opts.common.namespace = Some("ml-team".into());
        opts.common.image = Some("registry.local/elasticdl:1.0".into());
        opts.common.image_pull_policy = Some("Always".into());
        let spec = build(&opts).unwrap();
        assert_eq!(spec.namespace(), "ml-team");
        assert_eq!(spec.image(), "registry.local/elasticdl:1.0");
        assert_eq!(spec.image_pull_policy(), ImagePullPolicy::Always);
    }
}
