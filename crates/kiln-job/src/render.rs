//! Package rendering
//!
//! Turns a [`JobSpecification`] into the cluster resources that make up a
//! deployment:
//! - One `TrainingJob` with a pod template per role. Each role's container
//!   runs a launch script rendered from `templates/elasticdl.sh.j2`.
//! - One `ConfigMap` per file attachment, holding the file's contents. Text
//!   goes under `data`; anything that is not UTF-8 goes under `binaryData`.
//!
//! Owner references are not set here; the submitter adds them once the
//! TrainingJob exists and has a UID.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use kiln_common::crd::{
    ReplicaSpec, RestartPolicy, RoleType, TrainingJob, TrainingJobSpec,
};
use kiln_common::template::{TemplateContext, TemplateEngine};
use kiln_common::{JOB_MODE_LABEL, JOB_NAME_LABEL, MANAGED_BY, MANAGED_BY_LABEL, ROLE_LABEL};

use crate::error::SubmitError;
use crate::resolve::{AttachmentSource, ConfigFileAttachment, VolumeSource};
use crate::spec::{JobSpecification, RoleSpec};

/// Launch script template for ElasticDL roles
pub const LAUNCH_TEMPLATE: &str = include_str!("../templates/elasticdl.sh.j2");

const LAUNCH_TEMPLATE_NAME: &str = "elasticdl.sh.j2";
const CONTAINER_NAME: &str = "elasticdl";

/// Everything one submission creates in the cluster
#[derive(Clone, Debug)]
pub struct DeploymentPackage {
    /// The job resource
    pub job: TrainingJob,
    /// One ConfigMap per file attachment, in attachment order
    pub config_maps: Vec<ConfigMap>,
}

impl DeploymentPackage {
    /// Multi-document YAML of every resource, job first
    pub fn to_yaml(&self) -> Result<String, SubmitError> {
        let mut docs = Vec::with_capacity(1 + self.config_maps.len());
        docs.push(
            serde_yaml::to_string(&self.job)
                .map_err(|e| SubmitError::render(format!("TrainingJob: {}", e)))?,
        );
        for cm in &self.config_maps {
            docs.push(
                serde_yaml::to_string(cm)
                    .map_err(|e| SubmitError::render(format!("ConfigMap: {}", e)))?,
            );
        }
        Ok(docs.join("---\n"))
    }
}

/// Turns a specification into a deployable package
#[cfg_attr(test, automock)]
pub trait PackageRenderer: Send + Sync {
    /// Render every resource for `spec`
    fn render(&self, spec: &JobSpecification) -> Result<DeploymentPackage, SubmitError>;
}

/// Renders TrainingJob manifests with minijinja launch scripts
pub struct ManifestRenderer {
    engine: TemplateEngine,
}

impl ManifestRenderer {
    /// Create a renderer
    pub fn new() -> Result<Self, SubmitError> {
        Ok(Self {
            engine: TemplateEngine::new()?,
        })
    }

    fn launch_script(
        &self,
        base: &TemplateContext,
        role: RoleType,
        role_spec: &RoleSpec,
    ) -> Result<String, SubmitError> {
        let mut section = BTreeMap::new();
        section.insert("name".to_string(), role.short_name().to_string());
        section.insert("replicas".to_string(), role_spec.replicas.to_string());
        section.insert("cpu".to_string(), role_spec.cpu.to_string());
        section.insert("memory".to_string(), role_spec.memory.to_string());
        if let Some(priority) = &role_spec.priority_class {
            section.insert("priority".to_string(), priority.clone());
        }

        let ctx = base.for_role(section);
        Ok(self
            .engine
            .render_named(LAUNCH_TEMPLATE_NAME, LAUNCH_TEMPLATE, &ctx)?)
    }
}

impl PackageRenderer for ManifestRenderer {
    fn render(&self, spec: &JobSpecification) -> Result<DeploymentPackage, SubmitError> {
        let base = base_context(spec);
        let (volumes, mounts) = volumes_and_mounts(spec);

        let mut replica_specs = BTreeMap::new();
        for (role, role_spec) in spec.roles() {
            let script = self.launch_script(&base, *role, role_spec)?;
            let template = pod_template(spec, *role, role_spec, script, &volumes, &mounts);
            replica_specs.insert(
                *role,
                ReplicaSpec {
                    replicas: role_spec.replicas,
                    restart_policy: restart_policy(*role),
                    template,
                },
            );
        }

        let mut job = TrainingJob::new(
            spec.job_name(),
            TrainingJobSpec {
                mode: spec.mode(),
                run_policy: spec.run_policy().clone(),
                replica_specs,
            },
        );
        job.metadata.namespace = Some(spec.namespace().to_string());
        job.metadata.labels = Some(job_labels(spec));

        let config_maps = config_maps(spec)?;

        debug!(
            job = %spec.job_name(),
            roles = spec.roles().len(),
            config_maps = config_maps.len(),
            "rendered deployment package"
        );
        Ok(DeploymentPackage { job, config_maps })
    }
}

/// Name of the ConfigMap carrying attachment `index`
pub fn config_map_name(job: &str, attachment: &ConfigFileAttachment, index: usize) -> String {
    format!("{}-{}-{}", job, attachment.key.slug(), index)
}

fn job_labels(spec: &JobSpecification) -> BTreeMap<String, String> {
    BTreeMap::from([
        (JOB_NAME_LABEL.to_string(), spec.job_name().to_string()),
        (JOB_MODE_LABEL.to_string(), spec.mode().to_string()),
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string()),
    ])
}

fn restart_policy(role: RoleType) -> RestartPolicy {
    match role {
        RoleType::Master => RestartPolicy::Never,
        RoleType::ParameterServer | RoleType::Worker => RestartPolicy::OnFailure,
    }
}

fn base_context(spec: &JobSpecification) -> TemplateContext {
    let mut builder = TemplateContext::builder()
        .job("name", spec.job_name())
        .job("namespace", spec.namespace())
        .job("mode", spec.mode().as_str())
        .job("image", spec.image())
        .args(spec.args().iter().cloned());

    for role in RoleType::ALL {
        builder = builder.replicas(role.short_name(), spec.replicas(role));
    }

    let data = spec.data();
    for (key, value) in [
        ("training", &data.training),
        ("validation", &data.validation),
        ("output", &data.output),
    ] {
        if let Some(v) = value {
            builder = builder.data(key, v.as_str());
        }
    }

    let model = spec.model();
    if let Some(zoo) = &model.zoo {
        builder = builder.model("zoo", zoo.as_str());
    }
    if let Some(definition) = &model.definition {
        builder = builder.model("definition", definition.as_str());
    }

    for (key, value) in spec.hyperparameters().explicit() {
        builder = builder.param(key, value.to_string());
    }

    builder.build()
}

fn volumes_and_mounts(spec: &JobSpecification) -> (Vec<serde_json::Value>, Vec<serde_json::Value>) {
    let mut volumes = Vec::new();
    let mut mounts = Vec::new();

    for (index, attachment) in spec.attachments().iter().enumerate() {
        let name = format!("attachment-{}", index);
        match &attachment.source {
            AttachmentSource::File { file_name, .. } => {
                volumes.push(serde_json::json!({
                    "name": name,
                    "configMap": { "name": config_map_name(spec.job_name(), attachment, index) },
                }));
                mounts.push(serde_json::json!({
                    "name": name,
                    "mountPath": attachment.mount_path,
                    "subPath": file_name,
                    "readOnly": true,
                }));
            }
            AttachmentSource::Volume(VolumeSource::Claim { claim_name }) => {
                volumes.push(serde_json::json!({
                    "name": name,
                    "persistentVolumeClaim": { "claimName": claim_name },
                }));
                mounts.push(serde_json::json!({
                    "name": name,
                    "mountPath": attachment.mount_path,
                }));
            }
            AttachmentSource::Volume(VolumeSource::HostPath { path }) => {
                volumes.push(serde_json::json!({
                    "name": name,
                    "hostPath": { "path": path },
                }));
                mounts.push(serde_json::json!({
                    "name": name,
                    "mountPath": attachment.mount_path,
                }));
            }
        }
    }

    (volumes, mounts)
}

/// Pod template for one role, as JSON for the TrainingJob replica spec
fn pod_template(
    spec: &JobSpecification,
    role: RoleType,
    role_spec: &RoleSpec,
    script: String,
    volumes: &[serde_json::Value],
    mounts: &[serde_json::Value],
) -> serde_json::Value {
    let mut labels = job_labels(spec);
    labels.insert(ROLE_LABEL.to_string(), role.short_name().to_string());

    let env: Vec<serde_json::Value> = spec
        .env()
        .iter()
        .map(|(name, value)| serde_json::json!({ "name": name, "value": value }))
        .collect();

    let resources = serde_json::json!({
        "cpu": role_spec.cpu.as_str(),
        "memory": role_spec.memory.as_str(),
    });

    let mut container = serde_json::json!({
        "name": CONTAINER_NAME,
        "image": spec.image(),
        "imagePullPolicy": spec.image_pull_policy().to_string(),
        "command": ["/bin/sh", "-c", script],
        "resources": { "requests": resources, "limits": resources },
    });
    if !env.is_empty() {
        container["env"] = serde_json::Value::Array(env);
    }
    if !mounts.is_empty() {
        container["volumeMounts"] = serde_json::Value::Array(mounts.to_vec());
    }

    let mut pod_spec = serde_json::json!({
        "restartPolicy": restart_policy(role).to_string(),
        "containers": [container],
    });
    if let Some(priority) = &role_spec.priority_class {
        pod_spec["priorityClassName"] = serde_json::Value::String(priority.clone());
    }
    if !volumes.is_empty() {
        pod_spec["volumes"] = serde_json::Value::Array(volumes.to_vec());
    }

    serde_json::json!({
        "metadata": { "labels": labels },
        "spec": pod_spec,
    })
}

fn config_maps(spec: &JobSpecification) -> Result<Vec<ConfigMap>, SubmitError> {
    let mut out = Vec::new();
    for (index, attachment) in spec.attachments().iter().enumerate() {
        let AttachmentSource::File { path, file_name } = &attachment.source else {
            continue;
        };

        let bytes = std::fs::read(path).map_err(|e| SubmitError::Attachment {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let mut config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(config_map_name(spec.job_name(), attachment, index)),
                namespace: Some(spec.namespace().to_string()),
                labels: Some(job_labels(spec)),
                ..Default::default()
            },
            ..Default::default()
        };
        match String::from_utf8(bytes) {
            Ok(text) => config_map.data = Some(BTreeMap::from([(file_name.clone(), text)])),
            Err(e) => {
                debug!(path = %path.display(), "attachment is not UTF-8, storing as binaryData");
                config_map.binary_data =
                    Some(BTreeMap::from([(file_name.clone(), ByteString(e.into_bytes()))]));
            }
        }
        out.push(config_map);
    }
    Ok(out)
}
