//! Cluster resource store
//!
//! The submitter talks to the cluster only through [`JobStore`], so the whole
//! pipeline can run against a mock or an in-memory store in tests.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use kiln_common::crd::{TrainingJob, TrainingJobStatus};
use kiln_common::FIELD_MANAGER;

/// Errors from the resource store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A resource with the same name already exists
    #[error("resource already exists")]
    Conflict,
    /// Any other failure talking to the cluster
    #[error("{0}")]
    Transport(String),
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict,
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Trait abstracting the cluster calls a submission makes
///
/// `create_job` must be atomic: when two callers create the same name, exactly
/// one succeeds and the other gets [`StoreError::Conflict`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Get a TrainingJob by name
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<TrainingJob>, StoreError>;

    /// Create a TrainingJob, failing with `Conflict` if the name is taken
    async fn create_job(&self, namespace: &str, job: &TrainingJob) -> Result<TrainingJob, StoreError>;

    /// Create or update a ConfigMap
    async fn apply_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<(), StoreError>;

    /// Replace the status of a TrainingJob
    async fn patch_job_status(
        &self,
        namespace: &str,
        name: &str,
        status: &TrainingJobStatus,
    ) -> Result<(), StoreError>;
}

/// Server-side apply without `force`, so fields another manager owns
/// surface as a 409 [`StoreError::Conflict`] instead of being taken over
fn config_map_apply_params() -> PatchParams {
    PatchParams::apply(FIELD_MANAGER)
}

/// Real Kubernetes store implementation
pub struct KubeJobStore {
    client: Client,
}

impl KubeJobStore {
    /// Create a new KubeJobStore wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobStore for KubeJobStore {
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<TrainingJob>, StoreError> {
        let api: Api<TrainingJob> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(job) => Ok(Some(job)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_job(&self, namespace: &str, job: &TrainingJob) -> Result<TrainingJob, StoreError> {
        let api: Api<TrainingJob> = Api::namespaced(self.client.clone(), namespace);
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        let created = api.create(&params, job).await?;
        debug!(job = %created.name_any(), uid = ?created.uid(), "created TrainingJob");
        Ok(created)
    }

    async fn apply_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<(), StoreError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let name = config_map.name_any();
        api.patch(&name, &config_map_apply_params(), &Patch::Apply(config_map))
            .await?;
        debug!(name = %name, "applied ConfigMap");
        Ok(())
    }

    async fn patch_job_status(
        &self,
        namespace: &str,
        name: &str,
        status: &TrainingJobStatus,
    ) -> Result<(), StoreError> {
        let api: Api<TrainingJob> = Api::namespaced(self.client.clone(), namespace);
        let status_patch = serde_json::json!({ "status": status });

        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }
}
