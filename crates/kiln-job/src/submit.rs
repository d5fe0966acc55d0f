//! Deployment submission
//!
//! Submits a rendered package exactly once under the job's name:
//!
//! 1. Look for an existing job with the same name (`DuplicateJobName`).
//! 2. Render the package.
//! 3. Create the TrainingJob atomically. A conflict here means another
//!    submission won the race, and is also reported as `DuplicateJobName`.
//! 4. Create the attachment ConfigMaps, owned by the new job.
//! 5. Write the initial `Created` status.
//!
//! Nothing is retried internally. Transport failures carry the stage that
//! failed; after step 3 the job exists, so resubmitting reports a duplicate.

use std::sync::Arc;

use chrono::Utc;
use kube::Resource;
use tracing::{info, instrument, warn};

use kiln_common::crd::{JobMode, TrainingJobStatus};

use crate::error::{SubmitError, SubmitStage};
use crate::render::PackageRenderer;
use crate::spec::JobSpecification;
use crate::store::{JobStore, StoreError};

/// What a successful submission created
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// Job name
    pub job_name: String,
    /// Namespace the job was created in
    pub namespace: String,
    /// Job kind
    pub mode: JobMode,
    /// UID assigned by the cluster
    pub uid: Option<String>,
    /// ConfigMaps created for attachments
    pub config_maps: usize,
}

impl SubmissionReceipt {
    /// Command that shows the job's status
    pub fn status_hint(&self) -> String {
        format!("kiln get {} --type {}", self.job_name, self.mode)
    }
}

/// Renders and submits job specifications
pub struct DeploymentSubmitter {
    store: Arc<dyn JobStore>,
    renderer: Arc<dyn PackageRenderer>,
}

impl DeploymentSubmitter {
    /// Create a submitter over the given store and renderer
    pub fn new(store: Arc<dyn JobStore>, renderer: Arc<dyn PackageRenderer>) -> Self {
        Self { store, renderer }
    }

    /// Submit `spec` to the cluster
    #[instrument(skip(self, spec), fields(job = %spec.job_name(), namespace = %spec.namespace()))]
    pub async fn submit(&self, spec: &JobSpecification) -> Result<SubmissionReceipt, SubmitError> {
        let name = spec.job_name();
        let namespace = spec.namespace();

        match self.store.get_job(namespace, name).await {
            Ok(Some(_)) => return Err(duplicate(spec)),
            Ok(None) => {}
            Err(e) => return Err(transport(SubmitStage::DuplicateCheck, e)),
        }

        let package = self.renderer.render(spec)?;

        let created = match self.store.create_job(namespace, &package.job).await {
            Ok(job) => job,
            Err(StoreError::Conflict) => {
                warn!("job was created concurrently by another submission");
                return Err(duplicate(spec));
            }
            Err(e) => return Err(transport(SubmitStage::CreateJob, e)),
        };

        let owner = created.controller_owner_ref(&());
        if owner.is_none() {
            warn!("created job has no uid, attachments will not be garbage collected with it");
        }
        for mut config_map in package.config_maps {
            if let Some(owner) = &owner {
                config_map.metadata.owner_references = Some(vec![owner.clone()]);
            }
            self.store
                .apply_config_map(namespace, &config_map)
                .await
                .map_err(|e| transport(SubmitStage::CreateAttachments, e))?;
        }

        let status = TrainingJobStatus::created(Utc::now());
        self.store
            .patch_job_status(namespace, name, &status)
            .await
            .map_err(|e| transport(SubmitStage::InitializeStatus, e))?;

        let receipt = SubmissionReceipt {
            job_name: name.to_string(),
            namespace: namespace.to_string(),
            mode: spec.mode(),
            uid: created.meta().uid.clone(),
            config_maps: spec.attachments().iter().filter(|a| a.is_file()).count(),
        };
        info!(uid = ?receipt.uid, config_maps = receipt.config_maps, "job submitted");
        Ok(receipt)
    }
}

fn duplicate(spec: &JobSpecification) -> SubmitError {
    SubmitError::DuplicateJobName {
        name: spec.job_name().to_string(),
        namespace: spec.namespace().to_string(),
    }
}

fn transport(stage: SubmitStage, err: StoreError) -> SubmitError {
    warn!(stage = %stage, error = %err, "cluster call failed");
    SubmitError::transport(stage, err.to_string())
}
