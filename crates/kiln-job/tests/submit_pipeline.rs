//! End-to-end submission against an in-memory cluster
//!
//! Runs the full pipeline (options → specification → package → store) with a
//! store that behaves like the API server for the calls the submitter makes:
//! atomic create with name conflicts, UID assignment, and status patches.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;

use kiln_common::crd::{JobConditionType, RoleType, TrainingJob, TrainingJobStatus};
use kiln_job::{
    prepare_job, CommonJobOptions, DataLocations, DeploymentSubmitter, ExtendedOption, JobStore,
    ManifestRenderer, ResourceDefaults, RoleInput, RoleInputs, StoreError, SubmitError,
    SubmitOptions, SubmitStage,
};

// =============================================================================
// In-memory cluster
// =============================================================================

#[derive(Default)]
struct InMemoryCluster {
    jobs: Mutex<BTreeMap<(String, String), TrainingJob>>,
    config_maps: Mutex<BTreeMap<(String, String), ConfigMap>>,
    next_uid: AtomicUsize,
    fail_status_patch: bool,
}

impl InMemoryCluster {
    fn job(&self, namespace: &str, name: &str) -> Option<TrainingJob> {
        self.jobs
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    fn config_maps(&self) -> Vec<ConfigMap> {
        self.config_maps.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl JobStore for InMemoryCluster {
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<TrainingJob>, StoreError> {
        Ok(self.job(namespace, name))
    }

    async fn create_job(&self, namespace: &str, job: &TrainingJob) -> Result<TrainingJob, StoreError> {
        let mut jobs = self.jobs.lock().unwrap();
        let key = (namespace.to_string(), job.name_any());
        if jobs.contains_key(&key) {
            return Err(StoreError::Conflict);
        }
        let mut created = job.clone();
        let uid = self.next_uid.fetch_add(1, Ordering::SeqCst);
        created.metadata.uid = Some(format!("uid-{}", uid));
        jobs.insert(key, created.clone());
        Ok(created)
    }

    async fn apply_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<(), StoreError> {
        self.config_maps
            .lock()
            .unwrap()
            .insert((namespace.to_string(), config_map.name_any()), config_map.clone());
        Ok(())
    }

    async fn patch_job_status(
        &self,
        namespace: &str,
        name: &str,
        status: &TrainingJobStatus,
    ) -> Result<(), StoreError> {
        if self.fail_status_patch {
            return Err(StoreError::Transport("connection reset by peer".into()));
        }
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| StoreError::Transport(format!("{} not found", name)))?;
        job.status = Some(status.clone());
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn options(name: &str) -> SubmitOptions {
    SubmitOptions {
        common: CommonJobOptions {
            name: name.into(),
            namespace: Some("training".into()),
            env: vec!["PYTHONUNBUFFERED=1".into()],
            ..Default::default()
        },
        roles: RoleInputs {
            master: RoleInput::new(1, "1", "2Gi"),
            ps: RoleInput::new(1, "1", "2Gi"),
            worker: RoleInput::new(4, "2", "8Gi"),
        },
        data: DataLocations {
            training: Some("/data/mnist/train".into()),
            validation: Some("/data/mnist/test".into()),
            ..Default::default()
        },
        model_zoo: Some("model_zoo".into()),
        ..Default::default()
    }
}

fn submitter(cluster: Arc<InMemoryCluster>) -> DeploymentSubmitter {
    DeploymentSubmitter::new(cluster, Arc::new(ManifestRenderer::new().unwrap()))
}

// =============================================================================
// Stories
// =============================================================================

#[tokio::test]
async fn story_submitted_job_starts_in_created_state() {
    let cluster = Arc::new(InMemoryCluster::default());
    let spec = prepare_job(&options("mnist"), &ResourceDefaults::default()).unwrap();

    let receipt = submitter(cluster.clone()).submit(&spec).await.unwrap();
    assert_eq!(receipt.namespace, "training");
    assert_eq!(receipt.uid.as_deref(), Some("uid-0"));

    let job = cluster.job("training", "mnist").unwrap();
    let status = job.status.unwrap();
    assert_eq!(status.state(), Some(JobConditionType::Created));
    assert_eq!(status.conditions().len(), 1);
    assert_eq!(job.spec.replica_specs[&RoleType::Worker].replicas, 4);
    assert_eq!(job.spec.total_replicas(), 6);
}

#[tokio::test]
async fn story_resubmitting_the_same_name_is_rejected() {
    let cluster = Arc::new(InMemoryCluster::default());
    let spec = prepare_job(&options("mnist"), &ResourceDefaults::default()).unwrap();
    let submitter = submitter(cluster.clone());

    submitter.submit(&spec).await.unwrap();
    let err = submitter.submit(&spec).await.unwrap_err();

    match err {
        SubmitError::DuplicateJobName { name, namespace } => {
            assert_eq!(name, "mnist");
            assert_eq!(namespace, "training");
        }
        other => panic!("expected duplicate, got {other:?}"),
    }
    assert_eq!(cluster.jobs.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn story_same_name_in_another_namespace_is_independent() {
    let cluster = Arc::new(InMemoryCluster::default());
    let submitter = submitter(cluster.clone());

    let first = prepare_job(&options("mnist"), &ResourceDefaults::default()).unwrap();
    let mut other = options("mnist");
    other.common.namespace = Some("research".into());
    let second = prepare_job(&other, &ResourceDefaults::default()).unwrap();

    submitter.submit(&first).await.unwrap();
    submitter.submit(&second).await.unwrap();
    assert!(cluster.job("research", "mnist").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn story_concurrent_submissions_create_exactly_one_job() {
    let cluster = Arc::new(InMemoryCluster::default());
    let submitter = Arc::new(submitter(cluster.clone()));
    let spec = Arc::new(prepare_job(&options("race"), &ResourceDefaults::default()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let submitter = submitter.clone();
            let spec = spec.clone();
            tokio::spawn(async move { submitter.submit(&spec).await })
        })
        .collect();

    let mut succeeded = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(SubmitError::DuplicateJobName { .. }) => duplicates += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(duplicates, 7);
    assert_eq!(cluster.jobs.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn story_model_definition_ships_as_owned_config_map() {
    let mut model = tempfile::NamedTempFile::new().unwrap();
    writeln!(model, "def custom_model():\n    return None").unwrap();

    let mut opts = options("custom");
    opts.model_zoo = None;
    opts.extended = vec![ExtendedOption::new(
        "modelDef",
        model.path().to_str().unwrap(),
    )];

    let cluster = Arc::new(InMemoryCluster::default());
    let spec = prepare_job(&opts, &ResourceDefaults::default()).unwrap();
    let receipt = submitter(cluster.clone()).submit(&spec).await.unwrap();
    assert_eq!(receipt.config_maps, 1);

    let config_maps = cluster.config_maps();
    assert_eq!(config_maps.len(), 1);
    let owners = config_maps[0].owner_references();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].name, "custom");
    assert_eq!(Some(owners[0].uid.clone()), receipt.uid);
}

#[tokio::test]
async fn story_status_failure_leaves_job_and_reports_stage() {
    let cluster = Arc::new(InMemoryCluster {
        fail_status_patch: true,
        ..Default::default()
    });
    let spec = prepare_job(&options("flaky"), &ResourceDefaults::default()).unwrap();
    let submitter = submitter(cluster.clone());

    let err = submitter.submit(&spec).await.unwrap_err();
    assert_eq!(err.stage(), Some(SubmitStage::InitializeStatus));
    assert!(err.is_retryable());
    assert!(cluster.job("training", "flaky").is_some());

    // The job exists now, so a retry must not create a second one.
    let retry = submitter.submit(&spec).await.unwrap_err();
    assert!(matches!(retry, SubmitError::DuplicateJobName { .. }));
}

#[tokio::test]
async fn story_invalid_input_never_reaches_the_cluster() {
    let mut opts = options("bad");
    opts.roles.worker.cpu = Some("two".into());

    let err = prepare_job(&opts, &ResourceDefaults::default()).unwrap_err();
    match err {
        SubmitError::InvalidResourceQuantity { role, field, value, .. } => {
            assert_eq!(role, RoleType::Worker);
            assert_eq!(field, "cpu");
            assert_eq!(value, "two");
        }
        other => panic!("expected quantity error, got {other:?}"),
    }
}

#[test]
fn story_defaults_fill_missing_resources_per_role() {
    let defaults = ResourceDefaults::default()
        .with_role(RoleType::ParameterServer, "1", "4Gi")
        .with_role(RoleType::Worker, "2", "8Gi");

    let mut opts = options("defaults");
    opts.roles.ps = RoleInput {
        count: Some(2),
        ..Default::default()
    };
    opts.roles.worker = RoleInput {
        count: Some(3),
        cpu: Some("4".into()),
        ..Default::default()
    };

    let spec = prepare_job(&opts, &defaults).unwrap();
    let ps = spec.role(RoleType::ParameterServer).unwrap();
    let worker = spec.role(RoleType::Worker).unwrap();
    assert_eq!(ps.cpu.as_str(), "1");
    assert_eq!(ps.memory.as_str(), "4Gi");
    assert_eq!(worker.cpu.as_str(), "4");
    assert_eq!(worker.memory.as_str(), "8Gi");
}
