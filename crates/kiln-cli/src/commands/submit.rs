//! `kiln submit` - submit a training job
//!
//! Flags map onto [`SubmitOptions`]; unset values fall back to the config
//! file, then to built-in defaults. Long flags also accept their camelCase
//! spelling (`--modelZoo`, `--workerCPU`, ...).

use std::sync::Arc;

use clap::{Args, Subcommand};
use tracing::info;

use kiln_common::crd::JobMode;
use kiln_job::{
    prepare_job, CommonJobOptions, DataLocations, DeploymentSubmitter, ExtendedOption,
    Hyperparameters, KubeJobStore, ManifestRenderer, PackageRenderer, RoleInput, RoleInputs,
    SubmitOptions,
};

use super::resolve_kube_client;
use crate::config::{load_config, KilnConfig};
use crate::Result;

/// Submit a training job
#[derive(Args, Debug)]
pub struct SubmitArgs {
    #[command(subcommand)]
    pub job: SubmitJob,
}

/// Job kind to submit
#[derive(Subcommand, Debug)]
pub enum SubmitJob {
    /// Submit an ElasticDL job
    #[command(name = "elasticdl", alias = "elasticdljob", alias = "edl")]
    ElasticDl(ElasticDlArgs),
}

/// Flags shared by every job kind
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Job name, unique in the namespace
    #[arg(long)]
    pub name: String,

    /// Target namespace (default: config file, then "default")
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Container image for every role
    #[arg(short, long)]
    pub image: Option<String>,

    /// Image pull policy: Always, IfNotPresent or Never
    #[arg(long, alias = "imagePullPolicy")]
    pub image_pull_policy: Option<String>,

    /// Environment variable as KEY=VALUE, repeatable
    #[arg(short, long = "env")]
    pub env: Vec<String>,

    /// Seconds after creation before the job is failed
    #[arg(long, alias = "activeDeadlineSeconds")]
    pub active_deadline_seconds: Option<u64>,

    /// Restarts allowed before the job is failed
    #[arg(long, alias = "backoffLimit")]
    pub backoff_limit: Option<u32>,

    /// Seconds to keep the job after it finishes
    #[arg(long, alias = "ttlSecondsAfterFinished")]
    pub ttl_seconds_after_finished: Option<u32>,

    /// Pods removed once the job finishes: All, Running or None
    #[arg(long, alias = "cleanPodPolicy")]
    pub clean_pod_policy: Option<String>,

    /// Path to kubeconfig file (default: $KILN_KUBECONFIG, then kube defaults)
    #[arg(long)]
    pub kubeconfig: Option<String>,

    /// Print the rendered resources instead of submitting them
    #[arg(long)]
    pub dry_run: bool,
}

/// ElasticDL job flags
#[derive(Args, Debug, Clone)]
pub struct ElasticDlArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Model zoo location
    #[arg(long, alias = "modelZoo")]
    pub model_zoo: Option<String>,

    /// Local model definition file, shipped with the job
    #[arg(long, alias = "modelDef")]
    pub model_def: Option<String>,

    /// Volumes as claim_name=<pvc>,mount_path=<path>, entries separated by ';'
    #[arg(long)]
    pub volume: Vec<String>,

    /// Local file shipped with the job, as <source>[:<target>]
    #[arg(long, alias = "configFile")]
    pub config_file: Vec<String>,

    /// Training data location
    #[arg(long, alias = "trainingData")]
    pub training_data: Option<String>,

    /// Validation data location
    #[arg(long, alias = "validationData")]
    pub validation_data: Option<String>,

    /// Output location
    #[arg(long)]
    pub output: Option<String>,

    /// Number of epochs
    #[arg(long, alias = "numEpochs")]
    pub num_epochs: Option<u32>,

    /// Minibatch size
    #[arg(long, alias = "minibatchSize")]
    pub minibatch_size: Option<u32>,

    /// Minibatches per task
    #[arg(long, alias = "numMinibatchesPerTask")]
    pub num_minibatches_per_task: Option<u32>,

    /// Steps between evaluations
    #[arg(long, alias = "evaluationSteps")]
    pub evaluation_steps: Option<u32>,

    /// Master replicas
    #[arg(long, alias = "masterCount", default_value_t = 1)]
    pub master_count: u32,

    /// Master priority class
    #[arg(long, alias = "masterPriority")]
    pub master_priority: Option<String>,

    /// Master CPU request
    #[arg(long, alias = "masterCPU")]
    pub master_cpu: Option<String>,

    /// Master memory request
    #[arg(long, alias = "masterMemory")]
    pub master_memory: Option<String>,

    /// Parameter server replicas
    #[arg(long, alias = "psCount")]
    pub ps_count: Option<u32>,

    /// Parameter server priority class
    #[arg(long, alias = "psPriority")]
    pub ps_priority: Option<String>,

    /// Parameter server CPU request
    #[arg(long, alias = "psCPU")]
    pub ps_cpu: Option<String>,

    /// Parameter server memory request
    #[arg(long, alias = "psMemory")]
    pub ps_memory: Option<String>,

    /// Worker replicas
    #[arg(long, alias = "workerCount")]
    pub worker_count: Option<u32>,

    /// Worker priority class
    #[arg(long, alias = "workerPriority")]
    pub worker_priority: Option<String>,

    /// Worker CPU request
    #[arg(long, alias = "workerCPU")]
    pub worker_cpu: Option<String>,

    /// Worker memory request
    #[arg(long, alias = "workerMemory")]
    pub worker_memory: Option<String>,

    /// Arguments appended to every role's launch command
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl ElasticDlArgs {
    /// Raw submission inputs, with config-file fallbacks applied
    pub fn to_options(&self, config: &KilnConfig) -> SubmitOptions {
        let common = &self.common;

        let mut extended = Vec::new();
        if let Some(path) = &self.model_def {
            extended.push(ExtendedOption::new("modelDef", path));
        }
        extended.extend(self.volume.iter().map(|v| ExtendedOption::new("volume", v)));
        extended.extend(
            self.config_file
                .iter()
                .map(|v| ExtendedOption::new("configFile", v)),
        );

        SubmitOptions {
            common: CommonJobOptions {
                name: common.name.clone(),
                namespace: common.namespace.clone().or_else(|| config.namespace.clone()),
                image: common.image.clone().or_else(|| config.image.clone()),
                image_pull_policy: common.image_pull_policy.clone(),
                env: common.env.clone(),
                active_deadline_seconds: common.active_deadline_seconds,
                backoff_limit: common.backoff_limit,
                ttl_seconds_after_finished: common.ttl_seconds_after_finished,
                clean_pod_policy: common.clean_pod_policy.clone(),
                args: self.args.clone(),
            },
            mode: JobMode::ElasticDl,
            roles: RoleInputs {
                master: RoleInput {
                    count: Some(self.master_count),
                    priority: self.master_priority.clone(),
                    cpu: self.master_cpu.clone(),
                    memory: self.master_memory.clone(),
                },
                ps: RoleInput {
                    count: self.ps_count,
                    priority: self.ps_priority.clone(),
                    cpu: self.ps_cpu.clone(),
                    memory: self.ps_memory.clone(),
                },
                worker: RoleInput {
                    count: self.worker_count,
                    priority: self.worker_priority.clone(),
                    cpu: self.worker_cpu.clone(),
                    memory: self.worker_memory.clone(),
                },
            },
            data: DataLocations {
                training: self.training_data.clone(),
                validation: self.validation_data.clone(),
                output: self.output.clone(),
            },
            model_zoo: self.model_zoo.clone(),
            hyperparameters: Hyperparameters {
                epoch_count: self.num_epochs.unwrap_or(0),
                minibatch_size: self.minibatch_size.unwrap_or(0),
                minibatches_per_task: self.num_minibatches_per_task.unwrap_or(0),
                evaluation_steps: self.evaluation_steps.unwrap_or(0),
            },
            extended,
        }
    }
}

/// Run the submit command
pub async fn run(args: SubmitArgs) -> Result<()> {
    match args.job {
        SubmitJob::ElasticDl(args) => {
            let config = load_config()?;
            let options = args.to_options(&config);
            submit(options, &config, &args.common).await
        }
    }
}

async fn submit(options: SubmitOptions, config: &KilnConfig, common: &CommonArgs) -> Result<()> {
    let spec = prepare_job(&options, &config.defaults)?;
    let renderer = Arc::new(ManifestRenderer::new()?);

    if common.dry_run {
        let package = renderer.render(&spec)?;
        print!("{}", package.to_yaml()?);
        return Ok(());
    }

    let client = resolve_kube_client(common.kubeconfig.as_deref()).await?;
    let submitter = DeploymentSubmitter::new(Arc::new(KubeJobStore::new(client)), renderer);
    let receipt = submitter.submit(&spec).await?;

    info!(job = %receipt.job_name, namespace = %receipt.namespace, "submitted");
    println!("The Job {} has been submitted successfully", receipt.job_name);
    println!(
        "You can run `{}` to check the job status",
        receipt.status_hint()
    );
    Ok(())
}
