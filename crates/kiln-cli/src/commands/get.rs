//! `kiln get <name> --type <mode>` - show a submitted job

use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};

use kiln_common::crd::{JobMode, RoleType, TrainingJob};
use kiln_common::DEFAULT_NAMESPACE;
use kiln_job::{JobStore, KubeJobStore};

use super::{resolve_kube_client, CommandErrorExt};
use crate::config::load_config;
use crate::{Error, Result};

/// Show the state of a submitted job
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Job name
    pub name: String,

    /// Job type
    #[arg(long = "type", default_value = "elasticdljob")]
    pub mode: JobMode,

    /// Namespace (default: config file, then "default")
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub output: OutputFormat,

    /// Path to kubeconfig file (default: $KILN_KUBECONFIG, then kube defaults)
    #[arg(long)]
    pub kubeconfig: Option<String>,
}

/// Output format
#[derive(Clone, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary (default)
    #[default]
    Table,
    /// The full resource as JSON
    Json,
    /// The full resource as YAML
    Yaml,
}

/// Run the get command
pub async fn run(args: GetArgs) -> Result<()> {
    let config = load_config()?;
    let namespace = args
        .namespace
        .or(config.namespace)
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    let client = resolve_kube_client(args.kubeconfig.as_deref()).await?;
    let store = KubeJobStore::new(client);
    let job = store
        .get_job(&namespace, &args.name)
        .await
        .cmd_err()?
        .ok_or_else(|| Error::JobNotFound {
            name: args.name.clone(),
            namespace: namespace.clone(),
        })?;

    if job.spec.mode != args.mode {
        return Err(Error::validation(format!(
            "job {} is a {}, not a {}",
            args.name, job.spec.mode, args.mode
        )));
    }

    match args.output {
        OutputFormat::Table => print!("{}", describe(&job, &namespace, Utc::now())),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&job)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&job)?),
    }
    Ok(())
}

/// Human-readable summary of a job as of `now`
fn describe(job: &TrainingJob, namespace: &str, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let mut line = |label: &str, value: String| {
        out.push_str(&format!("{:<11}{}\n", format!("{}:", label), value));
    };

    line("Name", job.metadata.name.clone().unwrap_or_default());
    line("Namespace", namespace.to_string());
    line("Type", job.spec.mode.to_string());

    let status = job.status.as_ref();
    let state = status
        .and_then(|s| s.current())
        .map(|c| match c.reason.as_str() {
            "" => c.type_.to_string(),
            reason => format!("{} ({})", c.type_, reason),
        })
        .unwrap_or_else(|| "Unknown".to_string());
    line("State", state);

    let created = status
        .and_then(|s| s.created_at())
        .or_else(|| job.metadata.creation_timestamp.as_ref().map(|t| t.0));
    if let Some(created) = created {
        line("Age", format_age(created, now));
    }
    if let Some(restarts) = status.map(|s| s.restart_count).filter(|r| *r > 0) {
        line("Restarts", restarts.to_string());
    }

    for role in RoleType::ALL {
        let Some(spec) = job.spec.replica_specs.get(&role) else {
            continue;
        };
        let counts = status
            .and_then(|s| s.replica_statuses.get(&role))
            .cloned()
            .unwrap_or_default();
        line(
            role.as_str(),
            format!(
                "{} desired, {} active, {} succeeded, {} failed",
                spec.replicas, counts.active, counts.succeeded, counts.failed
            ),
        );
    }

    if let Some(status) = status {
        line("Directive", status.evaluate(&job.spec.run_policy, now).to_string());
    }

    out
}

/// Format the time since `timestamp` as a short age ("2d", "5h", "30m", "15s")
fn format_age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(timestamp);

    let total_secs = duration.num_seconds();
    if total_secs < 0 {
        return "0s".to_string();
    }

    let days = duration.num_days();
    if days > 0 {
        return format!("{}d", days);
    }

    let hours = duration.num_hours();
    if hours > 0 {
        return format!("{}h", hours);
    }

    let minutes = duration.num_minutes();
    if minutes > 0 {
        return format!("{}m", minutes);
    }

    format!("{}s", total_secs)
}
