//! CLI commands

use std::fmt::Display;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::{Error, Result};

pub mod get;
pub mod submit;

/// Extension trait to convert errors with Display to CLI Error::CommandFailed.
pub trait CommandErrorExt<T> {
    /// Convert an error to `Error::CommandFailed` using its Display implementation.
    fn cmd_err(self) -> Result<T>;
}

impl<T, E: Display> CommandErrorExt<T> for std::result::Result<T, E> {
    fn cmd_err(self) -> Result<T> {
        self.map_err(|e| Error::command_failed(e.to_string()))
    }
}

/// Build a kube [`Client`] using the Kiln kubeconfig resolution chain.
pub async fn resolve_kube_client(explicit_kubeconfig: Option<&str>) -> Result<Client> {
    let Some(path) = crate::config::resolve_kubeconfig(explicit_kubeconfig) else {
        debug!("using default kubeconfig");
        return Client::try_default().await.cmd_err();
    };

    debug!(kubeconfig = %path, "using explicit kubeconfig");
    let kubeconfig = Kubeconfig::read_from(&path)
        .map_err(|e| Error::command_failed(format!("failed to read kubeconfig {}: {}", path, e)))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .cmd_err()?;
    Client::try_from(config).cmd_err()
}
