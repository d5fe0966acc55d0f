//! Kiln CLI configuration stored at `~/.kiln/config.json`.
//!
//! Holds the defaults applied when a flag is not given: target namespace,
//! container image, and per-role CPU and memory requests. The file is
//! optional; a missing file means no defaults.
//!
//! The config path resolution chain (highest priority first):
//! 1. `KILN_CONFIG` environment variable
//! 2. `~/.kiln/config.json`
//!
//! The kubeconfig resolution chain (highest priority first):
//! 1. Explicit `--kubeconfig` flag
//! 2. `KILN_KUBECONFIG` environment variable
//! 3. Fall back to kube default (`KUBECONFIG` env / `~/.kube/config`)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use kiln_job::ResourceDefaults;

use crate::{Error, Result};

const CONFIG_DIR_NAME: &str = ".kiln";
const CONFIG_FILE_NAME: &str = "config.json";
const KILN_CONFIG_ENV: &str = "KILN_CONFIG";
const KILN_KUBECONFIG_ENV: &str = "KILN_KUBECONFIG";

/// Persistent CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KilnConfig {
    /// Namespace used when `--namespace` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Image used when `--image` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Per-role CPU and memory defaults, keyed by `Master`, `PS`, `Worker`.
    #[serde(default)]
    pub defaults: ResourceDefaults,
}

/// Path of the config file, honoring `KILN_CONFIG`.
pub fn config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(KILN_CONFIG_ENV) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let home = dirs::home_dir()
        .ok_or_else(|| Error::command_failed("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load the config, returning default if the file is missing.
pub fn load_config() -> Result<KilnConfig> {
    load_config_from(&config_path()?)
}

/// Load the config from `path`, returning default if the file is missing.
pub fn load_config_from(path: &Path) -> Result<KilnConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using built-in defaults");
        return Ok(KilnConfig::default());
    }
    let data = std::fs::read_to_string(path).map_err(|e| Error::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&data).map_err(|e| Error::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Resolve a kubeconfig path using the priority chain.
///
/// Returns `None` to use `kube::Client::try_default()`.
pub fn resolve_kubeconfig(explicit: Option<&str>) -> Option<String> {
    if let Some(path) = explicit {
        return Some(path.to_string());
    }

    if let Ok(path) = std::env::var(KILN_KUBECONFIG_ENV) {
        if !path.is_empty() {
            return Some(path);
        }
    }

    None
}
