//! Config file resolution
//!
//! Mode-specific extended options name files and volumes the job needs at
//! runtime. The resolver turns them into attachment records, in the order
//! the mode's schema lists its keys. Paths are not checked here; the renderer
//! reads file contents when it builds the package.

use std::path::{Path, PathBuf};

use tracing::debug;

use kiln_common::crd::JobMode;

use crate::error::SubmitError;
use crate::options::ExtendedOption;

/// Directory model definitions are mounted under
pub const MODEL_MOUNT_DIR: &str = "/kiln/model";

/// Directory config files are mounted under when no target is given
pub const CONFIG_MOUNT_DIR: &str = "/kiln/config";

/// Extended option keys understood by some mode
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    /// `modelDef=<path>`
    ModelDef,
    /// `volume=claim_name=<pvc>,mount_path=<p>;host_path=<h>,mount_path=<p>`
    Volume,
    /// `configFile=<source>[:<target>]`
    ConfigFile,
}

impl ConfigKey {
    /// Keys accepted by a mode, in resolution order
    pub fn schema(mode: JobMode) -> &'static [ConfigKey] {
        match mode {
            JobMode::ElasticDl => &[Self::ModelDef, Self::Volume, Self::ConfigFile],
        }
    }

    /// Option name as typed by the user
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelDef => "modelDef",
            Self::Volume => "volume",
            Self::ConfigFile => "configFile",
        }
    }

    /// Short lowercase form used in generated resource names
    pub fn slug(&self) -> &'static str {
        match self {
            Self::ModelDef => "model",
            Self::Volume => "volume",
            Self::ConfigFile => "config",
        }
    }

    fn parse(key: &str, mode: JobMode) -> Result<Self, SubmitError> {
        Self::schema(mode)
            .iter()
            .copied()
            .find(|k| k.as_str() == key)
            .ok_or_else(|| SubmitError::UnknownConfigKey {
                key: key.to_string(),
                mode,
            })
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a volume attachment comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VolumeSource {
    /// A PersistentVolumeClaim
    Claim {
        /// Claim name
        claim_name: String,
    },
    /// A directory on the node
    HostPath {
        /// Host directory
        path: String,
    },
}

/// What an attachment mounts
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachmentSource {
    /// A local file shipped to the cluster in a ConfigMap
    File {
        /// Local path
        path: PathBuf,
        /// File name inside the ConfigMap and at the mount point
        file_name: String,
    },
    /// An existing cluster volume
    Volume(VolumeSource),
}

/// A resolved file or volume reference bound to the job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigFileAttachment {
    /// Option the attachment came from
    pub key: ConfigKey,
    /// What is mounted
    pub source: AttachmentSource,
    /// Absolute path inside every container
    pub mount_path: String,
}

impl ConfigFileAttachment {
    /// Whether this attachment ships a local file
    pub fn is_file(&self) -> bool {
        matches!(self.source, AttachmentSource::File { .. })
    }
}

/// Resolves extended options for one mode
pub struct ConfigFileResolver {
    mode: JobMode,
}

impl ConfigFileResolver {
    /// Resolver for `mode`
    pub fn new(mode: JobMode) -> Self {
        Self { mode }
    }

    /// Resolve options into attachments
    ///
    /// Unknown keys fail before any value is parsed. Empty values are treated
    /// as absent. Attachments are ordered by the mode's key schema; values of
    /// the same key keep their input order.
    pub fn resolve(&self, options: &[ExtendedOption]) -> Result<Vec<ConfigFileAttachment>, SubmitError> {
        let mut keyed = Vec::with_capacity(options.len());
        for opt in options {
            keyed.push((ConfigKey::parse(&opt.key, self.mode)?, opt.value.trim()));
        }

        let mut attachments = Vec::new();
        for key in ConfigKey::schema(self.mode) {
            let values = keyed.iter().filter(|(k, v)| k == key && !v.is_empty());
            if *key == ConfigKey::ModelDef {
                if let Some((_, extra)) = values.clone().nth(1) {
                    return Err(invalid(*key, extra, "only one model definition may be given"));
                }
            }
            for (_, value) in values {
                match key {
                    ConfigKey::ModelDef => attachments.push(model_def(value)?),
                    ConfigKey::Volume => attachments.extend(volumes(value)?),
                    ConfigKey::ConfigFile => attachments.push(config_file(value)?),
                }
            }
        }

        debug!(mode = %self.mode, count = attachments.len(), "resolved attachments");
        Ok(attachments)
    }
}

fn invalid(key: ConfigKey, value: &str, reason: impl Into<String>) -> SubmitError {
    SubmitError::InvalidConfigValue {
        key: key.as_str().to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn file_name(key: ConfigKey, value: &str, path: &Path) -> Result<String, SubmitError> {
    if value.ends_with('/') {
        return Err(invalid(key, value, "path names a directory, not a file"));
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| invalid(key, value, "path has no file name"))
}

fn model_def(value: &str) -> Result<ConfigFileAttachment, SubmitError> {
    let path = PathBuf::from(value);
    let file_name = file_name(ConfigKey::ModelDef, value, &path)?;
    Ok(ConfigFileAttachment {
        key: ConfigKey::ModelDef,
        mount_path: format!("{}/{}", MODEL_MOUNT_DIR, file_name),
        source: AttachmentSource::File { path, file_name },
    })
}

fn config_file(value: &str) -> Result<ConfigFileAttachment, SubmitError> {
    let key = ConfigKey::ConfigFile;
    let (source, target) = match value.split_once(':') {
        Some((source, target)) => (source, Some(target)),
        None => (value, None),
    };
    if source.is_empty() {
        return Err(invalid(key, value, "source path is empty"));
    }

    let path = PathBuf::from(source);
    let file_name = file_name(key, source, &path)?;
    let mount_path = match target {
        Some(t) if !t.starts_with('/') => {
            return Err(invalid(key, value, "target must be an absolute path"))
        }
        Some(t) if t.ends_with('/') => format!("{}{}", t, file_name),
        Some(t) => t.to_string(),
        None => format!("{}/{}", CONFIG_MOUNT_DIR, file_name),
    };

    Ok(ConfigFileAttachment {
        key,
        mount_path,
        source: AttachmentSource::File { path, file_name },
    })
}

fn volumes(value: &str) -> Result<Vec<ConfigFileAttachment>, SubmitError> {
    value
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| volume(value, entry))
        .collect()
}

fn volume(value: &str, entry: &str) -> Result<ConfigFileAttachment, SubmitError> {
    let key = ConfigKey::Volume;
    let mut claim_name = None;
    let mut host_path = None;
    let mut mount_path = None;

    for field in entry.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        let (name, v) = field
            .split_once('=')
            .ok_or_else(|| invalid(key, value, format!("'{}' is not name=value", field)))?;
        let slot = match name.trim() {
            "claim_name" => &mut claim_name,
            "host_path" => &mut host_path,
            "mount_path" => &mut mount_path,
            other => return Err(invalid(key, value, format!("unknown volume field '{}'", other))),
        };
        if slot.replace(v.trim().to_string()).is_some() {
            return Err(invalid(key, value, format!("'{}' given twice", name.trim())));
        }
    }

    let source = match (claim_name, host_path) {
        (Some(claim_name), None) if !claim_name.is_empty() => VolumeSource::Claim { claim_name },
        (None, Some(path)) if path.starts_with('/') => VolumeSource::HostPath { path },
        (None, Some(_)) => return Err(invalid(key, value, "host_path must be an absolute path")),
        (Some(_), Some(_)) => {
            return Err(invalid(key, value, "claim_name and host_path are mutually exclusive"))
        }
        _ => return Err(invalid(key, value, "one of claim_name or host_path is required")),
    };

    let mount_path = mount_path
        .filter(|p| p.starts_with('/'))
        .ok_or_else(|| invalid(key, value, "mount_path is required and must be absolute"))?;

    Ok(ConfigFileAttachment {
        key,
        source: AttachmentSource::Volume(source),
        mount_path,
    })
}
