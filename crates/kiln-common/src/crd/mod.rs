//! Custom Resource Definitions for Kiln
//!
//! This module contains the TrainingJob CRD and the policy types it embeds.

mod training_job;
mod types;

pub use training_job::{
    JobCondition, JobConditionType, ReplicaSpec, ReplicaStatus, TrainingJob, TrainingJobSpec,
    TrainingJobStatus,
};
pub use types::{CleanPodPolicy, ImagePullPolicy, JobMode, RestartPolicy, RoleType, RunPolicy};

/// Maximum length of a DNS-1123 label
pub const DNS_LABEL_MAX_LEN: usize = 63;

/// Validate a DNS-1123 label (job names, namespaces)
///
/// Lowercase alphanumerics and hyphens, at most 63 characters, starting and
/// ending with an alphanumeric.
pub fn validate_dns_label(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("name cannot be empty".to_string());
    }
    if s.len() > DNS_LABEL_MAX_LEN {
        return Err(format!(
            "name must be at most {} characters: {}",
            DNS_LABEL_MAX_LEN, s
        ));
    }

    for c in s.chars() {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return Err(format!(
                "name must be lowercase alphanumeric with hyphens: {}",
                s
            ));
        }
    }

    if s.starts_with('-') || s.ends_with('-') {
        return Err(format!(
            "name must start and end with an alphanumeric character: {}",
            s
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dns_labels() {
        let longest = "x".repeat(DNS_LABEL_MAX_LEN);
        for name in ["mnist", "mnist-train-1", "a", "0job", longest.as_str()] {
            assert!(validate_dns_label(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_invalid_labels() {
        let too_long = "x".repeat(DNS_LABEL_MAX_LEN + 1);
        for name in ["", "Mnist", "mnist_train", "-mnist", "mnist-", "a.b", too_long.as_str()] {
            assert!(validate_dns_label(name).is_err(), "{name}");
        }
    }
}
