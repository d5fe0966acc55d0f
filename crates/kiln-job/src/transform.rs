//! Argument transformation
//!
//! Turns per-role scalar inputs and `KEY=VALUE` tokens into validated role
//! specs and an environment map. Pure: no I/O, no cluster access.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use kiln_common::crd::RoleType;
use kiln_common::quantity::Quantity;

use crate::error::SubmitError;
use crate::options::{ResourceDefaults, RoleInput, RoleInputs};
use crate::spec::RoleSpec;

/// Output of [`ArgumentTransformer::transform`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransformedArguments {
    /// Roles with at least one replica
    pub roles: BTreeMap<RoleType, RoleSpec>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
}

/// Validates role inputs and environment tokens
pub struct ArgumentTransformer<'a> {
    defaults: &'a ResourceDefaults,
}

impl<'a> ArgumentTransformer<'a> {
    /// Transformer that fills missing requests from `defaults`
    pub fn new(defaults: &'a ResourceDefaults) -> Self {
        Self { defaults }
    }

    /// Validate every role and the environment tokens
    ///
    /// Roles with zero replicas are dropped without looking at their other
    /// fields. Roles are checked in Master, PS, Worker order and the first
    /// problem is returned.
    pub fn transform(
        &self,
        roles: &RoleInputs,
        env_tokens: &[String],
    ) -> Result<TransformedArguments, SubmitError> {
        let mut specs = BTreeMap::new();
        for role in RoleType::ALL {
            if let Some(spec) = self.role_spec(role, roles.get(role))? {
                specs.insert(role, spec);
            }
        }

        Ok(TransformedArguments {
            roles: specs,
            env: parse_env(env_tokens)?,
        })
    }

    fn role_spec(&self, role: RoleType, input: &RoleInput) -> Result<Option<RoleSpec>, SubmitError> {
        let replicas = input.replicas();
        if replicas == 0 {
            debug!(role = %role, "role has no replicas, skipping");
            return Ok(None);
        }

        let cpu = pick(input.cpu.as_deref(), self.defaults.cpu(role)).ok_or(
            SubmitError::IncompleteRoleSpec {
                role,
                missing: "cpu",
            },
        )?;
        let memory = pick(input.memory.as_deref(), self.defaults.memory(role)).ok_or(
            SubmitError::IncompleteRoleSpec {
                role,
                missing: "memory",
            },
        )?;

        Ok(Some(RoleSpec {
            replicas,
            priority_class: non_empty(input.priority.as_deref()).map(str::to_string),
            cpu: parse_quantity(role, "cpu", cpu)?,
            memory: parse_quantity(role, "memory", memory)?,
        }))
    }
}

/// Explicit value if non-empty, else the default if non-empty
fn pick<'v>(explicit: Option<&'v str>, default: Option<&'v str>) -> Option<&'v str> {
    non_empty(explicit).or_else(|| non_empty(default))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_quantity(role: RoleType, field: &'static str, value: &str) -> Result<Quantity, SubmitError> {
    value
        .parse()
        .map_err(|e: kiln_common::quantity::QuantityError| SubmitError::InvalidResourceQuantity {
            role,
            field,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Parse `KEY=VALUE` tokens into a map
///
/// The value may be empty and may itself contain `=`. A token with no `=` or
/// an empty key rejects the whole list. When a key repeats, the last value
/// wins.
pub fn parse_env(tokens: &[String]) -> Result<BTreeMap<String, String>, SubmitError> {
    let mut env = BTreeMap::new();
    for token in tokens {
        let (key, value) = token
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or_else(|| SubmitError::InvalidEnvToken {
                token: token.clone(),
            })?;

        let key = key.trim().to_string();
        if env.insert(key.clone(), value.to_string()).is_some() {
            warn!(key = %key, "environment variable given more than once, last value wins");
        }
    }
    Ok(env)
}
