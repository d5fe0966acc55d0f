//! Template context for launch-script rendering
//!
//! Groups values into the namespaces templates see:
//! - `${job.*}` - job identity and image
//! - `${role.*}` - the role being rendered
//! - `${replicas.*}` - replica count of every role, by short name
//! - `${data.*}`, `${model.*}` - data locations and model reference
//! - `${params.*}` - hyperparameters that differ from the framework default
//! - `${args}` - trailing user arguments

use std::collections::BTreeMap;

use minijinja::Value;
use serde::Serialize;

/// Values available for placeholder resolution
///
/// Maps are ordered so repeated renders of the same inputs are byte-identical.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TemplateContext {
    /// `${job.KEY}`
    pub job: BTreeMap<String, String>,
    /// `${role.KEY}`
    pub role: BTreeMap<String, String>,
    /// `${replicas.ROLE}`
    pub replicas: BTreeMap<String, u32>,
    /// `${data.KEY}`
    pub data: BTreeMap<String, String>,
    /// `${model.KEY}`
    pub model: BTreeMap<String, String>,
    /// `${params.KEY}`
    pub params: BTreeMap<String, String>,
    /// `${args}`
    pub args: Vec<String>,
}

impl TemplateContext {
    /// Create a new builder for TemplateContext
    pub fn builder() -> TemplateContextBuilder {
        TemplateContextBuilder::default()
    }

    /// Copy of this context with the role section replaced
    ///
    /// Lets a renderer build the job-wide part once and stamp it per role.
    pub fn for_role(&self, role: BTreeMap<String, String>) -> Self {
        Self {
            role,
            ..self.clone()
        }
    }

    /// Convert to minijinja Value for rendering
    pub fn to_value(&self) -> Value {
        Value::from_serialize(self)
    }
}

/// Builder for TemplateContext
#[derive(Debug, Default)]
pub struct TemplateContextBuilder {
    ctx: TemplateContext,
}

impl TemplateContextBuilder {
    /// Set a `${job.*}` value
    pub fn job(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.job.insert(key.into(), value.into());
        self
    }

    /// Set a `${role.*}` value
    pub fn role(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.role.insert(key.into(), value.into());
        self
    }

    /// Set the replica count for a role
    pub fn replicas(mut self, role: impl Into<String>, count: u32) -> Self {
        self.ctx.replicas.insert(role.into(), count);
        self
    }

    /// Set a `${data.*}` value
    pub fn data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.data.insert(key.into(), value.into());
        self
    }

    /// Set a `${model.*}` value
    pub fn model(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.model.insert(key.into(), value.into());
        self
    }

    /// Set a `${params.*}` value
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.params.insert(key.into(), value.into());
        self
    }

    /// Append trailing user arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ctx.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build the TemplateContext
    pub fn build(self) -> TemplateContext {
        self.ctx
    }
}
