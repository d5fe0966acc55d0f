//! Templating for job packages
//!
//! Role launch scripts are written with `${...}` placeholders on top of
//! minijinja's custom syntax configuration, so shell-heavy templates stay
//! readable:
//!
//! - `${job.name}`, `${job.namespace}`, `${job.mode}`, `${job.image}`
//! - `${role.name}`, `${role.replicas}`, `${role.cpu}`, `${role.memory}`
//! - `${replicas.worker}`, `${replicas.ps}` - replica counts of every role
//! - `${data.training}`, `${model.zoo}`, `${params.num_epochs}`, ...
//! - `${args}` - trailing user arguments, as a list
//! - `{% if %}...{% endif %}`, `{% for %}...{% endfor %}`
//! - `$${HOME}` renders as a literal `${HOME}` for the shell
//! - `${value | quote}` single-quotes a value for the shell

mod context;
mod engine;
mod error;
mod filters;

pub use context::{TemplateContext, TemplateContextBuilder};
pub use engine::TemplateEngine;
pub use error::TemplateError;

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: a worker launch line is assembled from job, role and params
    #[test]
    fn story_render_worker_launch_line() {
        let engine = TemplateEngine::new().unwrap();
        let ctx = TemplateContext::builder()
            .job("name", "mnist")
            .job("image", "elasticdl:ci")
            .role("name", "worker")
            .replicas("worker", 3)
            .replicas("ps", 2)
            .param("minibatch_size", "64")
            .build();

        let template = concat!(
            "exec worker --job_name ${job.name | quote}",
            "{% if params.minibatch_size is defined %} --minibatch_size ${params.minibatch_size}{% endif %}",
            "{% if params.num_epochs is defined %} --num_epochs ${params.num_epochs}{% endif %}",
            " --num_ps ${replicas.ps}",
        );
        let out = engine.render(template, &ctx).unwrap();
        assert_eq!(
            out,
            "exec worker --job_name 'mnist' --minibatch_size 64 --num_ps 2"
        );
    }

    /// Story: shell variables survive rendering untouched when escaped
    #[test]
    fn story_shell_variables_pass_through() {
        let engine = TemplateEngine::new().unwrap();
        let ctx = TemplateContext::builder().job("name", "mnist").build();

        let out = engine
            .render("cd $${HOME} && echo ${job.name}", &ctx)
            .unwrap();
        assert_eq!(out, "cd ${HOME} && echo mnist");
    }

    /// Story: a typo in a template is caught, not rendered as an empty string
    #[test]
    fn story_typo_is_an_error() {
        let engine = TemplateEngine::new().unwrap();
        let ctx = TemplateContext::builder().job("name", "mnist").build();

        let err = engine.render("${job.nmae}", &ctx).unwrap_err();
        assert!(matches!(err, TemplateError::Undefined(_)));
    }
}
