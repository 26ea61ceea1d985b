//! Command handlers for vpgmctl.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde_json::json;
use tracing::info;
use vpgm_common::{
    compile_prompt, parse_reply, AttemptError, Config, Dataset, Instance, Oracle, Orchestrator,
    Template, TemplateDocument,
};

use crate::output;

/// Loaded config plus the template chosen for this invocation
pub struct Session {
    pub config: Config,
    pub template_id: String,
}

impl Session {
    pub fn new(config: Config, template_override: Option<String>) -> Self {
        let template_id = template_override.unwrap_or_else(|| config.templates.default_id.clone());
        Self { config, template_id }
    }

    fn templates(&self) -> Result<TemplateDocument> {
        TemplateDocument::load(&self.config.templates.path).context("Failed to load template document")
    }

    fn dataset(&self) -> Result<Dataset> {
        Dataset::load(&self.config.dataset.path).context("Failed to load dataset")
    }

    fn orchestrator<'a>(&self, oracle: &'a dyn Oracle) -> Orchestrator<'a> {
        Orchestrator::new(oracle, self.config.oracle.params())
            .with_policy(self.config.retry.policy())
            .with_tolerance(self.config.validation.tolerance)
    }
}

/// Extract and validate a saved oracle reply without calling the oracle
pub fn check_reply(raw: &str, template: &Template, tolerance: f64) -> Result<Instance, AttemptError> {
    let value = parse_reply(raw)?;
    Ok(Instance::validate(value, template, tolerance)?)
}

/// Handle templates command
pub fn templates(session: &Session) -> Result<()> {
    let doc = session.templates()?;
    for template in &doc.templates {
        let id = template.expected_id().unwrap_or("(no id)");
        let marker = if id == session.template_id { "*" } else { " " };
        let latents = template.required_latents().len();
        println!(
            "{} {:<40} {} latents  {}",
            marker,
            id.cyan(),
            latents,
            template.description.as_deref().unwrap_or("").dimmed()
        );
    }
    Ok(())
}

/// Handle list command
pub fn list(
    session: &Session,
    page: usize,
    limit: usize,
    search: Option<&str>,
    include_images: bool,
) -> Result<()> {
    let dataset = session.dataset()?;
    output::print_question_page(&dataset.list(page, limit, search, !include_images));
    Ok(())
}

/// Handle skeleton command
pub fn skeleton(session: &Session, id: &str) -> Result<()> {
    let skeleton = session.dataset()?.skeleton_for(id, &session.template_id)?;
    output::write_json(&skeleton, None)
}

/// Handle prompt command
pub fn prompt(session: &Session, id: &str) -> Result<()> {
    let doc = session.templates()?;
    let template = doc.resolve(&session.template_id)?;
    let skeleton = session.dataset()?.skeleton_for(id, &session.template_id)?;
    println!("{}", compile_prompt(&skeleton, template));
    Ok(())
}

/// Handle skeletons command: every record, as `{template_id, instances}`
pub fn skeletons(session: &Session, out: Option<&Path>) -> Result<()> {
    session.templates()?.resolve(&session.template_id)?;
    let instances = session.dataset()?.skeletons(&session.template_id);
    eprintln!("Built {} instances.", instances.len());
    output::write_json(
        &json!({"template_id": session.template_id, "instances": instances}),
        out,
    )
}

/// Handle infer command
pub fn infer(session: &Session, oracle: &dyn Oracle, id: &str, out: Option<&Path>) -> Result<()> {
    let doc = session.templates()?;
    let skeleton = session.dataset()?.skeleton_for(id, &session.template_id)?;

    info!("Running inference for {}", id);
    let instance = session
        .orchestrator(oracle)
        .infer(&doc, &session.template_id, &skeleton)?;

    output::print_instance_summary(&instance, &skeleton.observed.options);
    output::write_json(&instance, out)
}

/// Handle batch command. Stops at the first question that cannot be inferred.
pub fn batch(session: &Session, oracle: &dyn Oracle, ids: &[String], out: Option<&Path>) -> Result<()> {
    let doc = session.templates()?;
    let template = doc.resolve(&session.template_id)?;
    let dataset = session.dataset()?;
    let skeletons = ids
        .iter()
        .map(|id| dataset.skeleton_for(id, &session.template_id))
        .collect::<Result<Vec<_>, _>>()?;

    let instances = session.orchestrator(oracle).run_batch(&skeletons, template)?;
    eprintln!(
        "{} {} instances inferred",
        "[OK]".bright_green(),
        instances.len()
    );
    output::write_json(&instances, out)
}

/// Handle check command
pub fn check(session: &Session, file: &Path) -> Result<()> {
    let raw = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let doc = session.templates()?;
    let template = doc.resolve(&session.template_id)?;

    match check_reply(&raw, template, session.config.validation.tolerance) {
        Ok(instance) => {
            let options: Vec<String> = instance
                .as_value()
                .pointer("/observed/options")
                .and_then(|v| v.as_array())
                .map(|opts| {
                    opts.iter()
                        .map(|o| o.as_str().map(str::to_string).unwrap_or_else(|| o.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            output::print_instance_summary(&instance, &options);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {} error: {}", "[INVALID]".bright_red(), e.kind(), e);
            anyhow::bail!("{} is not a valid instance of {}", file.display(), session.template_id)
        }
    }
}
