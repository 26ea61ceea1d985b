//! Prompt compiler.
//!
//! Renders a skeleton and its template into the single prompt sent to the
//! oracle. Output is a pure function of the inputs: the same skeleton and
//! template always produce byte-identical text, so a failed attempt can be
//! blamed on the oracle and not on prompt drift between retries.
//!
//! Nested structures are rendered as two-space indented JSON in source key
//! order (serde_json is built with `preserve_order`).

use serde::Serialize;

use crate::skeleton::Skeleton;
use crate::template::Template;

const ROLE_LINE: &str = "You are performing verbalized probabilistic graphical model inference.";

const TASK_LINE: &str = "Given the following ScienceQA question, fill in the missing latent_posteriors and answer_posterior according to the template.";

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

/// Build the full prompt text.
pub fn compile_prompt(skeleton: &Skeleton, template: &Template) -> String {
    let observed = pretty(&skeleton.observed);
    let meta = pretty(&skeleton.question_meta);
    let cpd_templates = pretty(&template.verbal_cpd_templates);
    let instance_fields = pretty(&template.instance_fields);

    let parts = [
        ROLE_LINE,
        "",
        "### Task",
        "",
        TASK_LINE,
        "",
        "### Observed Data",
        "",
        observed.as_str(),
        "",
        "### Metadata",
        "",
        meta.as_str(),
        "",
        "### Latent Variable Instructions",
        "",
        "For each latent variable, follow these instructions:",
        cpd_templates.as_str(),
        "",
        "### Output Format (MUST match exactly)",
        "",
        "You must output ONLY a JSON object with the following structure:",
        instance_fields.as_str(),
        "",
        "### Your Output",
        "",
        "Fill in:",
        "",
        "* latent_posteriors",
        "* answer_posterior",
        "",
        "Produce only valid JSON.",
    ];

    parts.join("\n")
}
