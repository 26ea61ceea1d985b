//! Schema and distribution validation.
//!
//! The oracle's reply is untrusted. Checks run in a fixed order and stop at
//! the first violation so the caller sees the earliest actionable problem.
//! Nothing is repaired.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::template::Template;

/// Default allowed deviation of a distribution's sum from 1.0
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// Top-level keys every instance must carry
pub const REQUIRED_KEYS: [&str; 5] = [
    "template_id",
    "question_meta",
    "observed",
    "latent_posteriors",
    "answer_posterior",
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DistributionError {
    #[error("Probability mapping is not an object: {0}")]
    NotAMapping(Value),

    #[error("Probability dictionary is empty.")]
    Empty,

    #[error("Value for '{key}' is not a number: {value}")]
    NotNumeric { key: String, value: Value },

    #[error("Value for '{key}' is out of range [0, 1]: {value}")]
    OutOfRange { key: String, value: f64 },

    #[error("Probabilities sum to {total}, expected 1.0 (tolerance {tolerance}).")]
    BadSum { total: f64, tolerance: f64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Instance is not a JSON object")]
    NotAnObject,

    #[error("Missing top-level key: {0}")]
    MissingKey(&'static str),

    #[error("Template declares no id to match against")]
    TemplateIdUndeclared,

    #[error("Template ID mismatch. Expected '{expected}', got {actual}")]
    TemplateIdMismatch { expected: String, actual: Value },

    #[error("'latent_posteriors' is not an object")]
    LatentsNotAnObject,

    #[error("Missing latent variable: {0}")]
    MissingLatent(String),

    #[error("Missing '{field}' for latent: {latent}")]
    MissingLatentField { latent: String, field: &'static str },

    #[error("Invalid state_probabilities for latent '{latent}': {source}")]
    LatentDistribution {
        latent: String,
        #[source]
        source: DistributionError,
    },

    #[error("Missing '{0}' in answer_posterior")]
    MissingAnswerField(&'static str),

    #[error("Invalid option_probabilities: {0}")]
    AnswerDistribution(#[source] DistributionError),

    #[error("Selected answer {selected} is not in observed options: {options:?}")]
    SelectedNotInOptions { selected: Value, options: Vec<Value> },
}

/// Check one probability mapping.
///
/// The mapping must be a non-empty object of numbers in `[0, 1]` whose sum
/// is within `tolerance` of 1.0.
pub fn validate_distribution(mapping: &Value, tolerance: f64) -> Result<(), DistributionError> {
    let probs = mapping
        .as_object()
        .ok_or_else(|| DistributionError::NotAMapping(mapping.clone()))?;
    if probs.is_empty() {
        return Err(DistributionError::Empty);
    }

    let mut total = 0.0;
    for (key, value) in probs {
        let p = value.as_f64().ok_or_else(|| DistributionError::NotNumeric {
            key: key.clone(),
            value: value.clone(),
        })?;
        if !(0.0..=1.0).contains(&p) {
            return Err(DistributionError::OutOfRange {
                key: key.clone(),
                value: p,
            });
        }
        total += p;
    }

    if (total - 1.0).abs() > tolerance {
        return Err(DistributionError::BadSum { total, tolerance });
    }
    Ok(())
}

/// Validate a parsed instance against its template.
pub fn validate_instance(instance: &Value, template: &Template, tolerance: f64) -> Result<(), ValidationError> {
    let obj = instance.as_object().ok_or(ValidationError::NotAnObject)?;

    // 1. Top-level shape
    for key in REQUIRED_KEYS {
        if !obj.contains_key(key) {
            return Err(ValidationError::MissingKey(key));
        }
    }

    // 2. Template id
    let expected = template
        .expected_id()
        .ok_or(ValidationError::TemplateIdUndeclared)?;
    if obj["template_id"].as_str() != Some(expected) {
        return Err(ValidationError::TemplateIdMismatch {
            expected: expected.to_string(),
            actual: obj["template_id"].clone(),
        });
    }

    // 3 + 4. Declared latents and their distributions
    let latents = obj["latent_posteriors"]
        .as_object()
        .ok_or(ValidationError::LatentsNotAnObject)?;
    for name in template.required_latents() {
        let latent = latents
            .get(name)
            .ok_or_else(|| ValidationError::MissingLatent(name.to_string()))?;
        let states = require_field(latent, "state_probabilities").ok_or_else(|| {
            ValidationError::MissingLatentField {
                latent: name.to_string(),
                field: "state_probabilities",
            }
        })?;
        if require_field(latent, "justification").is_none() {
            return Err(ValidationError::MissingLatentField {
                latent: name.to_string(),
                field: "justification",
            });
        }
        validate_distribution(states, tolerance).map_err(|source| {
            ValidationError::LatentDistribution {
                latent: name.to_string(),
                source,
            }
        })?;
    }

    // 5. Answer posterior
    let answer = &obj["answer_posterior"];
    let option_probs = require_field(answer, "option_probabilities")
        .ok_or(ValidationError::MissingAnswerField("option_probabilities"))?;
    let selected = require_field(answer, "selected_answer")
        .ok_or(ValidationError::MissingAnswerField("selected_answer"))?;
    validate_distribution(option_probs, tolerance).map_err(ValidationError::AnswerDistribution)?;

    // 6. Membership, only when options are a non-empty list
    if let Some(options) = obj["observed"].get("options").and_then(Value::as_array) {
        if !options.is_empty() && !options.contains(selected) {
            return Err(ValidationError::SelectedNotInOptions {
                selected: selected.clone(),
                options: options.clone(),
            });
        }
    }

    Ok(())
}

fn require_field<'a>(parent: &'a Value, field: &str) -> Option<&'a Value> {
    parent.as_object().and_then(|o| o.get(field))
}

/// A validated vPGM instance.
///
/// Holds the oracle's JSON exactly as parsed; the only way to obtain one is
/// through [`Instance::validate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Instance(Value);

impl Instance {
    pub fn validate(value: Value, template: &Template, tolerance: f64) -> Result<Self, ValidationError> {
        validate_instance(&value, template, tolerance)?;
        Ok(Self(value))
    }

    pub fn template_id(&self) -> &str {
        self.0["template_id"].as_str().unwrap_or_default()
    }

    /// Selected answer. A string for every instance the oracle is asked for;
    /// other JSON types are rendered as text.
    pub fn selected_answer(&self) -> String {
        match &self.0["answer_posterior"]["selected_answer"] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Latent name -> `{state_probabilities, justification}`, in reply order.
    pub fn latent_posteriors(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0
            .get("latent_posteriors")
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(Map::iter)
    }

    /// Probability the oracle assigned to one answer option.
    pub fn option_probability(&self, option: &str) -> Option<f64> {
        self.0["answer_posterior"]["option_probabilities"]
            .get(option)
            .and_then(Value::as_f64)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}
