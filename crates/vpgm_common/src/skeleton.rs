//! Skeleton assembly: raw question record -> unfilled vPGM instance.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::dataset::QuestionRecord;

/// Descriptive metadata. Passed to the oracle, never validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionMeta {
    pub scienceqa_id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub skill: String,
    #[serde(default)]
    pub grade: Value,
}

/// What the oracle gets to see about the question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observed {
    pub question_text: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub image_caption_optional: Option<String>,
    #[serde(default)]
    pub text_context_optional: Option<String>,
    #[serde(default)]
    pub lecture_optional: Option<String>,
    #[serde(default)]
    pub retrieved_knowledge_optional: Option<String>,
}

/// Unfilled instance. `latent_posteriors` and `answer_posterior` stay empty;
/// the oracle fills them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    pub template_id: String,
    pub question_meta: QuestionMeta,
    pub observed: Observed,
    #[serde(default)]
    pub latent_posteriors: Map<String, Value>,
    #[serde(default)]
    pub answer_posterior: Map<String, Value>,
}

impl Skeleton {
    /// Build a skeleton for one record.
    ///
    /// The question id comes from `id`, then `qid`, then `override_id`,
    /// then `"unknown"`. Text context prefers a non-empty `hint` over
    /// `context`.
    pub fn from_record(record: &QuestionRecord, template_id: &str, override_id: Option<&str>) -> Self {
        let scienceqa_id = record
            .id
            .as_ref()
            .or(record.qid.as_ref())
            .map(id_string)
            .or_else(|| override_id.map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());

        let text_context = match record.hint.as_deref() {
            Some(hint) if !hint.is_empty() => Some(hint.to_string()),
            _ => record.context.clone(),
        };

        Self {
            template_id: template_id.to_string(),
            question_meta: QuestionMeta {
                scienceqa_id,
                subject: record.subject.clone().unwrap_or_default(),
                topic: record.topic.clone().unwrap_or_default(),
                category: record.category.clone().unwrap_or_default(),
                skill: record.skill.clone().unwrap_or_default(),
                grade: record.grade.clone().unwrap_or_else(|| json!(-1)),
            },
            observed: Observed {
                question_text: record.question.clone(),
                options: options_from(&record.choices),
                image_caption_optional: None,
                text_context_optional: text_context,
                lecture_optional: record.lecture.clone(),
                retrieved_knowledge_optional: None,
            },
            latent_posteriors: Map::new(),
            answer_posterior: Map::new(),
        }
    }
}

fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Choices must be a list; anything else yields no options.
fn options_from(choices: &Value) -> Vec<String> {
    match choices {
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}
