//! Question dataset.
//!
//! Reads a local export of ScienceQA-style records, either a JSON array or
//! JSON Lines. Records are addressed by positional ids (`idx_<n>`), with a
//! fallback search on the record's own `id` / `qid`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{ConfigError, NotFoundError};
use crate::schemas::{QuestionPage, QuestionSummary};
use crate::skeleton::Skeleton;

const POSITIONAL_PREFIX: &str = "idx_";

/// One raw question record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qid: Option<Value>,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub choices: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Only ever used as a filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Value>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub skill: Option<String>,
    #[serde(default)]
    pub grade: Option<Value>,
    #[serde(default)]
    pub lecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QuestionRecord {
    pub fn has_image(&self) -> bool {
        self.image.as_ref().is_some_and(|v| !v.is_null())
    }

    /// The record as JSON with the image removed.
    pub fn to_raw_example(&self) -> Value {
        let mut copy = self.clone();
        copy.image = None;
        serde_json::to_value(copy).unwrap_or(Value::Null)
    }

    fn matches_own_id(&self, id: &str) -> bool {
        [&self.id, &self.qid].into_iter().flatten().any(|v| match v {
            Value::String(s) => s == id,
            other => other.to_string() == id,
        })
    }
}

/// In-memory, read-only question store.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<QuestionRecord>,
}

impl Dataset {
    pub fn new(records: Vec<QuestionRecord>) -> Self {
        Self { records }
    }

    /// Load a JSON array or JSON Lines file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let records = if content.trim_start().starts_with('[') {
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            let mut records = Vec::new();
            for (n, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let record = serde_json::from_str(line).map_err(|e| {
                    ConfigError::Invalid(format!("{} line {}: {}", path.display(), n + 1, e))
                })?;
                records.push(record);
            }
            records
        };

        let dataset = Self::new(records);
        info!("Loaded {} questions from {}", dataset.len(), path.display());
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up `idx_<n>` positionally, otherwise search record ids.
    pub fn record_by_id(&self, id: &str) -> Option<&QuestionRecord> {
        if let Some(idx) = id
            .strip_prefix(POSITIONAL_PREFIX)
            .and_then(|n| n.parse::<usize>().ok())
        {
            if let Some(record) = self.records.get(idx) {
                return Some(record);
            }
        }
        debug!("No positional match for {}, searching record ids", id);
        self.records.iter().find(|r| r.matches_own_id(id))
    }

    pub fn get(&self, id: &str) -> Result<&QuestionRecord, NotFoundError> {
        self.record_by_id(id)
            .ok_or_else(|| NotFoundError::Record(id.to_string()))
    }

    /// Filter, then paginate. `page` is 1-based.
    pub fn list(&self, page: usize, limit: usize, search: Option<&str>, exclude_image: bool) -> QuestionPage {
        let needle = search
            .map(str::to_lowercase)
            .filter(|s| !s.is_empty());

        let matching: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| !(exclude_image && r.has_image()))
            .filter(|(_, r)| match &needle {
                Some(n) => r.question.to_lowercase().contains(n),
                None => true,
            })
            .map(|(i, _)| i)
            .collect();

        let page = page.max(1);
        let items = matching
            .iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .map(|&i| {
                let r = &self.records[i];
                QuestionSummary {
                    id: format!("{}{}", POSITIONAL_PREFIX, i),
                    question: r.question.clone(),
                    subject: r.subject.clone(),
                    topic: r.topic.clone(),
                }
            })
            .collect();

        QuestionPage {
            total: matching.len(),
            page,
            limit,
            items,
        }
    }

    /// Skeleton for one question, addressed the same way as `record_by_id`.
    pub fn skeleton_for(&self, id: &str, template_id: &str) -> Result<Skeleton, NotFoundError> {
        let record = self.get(id)?;
        Ok(Skeleton::from_record(record, template_id, Some(id)))
    }

    /// Skeletons for every record, in dataset order.
    pub fn skeletons(&self, template_id: &str) -> Vec<Skeleton> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let fallback = format!("{}{}", POSITIONAL_PREFIX, i);
                Skeleton::from_record(r, template_id, Some(&fallback))
            })
            .collect()
    }
}
