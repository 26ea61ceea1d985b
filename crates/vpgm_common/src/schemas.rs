//! JSON schemas for the vpgmd API

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::skeleton::Skeleton;

/// One row in a question listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub id: String,
    pub question: String,
    pub subject: Option<String>,
    pub topic: Option<String>,
}

/// Paginated question listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionPage {
    /// Matches after filtering, before pagination
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub items: Vec<QuestionSummary>,
}

/// Question detail: the raw record (image stripped) and what the oracle sees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDetail {
    pub raw_example: Value,
    pub skeleton: Skeleton,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub template_id: String,
    pub records_loaded: usize,
}

/// Error body for failed requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}
