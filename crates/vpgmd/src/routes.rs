//! API routes for vpgmd
//!
//! Question browsing plus the single inference endpoint. Inference runs on
//! the blocking pool; each request owns its skeleton and awaits one outcome.

use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument, Span};
use uuid::Uuid;
use vpgm_common::{
    ErrorResponse, HealthResponse, QuestionDetail, QuestionPage, Skeleton, VpgmError,
};

type AppStateArc = Arc<AppState>;
type ApiError = (StatusCode, Json<ErrorResponse>);

const DEFAULT_PAGE_LIMIT: usize = 20;

fn api_error(status: StatusCode, error: impl Into<String>, attempts: Option<u32>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            attempts,
        }),
    )
}

/// 404 for unknown ids, 500 for everything else
fn vpgm_error(e: VpgmError) -> ApiError {
    let status = match &e {
        VpgmError::NotFound(_) => StatusCode::NOT_FOUND,
        VpgmError::Config(_) | VpgmError::ExhaustedRetries { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, e.to_string(), e.attempts())
}

// ============================================================================
// Health Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/api/health", get(health))
}

async fn health(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        template_id: state.template_id.clone(),
        records_loaded: state.dataset.len(),
    })
}

// ============================================================================
// Question Routes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub search: Option<String>,
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

pub fn question_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/api/questions", get(list_questions))
        .route("/api/questions/:id", get(question_detail))
}

async fn list_questions(
    State(state): State<AppStateArc>,
    Query(query): Query<ListQuery>,
) -> Json<QuestionPage> {
    Json(
        state
            .dataset
            .list(query.page, query.limit, query.search.as_deref(), true),
    )
}

async fn question_detail(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<Json<QuestionDetail>, ApiError> {
    let record = state
        .dataset
        .get(&id)
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e.to_string(), None))?;

    Ok(Json(QuestionDetail {
        raw_example: record.to_raw_example(),
        skeleton: Skeleton::from_record(record, &state.template_id, Some(&id)),
    }))
}

// ============================================================================
// Inference Routes
// ============================================================================

pub fn infer_routes() -> Router<AppStateArc> {
    Router::new().route("/api/infer/:id", post(run_inference))
}

async fn run_inference(
    State(state): State<AppStateArc>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let skeleton = state
        .dataset
        .skeleton_for(&id, &state.template_id)
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e.to_string(), None))?;

    let span = info_span!("infer", request_id = %Uuid::new_v4(), question = %id);
    async move {
        info!("--- Running inference for {} ---", id);

        let task_state = Arc::clone(&state);
        let task_span = Span::current();
        let outcome = tokio::task::spawn_blocking(move || {
            task_span.in_scope(|| {
                task_state
                    .orchestrator()
                    .infer(&task_state.templates, &task_state.template_id, &skeleton)
            })
        })
        .await
        .map_err(|e| {
            error!("  Inference task failed: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Inference task failed: {}", e),
                None,
            )
        })?;

        match outcome {
            Ok(instance) => {
                info!("  Selected answer: {}", instance.selected_answer());
                Ok(Json(instance.into_value()))
            }
            Err(e) => {
                error!("  Inference failed: {}", e);
                Err(vpgm_error(e))
            }
        }
    }
    .instrument(span)
    .await
}
