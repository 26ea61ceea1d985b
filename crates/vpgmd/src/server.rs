//! HTTP server for vpgmd

use crate::routes;
use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use vpgm_common::{
    Config, Dataset, NotFoundError, Oracle, OracleParams, Orchestrator, RetryPolicy,
    TemplateDocument,
};

/// Application state shared across handlers. Read-only after startup.
pub struct AppState {
    pub templates: Arc<TemplateDocument>,
    pub template_id: String,
    pub dataset: Arc<Dataset>,
    pub oracle: Arc<dyn Oracle>,
    pub params: OracleParams,
    pub policy: RetryPolicy,
    pub tolerance: f64,
    pub start_time: Instant,
}

impl AppState {
    /// Fails if the configured template id is not in the document, so a bad
    /// id is caught at startup rather than on the first inference.
    pub fn new(
        config: &Config,
        templates: TemplateDocument,
        dataset: Dataset,
        oracle: Arc<dyn Oracle>,
    ) -> Result<Self, NotFoundError> {
        let template_id = config.templates.default_id.clone();
        templates.resolve(&template_id)?;

        Ok(Self {
            templates: Arc::new(templates),
            template_id,
            dataset: Arc::new(dataset),
            oracle,
            params: config.oracle.params(),
            policy: config.retry.policy(),
            tolerance: config.validation.tolerance,
            start_time: Instant::now(),
        })
    }

    /// Orchestrator borrowing this state's oracle and settings
    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(self.oracle.as_ref(), self.params.clone())
            .with_policy(self.policy.clone())
            .with_tolerance(self.tolerance)
    }
}

/// Build the router with all route groups and layers
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::question_routes())
        .merge(routes::infer_routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server
pub async fn run(state: AppState, bind: &str) -> Result<()> {
    let app = app(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("  Listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down gracefully");
    }
}
