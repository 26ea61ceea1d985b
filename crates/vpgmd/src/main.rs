//! vPGM Daemon - question browsing and vPGM inference over HTTP.
//!
//! Config comes from `$VPGM_CONFIG`, /etc/vpgm/config.toml or ./vpgm.toml.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use vpgm_common::{Config, Dataset, Oracle, TemplateDocument};
use vpgmd::{server, AppState};

fn main() -> Result<()> {
    let config = Config::load(None).context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level)),
        )
        .init();

    info!("[BOOT] vPGM daemon v{} starting...", env!("CARGO_PKG_VERSION"));

    let templates = TemplateDocument::load(&config.templates.path)
        .context("Failed to load template document")?;
    let dataset = Dataset::load(&config.dataset.path).context("Failed to load dataset")?;
    info!("[BOOT] {} questions, template {}", dataset.len(), config.templates.default_id);

    // The blocking HTTP client must be created, and finally dropped, outside the async runtime.
    let oracle: Arc<dyn Oracle> =
        Arc::new(config.oracle.build().context("Failed to create oracle client")?);
    info!(
        "[BOOT] Oracle: {} {} at {}",
        config.oracle.backend.as_str(),
        config.oracle.model,
        config.oracle.endpoint
    );

    let state = AppState::new(&config, templates, dataset, Arc::clone(&oracle))
        .context("Configured default template is not in the template document")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let result = runtime.block_on(server::run(state, &config.server.bind));

    drop(runtime);
    drop(oracle);
    result
}
