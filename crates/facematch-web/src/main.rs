use anyhow::{Context, Result};
use facematch_core::FaceVerifier;
use facematch_web::config::Config;
use facematch_web::{engine, routes, AppState};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    tracing::info!(
        bind = %config.bind,
        model_dir = %config.model_dir.display(),
        metric = %config.metric,
        threshold = config.threshold(),
        enforce_detection = config.enforce_detection,
        "facematch-web starting"
    );

    // Load models synchronously so a missing model fails at startup.
    let verifier = FaceVerifier::load(&config.verifier_config()).context("loading face models")?;
    let engine = engine::spawn_engine(Box::new(verifier), config.queue_depth)?;

    let state = Arc::new(AppState::new(&config, engine));
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!(addr = %config.bind, "facematch-web ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("facematch-web shutting down");
    Ok(())
}
