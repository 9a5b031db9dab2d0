//! Fraud Scoring Service - Main Entry Point
//!
//! Loads the trained pipeline once, then serves predictions and SHAP/LIME
//! explanations over HTTP.

use anyhow::{Context, Result};
use fraud_scoring_service::{
    api::{self, AppState},
    config::{AppConfig, LoggingConfig},
    explain::FeatureNames,
    metrics::{MetricsReporter, ServiceMetrics},
    models::loader::ModelLoader,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("fraud_scoring_service={}", logging.level).parse()?)
        .add_directive("tower_http=info".parse()?);

    if logging.is_json() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration comes first so it can shape the log output
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Fraud Scoring Service");

    let loader = ModelLoader::new();
    let pipeline = Arc::new(
        loader
            .load_pipeline(&config.models.artifact_path)
            .with_context(|| {
                format!(
                    "Failed to load model artifact from {} (run train_model first)",
                    config.models.artifact_path.display()
                )
            })?,
    );

    let names = FeatureNames::resolve(&pipeline, config.models.fallback_feature_width);
    let reference = loader.load_reference_sample_or_warn(&config.models.reference_sample_path);
    let features = names.len();

    let metrics = Arc::new(ServiceMetrics::new());
    let state = AppState::new(
        pipeline,
        names,
        reference.as_deref(),
        &config.explain,
        metrics.clone(),
    );
    info!(
        features,
        reference_rows = state.lime.background_rows(),
        "Explainers ready"
    );

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!(address = %address, "Listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}
