//! Tabular AutoML server
//!
//! Trains classification models on uploaded datasets and serves
//! single-record predictions from the stored artifacts.

use anyhow::{Context, Result};
use automl_lib::{
    health::HealthRegistry, observability::StructuredLogger, ArtifactStore, CsvDirectorySource,
    FsArtifactStore, InferenceEngine, TrainingCoordinator, TrainingPipeline,
};
use automl_server::{api, config::ServerConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting automl-server");

    let config = ServerConfig::load()?;
    info!(
        instance = %config.instance,
        port = config.port,
        data_dir = %config.data_dir.display(),
        artifact_dir = %config.artifact_dir.display(),
        "Server configured"
    );

    tokio::fs::create_dir_all(&config.artifact_dir)
        .await
        .with_context(|| format!("Failed to create artifact dir {:?}", config.artifact_dir))?;

    let store: Arc<dyn ArtifactStore> = Arc::new(
        FsArtifactStore::new(&config.artifact_dir).with_versions_to_keep(config.versions_to_keep),
    );
    let source = Arc::new(CsvDirectorySource::new(&config.data_dir));
    let pipeline = TrainingPipeline::new(config.pipeline.clone(), store.clone());
    let coordinator = TrainingCoordinator::new(pipeline, source);
    let engine = InferenceEngine::new(store.clone(), config.pipeline.risk);

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;
    health_registry.probe_store(store.as_ref()).await;

    let logger = StructuredLogger::new(&config.instance);
    logger.log_startup(SERVICE_VERSION, &config.artifact_dir.display().to_string());

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        coordinator,
        engine,
        config.training_timeout(),
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => info!("API server exited"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
            logger.log_shutdown("API server stopped");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
