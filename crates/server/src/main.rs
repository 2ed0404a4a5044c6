//! Model server - HTTP prediction service
//!
//! Loads the startup model, then serves predictions, model information,
//! health checks and Prometheus metrics until interrupted.

use anyhow::Result;
use model_server::{
    api,
    config::{LogFormat, ServerConfig},
};
use serving_lib::{ModelLoader, PredictionService, ServingMetrics, StructuredLogger};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

async fn shutdown_signal(logger: StructuredLogger) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    logger.log_shutdown("SIGINT received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::load()?;
    init_tracing(config.log_format);

    info!(
        model_dir = %config.model_dir.display(),
        tracking_uri = %config.mlflow_tracking_uri,
        "Model server configured"
    );

    let logger = StructuredLogger::new(&config.instance_name);
    let metrics = ServingMetrics::with_buffer_capacity(config.buffer_capacity)?;
    let loader = Arc::new(ModelLoader::new(config.loader_config())?);
    let service = Arc::new(
        PredictionService::new(loader, metrics, config.startup_model()).with_logger(logger.clone()),
    );

    logger.log_startup(SERVER_VERSION, service.default_model());

    // A missing startup model is not fatal: /health reports it and
    // /predict answers 503 until a request names a loadable model.
    if let Err(e) = service.load_default().await {
        warn!(error = %e, "Starting without a model");
    }

    let state = Arc::new(api::AppState::new(service));
    api::serve(&config.bind_addr(), state, shutdown_signal(logger)).await?;

    info!("Shutting down");
    Ok(())
}
