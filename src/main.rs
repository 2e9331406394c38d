//! This file defines the aquifer-anomaly binary entry point.

use aquifer_anomaly::app;
use aquifer_anomaly::cli;
use aquifer_anomaly::metrics;
use aquifer_anomaly::server;
use aquifer_anomaly::tracing;

use std::process::exit;

/// Application entry point
#[tokio::main]
async fn main() {
    let args = cli::parse();
    tracing::init_tracing(&args);
    ::tracing::debug!(?args, "parsed command line arguments");
    metrics::register_metrics();
    let service = match app::service(&args) {
        Ok(service) => service,
        Err(err) => {
            ::tracing::error!("failed to start: {}", err);
            tracing::shutdown_tracing();
            exit(1)
        }
    };
    server::serve(&args, service).await;
    tracing::shutdown_tracing();
}
