//! Libvirt collector - VM resource metrics exporter
//!
//! Samples every running domain on the local hypervisor at a fixed interval
//! and pushes the results to a Prometheus Pushgateway.

use anyhow::{Context, Result};
use collector_lib::{
    collector::CollectionLoopBuilder,
    health::{components, HealthRegistry},
    hypervisor::Hypervisor,
    observability::{CollectorMetrics, StructuredLogger},
    sink::{MetricSink, PushGatewaySink},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const COLLECTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting libvirt-collector");

    let config = config::CollectorConfig::load()?;
    info!(
        libvirt_uri = %config.libvirt_uri,
        pushgateway_url = %config.pushgateway_url,
        interval_secs = config.collect_interval_secs,
        "Collector configured"
    );

    let hypervisor = connect(&config.libvirt_uri)?;
    let sink: Arc<dyn MetricSink> = Arc::new(
        PushGatewaySink::new(config.push_gateway()).context("Failed to create push gateway sink")?,
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::HYPERVISOR).await;
    health_registry.register(components::COLLECTOR).await;
    health_registry.register(components::SINK).await;

    // Register self-metrics before the API can be scraped
    let _metrics = CollectorMetrics::new();

    let logger = StructuredLogger::new(hypervisor.uri());
    logger.log_startup(COLLECTOR_VERSION, config.collect_interval_secs);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let mut api_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = api_shutdown.recv().await;
    }));

    let collection_loop = CollectionLoopBuilder::new()
        .hypervisor(hypervisor.clone())
        .sink(sink.clone())
        .interval(config.collect_interval())
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()?;

    health_registry.set_ready(true).await;
    let loop_handle = tokio::spawn(collection_loop.run(shutdown_tx.subscribe()));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    // Receivers may already be gone if the API failed to bind
    let _ = shutdown_tx.send(());

    if let Err(e) = loop_handle.await {
        error!(error = %e, "Collection loop task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    if let Err(e) = sink.close().await {
        error!(error = %e, "Failed to delete pushed metrics");
    }
    if let Err(e) = hypervisor.close() {
        error!(error = %e, "Failed to close hypervisor connection");
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(feature = "libvirt")]
fn connect(uri: &str) -> Result<Arc<dyn Hypervisor>> {
    let conn = collector_lib::hypervisor::LibvirtConnection::open(uri)
        .context("Failed to connect to libvirt")?;
    Ok(Arc::new(conn))
}

#[cfg(not(feature = "libvirt"))]
fn connect(uri: &str) -> Result<Arc<dyn Hypervisor>> {
    anyhow::bail!(
        "cannot connect to {}: libvirt-collector was built without the `libvirt` feature",
        uri
    )
}
