//! Fixed-interval collection loop
//!
//! Runs a [`BatchCollector`] pass on every tick until shutdown. The first
//! pass starts immediately; passes never overlap and a late pass delays the
//! next tick instead of bursting.

use super::batch::{BatchCollector, CollectionResults};
use crate::error::HypervisorError;
use crate::health::HealthRegistry;
use crate::hypervisor::Hypervisor;
use crate::observability::{CollectorMetrics, StructuredLogger};
use crate::sink::MetricSink;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info};

/// Configuration for the collection loop
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Time between pass starts (default: 30 seconds)
    pub interval: Duration,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Periodically collects from every active domain and feeds the sink
pub struct CollectionLoop {
    hypervisor: Arc<dyn Hypervisor>,
    sink: Arc<dyn MetricSink>,
    collector: BatchCollector,
    config: CollectionConfig,
    health: HealthRegistry,
    metrics: CollectorMetrics,
    logger: StructuredLogger,
}

impl CollectionLoop {
    pub fn new(
        hypervisor: Arc<dyn Hypervisor>,
        sink: Arc<dyn MetricSink>,
        config: CollectionConfig,
    ) -> Self {
        let logger = StructuredLogger::new(hypervisor.uri());
        Self {
            hypervisor,
            sink,
            collector: BatchCollector::default(),
            config,
            health: HealthRegistry::new(),
            metrics: CollectorMetrics::new(),
            logger,
        }
    }

    /// Run until a shutdown message arrives. A pass in progress always
    /// completes before the loop exits.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting metrics collection loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Result is already recorded in health and metrics
                    let _ = self.run_pass().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down metrics collection loop");
                    break;
                }
            }
        }
    }

    /// Run one pass and record its outcome
    pub async fn run_pass(&self) -> Result<CollectionResults, HypervisorError> {
        let start = Instant::now();
        let outcome = self
            .collector
            .collect(Arc::clone(&self.hypervisor), self.sink.as_ref())
            .await;
        let elapsed = start.elapsed();

        match &outcome {
            Ok(results) => {
                self.metrics.observe_pass(elapsed.as_secs_f64(), results);
                self.health.record_pass(results).await;
                self.logger.log_pass(results, elapsed.as_millis());
            }
            Err(e) => {
                error!(error = %e, "Collection pass aborted");
                self.metrics.inc_enumeration_errors();
                self.health.record_enumeration_failure(&e.to_string()).await;
            }
        }

        outcome
    }
}

/// Builder for the collection loop
pub struct CollectionLoopBuilder {
    hypervisor: Option<Arc<dyn Hypervisor>>,
    sink: Option<Arc<dyn MetricSink>>,
    config: CollectionConfig,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
}

impl CollectionLoopBuilder {
    pub fn new() -> Self {
        Self {
            hypervisor: None,
            sink: None,
            config: CollectionConfig::default(),
            health: None,
            logger: None,
        }
    }

    pub fn hypervisor(mut self, hypervisor: Arc<dyn Hypervisor>) -> Self {
        self.hypervisor = Some(hypervisor);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Share a health registry with the HTTP API
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<CollectionLoop> {
        let hypervisor = self
            .hypervisor
            .ok_or_else(|| anyhow::anyhow!("Hypervisor connection is required"))?;
        let sink = self
            .sink
            .ok_or_else(|| anyhow::anyhow!("Metric sink is required"))?;

        if self.config.interval.is_zero() {
            anyhow::bail!("Collection interval must be greater than zero");
        }

        let mut collection_loop = CollectionLoop::new(hypervisor, sink, self.config);
        if let Some(health) = self.health {
            collection_loop.health = health;
        }
        if let Some(logger) = self.logger {
            collection_loop.logger = logger;
        }

        Ok(collection_loop)
    }
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::tests::{FakeDomain, FakeHypervisor, RecordingSink};
    use crate::health::{components, ComponentStatus};

    fn hypervisor() -> Arc<FakeHypervisor> {
        Arc::new(FakeHypervisor::with_domains(vec![
            FakeDomain::new(1, "web-01"),
            FakeDomain::new(2, "db-01"),
        ]))
    }

    #[test]
    fn test_collection_config_default() {
        let config = CollectionConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_requires_hypervisor() {
        let result = CollectionLoopBuilder::new()
            .sink(Arc::new(RecordingSink::default()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_requires_sink() {
        let result = CollectionLoopBuilder::new().hypervisor(hypervisor()).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_zero_interval() {
        let result = CollectionLoopBuilder::new()
            .hypervisor(hypervisor())
            .sink(Arc::new(RecordingSink::default()))
            .interval(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_default_logger_tagged_with_hypervisor_uri() {
        let collection_loop = CollectionLoopBuilder::new()
            .hypervisor(hypervisor())
            .sink(Arc::new(RecordingSink::default()))
            .build()
            .unwrap();

        assert_eq!(collection_loop.logger.hypervisor_uri(), "test:///default");
    }

    #[tokio::test]
    async fn test_run_pass_updates_health() {
        let sink = Arc::new(RecordingSink::default());
        let health = HealthRegistry::new();

        let collection_loop = CollectionLoopBuilder::new()
            .hypervisor(hypervisor())
            .sink(sink.clone())
            .health(health.clone())
            .build()
            .unwrap();

        let results = collection_loop.run_pass().await.unwrap();

        assert_eq!(results.collected, 2);
        assert_eq!(sink.names(), vec!["web-01", "db-01"]);
        assert_eq!(health.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_run_pass_enumeration_failure() {
        let health = HealthRegistry::new();
        let collection_loop = CollectionLoopBuilder::new()
            .hypervisor(Arc::new(FakeHypervisor::unreachable()))
            .sink(Arc::new(RecordingSink::default()))
            .health(health.clone())
            .build()
            .unwrap();

        assert!(collection_loop.run_pass().await.is_err());

        let status = health.health().await;
        assert_eq!(
            status.components[components::HYPERVISOR].status,
            ComponentStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let sink = Arc::new(RecordingSink::default());
        let collection_loop = CollectionLoopBuilder::new()
            .hypervisor(hypervisor())
            .sink(sink.clone())
            .interval(Duration::from_secs(3600))
            .build()
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(collection_loop.run(shutdown_rx));

        // The first tick fires immediately
        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(sink.len(), 2);
    }
}
