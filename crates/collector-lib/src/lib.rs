//! Libvirt VM metrics collector
//!
//! This crate provides the core functionality for:
//! - Enumerating running domains on a hypervisor
//! - Extracting normalized CPU, memory, network and disk metrics
//! - Publishing them as labeled gauges to a Prometheus Pushgateway
//! - Health checks and self-observability

pub mod collector;
pub mod error;
pub mod health;
pub mod hypervisor;
pub mod models;
pub mod observability;
pub mod sink;

pub use error::{DescriptorError, ExtractionError, HypervisorError, SinkError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use hypervisor::{DomainHandle, Hypervisor};
pub use models::*;
pub use observability::{CollectorMetrics, StructuredLogger};
pub use sink::{MetricSink, PushGatewayConfig, PushGatewaySink};
