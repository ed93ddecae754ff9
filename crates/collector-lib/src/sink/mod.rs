//! Metric sinks
//!
//! A sink receives one [`MetricRecord`] per domain per pass. The push
//! gateway sink exposes records as labeled gauges and pushes the whole
//! gauge set after every write.

mod pushgateway;

pub use pushgateway::{PushGatewayConfig, PushGatewaySink, DEFAULT_JOB_NAME};

use crate::error::SinkError;
use crate::models::MetricRecord;
use async_trait::async_trait;

/// `(vm_name, vm_uuid)` label pair identifying one domain's series
pub type SeriesKey = (String, String);

/// Destination for normalized metric records
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Publish a record
    async fn write(&self, record: &MetricRecord) -> Result<(), SinkError>;

    /// Drop series for domains missing from `live`, the keys written during
    /// a pass that reached every active domain
    async fn retain(&self, _live: &[SeriesKey]) -> Result<(), SinkError> {
        Ok(())
    }

    /// Tear down whatever the sink published
    async fn close(&self) -> Result<(), SinkError>;
}
