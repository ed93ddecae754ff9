//! Prometheus Pushgateway sink
//!
//! Keeps eleven labeled gauges (`vm_name`, `vm_uuid`) in a registry owned
//! by the sink and pushes the full snapshot to
//! `{url}/metrics/job/{job}` after each write. Writes use POST, so groups
//! pushed by other jobs are left alone. Once series for vanished domains
//! are dropped, the group is replaced with PUT so the gateway forgets them
//! too.

use super::{MetricSink, SeriesKey};
use crate::error::SinkError;
use crate::models::MetricRecord;
use async_trait::async_trait;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Response};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Job identifier used when none is configured
pub const DEFAULT_JOB_NAME: &str = "libvirt_collector";

const LABELS: &[&str] = &["vm_name", "vm_uuid"];

/// Configuration for the push gateway sink
#[derive(Debug, Clone)]
pub struct PushGatewayConfig {
    /// Base URL of the gateway (e.g. "http://localhost:9091")
    pub url: String,
    /// Job the gauges are grouped under
    pub job_name: String,
    /// Timeout for each push or delete request
    pub timeout: Duration,
}

impl Default for PushGatewayConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9091".to_string(),
            job_name: DEFAULT_JOB_NAME.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// The per-domain gauge family
struct VmGauges {
    cpu_time_seconds: GaugeVec,
    vcpu_count: GaugeVec,
    uptime_seconds: GaugeVec,
    memory_used_kb: GaugeVec,
    memory_max_kb: GaugeVec,
    memory_usage_percent: GaugeVec,
    network_receive_bytes: GaugeVec,
    network_transmit_bytes: GaugeVec,
    disk_read_bytes: GaugeVec,
    disk_write_bytes: GaugeVec,
    state_code: GaugeVec,
}

impl VmGauges {
    fn register(registry: &Registry) -> Result<Self, SinkError> {
        let gauge = |name: &str, help: &str| -> Result<GaugeVec, SinkError> {
            let vec = GaugeVec::new(Opts::new(name, help), LABELS).map_err(SinkError::Registration)?;
            registry
                .register(Box::new(vec.clone()))
                .map_err(SinkError::Registration)?;
            Ok(vec)
        };

        Ok(Self {
            cpu_time_seconds: gauge("vm_cpu_time_seconds", "Cumulative CPU time in seconds")?,
            vcpu_count: gauge("vm_vcpu_count", "Number of virtual CPUs")?,
            uptime_seconds: gauge(
                "vm_uptime_seconds",
                "Estimated execution time (CPU time divided by vCPUs)",
            )?,
            memory_used_kb: gauge("vm_memory_used_kb", "Memory in use in KB")?,
            memory_max_kb: gauge("vm_memory_max_kb", "Maximum memory in KB")?,
            memory_usage_percent: gauge("vm_memory_usage_percent", "Memory usage percentage")?,
            network_receive_bytes: gauge(
                "vm_network_receive_bytes_total",
                "Bytes received on the first network interface",
            )?,
            network_transmit_bytes: gauge(
                "vm_network_transmit_bytes_total",
                "Bytes transmitted on the first network interface",
            )?,
            disk_read_bytes: gauge("vm_disk_read_bytes_total", "Bytes read from the first disk")?,
            disk_write_bytes: gauge(
                "vm_disk_write_bytes_total",
                "Bytes written to the first disk",
            )?,
            state_code: gauge("vm_state_code", "Domain lifecycle state code")?,
        })
    }

    fn set(&self, record: &MetricRecord) {
        let labels = [record.vm_name.as_str(), record.vm_uuid.as_str()];
        let values = [
            (&self.cpu_time_seconds, record.cpu_time_sec as f64),
            (&self.vcpu_count, f64::from(record.vcpus)),
            (&self.uptime_seconds, record.uptime_sec as f64),
            (&self.memory_used_kb, record.memory_kb as f64),
            (&self.memory_max_kb, record.max_memory_kb as f64),
            (&self.memory_usage_percent, record.memory_usage_percent),
            (&self.network_receive_bytes, record.net_rx_bytes as f64),
            (&self.network_transmit_bytes, record.net_tx_bytes as f64),
            (&self.disk_read_bytes, record.disk_read_bytes as f64),
            (&self.disk_write_bytes, record.disk_write_bytes as f64),
            (&self.state_code, f64::from(record.state)),
        ];

        for (gauge, value) in values {
            gauge.with_label_values(&labels).set(value);
        }
    }

    fn remove(&self, (vm_name, vm_uuid): &SeriesKey) {
        for gauge in self.all() {
            // Absent when the domain was never fully written
            let _ = gauge.remove_label_values(&[vm_name.as_str(), vm_uuid.as_str()]);
        }
    }

    fn reset(&self) {
        for gauge in self.all() {
            gauge.reset();
        }
    }

    fn all(&self) -> [&GaugeVec; 11] {
        [
            &self.cpu_time_seconds,
            &self.vcpu_count,
            &self.uptime_seconds,
            &self.memory_used_kb,
            &self.memory_max_kb,
            &self.memory_usage_percent,
            &self.network_receive_bytes,
            &self.network_transmit_bytes,
            &self.disk_read_bytes,
            &self.disk_write_bytes,
            &self.state_code,
        ]
    }
}

/// Sink that pushes per-domain gauges to a Prometheus Pushgateway
pub struct PushGatewaySink {
    client: Client,
    job_url: Url,
    registry: Registry,
    gauges: VmGauges,
    series: Mutex<HashSet<SeriesKey>>,
}

impl PushGatewaySink {
    /// Create the sink and register its gauges in a fresh registry
    pub fn new(config: PushGatewayConfig) -> Result<Self, SinkError> {
        let job_url = job_url(&config.url, &config.job_name)?;
        let client = Client::builder().timeout(config.timeout).build()?;

        let registry = Registry::new();
        let gauges = VmGauges::register(&registry)?;

        info!(url = %config.url, job = %config.job_name, "Push gateway sink ready");

        Ok(Self {
            client,
            job_url,
            registry,
            gauges,
            series: Mutex::new(HashSet::new()),
        })
    }

    /// Grouping URL the gauges are pushed to
    pub fn job_url(&self) -> &Url {
        &self.job_url
    }

    /// Current gauge snapshot in the Prometheus text format
    pub fn encode(&self) -> Result<Vec<u8>, SinkError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(SinkError::Encode)?;
        Ok(buffer)
    }

    fn series(&self) -> MutexGuard<'_, HashSet<SeriesKey>> {
        self.series.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Send the snapshot. POST merges into the group, PUT replaces it.
    async fn push(&self, method: Method) -> Result<(), SinkError> {
        let body = self.encode()?;

        let response = self
            .client
            .request(method, self.job_url.clone())
            .header(CONTENT_TYPE, TextEncoder::new().format_type())
            .body(body)
            .send()
            .await?;

        ensure_success(response).await
    }
}

#[async_trait]
impl MetricSink for PushGatewaySink {
    async fn write(&self, record: &MetricRecord) -> Result<(), SinkError> {
        self.gauges.set(record);
        self.series()
            .insert((record.vm_name.clone(), record.vm_uuid.clone()));
        self.push(Method::POST).await?;

        info!(
            vm_name = %record.vm_name,
            cpu_seconds = record.cpu_time_sec,
            memory_kb = record.memory_kb,
            vcpus = record.vcpus,
            net_rx_bytes = record.net_rx_bytes,
            disk_read_bytes = record.disk_read_bytes,
            "Metrics pushed"
        );

        Ok(())
    }

    async fn retain(&self, live: &[SeriesKey]) -> Result<(), SinkError> {
        let stale: Vec<SeriesKey> = {
            let mut series = self.series();
            let stale: Vec<SeriesKey> = series
                .iter()
                .filter(|key| !live.contains(key))
                .cloned()
                .collect();
            for key in &stale {
                series.remove(key);
            }
            stale
        };

        if stale.is_empty() {
            return Ok(());
        }

        for key in &stale {
            self.gauges.remove(key);
            info!(vm_name = %key.0, vm_uuid = %key.1, "Dropped series for inactive domain");
        }

        self.push(Method::PUT).await
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.gauges.reset();
        self.series().clear();

        let response = self.client.delete(self.job_url.clone()).send().await?;
        ensure_success(response).await?;

        debug!(url = %self.job_url, "Deleted pushed metric group");
        Ok(())
    }
}

async fn ensure_success(response: Response) -> Result<(), SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(SinkError::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// Build `{base}/metrics/job/{job}`. A base without a scheme is taken as
/// plain HTTP.
pub fn job_url(base: &str, job: &str) -> Result<Url, SinkError> {
    if job.is_empty() {
        return Err(SinkError::InvalidEndpoint("job name is empty".to_string()));
    }

    let base = if base.contains("://") {
        base.to_string()
    } else {
        format!("http://{}", base)
    };

    let mut url =
        Url::parse(&base).map_err(|e| SinkError::InvalidEndpoint(format!("{}: {}", base, e)))?;

    url.path_segments_mut()
        .map_err(|_| SinkError::InvalidEndpoint(format!("{} cannot be a base URL", base)))?
        .pop_if_empty()
        .extend(["metrics", "job", job]);

    Ok(url)
}
