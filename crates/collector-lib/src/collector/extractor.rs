//! Per-domain metric extraction
//!
//! Reads the domain's core info block and its first network/disk device
//! counters, and normalizes them into a [`MetricRecord`].
//!
//! Only the core info block is fatal. Device counters degrade to zero on
//! any failure so a missing disk never costs the whole record.

use super::descriptor::DomainDescriptor;
use crate::error::{ExtractionError, HypervisorError};
use crate::hypervisor::DomainHandle;
use crate::models::{BlockStats, InterfaceStats, MetricRecord};
use tracing::debug;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Builds [`MetricRecord`]s from domain handles
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricExtractor;

/// Device names resolved from one descriptor fetch
#[derive(Debug, Default, PartialEq, Eq)]
struct ResolvedDevices {
    network: Option<String>,
    disk: Option<String>,
}

impl MetricExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Build the metric record for a domain.
    ///
    /// Fails only if name, UUID, info block or max memory cannot be read.
    pub fn build(&self, domain: &dyn DomainHandle) -> Result<MetricRecord, ExtractionError> {
        let info = domain.info().map_err(core("info"))?;
        let vm_name = domain.name().map_err(core("name"))?;
        let vm_uuid = domain.uuid().map_err(core("uuid"))?;
        let max_memory_kb = domain.max_memory_kb().map_err(core("max memory"))?;

        let cpu_time_sec = info.cpu_time_ns / NANOS_PER_SEC;

        let devices = resolve_devices(domain, &vm_name);
        let net = interface_stats_or_default(domain, devices.network.as_deref(), &vm_name);
        let disk = disk_stats_or_default(domain, devices.disk.as_deref(), &vm_name);

        Ok(MetricRecord {
            timestamp: chrono::Utc::now().timestamp_millis(),
            vm_name,
            vm_uuid,
            cpu_time_ns: info.cpu_time_ns,
            cpu_time_sec,
            vcpus: info.vcpus,
            uptime_sec: estimate_uptime_secs(cpu_time_sec, info.vcpus),
            memory_kb: info.memory_kb,
            max_memory_kb,
            memory_usage_percent: memory_usage_percent(info.memory_kb, max_memory_kb),
            state: info.state,
            net_rx_bytes: net.rx_bytes,
            net_tx_bytes: net.tx_bytes,
            disk_read_bytes: disk.read_bytes,
            disk_write_bytes: disk.write_bytes,
        })
    }
}

fn core(field: &'static str) -> impl FnOnce(HypervisorError) -> ExtractionError {
    move |source| ExtractionError::Core { field, source }
}

/// Approximate execution time: CPU seconds spread over the vCPUs.
///
/// A domain reporting zero vCPUs is treated as having one.
pub fn estimate_uptime_secs(cpu_time_sec: u64, vcpus: u32) -> u64 {
    cpu_time_sec / u64::from(vcpus.max(1))
}

/// Used memory as a percentage of the ceiling; 0 when the ceiling is 0
pub fn memory_usage_percent(memory_kb: u64, max_memory_kb: u64) -> f64 {
    if max_memory_kb == 0 {
        return 0.0;
    }
    (memory_kb as f64 * 100.0) / max_memory_kb as f64
}

/// Fetch and parse the descriptor once, resolving both device names
fn resolve_devices(domain: &dyn DomainHandle, vm_name: &str) -> ResolvedDevices {
    let xml = match domain.descriptor_xml() {
        Ok(xml) => xml,
        Err(e) => {
            debug!(vm_name = %vm_name, error = %e, "Descriptor unavailable, device metrics zeroed");
            return ResolvedDevices::default();
        }
    };

    match DomainDescriptor::parse(&xml) {
        Ok(descriptor) => ResolvedDevices {
            network: descriptor.first_network_device().map(str::to_string),
            disk: descriptor.first_disk_device().map(str::to_string),
        },
        Err(e) => {
            debug!(vm_name = %vm_name, error = %e, "Descriptor unparsable, device metrics zeroed");
            ResolvedDevices::default()
        }
    }
}

fn interface_stats_or_default(
    domain: &dyn DomainHandle,
    device: Option<&str>,
    vm_name: &str,
) -> InterfaceStats {
    let Some(device) = device else {
        debug!(vm_name = %vm_name, "No network interface resolved");
        return InterfaceStats::default();
    };

    or_default(domain.interface_stats(device), vm_name, device)
}

fn disk_stats_or_default(
    domain: &dyn DomainHandle,
    device: Option<&str>,
    vm_name: &str,
) -> BlockStats {
    let Some(device) = device else {
        debug!(vm_name = %vm_name, "No disk device resolved");
        return BlockStats::default();
    };

    or_default(domain.disk_stats(device), vm_name, device)
}

fn or_default<T: Default>(result: Result<T, HypervisorError>, vm_name: &str, device: &str) -> T {
    result.unwrap_or_else(|e| {
        debug!(vm_name = %vm_name, device = %device, error = %e, "Device stats unavailable");
        T::default()
    })
}
