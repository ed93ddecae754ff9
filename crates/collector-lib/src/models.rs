//! Core data models for the collector

use serde::{Deserialize, Serialize};

/// Normalized metrics for one domain, captured in one collection pass.
///
/// Every field is always populated. Device counters that could not be
/// read are reported as zero rather than left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Capture time in milliseconds since the Unix epoch
    pub timestamp: i64,
    pub vm_name: String,
    pub vm_uuid: String,
    pub cpu_time_ns: u64,
    pub cpu_time_sec: u64,
    pub vcpus: u32,
    /// CPU time divided by the vCPU count.
    ///
    /// This approximates how long the guest has been executing. It is not
    /// wall-clock uptime: an idle guest accrues almost none of it.
    pub uptime_sec: u64,
    pub memory_kb: u64,
    pub max_memory_kb: u64,
    pub memory_usage_percent: f64,
    /// Hypervisor lifecycle code (0 nostate, 1 running, 2 blocked, 3 paused,
    /// 4 shutdown, 5 shutoff, 6 crashed, 7 pmsuspended)
    pub state: u32,
    pub net_rx_bytes: u64,
    pub net_tx_bytes: u64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
}

/// Numeric info block reported by the hypervisor for a domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DomainInfo {
    pub cpu_time_ns: u64,
    pub vcpus: u32,
    pub memory_kb: u64,
    pub state: u32,
}

/// Byte counters for a network interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Byte counters for a block device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStats {
    pub read_bytes: u64,
    pub write_bytes: u64,
}
