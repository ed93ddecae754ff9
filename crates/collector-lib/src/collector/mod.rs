//! Metrics collection from the hypervisor
//!
//! This module turns hypervisor counters into normalized metric records:
//! - `descriptor` resolves device names from the domain XML
//! - `extractor` builds one record per domain
//! - `batch` runs one pass over all active domains
//! - `loop` schedules passes at a fixed interval

mod batch;
mod descriptor;
mod extractor;
mod r#loop;


pub use batch::{BatchCollector, CollectionResults};
pub use descriptor::{
    is_disk_device, resolve_first_disk_device, resolve_first_network_device, DomainDescriptor,
};
pub use extractor::{estimate_uptime_secs, memory_usage_percent, MetricExtractor};
pub use r#loop::{CollectionConfig, CollectionLoop, CollectionLoopBuilder};
