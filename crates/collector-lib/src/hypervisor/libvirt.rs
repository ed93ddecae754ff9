//! libvirt-backed hypervisor connection
//!
//! Thin adapter from the `virt` bindings to the [`Hypervisor`] and
//! [`DomainHandle`] traits. Counters that libvirt reports as negative
//! (unsupported) are clamped to zero.

use super::{DomainHandle, Hypervisor};
use crate::error::HypervisorError;
use crate::models::{BlockStats, DomainInfo, InterfaceStats};
use std::sync::{Mutex, MutexGuard};
use tracing::info;
use virt::connect::Connect;
use virt::domain::Domain;

/// Connection to a libvirt daemon
pub struct LibvirtConnection {
    uri: String,
    conn: Mutex<Option<Connect>>,
}

impl LibvirtConnection {
    /// Open a connection to the given libvirt URI (e.g. `qemu:///system`)
    pub fn open(uri: &str) -> Result<Self, HypervisorError> {
        let conn = Connect::open(Some(uri)).map_err(|e| HypervisorError::Connect {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;

        info!(uri = %uri, "Connected to libvirt");

        Ok(Self {
            uri: uri.to_string(),
            conn: Mutex::new(Some(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connect>> {
        // Connect carries no invariants a panicking holder could break
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Hypervisor for LibvirtConnection {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn list_active_domain_ids(&self) -> Result<Vec<u32>, HypervisorError> {
        let guard = self.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| HypervisorError::Enumeration("connection closed".to_string()))?;

        conn.list_domains()
            .map_err(|e| HypervisorError::Enumeration(e.to_string()))
    }

    fn lookup_domain(&self, id: u32) -> Result<Box<dyn DomainHandle + '_>, HypervisorError> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or_else(|| HypervisorError::Lookup {
            id,
            message: "connection closed".to_string(),
        })?;

        let domain = Domain::lookup_by_id(conn, id).map_err(|e| HypervisorError::Lookup {
            id,
            message: e.to_string(),
        })?;

        Ok(Box::new(LibvirtDomain { domain }))
    }

    fn close(&self) -> Result<(), HypervisorError> {
        let mut guard = self.lock();
        if let Some(mut conn) = guard.take() {
            conn.close().map_err(|e| HypervisorError::query("close", e.to_string()))?;
            info!(uri = %self.uri, "Closed libvirt connection");
        }
        Ok(())
    }
}

/// A domain resolved through libvirt
pub struct LibvirtDomain {
    domain: Domain,
}

fn clamp(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl DomainHandle for LibvirtDomain {
    fn name(&self) -> Result<String, HypervisorError> {
        self.domain
            .get_name()
            .map_err(|e| HypervisorError::query("virDomainGetName", e.to_string()))
    }

    fn uuid(&self) -> Result<String, HypervisorError> {
        self.domain
            .get_uuid_string()
            .map_err(|e| HypervisorError::query("virDomainGetUUIDString", e.to_string()))
    }

    fn info(&self) -> Result<DomainInfo, HypervisorError> {
        let info = self
            .domain
            .get_info()
            .map_err(|e| HypervisorError::query("virDomainGetInfo", e.to_string()))?;

        Ok(DomainInfo {
            cpu_time_ns: info.cpu_time,
            vcpus: info.nr_virt_cpu,
            memory_kb: info.memory,
            state: info.state as u32,
        })
    }

    fn max_memory_kb(&self) -> Result<u64, HypervisorError> {
        self.domain
            .get_max_memory()
            .map_err(|e| HypervisorError::query("virDomainGetMaxMemory", e.to_string()))
    }

    fn descriptor_xml(&self) -> Result<String, HypervisorError> {
        self.domain
            .get_xml_desc(0)
            .map_err(|e| HypervisorError::query("virDomainGetXMLDesc", e.to_string()))
    }

    fn interface_stats(&self, device: &str) -> Result<InterfaceStats, HypervisorError> {
        let stats = self
            .domain
            .interface_stats(device)
            .map_err(|e| HypervisorError::query("virDomainInterfaceStats", e.to_string()))?;

        Ok(InterfaceStats {
            rx_bytes: clamp(stats.rx_bytes),
            tx_bytes: clamp(stats.tx_bytes),
        })
    }

    fn disk_stats(&self, device: &str) -> Result<BlockStats, HypervisorError> {
        let stats = self
            .domain
            .get_block_stats(device)
            .map_err(|e| HypervisorError::query("virDomainBlockStats", e.to_string()))?;

        Ok(BlockStats {
            read_bytes: clamp(stats.rd_bytes),
            write_bytes: clamp(stats.wr_bytes),
        })
    }
}
