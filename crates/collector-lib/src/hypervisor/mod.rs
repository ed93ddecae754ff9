//! Hypervisor connection boundary
//!
//! The collector only reads from the hypervisor. All calls block on the
//! hypervisor round trip, so async callers run them on the blocking pool.
//! Domain handles are dropped as soon as their record has been built.

#[cfg(feature = "libvirt")]
mod libvirt;

#[cfg(feature = "libvirt")]
pub use libvirt::{LibvirtConnection, LibvirtDomain};

use crate::error::HypervisorError;
use crate::models::{BlockStats, DomainInfo, InterfaceStats};

/// A connection that can enumerate and resolve running domains
pub trait Hypervisor: Send + Sync {
    /// Connection URI, used to tag lifecycle logs
    fn uri(&self) -> &str;

    /// IDs of all currently active domains
    fn list_active_domain_ids(&self) -> Result<Vec<u32>, HypervisorError>;

    /// Resolve an active domain ID to a handle
    fn lookup_domain(&self, id: u32) -> Result<Box<dyn DomainHandle + '_>, HypervisorError>;

    /// Release the connection. Default is a no-op for connections that need
    /// no explicit teardown.
    fn close(&self) -> Result<(), HypervisorError> {
        Ok(())
    }
}

/// A running domain, queried for its counters and configuration
pub trait DomainHandle {
    fn name(&self) -> Result<String, HypervisorError>;

    fn uuid(&self) -> Result<String, HypervisorError>;

    fn info(&self) -> Result<DomainInfo, HypervisorError>;

    fn max_memory_kb(&self) -> Result<u64, HypervisorError>;

    /// The domain's XML descriptor document
    fn descriptor_xml(&self) -> Result<String, HypervisorError>;

    fn interface_stats(&self, device: &str) -> Result<InterfaceStats, HypervisorError>;

    fn disk_stats(&self, device: &str) -> Result<BlockStats, HypervisorError>;
}
