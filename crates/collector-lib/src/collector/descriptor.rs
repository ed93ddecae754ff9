//! Domain descriptor parsing
//!
//! Resolves the device names the extractor needs from a domain's XML
//! descriptor:
//! - the first `<interface>` with a `<target dev="...">` child
//! - the first `<disk>` whose target `dev` looks like a block device
//!
//! Elements are matched anywhere in the document, in document order.
//! Nothing is cached: devices can be hot-plugged between passes.

use crate::error::DescriptorError;
use regex::Regex;
use roxmltree::{Document, Node};
use std::sync::OnceLock;

/// Recognized block device names: virtio, SCSI/SATA, IDE, Xen and NVMe
const DISK_DEVICE_PATTERN: &str = r"^(vd|sd|hd|xvd|nvme)[a-z0-9]+$";

fn disk_device_regex() -> &'static Regex {
    static DISK_DEVICE: OnceLock<Regex> = OnceLock::new();
    DISK_DEVICE.get_or_init(|| Regex::new(DISK_DEVICE_PATTERN).expect("valid disk device pattern"))
}

/// Whether `dev` names a block device the collector reports on
pub fn is_disk_device(dev: &str) -> bool {
    disk_device_regex().is_match(dev)
}

/// A parsed domain descriptor document
pub struct DomainDescriptor<'a> {
    doc: Document<'a>,
}

impl<'a> DomainDescriptor<'a> {
    /// Parse a descriptor document
    pub fn parse(xml: &'a str) -> Result<Self, DescriptorError> {
        Ok(Self {
            doc: Document::parse(xml)?,
        })
    }

    /// Device name of the first network interface target.
    ///
    /// Any `dev` value is accepted.
    pub fn first_network_device(&self) -> Option<&str> {
        self.target_devices("interface").next()
    }

    /// Device name of the first disk target that matches a known block
    /// device prefix. Non-matching targets (`fd0`, `sr0`) are skipped.
    pub fn first_disk_device(&self) -> Option<&str> {
        self.target_devices("disk").find(|dev| is_disk_device(dev))
    }

    /// `dev` attributes of `<target>` descendants of every `tag` element
    fn target_devices<'d>(&'d self, tag: &'d str) -> impl Iterator<Item = &'d str> + 'd {
        self.doc
            .descendants()
            .filter(move |node| node.has_tag_name(tag))
            .flat_map(|device| device.descendants().filter(is_target))
            .filter_map(|target| target.attribute("dev"))
    }
}

fn is_target(node: &Node<'_, '_>) -> bool {
    node.has_tag_name("target")
}

/// Resolve the first network device name from a descriptor document
pub fn resolve_first_network_device(xml: &str) -> Result<Option<String>, DescriptorError> {
    let descriptor = DomainDescriptor::parse(xml)?;
    Ok(descriptor.first_network_device().map(str::to_string))
}

/// Resolve the first recognized disk device name from a descriptor document
pub fn resolve_first_disk_device(xml: &str) -> Result<Option<String>, DescriptorError> {
    let descriptor = DomainDescriptor::parse(xml)?;
    Ok(descriptor.first_disk_device().map(str::to_string))
}
