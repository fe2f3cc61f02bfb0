//! Guest descriptor extraction
//!
//! libvirt hands the hook the guest's domain XML on stdin. Only two things
//! are read from it: PCI host devices requested for passthrough and the
//! virtual networks the guest's interfaces attach to.
//!
//! ```xml
//! <domain type='kvm'>
//!   <name>win11</name>
//!   <devices>
//!     <hostdev mode='subsystem' type='pci' managed='no'>
//!       <source><address domain='0x0000' bus='0x01' slot='0x00' function='0x0'/></source>
//!     </hostdev>
//!     <interface type='network'><source network='default'/></interface>
//!   </devices>
//! </domain>
//! ```

use std::collections::HashSet;

use roxmltree::{Document, Node};
use tracing::debug;

use crate::error::{PciHookError, Result};
use crate::pci::PciAddress;

/// What the prepare handler needs from a domain XML document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuestDescriptor {
    pub name: Option<String>,
    /// PCI devices in document order, duplicates removed
    pub devices: Vec<PciAddress>,
    /// Network names in document order, duplicates removed
    pub networks: Vec<String>,
}

impl GuestDescriptor {
    /// Parse a libvirt domain XML document
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = Document::parse(xml)
            .map_err(|e| PciHookError::descriptor(format!("malformed XML: {}", e)))?;

        let root = doc.root_element();
        if root.tag_name().name() != "domain" {
            return Err(PciHookError::descriptor(format!(
                "expected <domain> root element, found <{}>",
                root.tag_name().name()
            )));
        }

        let name = child_element(root, "name")
            .and_then(|n| n.text())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let mut descriptor = GuestDescriptor { name, ..Default::default() };

        let Some(devices) = child_element(root, "devices") else {
            return Ok(descriptor);
        };

        let mut seen_devices = HashSet::new();
        let mut seen_networks = HashSet::new();

        for node in devices.children().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "hostdev" if is_pci_hostdev(node) => {
                    let address = parse_hostdev_address(node)?;
                    if seen_devices.insert(address) {
                        descriptor.devices.push(address);
                    }
                }
                "interface" if node.attribute("type") == Some("network") => {
                    let network = child_element(node, "source")
                        .and_then(|s| s.attribute("network"))
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .ok_or_else(|| {
                            PciHookError::descriptor("network interface without source network")
                        })?;
                    if seen_networks.insert(network.to_string()) {
                        descriptor.networks.push(network.to_string());
                    }
                }
                _ => {}
            }
        }

        debug!(
            guest = ?descriptor.name,
            devices = descriptor.devices.len(),
            networks = descriptor.networks.len(),
            "Parsed guest descriptor"
        );

        Ok(descriptor)
    }
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.is_element() && n.tag_name().name() == name)
}

/// USB and SCSI hostdevs share the element name; only PCI subsystem ones count
fn is_pci_hostdev(node: Node) -> bool {
    node.attribute("mode").unwrap_or("subsystem") == "subsystem" && node.attribute("type") == Some("pci")
}

fn parse_hostdev_address(hostdev: Node) -> Result<PciAddress> {
    let address = child_element(hostdev, "source")
        .and_then(|s| child_element(s, "address"))
        .ok_or_else(|| PciHookError::descriptor("PCI hostdev without source address"))?;

    let domain = match address.attribute("domain") {
        Some(v) => parse_number::<u16>("domain", v)?,
        None => 0,
    };
    let bus = parse_number::<u8>("bus", required_attr(address, "bus")?)?;
    let slot = parse_number::<u8>("slot", required_attr(address, "slot")?)?;
    let function = parse_number::<u8>("function", required_attr(address, "function")?)?;

    PciAddress::new(domain, bus, slot, function)
        .map_err(|e| PciHookError::descriptor(format!("hostdev address: {}", e)))
}

fn required_attr<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name)
        .ok_or_else(|| PciHookError::descriptor(format!("hostdev address missing '{}'", name)))
}

/// libvirt writes `0x`-prefixed hex; bare numbers are decimal
fn parse_number<T>(field: &str, value: &str) -> Result<T>
where
    T: TryFrom<u32>,
{
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse::<u32>(),
    }
    .map_err(|e| PciHookError::descriptor(format!("invalid {} '{}': {}", field, value, e)))?;

    T::try_from(parsed)
        .map_err(|_| PciHookError::descriptor(format!("{} '{}' out of range", field, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIN11: &str = r#"
        <domain type='kvm'>
          <name>win11</name>
          <devices>
            <emulator>/usr/bin/qemu-system-x86_64</emulator>
            <hostdev mode='subsystem' type='pci' managed='no'>
              <source>
                <address domain='0x0000' bus='0x01' slot='0x00' function='0x0'/>
              </source>
            </hostdev>
            <hostdev mode='subsystem' type='pci' managed='no'>
              <source>
                <address domain='0x0000' bus='0x01' slot='0x00' function='0x1'/>
              </source>
              <address type='pci' domain='0x0000' bus='0x06' slot='0x00' function='0x0'/>
            </hostdev>
            <hostdev mode='subsystem' type='usb' managed='yes'>
              <source><vendor id='0x046d'/><product id='0xc52b'/></source>
            </hostdev>
            <interface type='network'>
              <source network='default'/>
            </interface>
            <interface type='bridge'>
              <source bridge='br0'/>
            </interface>
            <interface type='network'>
              <source network='isolated'/>
            </interface>
            <interface type='network'>
              <source network='default'/>
            </interface>
          </devices>
        </domain>"#;

    #[test]
    fn test_extracts_pci_hostdevs_and_networks() {
        let desc = GuestDescriptor::parse(WIN11).unwrap();

        assert_eq!(desc.name.as_deref(), Some("win11"));
        let devices: Vec<String> = desc.devices.iter().map(|a| a.to_string()).collect();
        assert_eq!(devices, vec!["0000:01:00.0", "0000:01:00.1"]);
        assert_eq!(desc.networks, vec!["default", "isolated"]);
    }

    #[test]
    fn test_domain_without_devices() {
        let desc = GuestDescriptor::parse("<domain><name>empty</name></domain>").unwrap();
        assert!(desc.devices.is_empty());
        assert!(desc.networks.is_empty());
    }

    #[test]
    fn test_missing_domain_attribute_defaults_to_zero() {
        let xml = r#"<domain><devices>
            <hostdev mode='subsystem' type='pci'>
              <source><address bus='0x0a' slot='0x1f' function='0x7'/></source>
            </hostdev>
        </devices></domain>"#;
        let desc = GuestDescriptor::parse(xml).unwrap();
        assert_eq!(desc.devices[0].to_string(), "0000:0a:1f.7");
    }

    #[test]
    fn test_decimal_attributes() {
        let xml = r#"<domain><devices>
            <hostdev mode='subsystem' type='pci'>
              <source><address domain='0' bus='10' slot='2' function='1'/></source>
            </hostdev>
        </devices></domain>"#;
        let desc = GuestDescriptor::parse(xml).unwrap();
        assert_eq!(desc.devices[0].to_string(), "0000:0a:02.1");
    }

    #[test]
    fn test_malformed_descriptors() {
        assert!(matches!(
            GuestDescriptor::parse("<domain><devices>"),
            Err(PciHookError::Descriptor(_))
        ));
        assert!(GuestDescriptor::parse("<network><name>default</name></network>").is_err());

        let missing_slot = r#"<domain><devices>
            <hostdev mode='subsystem' type='pci'>
              <source><address domain='0x0000' bus='0x01' function='0x0'/></source>
            </hostdev></devices></domain>"#;
        assert!(GuestDescriptor::parse(missing_slot).is_err());

        let bad_function = r#"<domain><devices>
            <hostdev mode='subsystem' type='pci'>
              <source><address domain='0x0000' bus='0x01' slot='0x00' function='0x9'/></source>
            </hostdev></devices></domain>"#;
        assert!(GuestDescriptor::parse(bad_function).is_err());

        let bus_overflow = r#"<domain><devices>
            <hostdev mode='subsystem' type='pci'>
              <source><address domain='0x0000' bus='0x100' slot='0x00' function='0x0'/></source>
            </hostdev></devices></domain>"#;
        assert!(GuestDescriptor::parse(bus_overflow).is_err());

        let no_network = r#"<domain><devices>
            <interface type='network'><source/></interface>
        </devices></domain>"#;
        assert!(GuestDescriptor::parse(no_network).is_err());
    }
}
