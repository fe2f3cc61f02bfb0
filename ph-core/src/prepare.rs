//! Prepare handler
//!
//! Runs before libvirt allocates anything for the guest: rebind its PCI
//! devices to the pass-through driver, then start its networks. Any error
//! aborts the guest start.

use tracing::info;

use crate::config::Config;
use crate::descriptor::GuestDescriptor;
use crate::error::Result;
use crate::network::{activate_networks, VirtControl};
use crate::pci::{KernelModules, RebindReport, Rebinder, Sysfs};

/// Host-side collaborators of the prepare handler
pub struct HostBackends<'a> {
    pub sysfs: &'a dyn Sysfs,
    pub modules: &'a dyn KernelModules,
    pub virt: &'a dyn VirtControl,
}

/// Outcome of a prepare run
#[derive(Debug, Clone)]
pub struct PrepareSummary {
    pub guest: Option<String>,
    pub rebind: RebindReport,
    pub networks_started: Vec<String>,
}

/// Prepare a guest from its domain XML
pub fn prepare_guest(config: &Config, host: &HostBackends<'_>, descriptor_xml: &str) -> Result<PrepareSummary> {
    let descriptor = GuestDescriptor::parse(descriptor_xml)?;

    info!(
        guest = ?descriptor.name,
        devices = descriptor.devices.len(),
        networks = descriptor.networks.len(),
        "Preparing guest"
    );

    let rebind = Rebinder::new(config, host.sysfs, host.modules).rebind(&descriptor.devices)?;
    let networks_started = activate_networks(host.virt, &descriptor.networks)?;

    info!(
        guest = ?descriptor.name,
        rebound = rebind.rebound_count(),
        networks_started = networks_started.len(),
        "Guest prepared"
    );

    Ok(PrepareSummary {
        guest: descriptor.name,
        rebind,
        networks_started,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PciHookError;
    use crate::network::MockVirtControl;
    use crate::pci::PciAddress;
    use crate::test_utils::FakeHost;

    const GUEST: &str = r#"<domain type='kvm'><name>gaming</name><devices>
        <hostdev mode='subsystem' type='pci' managed='no'>
          <source><address domain='0x0000' bus='0x01' slot='0x00' function='0x0'/></source>
        </hostdev>
        <interface type='network'><source network='default'/></interface>
    </devices></domain>"#;

    #[test]
    fn test_prepare_rebinds_then_starts_networks() {
        let host = FakeHost::new();
        let gpu: PciAddress = "0000:01:00.0".parse().unwrap();
        host.add_device(&gpu, "10de", "2204", Some("nvidia"));

        let mut virt = MockVirtControl::new();
        virt.expect_is_network_active().returning(|_| Ok(false));
        virt.expect_start_network().times(1).returning(|_| Ok(()));

        let backends = HostBackends { sysfs: &host, modules: &host, virt: &virt };
        let summary = prepare_guest(&Config::default(), &backends, GUEST).unwrap();

        assert_eq!(summary.guest.as_deref(), Some("gaming"));
        assert_eq!(summary.rebind.rebound_count(), 1);
        assert_eq!(summary.networks_started, vec!["default"]);
        assert_eq!(host.driver_of(&gpu).as_deref(), Some("vfio-pci"));
    }

    #[test]
    fn test_rebind_failure_skips_networks() {
        let host = FakeHost::new();
        let gpu: PciAddress = "0000:01:00.0".parse().unwrap();
        host.add_device(&gpu, "10de", "2204", Some("nvidia"));
        host.fail_unload("nvidia");

        let mut virt = MockVirtControl::new();
        virt.expect_is_network_active().never();
        virt.expect_start_network().never();

        let backends = HostBackends { sysfs: &host, modules: &host, virt: &virt };
        let err = prepare_guest(&Config::default(), &backends, GUEST).unwrap_err();
        assert!(matches!(err, PciHookError::ModuleUnload { .. }));
    }

    #[test]
    fn test_bad_descriptor_touches_nothing() {
        let host = FakeHost::new();
        let virt = MockVirtControl::new();

        let backends = HostBackends { sysfs: &host, modules: &host, virt: &virt };
        let err = prepare_guest(&Config::default(), &backends, "not xml").unwrap_err();
        assert!(matches!(err, PciHookError::Descriptor(_)));
        assert!(host.events().is_empty());
    }
}
