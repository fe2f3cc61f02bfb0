//! Pass-through driver claim
//!
//! Registers a vendor/model pair with the pass-through driver's new_id file.
//! The kernel then probes every unclaimed device with that pair, which
//! includes the device being rebound.
//!
//! new_id is driver-wide: a pair the driver already knows (registered earlier
//! in the batch, by an earlier guest start, or through the module's `ids=`
//! parameter) is rejected with EEXIST and nothing is probed. Such devices are
//! claimed by address through the driver's bind file instead.

use std::io;

use tracing::{debug, info};

use crate::config::PassthroughConfig;
use crate::error::{PciHookError, Result};
use crate::pci::inspect::{read_driver, DeviceBindingState};
use crate::pci::modules::{ensure_passthrough_module, KernelModules};
use crate::pci::orchestrator::BatchGuards;
use crate::pci::sysfs::{Sysfs, SysfsLayout};

/// Everything the binder needs from the host
pub struct Binder<'a> {
    pub sysfs: &'a dyn Sysfs,
    pub modules: &'a dyn KernelModules,
    pub layout: &'a SysfsLayout,
    pub passthrough: &'a PassthroughConfig,
}

impl Binder<'_> {
    /// Claim a device for the pass-through driver
    pub fn bind(&self, guards: &mut BatchGuards, device: &DeviceBindingState) -> Result<()> {
        ensure_passthrough_module(self.modules, self.sysfs, self.layout, self.passthrough, guards)?;

        let ids = device.id_pair();

        if guards.registered_ids.contains(&ids) {
            debug!(address = %device.address, ids = %ids, "ID pair already registered in this batch");
            return self.bind_by_address(device);
        }

        let new_id_path = self.layout.new_id_file(&self.passthrough.driver);

        info!(
            address = %device.address,
            vendor = %device.vendor_id,
            device = %device.model_id,
            driver = %self.passthrough.driver,
            "Binding device to pass-through driver"
        );

        match self.sysfs.write_attr(&new_id_path, &ids) {
            Ok(()) => {
                guards.registered_ids.insert(ids);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!(address = %device.address, ids = %ids, "Driver already knows ID pair");
                guards.registered_ids.insert(ids);
                self.bind_by_address(device)
            }
            Err(e) => Err(PciHookError::Bind {
                address: device.address.to_string(),
                ids,
                path: new_id_path,
                source: e,
            }),
        }
    }

    /// Claim one device through the driver's bind file, unless the kernel
    /// already probed it
    fn bind_by_address(&self, device: &DeviceBindingState) -> Result<()> {
        match read_driver(self.sysfs, self.layout, &device.address) {
            Ok(driver) if driver == self.passthrough.driver => {
                debug!(address = %device.address, "Device already claimed by pass-through driver");
                return Ok(());
            }
            Ok(driver) => {
                debug!(address = %device.address, driver = %driver, "Device held by another driver");
            }
            Err(e) if e.is_recoverable() => {}
            Err(e) => return Err(e),
        }

        let bind_path = self.layout.bind_file(&self.passthrough.driver);
        let address = device.address.to_string();

        info!(
            address = %address,
            driver = %self.passthrough.driver,
            "Binding device to pass-through driver by address"
        );

        self.sysfs
            .write_attr(&bind_path, &address)
            .map_err(|e| PciHookError::Bind {
                address: address.clone(),
                ids: device.id_pair(),
                path: bind_path,
                source: e,
            })
    }
}
