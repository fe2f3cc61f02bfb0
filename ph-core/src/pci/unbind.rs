//! Generic per-device driver detach

use tracing::info;

use crate::error::{PciHookError, Result};
use crate::pci::sysfs::{Sysfs, SysfsLayout};
use crate::pci::PciAddress;

/// Detach a device from its current driver by writing its address to the
/// driver's unbind file
pub fn unbind(
    sysfs: &dyn Sysfs,
    layout: &SysfsLayout,
    address: &PciAddress,
    current_driver: &str,
) -> Result<()> {
    let unbind_path = layout.unbind_file(current_driver);

    info!(address = %address, driver = %current_driver, "Unbinding device from driver");

    sysfs
        .write_attr(&unbind_path, &address.to_string())
        .map_err(|e| PciHookError::Unbind {
            address: address.to_string(),
            driver: current_driver.to_string(),
            path: unbind_path,
            source: e,
        })
}
