//! Driver inspection
//!
//! Reads which kernel driver currently claims a device and the vendor/model
//! identifiers the pass-through driver needs to claim it.

use std::io;

use tracing::debug;

use crate::error::{PciHookError, Result};
use crate::pci::sysfs::{Sysfs, SysfsLayout};
use crate::pci::PciAddress;

/// Driver ownership and identity of one device, read fresh from sysfs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBindingState {
    pub address: PciAddress,
    /// None if no driver claims the device
    pub current_driver: Option<String>,
    /// Lowercase hex without the 0x prefix, e.g. "10de"
    pub vendor_id: String,
    /// Lowercase hex without the 0x prefix, e.g. "1eb8"
    pub model_id: String,
}

impl DeviceBindingState {
    /// The `"<vendor> <model>"` pair written to a driver's new_id file
    pub fn id_pair(&self) -> String {
        format!("{} {}", self.vendor_id, self.model_id)
    }
}

/// How a device must be detached before the pass-through driver can claim it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverFamily {
    /// No driver; nothing to detach
    Unbound,
    /// Driver that only lets go of devices when its modules are unloaded
    Monolithic,
    /// Driver supporting per-device detach through its unbind file
    Unbindable,
    /// Already owned by the pass-through driver; never touched
    AlreadyTarget,
}

impl DriverFamily {
    /// Classify a device by its current driver.
    ///
    /// Anything that is neither the pass-through driver nor the monolithic
    /// driver is assumed to support the generic unbind path.
    pub fn classify(
        current_driver: Option<&str>,
        passthrough_driver: &str,
        monolithic_driver: &str,
    ) -> Self {
        match current_driver {
            None => Self::Unbound,
            Some(d) if d == passthrough_driver => Self::AlreadyTarget,
            Some(d) if d == monolithic_driver => Self::Monolithic,
            Some(_) => Self::Unbindable,
        }
    }

    pub fn needs_binding(&self) -> bool {
        !matches!(self, Self::AlreadyTarget)
    }
}

impl std::fmt::Display for DriverFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverFamily::Unbound => write!(f, "unbound"),
            DriverFamily::Monolithic => write!(f, "monolithic"),
            DriverFamily::Unbindable => write!(f, "unbindable"),
            DriverFamily::AlreadyTarget => write!(f, "already-target"),
        }
    }
}

/// Read the name of the driver bound to a device.
///
/// Fails with [`PciHookError::NotBound`] when the device has no driver link.
pub fn read_driver(sysfs: &dyn Sysfs, layout: &SysfsLayout, address: &PciAddress) -> Result<String> {
    let link = layout.driver_link(address);
    let target = sysfs.read_link(&link).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => PciHookError::NotBound { address: address.to_string() },
        _ => PciHookError::DeviceRead {
            address: address.to_string(),
            path: link.clone(),
            source: e,
        },
    })?;

    target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| PciHookError::NotBound { address: address.to_string() })
}

/// Read one hex ID attribute, normalised to lowercase without "0x"
fn read_id(sysfs: &dyn Sysfs, address: &PciAddress, path: std::path::PathBuf) -> Result<String> {
    let raw = sysfs.read_attr(&path).map_err(|e| PciHookError::DeviceRead {
        address: address.to_string(),
        path: path.clone(),
        source: e,
    })?;

    let id = raw.trim_start_matches("0x").to_lowercase();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(PciHookError::DeviceRead {
            address: address.to_string(),
            path,
            source: io::Error::new(io::ErrorKind::InvalidData, format!("not a hex ID: '{}'", raw)),
        });
    }
    Ok(id)
}

/// Read the current binding state of a device
pub fn inspect(sysfs: &dyn Sysfs, layout: &SysfsLayout, address: &PciAddress) -> Result<DeviceBindingState> {
    let current_driver = match read_driver(sysfs, layout, address) {
        Ok(driver) => Some(driver),
        Err(e) if e.is_recoverable() => None,
        Err(e) => return Err(e),
    };

    let vendor_id = read_id(sysfs, address, layout.vendor_attr(address))?;
    let model_id = read_id(sysfs, address, layout.model_attr(address))?;

    debug!(
        address = %address,
        driver = ?current_driver,
        vendor = %vendor_id,
        device = %model_id,
        "Read PCI device state"
    );

    Ok(DeviceBindingState {
        address: *address,
        current_driver,
        vendor_id,
        model_id,
    })
}
