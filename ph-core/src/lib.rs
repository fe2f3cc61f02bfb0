//! pcihook core library
//!
//! Everything a libvirt pre-start hook needs to hand PCI devices to a guest.
//!
//! # Module Structure
//!
//! - `pci/` - Device addresses, sysfs access, and the rebind engine
//! - `descriptor` - Domain XML extraction (devices and networks)
//! - `network` - Virtual network activation through libvirt
//! - `hooks` - (script, guest, action) routing table
//! - `prepare` - The pre-start handler tying the above together
//! - `config` - JSON configuration
//!
//! # Example
//!
//! ```no_run
//! use ph_core::{Config, HostSysfs, Modprobe, PciAddress, Rebinder};
//!
//! let config = Config::default();
//! let gpu: PciAddress = "0000:01:00.0".parse().unwrap();
//! let report = Rebinder::new(&config, &HostSysfs, &Modprobe::default())
//!     .rebind(&[gpu])
//!     .unwrap();
//! ```

pub mod pci;

pub mod config;
pub mod constants;
pub mod descriptor;
pub mod error;
pub mod hooks;
pub mod network;
pub mod prepare;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export error types
pub use error::{PciHookError, Result};

// Re-export the rebind engine
pub use pci::{
    BatchGuards, DeviceBindingState, DeviceReport, DriverFamily, HostSysfs, KernelModules,
    Modprobe, PciAddress, RebindReport, Rebinder, Sysfs, SysfsLayout,
};

// Re-export collaborators
pub use config::{Config, MonolithicConfig, PassthroughConfig, RouteConfig, VirshConfig};
pub use descriptor::GuestDescriptor;
pub use hooks::{HookHandler, HookKey, HookTable};
pub use network::{activate_networks, VirtControl, Virsh};
pub use prepare::{prepare_guest, HostBackends, PrepareSummary};
