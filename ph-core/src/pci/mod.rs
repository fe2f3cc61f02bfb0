//! PCI device rebinding
//!
//! Contains the sysfs access layer and the four collaborators of the rebind
//! engine (inspector, module unloader, unbinder, binder) plus the
//! orchestrator that sequences them.

mod address;
pub mod bind;
pub mod inspect;
pub mod modules;
pub mod orchestrator;
pub mod sysfs;
pub mod unbind;

pub use address::{PciAddress, MAX_FUNCTION, MAX_SLOT};
pub use bind::Binder;
pub use inspect::{inspect, read_driver, DeviceBindingState, DriverFamily};
pub use modules::{ensure_passthrough_module, unload_monolithic_driver, KernelModules, Modprobe};
pub use orchestrator::{BatchGuards, DeviceReport, RebindReport, Rebinder};
pub use sysfs::{HostSysfs, Sysfs, SysfsLayout};
pub use unbind::unbind;
