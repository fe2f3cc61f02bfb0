//! Constants and configuration defaults for pcihook
//!
//! Centralizes sysfs layout, driver and module names, and environment
//! variables. Configuration defaults in `config.rs` are built from these.

/// System paths
pub mod paths {
    /// Default sysfs mount point
    pub const SYSFS_ROOT: &str = "/sys";

    /// PCI device directories, relative to the sysfs root
    pub const PCI_DEVICES: &str = "bus/pci/devices";

    /// PCI driver directories, relative to the sysfs root
    pub const PCI_DRIVERS: &str = "bus/pci/drivers";

    /// Configuration directory
    pub const CONFIG_DIR: &str = "/etc/pcihook";

    /// Configuration file inside CONFIG_DIR
    pub const CONFIG_FILE: &str = "config.json";

    /// journald socket; its presence selects journald logging
    pub const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";
}

/// Per-device and per-driver sysfs attribute names
pub mod sysfs {
    /// Symlink to the bound driver
    pub const DRIVER_LINK: &str = "driver";
    /// Vendor ID attribute ("0x10de")
    pub const VENDOR: &str = "vendor";
    /// Device (model) ID attribute ("0x1eb8")
    pub const DEVICE: &str = "device";
    /// Driver-wide unbind control file
    pub const UNBIND: &str = "unbind";
    /// Driver-wide dynamic ID registration file
    pub const NEW_ID: &str = "new_id";
    /// Driver-wide bind control file (takes a device address)
    pub const BIND: &str = "bind";
}

/// Pass-through driver defaults
pub mod passthrough {
    /// Driver name as it appears under bus/pci/drivers
    pub const DRIVER: &str = "vfio-pci";
    /// Kernel module providing the driver
    pub const MODULE: &str = "vfio-pci";
}

/// Monolithic driver family defaults (NVIDIA proprietary stack)
///
/// The nvidia driver holds the VGA arbiter for every GPU it controls, so a
/// single device cannot be released without unloading the whole stack.
pub mod monolithic {
    /// Driver name as it appears under bus/pci/drivers
    pub const DRIVER: &str = "nvidia";

    /// Modules depending on the base module, in unload order
    pub const DEPENDENT_MODULES: &[&str] = &["nvidia_drm", "nvidia_modeset", "nvidia_uvm"];

    /// Base module, unloaded last
    pub const BASE_MODULE: &str = "nvidia";
}

/// External commands
pub mod commands {
    /// Kernel module loader
    pub const MODPROBE: &str = "modprobe";
    /// libvirt command-line client
    pub const VIRSH: &str = "virsh";
    /// Default libvirt connection URI
    pub const VIRSH_URI: &str = "qemu:///system";
}

/// Hook routing defaults
pub mod hooks {
    /// libvirt names the QEMU driver hook script "qemu"
    pub const QEMU_SCRIPT: &str = "qemu";
    /// Operation libvirt runs before any guest resources are allocated
    pub const PREPARE_ACTION: &str = "prepare";
}

/// Environment variables
pub mod env {
    /// Overrides the configuration file path
    pub const CONFIG: &str = "PCIHOOK_CONFIG";
    /// tracing EnvFilter directive, e.g. "debug" or "ph_core=trace"
    pub const LOG: &str = "PCIHOOK_LOG";
}

/// Logging defaults
pub mod logging {
    pub const DEFAULT_LEVEL: &str = "info";
}
