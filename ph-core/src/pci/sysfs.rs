//! Sysfs access for the PCI driver-binding subsystem
//!
//! [`SysfsLayout`] knows where each attribute and control file lives below a
//! sysfs root; [`Sysfs`] performs the reads and writes. The production
//! implementation is [`HostSysfs`], which goes straight to the filesystem.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::constants::{paths, sysfs};
use crate::pci::PciAddress;

/// Read/write access to sysfs attribute files
pub trait Sysfs {
    /// Read an attribute file, trimmed of surrounding whitespace
    fn read_attr(&self, path: &Path) -> io::Result<String>;

    /// Read the target of a symlink
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Write a value to a control file
    fn write_attr(&self, path: &Path, value: &str) -> io::Result<()>;

    /// Whether a path exists
    fn exists(&self, path: &Path) -> bool;
}

/// Sysfs backed by the real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSysfs;

impl Sysfs for HostSysfs {
    fn read_attr(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path).map(|s| s.trim().to_string())
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn write_attr(&self, path: &Path, value: &str) -> io::Result<()> {
        fs::write(path, value)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Paths of the PCI attributes and control files below a sysfs root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsLayout {
    root: PathBuf,
}

impl Default for SysfsLayout {
    fn default() -> Self {
        Self::new(paths::SYSFS_ROOT)
    }
}

impl SysfsLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/bus/pci/devices/<addr>`
    pub fn device_dir(&self, address: &PciAddress) -> PathBuf {
        self.root.join(paths::PCI_DEVICES).join(address.to_string())
    }

    /// `<root>/bus/pci/devices/<addr>/driver`
    pub fn driver_link(&self, address: &PciAddress) -> PathBuf {
        self.device_dir(address).join(sysfs::DRIVER_LINK)
    }

    pub fn vendor_attr(&self, address: &PciAddress) -> PathBuf {
        self.device_dir(address).join(sysfs::VENDOR)
    }

    pub fn model_attr(&self, address: &PciAddress) -> PathBuf {
        self.device_dir(address).join(sysfs::DEVICE)
    }

    /// `<root>/bus/pci/drivers/<driver>`
    pub fn driver_dir(&self, driver: &str) -> PathBuf {
        self.root.join(paths::PCI_DRIVERS).join(driver)
    }

    pub fn unbind_file(&self, driver: &str) -> PathBuf {
        self.driver_dir(driver).join(sysfs::UNBIND)
    }

    pub fn new_id_file(&self, driver: &str) -> PathBuf {
        self.driver_dir(driver).join(sysfs::NEW_ID)
    }

    pub fn bind_file(&self, driver: &str) -> PathBuf {
        self.driver_dir(driver).join(sysfs::BIND)
    }
}
