//! In-memory host for engine tests
//!
//! Simulates the parts of the kernel the rebind engine talks to: device
//! attributes and driver links, the unbind, new_id and bind control files,
//! and module load/unload side effects. Every successful side effect is
//! recorded in an ordered event log.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use crate::constants::{monolithic, passthrough};
use crate::error::{PciHookError, Result};
use crate::pci::modules::KernelModules;
use crate::pci::sysfs::{Sysfs, SysfsLayout};
use crate::pci::PciAddress;

/// A host side effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Load(String),
    Unload(String),
    Write(PathBuf, String),
}

impl Event {
    pub fn is_unbind(&self) -> bool {
        matches!(self, Event::Write(path, _) if path.ends_with("unbind"))
    }

    pub fn is_new_id(&self) -> bool {
        matches!(self, Event::Write(path, _) if path.ends_with("new_id"))
    }

    /// Whether a write targets or carries the given address
    pub fn mentions(&self, address: &str) -> bool {
        match self {
            Event::Write(path, value) => {
                value == address || path.to_string_lossy().contains(address)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct FakeDevice {
    vendor: Option<String>,
    model: Option<String>,
    driver: Option<String>,
}

#[derive(Debug, Default)]
struct HostState {
    devices: BTreeMap<PciAddress, FakeDevice>,
    loaded_drivers: HashSet<String>,
    events: Vec<Event>,
    failing_writes: HashSet<PathBuf>,
    failing_loads: HashSet<String>,
    failing_unloads: HashSet<String>,
    /// (driver, "<vendor> <model>") pairs a driver matches on
    dynamic_ids: HashSet<(String, String)>,
    /// Devices no driver probe succeeds on
    unclaimable: HashSet<PciAddress>,
}

/// Fake sysfs plus kernel module control rooted at /sys
pub struct FakeHost {
    layout: SysfsLayout,
    state: RefCell<HostState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            layout: SysfsLayout::default(),
            state: RefCell::new(HostState::default()),
        }
    }

    /// Start with the pass-through driver already present
    pub fn with_passthrough_loaded(self) -> Self {
        self.state
            .borrow_mut()
            .loaded_drivers
            .insert(passthrough::DRIVER.to_string());
        self
    }

    pub fn add_device(&self, address: &PciAddress, vendor: &str, model: &str, driver: Option<&str>) {
        let mut state = self.state.borrow_mut();
        if let Some(d) = driver {
            state.loaded_drivers.insert(d.to_string());
        }
        state.devices.insert(
            *address,
            FakeDevice {
                vendor: Some(vendor.to_string()),
                model: Some(model.to_string()),
                driver: driver.map(str::to_string),
            },
        );
    }

    /// Make an attribute ("vendor" or "device") unreadable
    pub fn remove_attr(&self, address: &PciAddress, attr: &str) {
        if let Some(device) = self.state.borrow_mut().devices.get_mut(address) {
            match attr {
                "vendor" => device.vendor = None,
                "device" => device.model = None,
                _ => {}
            }
        }
    }

    pub fn fail_write(&self, path: PathBuf) {
        self.state.borrow_mut().failing_writes.insert(path);
    }

    pub fn fail_load(&self, module: &str) {
        self.state.borrow_mut().failing_loads.insert(module.to_string());
    }

    pub fn fail_unload(&self, module: &str) {
        self.state.borrow_mut().failing_unloads.insert(module.to_string());
    }

    /// Pair the driver already matches on, as from an earlier new_id or `ids=`
    pub fn register_ids(&self, driver: &str, vendor: &str, model: &str) {
        self.state
            .borrow_mut()
            .dynamic_ids
            .insert((driver.to_string(), format!("{} {}", vendor, model)));
    }

    /// Make every driver probe of the device fail
    pub fn refuse_probe(&self, address: &PciAddress) {
        self.state.borrow_mut().unclaimable.insert(*address);
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.clone()
    }

    pub fn driver_of(&self, address: &PciAddress) -> Option<String> {
        self.state
            .borrow()
            .devices
            .get(address)
            .and_then(|d| d.driver.clone())
    }

    fn find_device<F>(&self, matches: F) -> Option<(PciAddress, FakeDevice)>
    where
        F: Fn(&PciAddress) -> bool,
    {
        self.state
            .borrow()
            .devices
            .iter()
            .find(|(addr, _)| matches(addr))
            .map(|(addr, dev)| (*addr, dev.clone()))
    }
}

const EEXIST: i32 = 17;

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
}

impl Sysfs for FakeHost {
    fn read_attr(&self, path: &Path) -> io::Result<String> {
        if let Some((_, dev)) = self.find_device(|a| self.layout.vendor_attr(a) == path) {
            return dev.vendor.map(|v| format!("0x{}", v)).ok_or_else(|| not_found(path));
        }
        if let Some((_, dev)) = self.find_device(|a| self.layout.model_attr(a) == path) {
            return dev.model.map(|m| format!("0x{}", m)).ok_or_else(|| not_found(path));
        }
        Err(not_found(path))
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        let (_, dev) = self
            .find_device(|a| self.layout.driver_link(a) == path)
            .ok_or_else(|| not_found(path))?;
        dev.driver
            .map(|d| PathBuf::from("../../../bus/pci/drivers").join(d))
            .ok_or_else(|| not_found(path))
    }

    fn write_attr(&self, path: &Path, value: &str) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.failing_writes.contains(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "write rejected"));
        }

        let drivers: Vec<String> = state.loaded_drivers.iter().cloned().collect();
        for driver in drivers {
            if path == self.layout.unbind_file(&driver) {
                let address: PciAddress = value
                    .parse()
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad address"))?;
                let device = state
                    .devices
                    .get_mut(&address)
                    .filter(|d| d.driver.as_deref() == Some(driver.as_str()))
                    .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such device"))?;
                device.driver = None;
            } else if path == self.layout.new_id_file(&driver) {
                if !state.dynamic_ids.insert((driver.clone(), value.to_string())) {
                    return Err(io::Error::from_raw_os_error(EEXIST));
                }
                let mut ids = value.split_whitespace();
                let (vendor, model) = (ids.next(), ids.next());
                let HostState { devices, unclaimable, .. } = &mut *state;
                for (address, device) in devices.iter_mut() {
                    if device.driver.is_none()
                        && !unclaimable.contains(address)
                        && device.vendor.as_deref() == vendor
                        && device.model.as_deref() == model
                    {
                        device.driver = Some(driver.clone());
                    }
                }
            } else if path == self.layout.bind_file(&driver) {
                let address: PciAddress = value
                    .parse()
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad address"))?;
                if state.unclaimable.contains(&address) {
                    return Err(io::Error::new(io::ErrorKind::Other, "probe failed"));
                }
                let device = state
                    .devices
                    .get_mut(&address)
                    .filter(|d| d.driver.is_none())
                    .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such unbound device"))?;
                device.driver = Some(driver.clone());
            }
        }

        state.events.push(Event::Write(path.to_path_buf(), value.to_string()));
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.state.borrow();
        state.loaded_drivers.iter().any(|d| self.layout.driver_dir(d) == path)
            || state.devices.keys().any(|a| self.layout.device_dir(a) == path)
    }
}

impl KernelModules for FakeHost {
    fn load(&self, module: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.failing_loads.contains(module) {
            return Err(PciHookError::ModuleLoad {
                module: module.to_string(),
                reason: "modprobe: FATAL: Module not found".to_string(),
            });
        }
        state.events.push(Event::Load(module.to_string()));
        if module == passthrough::MODULE {
            state.loaded_drivers.insert(passthrough::DRIVER.to_string());
        }
        Ok(())
    }

    fn unload(&self, module: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.failing_unloads.contains(module) {
            return Err(PciHookError::ModuleUnload {
                module: module.to_string(),
                reason: "modprobe: FATAL: Module is in use".to_string(),
            });
        }
        state.events.push(Event::Unload(module.to_string()));
        if module == monolithic::BASE_MODULE {
            for device in state.devices.values_mut() {
                if device.driver.as_deref() == Some(monolithic::DRIVER) {
                    device.driver = None;
                }
            }
            state.loaded_drivers.remove(monolithic::DRIVER);
        }
        Ok(())
    }
}
