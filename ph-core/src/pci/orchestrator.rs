//! Rebind orchestration
//!
//! Moves a batch of devices from whatever driver owns them to the
//! pass-through driver.
//!
//! # Phases
//!
//! 1. **Classify** every device (fresh read per device). Devices already on
//!    the pass-through driver are recorded and left alone: repeated
//!    bind/unbind cycles destabilise this class of hardware.
//! 2. **Load** the pass-through module once, if anything needs binding.
//! 3. **Detach** every remaining device in batch order. The monolithic
//!    driver stack is unloaded on the first monolithic device and never
//!    again in the same batch.
//! 4. **Bind** every remaining device in batch order, with the vendor/model
//!    pair captured in phase 1.
//! 5. **Verify** every bound device by reading its driver link again; the
//!    report carries what sysfs shows, not what was requested.
//!
//! All detaches finish before the first bind. Any error aborts the batch;
//! there is no partial-success mode.

use std::collections::HashSet;
use std::io;

use tracing::{debug, info};

use crate::config::{Config, MonolithicConfig, PassthroughConfig};
use crate::error::{PciHookError, Result};
use crate::pci::bind::Binder;
use crate::pci::inspect::{inspect, read_driver, DeviceBindingState, DriverFamily};
use crate::pci::modules::{ensure_passthrough_module, unload_monolithic_driver, KernelModules};
use crate::pci::sysfs::{Sysfs, SysfsLayout};
use crate::pci::unbind::unbind;
use crate::pci::PciAddress;

/// Batch-scoped guard state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchGuards {
    /// Set once the pass-through driver is confirmed present
    pub pass_through_module_loaded: bool,
    /// Cleared once the monolithic driver stack has been unloaded
    pub monolithic_driver_active: bool,
    /// `"<vendor> <model>"` pairs the pass-through driver is known to hold
    pub registered_ids: HashSet<String>,
}

impl BatchGuards {
    pub fn new() -> Self {
        Self {
            pass_through_module_loaded: false,
            monolithic_driver_active: true,
            registered_ids: HashSet::new(),
        }
    }
}

impl Default for BatchGuards {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReport {
    pub family: DriverFamily,
    /// State read during classification, before any mutation
    pub initial: DeviceBindingState,
    /// State read back from sysfs at the end of the batch
    pub final_state: DeviceBindingState,
}

impl DeviceReport {
    /// Whether the batch issued any detach or bind for this device
    pub fn was_rebound(&self) -> bool {
        self.family.needs_binding()
    }
}

/// Result of one batch, in batch order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebindReport {
    pub devices: Vec<DeviceReport>,
    /// Guard values at the end of the batch
    pub guards: BatchGuards,
}

impl RebindReport {
    /// Final state of a device, if it was part of the batch
    pub fn get(&self, address: &PciAddress) -> Option<&DeviceBindingState> {
        self.devices
            .iter()
            .find(|d| d.final_state.address == *address)
            .map(|d| &d.final_state)
    }

    /// Number of devices claimed in this batch
    pub fn rebound_count(&self) -> usize {
        self.devices.iter().filter(|d| d.was_rebound()).count()
    }
}

/// A classified device waiting for detach and bind
struct PendingDevice {
    state: DeviceBindingState,
    family: DriverFamily,
}

/// Drives the Inspector, Module Unloader, Unbinder and Binder for a batch
pub struct Rebinder<'a> {
    sysfs: &'a dyn Sysfs,
    modules: &'a dyn KernelModules,
    layout: SysfsLayout,
    passthrough: &'a PassthroughConfig,
    monolithic: &'a MonolithicConfig,
}

impl<'a> Rebinder<'a> {
    pub fn new(config: &'a Config, sysfs: &'a dyn Sysfs, modules: &'a dyn KernelModules) -> Self {
        Self {
            sysfs,
            modules,
            layout: SysfsLayout::new(&config.sysfs_root),
            passthrough: &config.passthrough,
            monolithic: &config.monolithic,
        }
    }

    /// Rebind every device of the batch to the pass-through driver
    pub fn rebind(&self, batch: &[PciAddress]) -> Result<RebindReport> {
        let mut guards = BatchGuards::new();

        let mut seen = HashSet::new();
        let batch: Vec<PciAddress> = batch.iter().copied().filter(|a| seen.insert(*a)).collect();

        info!(devices = batch.len(), "Starting rebind batch");

        // Phase 1: classify
        let mut pending = Vec::with_capacity(batch.len());
        for address in &batch {
            pending.push(self.classify(address)?);
        }

        let needs_binding: Vec<&PendingDevice> =
            pending.iter().filter(|d| d.family.needs_binding()).collect();

        // Phase 2: pass-through module
        if !needs_binding.is_empty() {
            ensure_passthrough_module(
                self.modules,
                self.sysfs,
                &self.layout,
                self.passthrough,
                &mut guards,
            )?;
        }

        // Phase 3: detach
        for device in &needs_binding {
            match device.family {
                DriverFamily::Unbound => {
                    debug!(address = %device.state.address, "Device unbound, nothing to detach");
                }
                DriverFamily::Monolithic => {
                    unload_monolithic_driver(self.modules, self.monolithic, &mut guards)?;
                }
                DriverFamily::Unbindable => {
                    if let Some(driver) = &device.state.current_driver {
                        unbind(self.sysfs, &self.layout, &device.state.address, driver)?;
                    }
                }
                DriverFamily::AlreadyTarget => {}
            }
        }

        // Phase 4: bind
        let binder = Binder {
            sysfs: self.sysfs,
            modules: self.modules,
            layout: &self.layout,
            passthrough: self.passthrough,
        };
        for device in &needs_binding {
            binder.bind(&mut guards, &device.state)?;
        }

        // Phase 5: verify
        let mut devices = Vec::with_capacity(pending.len());
        for device in pending {
            devices.push(self.report(device)?);
        }
        for device in &devices {
            info!(
                address = %device.initial.address,
                family = %device.family,
                previous_driver = ?device.initial.current_driver,
                driver = ?device.final_state.current_driver,
                "Device rebind complete"
            );
        }

        Ok(RebindReport { devices, guards })
    }

    fn classify(&self, address: &PciAddress) -> Result<PendingDevice> {
        let state = inspect(self.sysfs, &self.layout, address)?;
        let family = DriverFamily::classify(
            state.current_driver.as_deref(),
            &self.passthrough.driver,
            &self.monolithic.driver,
        );

        debug!(address = %address, family = %family, "Classified device");

        if family == DriverFamily::AlreadyTarget {
            info!(address = %address, driver = %self.passthrough.driver, "Device already bound to pass-through driver");
        }

        Ok(PendingDevice { state, family })
    }

    /// Confirm a bound device ended up on the pass-through driver
    fn report(&self, device: PendingDevice) -> Result<DeviceReport> {
        if !device.family.needs_binding() {
            return Ok(DeviceReport {
                family: device.family,
                final_state: device.state.clone(),
                initial: device.state,
            });
        }

        let address = &device.state.address;
        let current_driver = match read_driver(self.sysfs, &self.layout, address) {
            Ok(driver) => Some(driver),
            Err(e) if e.is_recoverable() => None,
            Err(e) => return Err(e),
        };

        if current_driver.as_deref() != Some(self.passthrough.driver.as_str()) {
            let held_by = current_driver.as_deref().unwrap_or("no driver");
            return Err(PciHookError::Bind {
                address: address.to_string(),
                ids: device.state.id_pair(),
                path: self.layout.driver_link(address),
                source: io::Error::new(
                    io::ErrorKind::Other,
                    format!("device not claimed by {}, held by {}", self.passthrough.driver, held_by),
                ),
            });
        }

        Ok(DeviceReport {
            family: device.family,
            final_state: DeviceBindingState {
                current_driver,
                ..device.state.clone()
            },
            initial: device.state,
        })
    }
}
