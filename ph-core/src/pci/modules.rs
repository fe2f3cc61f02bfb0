//! Kernel module control
//!
//! Loading the pass-through driver module and unloading the monolithic
//! driver stack. Loads and unloads are either *required* (errors propagate)
//! or *best-effort* (errors are logged and discarded); each call site below
//! says which.

use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info, warn};

use crate::config::{MonolithicConfig, PassthroughConfig};
use crate::constants::commands;
use crate::error::{PciHookError, Result};
use crate::pci::orchestrator::BatchGuards;
use crate::pci::sysfs::{Sysfs, SysfsLayout};

/// Kernel module load/unload by name
pub trait KernelModules {
    fn load(&self, module: &str) -> Result<()>;
    fn unload(&self, module: &str) -> Result<()>;
}

/// Module control through `modprobe`
#[derive(Debug, Clone)]
pub struct Modprobe {
    binary: PathBuf,
}

impl Default for Modprobe {
    fn default() -> Self {
        Self { binary: PathBuf::from(commands::MODPROBE) }
    }
}

impl Modprobe {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| PciHookError::CommandFailed {
                command: format!("{} {}", self.binary.display(), args.join(" ")),
                source: e,
            })
    }
}

impl KernelModules for Modprobe {
    fn load(&self, module: &str) -> Result<()> {
        let output = self.run(&[module])?;
        if !output.status.success() {
            return Err(PciHookError::ModuleLoad {
                module: module.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn unload(&self, module: &str) -> Result<()> {
        let output = self.run(&["-r", module])?;
        if !output.status.success() {
            return Err(PciHookError::ModuleUnload {
                module: module.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Make sure the pass-through driver is available, at most once per batch.
///
/// The module load itself is best-effort (modprobe fails harmlessly for
/// built-in drivers); the driver directory appearing in sysfs is what
/// confirms the load, and its absence is fatal.
pub fn ensure_passthrough_module(
    modules: &dyn KernelModules,
    sysfs: &dyn Sysfs,
    layout: &SysfsLayout,
    passthrough: &PassthroughConfig,
    guards: &mut BatchGuards,
) -> Result<()> {
    if guards.pass_through_module_loaded {
        return Ok(());
    }

    let driver_dir = layout.driver_dir(&passthrough.driver);
    if sysfs.exists(&driver_dir) {
        debug!(driver = %passthrough.driver, "Pass-through driver already loaded");
        guards.pass_through_module_loaded = true;
        return Ok(());
    }

    info!(module = %passthrough.module, "Loading pass-through driver module");
    if let Err(e) = modules.load(&passthrough.module) {
        warn!(module = %passthrough.module, error = %e, "Module load reported failure");
    }

    if !sysfs.exists(&driver_dir) {
        return Err(PciHookError::ModuleLoad {
            module: passthrough.module.clone(),
            reason: format!("driver directory {} did not appear", driver_dir.display()),
        });
    }

    guards.pass_through_module_loaded = true;
    Ok(())
}

/// Unload the monolithic driver stack, at most once per batch.
///
/// Dependent modules go first and may already be absent, so their unloads
/// are best-effort. The base module must go, otherwise none of its devices
/// can be claimed.
pub fn unload_monolithic_driver(
    modules: &dyn KernelModules,
    monolithic: &MonolithicConfig,
    guards: &mut BatchGuards,
) -> Result<()> {
    if !guards.monolithic_driver_active {
        debug!(driver = %monolithic.driver, "Monolithic driver already unloaded in this batch");
        return Ok(());
    }

    info!(driver = %monolithic.driver, "Unloading monolithic driver modules");

    for module in &monolithic.dependent_modules {
        match modules.unload(module) {
            Ok(()) => debug!(module = %module, "Unloaded dependent module"),
            Err(e) => debug!(module = %module, error = %e, "Dependent module not unloaded"),
        }
    }

    modules.unload(&monolithic.base_module)?;
    guards.monolithic_driver_active = false;

    info!(module = %monolithic.base_module, "Monolithic driver unloaded");
    Ok(())
}
