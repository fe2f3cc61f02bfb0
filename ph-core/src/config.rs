//! Hook configuration
//!
//! Loaded from `/etc/pcihook/config.json` (or `$PCIHOOK_CONFIG`, or an
//! explicit path). Every field has a default, so an empty object or a
//! missing default file yields a working configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::{commands, env, hooks, logging, monolithic, passthrough, paths};
use crate::error::{PciHookError, Result};
use crate::hooks::HookHandler;

/// Pass-through driver settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassthroughConfig {
    /// Driver name under bus/pci/drivers
    pub driver: String,
    /// Kernel module providing the driver
    pub module: String,
}

impl Default for PassthroughConfig {
    fn default() -> Self {
        Self {
            driver: passthrough::DRIVER.to_string(),
            module: passthrough::MODULE.to_string(),
        }
    }
}

/// Monolithic driver family settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonolithicConfig {
    /// Driver name under bus/pci/drivers
    pub driver: String,
    /// Modules unloaded best-effort before the base module, in order
    pub dependent_modules: Vec<String>,
    /// Module whose unload releases the devices
    pub base_module: String,
}

impl Default for MonolithicConfig {
    fn default() -> Self {
        Self {
            driver: monolithic::DRIVER.to_string(),
            dependent_modules: monolithic::DEPENDENT_MODULES
                .iter()
                .map(|m| m.to_string())
                .collect(),
            base_module: monolithic::BASE_MODULE.to_string(),
        }
    }
}

/// libvirt client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirshConfig {
    pub binary: PathBuf,
    pub uri: String,
}

impl Default for VirshConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(commands::VIRSH),
            uri: commands::VIRSH_URI.to_string(),
        }
    }
}

/// Extra hook route; overrides a default route with the same key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default = "default_script")]
    pub script: String,
    /// None routes every guest
    #[serde(default)]
    pub guest: Option<String>,
    pub action: String,
    pub handler: HookHandler,
}

fn default_script() -> String {
    hooks::QEMU_SCRIPT.to_string()
}

/// Complete hook configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sysfs_root: PathBuf,
    pub passthrough: PassthroughConfig,
    pub monolithic: MonolithicConfig,
    pub virsh: VirshConfig,
    pub routes: Vec<RouteConfig>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from(paths::SYSFS_ROOT),
            passthrough: PassthroughConfig::default(),
            monolithic: MonolithicConfig::default(),
            virsh: VirshConfig::default(),
            routes: Vec::new(),
            log_level: logging::DEFAULT_LEVEL.to_string(),
        }
    }
}

/// Default configuration file path, honouring $PCIHOOK_CONFIG
pub fn default_config_path() -> PathBuf {
    std::env::var_os(env::CONFIG)
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(paths::CONFIG_DIR).join(paths::CONFIG_FILE))
}

impl Config {
    /// Parse and validate a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default path is used and
    /// a missing file means built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let p = default_config_path();
                if !p.exists() {
                    debug!(path = ?p, "No configuration file, using defaults");
                    return Ok(Self::default());
                }
                p
            }
        };

        let content = fs::read_to_string(&path).map_err(|e| PciHookError::FileRead {
            path: path.clone(),
            source: e,
        })?;
        let config = Self::from_json(&content)?;

        info!(path = ?path, routes = config.routes.len(), "Loaded configuration");
        Ok(config)
    }

    /// Check names and paths before they reach sysfs or modprobe
    pub fn validate(&self) -> Result<()> {
        if !self.sysfs_root.is_absolute() {
            return Err(PciHookError::invalid_config(
                "sysfs_root",
                format!("{} is not an absolute path", self.sysfs_root.display()),
            ));
        }

        validate_name("passthrough.driver", &self.passthrough.driver)?;
        validate_name("passthrough.module", &self.passthrough.module)?;
        validate_name("monolithic.driver", &self.monolithic.driver)?;
        validate_name("monolithic.base_module", &self.monolithic.base_module)?;
        for module in &self.monolithic.dependent_modules {
            validate_name("monolithic.dependent_modules", module)?;
        }

        if self.passthrough.driver == self.monolithic.driver {
            return Err(PciHookError::invalid_config(
                "monolithic.driver",
                "must differ from passthrough.driver",
            ));
        }

        if self.virsh.uri.trim().is_empty() {
            return Err(PciHookError::invalid_config("virsh.uri", "must not be empty"));
        }

        for route in &self.routes {
            validate_name("routes.script", &route.script)?;
            validate_name("routes.action", &route.action)?;
            if let Some(guest) = &route.guest {
                if guest.trim().is_empty() {
                    return Err(PciHookError::invalid_config("routes.guest", "must not be empty"));
                }
            }
        }

        Ok(())
    }
}

/// Driver, module and action names: non-empty, `[A-Za-z0-9_-]` only
fn validate_name(field: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PciHookError::invalid_config(field, "must not be empty"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(PciHookError::invalid_config(
            field,
            format!("'{}' contains invalid characters", name),
        ));
    }
    Ok(())
}
