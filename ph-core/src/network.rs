//! Virtual network activation
//!
//! A guest attached to an inactive libvirt network fails to start, so every
//! network named in the descriptor is started here if it is not running.

use std::path::PathBuf;
use std::process::{Command, Output};

use tracing::{debug, info};

use crate::config::VirshConfig;
use crate::error::{PciHookError, Result};

/// Virtualization control plane operations on named networks
#[cfg_attr(test, mockall::automock)]
pub trait VirtControl {
    fn is_network_active(&self, name: &str) -> Result<bool>;
    fn start_network(&self, name: &str) -> Result<()>;
}

/// libvirt control plane reached through `virsh`
#[derive(Debug, Clone)]
pub struct Virsh {
    binary: PathBuf,
    uri: String,
}

impl Virsh {
    pub fn new(config: &VirshConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            uri: config.uri.clone(),
        }
    }

    fn run(&self, network: &str, subcommand: &str) -> Result<Output> {
        let output = Command::new(&self.binary)
            .args(["-c", &self.uri, subcommand, network])
            .output()
            .map_err(|e| PciHookError::CommandFailed {
                command: format!("{} {} {}", self.binary.display(), subcommand, network),
                source: e,
            })?;

        if !output.status.success() {
            return Err(PciHookError::network(
                network,
                format!(
                    "{} failed: {}",
                    subcommand,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(output)
    }
}

impl VirtControl for Virsh {
    fn is_network_active(&self, name: &str) -> Result<bool> {
        let output = self.run(name, "net-info")?;
        parse_net_info_active(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| PciHookError::network(name, "net-info output has no Active field"))
    }

    fn start_network(&self, name: &str) -> Result<()> {
        self.run(name, "net-start").map(|_| ())
    }
}

/// Read the `Active:` line of `virsh net-info` output
fn parse_net_info_active(output: &str) -> Option<bool> {
    output.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() != "Active" {
            return None;
        }
        match value.trim() {
            "yes" => Some(true),
            "no" => Some(false),
            _ => None,
        }
    })
}

/// Start every inactive network, in order. Returns the names started.
pub fn activate_networks(control: &dyn VirtControl, networks: &[String]) -> Result<Vec<String>> {
    let mut started = Vec::new();

    for network in networks {
        if control.is_network_active(network)? {
            debug!(network = %network, "Network already active");
            continue;
        }

        info!(network = %network, "Starting network");
        control.start_network(network)?;
        started.push(network.clone());
    }

    Ok(started)
}
