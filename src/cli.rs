/*
 * This file is part of pcihook.
 *
 * Copyright (C) 2025 pcihook contributors
 *
 * pcihook is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * pcihook is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with pcihook. If not, see <https://www.gnu.org/licenses/>.
 */

//! Command line interface
//!
//! libvirt runs hooks as `<hooks-dir>/<script> <guest> <operation>
//! <sub-operation> <extra>` with the domain XML on stdin.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use clap::Parser;

use ph_core::constants::hooks;

#[derive(Parser, Debug)]
#[command(name = "pcihook")]
#[command(version)]
#[command(about = "libvirt hook that hands PCI devices to vfio-pci before a guest starts")]
#[command(long_about = "pcihook - libvirt pre-start hook for PCI passthrough

Install as /etc/libvirt/hooks/qemu. On the 'prepare' operation it reads the
guest's domain XML from stdin, moves every <hostdev type='pci'> device to
the pass-through driver and starts every virtual network the guest uses.

EXAMPLES:
    qemu win11 prepare begin -                 Invoked by libvirtd
    pcihook --script qemu --descriptor win11.xml win11 prepare begin

ENVIRONMENT VARIABLES:
    PCIHOOK_LOG=debug       Log filter (overrides log_level in the config)
    PCIHOOK_CONFIG=<path>   Configuration file

FILES:
    /etc/pcihook/config.json    Drivers, modules, libvirt URI, extra routes")]
pub struct Cli {
    /// Guest (domain) name
    pub guest: String,

    /// Lifecycle operation, e.g. prepare, start, started, stopped, release
    pub action: String,

    /// Sub-operation, e.g. begin or end
    pub sub_action: Option<String>,

    /// Extra argument passed by libvirt
    pub extra: Option<String>,

    /// Configuration file (default: /etc/pcihook/config.json)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Read the domain XML from a file instead of stdin
    #[arg(long, value_name = "PATH")]
    pub descriptor: Option<PathBuf>,

    /// Routing script name (default: file name this binary was invoked as)
    #[arg(long, value_name = "NAME")]
    pub script: Option<String>,
}

impl Cli {
    /// Script name used for routing.
    ///
    /// libvirt selects hook scripts by file name, so the invoked name is the
    /// script name; running the binary under its own name means "qemu".
    pub fn script_name(&self, argv0: Option<&OsStr>) -> String {
        if let Some(script) = &self.script {
            return script.clone();
        }

        argv0
            .and_then(|a| Path::new(a).file_name())
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| n != env!("CARGO_PKG_NAME"))
            .unwrap_or_else(|| hooks::QEMU_SCRIPT.to_string())
    }
}
