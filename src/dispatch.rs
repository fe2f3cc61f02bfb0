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

//! Hook dispatch
//!
//! Resolves the handler for an invocation and runs it against the host
//! backends. Kept apart from `main` so the whole path runs in tests with
//! fake backends.

use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info};

use ph_core::{prepare_guest, Config, HookHandler, HookTable, HostBackends, PciHookError, PrepareSummary, Result};

/// One hook invocation as libvirt describes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub script: String,
    pub guest: String,
    pub action: String,
    pub sub_action: Option<String>,
}

/// What a hook invocation did
#[derive(Debug)]
pub enum HookOutcome {
    /// No route for this (script, guest, action)
    Unrouted,
    /// Routed to the no-op handler
    Ignored,
    /// Devices rebound and networks started
    Prepared(PrepareSummary),
}

impl Invocation {
    pub fn resolve(&self, table: &HookTable) -> Option<HookHandler> {
        table.resolve(&self.script, &self.guest, &self.action)
    }
}

/// Run the handler routed for an invocation.
///
/// The descriptor is only read when a handler needs it; libvirt writes it
/// to stdin for every event regardless.
pub fn run_hook<F>(
    invocation: &Invocation,
    handler: Option<HookHandler>,
    config: &Config,
    host: &HostBackends<'_>,
    read_descriptor: F,
) -> Result<HookOutcome>
where
    F: FnOnce() -> Result<String>,
{
    match handler {
        None => {
            debug!(
                script = %invocation.script,
                guest = %invocation.guest,
                action = %invocation.action,
                "No handler routed"
            );
            Ok(HookOutcome::Unrouted)
        }
        Some(HookHandler::Ignore) => {
            info!(guest = %invocation.guest, action = %invocation.action, "Guest exempted by route");
            Ok(HookOutcome::Ignored)
        }
        Some(HookHandler::Prepare) => {
            let xml = read_descriptor()?;
            let summary = prepare_guest(config, host, &xml)?;
            Ok(HookOutcome::Prepared(summary))
        }
    }
}

/// Read the domain XML from a file, or from stdin when no path is given
pub fn read_descriptor(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) => fs::read_to_string(p).map_err(|e| PciHookError::FileRead {
            path: p.to_path_buf(),
            source: e,
        }),
        None => {
            let mut xml = String::new();
            std::io::stdin().read_to_string(&mut xml)?;
            Ok(xml)
        }
    }
}

/// Host changes need root
pub fn verify_privileges() -> Result<()> {
    // SAFETY: geteuid has no preconditions and cannot fail.
    if unsafe { libc::geteuid() } != 0 {
        return Err(PciHookError::PermissionDenied(
            "rebinding PCI devices requires root".to_string(),
        ));
    }
    Ok(())
}
