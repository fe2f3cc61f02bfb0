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

//! pcihook - libvirt pre-start hook for PCI passthrough
//!
//! Exit status is the only output contract: non-zero makes libvirt refuse
//! to start the guest.

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use pcihook::cli::Cli;
use pcihook::dispatch::{read_descriptor, run_hook, verify_privileges, HookOutcome, Invocation};
use pcihook::logging::{init_logging, LogTarget};

use ph_core::constants::logging;
use ph_core::{Config, HookHandler, HookTable, HostBackends, HostSysfs, Modprobe, Virsh};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn run(cli: &Cli, config: &Config, target: LogTarget) -> anyhow::Result<()> {
    let invocation = Invocation {
        script: cli.script_name(std::env::args_os().next().as_deref()),
        guest: cli.guest.clone(),
        action: cli.action.clone(),
        sub_action: cli.sub_action.clone(),
    };

    info!(
        version = VERSION,
        script = %invocation.script,
        guest = %invocation.guest,
        action = %invocation.action,
        sub_action = ?invocation.sub_action,
        log_target = ?target,
        "Hook invoked"
    );

    let table = HookTable::from_routes(&config.routes);
    let handler = invocation.resolve(&table);

    if handler == Some(HookHandler::Prepare) {
        verify_privileges()?;
    }

    let sysfs = HostSysfs;
    let modules = Modprobe::default();
    let virt = Virsh::new(&config.virsh);
    let host = HostBackends { sysfs: &sysfs, modules: &modules, virt: &virt };

    let outcome = run_hook(&invocation, handler, config, &host, || {
        read_descriptor(cli.descriptor.as_deref())
    })
    .with_context(|| format!("{} hook for guest {}", invocation.action, invocation.guest))?;

    if let HookOutcome::Prepared(summary) = outcome {
        info!(
            guest = ?summary.guest,
            devices = summary.rebind.devices.len(),
            networks_started = ?summary.networks_started,
            "Hook finished"
        );
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_logging(logging::DEFAULT_LEVEL);
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    let target = init_logging(&config.log_level);

    if let Err(e) = run(&cli, &config, target) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
