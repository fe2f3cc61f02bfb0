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

//! Logging setup
//!
//! libvirtd captures hook output, but journald keeps it searchable, so the
//! journal is preferred when it is reachable. stdout is never written.

use std::path::Path;

use ph_core::constants::{env, paths};

/// Where log records end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Journald,
    Stderr,
}

/// Filter directive: $PCIHOOK_LOG wins over the configured level
pub fn log_filter(configured: &str) -> String {
    std::env::var(env::LOG).unwrap_or_else(|_| configured.to_string())
}

/// Install the global tracing subscriber
pub fn init_logging(configured_level: &str) -> LogTarget {
    use tracing_subscriber::prelude::*;

    let filter = log_filter(configured_level);

    if Path::new(paths::JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&filter))
                    .init();
                return LogTarget::Journald;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stderr", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_env_filter(&filter)
        .init();
    LogTarget::Stderr
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_overrides_configured_level() {
        std::env::remove_var(env::LOG);
        assert_eq!(log_filter("info"), "info");

        std::env::set_var(env::LOG, "ph_core=trace");
        assert_eq!(log_filter("info"), "ph_core=trace");
        std::env::remove_var(env::LOG);
    }
}
