//! Hook routing
//!
//! libvirt runs `<hooks-dir>/<script> <guest> <action> ...` for every
//! lifecycle event. The routing table maps `(script, guest, action)` to a
//! handler; a guest-specific entry wins over the wildcard entry for the same
//! script and action. Unrouted events do nothing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RouteConfig;
use crate::constants::hooks;

/// What runs for a routed event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookHandler {
    /// Rebind the guest's PCI devices and start its networks
    Prepare,
    /// Do nothing; exempts a guest from a wildcard route
    Ignore,
}

impl std::fmt::Display for HookHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookHandler::Prepare => write!(f, "prepare"),
            HookHandler::Ignore => write!(f, "ignore"),
        }
    }
}

/// Routing key; `guest: None` matches every guest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HookKey {
    pub script: String,
    pub guest: Option<String>,
    pub action: String,
}

impl HookKey {
    pub fn new(script: &str, guest: Option<&str>, action: &str) -> Self {
        Self {
            script: script.to_string(),
            guest: guest.map(str::to_string),
            action: action.to_string(),
        }
    }
}

/// Registration table from routing key to handler
#[derive(Debug, Clone, Default)]
pub struct HookTable {
    routes: HashMap<HookKey, HookHandler>,
}

impl HookTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the built-in route: prepare every QEMU guest
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.register(
            HookKey::new(hooks::QEMU_SCRIPT, None, hooks::PREPARE_ACTION),
            HookHandler::Prepare,
        );
        table
    }

    /// Built-in routes overridden by configured ones
    pub fn from_routes(routes: &[RouteConfig]) -> Self {
        let mut table = Self::with_defaults();
        for route in routes {
            table.register(
                HookKey::new(&route.script, route.guest.as_deref(), &route.action),
                route.handler,
            );
        }
        table
    }

    /// Register a handler, replacing any previous one for the same key
    pub fn register(&mut self, key: HookKey, handler: HookHandler) {
        self.routes.insert(key, handler);
    }

    /// Find the handler for an event: guest-specific key first, then wildcard
    pub fn resolve(&self, script: &str, guest: &str, action: &str) -> Option<HookHandler> {
        let specific = HookKey::new(script, Some(guest), action);
        if let Some(handler) = self.routes.get(&specific) {
            debug!(script, guest, action, handler = %handler, "Matched guest route");
            return Some(*handler);
        }

        let wildcard = HookKey::new(script, None, action);
        let handler = self.routes.get(&wildcard).copied();
        debug!(script, guest, action, handler = ?handler, "Resolved wildcard route");
        handler
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
