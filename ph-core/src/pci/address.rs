//! PCI device addresses
//!
//! A device is identified by its (domain, bus, slot, function) tuple and
//! rendered in the canonical sysfs form `DDDD:BB:SS.F`.

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{PciHookError, Result};

lazy_static! {
    static ref PCI_ADDRESS_REGEX: Regex =
        Regex::new(r"^([0-9a-fA-F]{4}):([0-9a-fA-F]{2}):([0-9a-fA-F]{2})\.([0-7])$")
            .expect("PCI address regex is valid");
}

/// Highest slot number on a PCI bus (5 bits)
pub const MAX_SLOT: u8 = 0x1f;

/// Highest function number on a PCI device (3 bits)
pub const MAX_FUNCTION: u8 = 0x07;

/// PCI device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PciAddress {
    pub domain: u16,
    pub bus: u8,
    pub slot: u8,
    pub function: u8,
}

impl PciAddress {
    /// Build an address, rejecting out-of-range slot or function numbers
    pub fn new(domain: u16, bus: u8, slot: u8, function: u8) -> Result<Self> {
        if slot > MAX_SLOT {
            return Err(PciHookError::InvalidAddress(format!(
                "slot {:#x} exceeds {:#x}",
                slot, MAX_SLOT
            )));
        }
        if function > MAX_FUNCTION {
            return Err(PciHookError::InvalidAddress(format!(
                "function {:#x} exceeds {:#x}",
                function, MAX_FUNCTION
            )));
        }
        Ok(Self { domain, bus, slot, function })
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.slot, self.function
        )
    }
}

impl FromStr for PciAddress {
    type Err = PciHookError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = PCI_ADDRESS_REGEX.captures(s.trim()).ok_or_else(|| {
            PciHookError::InvalidAddress(format!("{} (expected: 0000:01:00.0)", s))
        })?;

        // The regex guarantees the digit counts, so radix parsing cannot overflow.
        let field = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();
        let domain = u16::from_str_radix(field(1), 16)
            .map_err(|e| PciHookError::InvalidAddress(format!("{}: {}", s, e)))?;
        let bus = u8::from_str_radix(field(2), 16)
            .map_err(|e| PciHookError::InvalidAddress(format!("{}: {}", s, e)))?;
        let slot = u8::from_str_radix(field(3), 16)
            .map_err(|e| PciHookError::InvalidAddress(format!("{}: {}", s, e)))?;
        let function = u8::from_str_radix(field(4), 16)
            .map_err(|e| PciHookError::InvalidAddress(format!("{}: {}", s, e)))?;

        Self::new(domain, bus, slot, function)
    }
}
