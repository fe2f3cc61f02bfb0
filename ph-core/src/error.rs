//! Error types re-exported from ph-error

pub use ph_error::{PciHookError, Result};
