//! Unified error handling for pcihook
//!
//! One error type for the rebind engine, the descriptor extractor, network
//! activation and configuration. Every variant except [`PciHookError::NotBound`]
//! is fatal to a hook invocation.

use std::io;
use std::path::PathBuf;

/// Result type alias using PciHookError
pub type Result<T> = std::result::Result<T, PciHookError>;

/// Unified error type for all pcihook operations
#[derive(thiserror::Error, Debug)]
pub enum PciHookError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to execute {command}: {source}")]
    CommandFailed {
        command: String,
        source: io::Error,
    },

    // ============================================================================
    // Device Rebinding Errors
    // ============================================================================
    #[error("Invalid PCI address: {0}")]
    InvalidAddress(String),

    #[error("Failed to read device {address} attribute {path}: {source}")]
    DeviceRead {
        address: String,
        path: PathBuf,
        source: io::Error,
    },

    /// Device has no driver link. Recovered by the inspector as "unbound".
    #[error("Device {address} is not bound to any driver")]
    NotBound {
        address: String,
    },

    #[error("Failed to load kernel module {module}: {reason}")]
    ModuleLoad {
        module: String,
        reason: String,
    },

    #[error("Failed to unload kernel module {module}: {reason}")]
    ModuleUnload {
        module: String,
        reason: String,
    },

    #[error("Failed to unbind {address} from {driver} via {path}: {source}")]
    Unbind {
        address: String,
        driver: String,
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to bind {address} ({ids}) via {path}: {source}")]
    Bind {
        address: String,
        ids: String,
        path: PathBuf,
        source: io::Error,
    },

    // ============================================================================
    // Collaborator Errors
    // ============================================================================
    #[error("Invalid guest descriptor: {0}")]
    Descriptor(String),

    #[error("Network {network}: {reason}")]
    Network {
        network: String,
        reason: String,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

impl PciHookError {
    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid configuration value error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a descriptor error from a string
    pub fn descriptor(msg: impl Into<String>) -> Self {
        Self::Descriptor(msg.into())
    }

    /// Create a network error
    pub fn network(network: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            network: network.into(),
            reason: reason.into(),
        }
    }

    /// True for errors the inspector recovers from locally
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotBound { .. })
    }
}
