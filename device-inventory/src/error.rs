//! Error types for inventory loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a device inventory.
///
/// Every variant is a configuration error: a device that fails validation is
/// never handed to the monitor.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The inventory file could not be read
    #[error("Failed to read inventory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The inventory file is not valid TOML or has unexpected fields
    #[error("Inventory parse error: {0}")]
    Parse(String),

    /// A device entry failed validation
    #[error("Invalid device '{device_id}': {reason}")]
    InvalidDevice { device_id: String, reason: String },

    /// Two entries share a device id
    #[error("Device id '{0}' appears more than once")]
    DuplicateDevice(String),

    /// Unrecognised device class name
    #[error("Unknown device class: {0}")]
    UnknownDeviceClass(String),
}

impl From<toml::de::Error> for InventoryError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

/// Convenience Result type alias for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
