//! Static device inventory
//!
//! The monitor does not discover devices itself. This crate loads the list of
//! devices to poll, once, from a TOML file and validates every entry before
//! anything is started.
//!
//! # File format
//!
//! ```toml
//! [defaults]
//! poll_interval_minutes = 5
//!
//! [[device]]
//! id = "ap-1"
//! address = "192.168.1.66"
//! token = "6f1f001e582df060"
//! class = "air-purifier"
//! room = "living-room"
//!
//! [[device]]
//! id = "hum-1"
//! address = "192.168.1.63"
//! token = "5aa0046065ab93e4"
//! class = "humidifier"
//! poll_interval_minutes = 1
//! ```

mod error;
pub mod device;

pub use device::{validate_address, Credential, DeviceClass, DeviceDescriptor};
pub use error::{InventoryError, Result};

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InventoryFile {
    #[serde(default)]
    defaults: Defaults,
    #[serde(default, rename = "device")]
    devices: Vec<DeviceEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Defaults {
    poll_interval_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceEntry {
    id: String,
    address: String,
    token: Credential,
    class: String,
    poll_interval_minutes: Option<u32>,
    room: Option<String>,
    name: Option<String>,
}

/// Validated, ordered list of devices.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    devices: Vec<DeviceDescriptor>,
}

impl Inventory {
    /// Build an inventory from descriptors, rejecting duplicates and invalid entries.
    pub fn new(devices: Vec<DeviceDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for device in &devices {
            device.validate()?;
            if !seen.insert(device.id.as_str()) {
                return Err(InventoryError::DuplicateDevice(device.id.clone()));
            }
        }
        Ok(Self { devices })
    }

    /// Read and validate an inventory file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| InventoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let inventory = Self::from_toml_str(&text)?;
        tracing::debug!(
            path = %path.display(),
            devices = inventory.len(),
            "loaded device inventory"
        );
        Ok(inventory)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: InventoryFile = toml::from_str(text)?;
        let default_interval = file.defaults.poll_interval_minutes;

        let devices = file
            .devices
            .into_iter()
            .map(|entry| -> Result<DeviceDescriptor> {
                let interval = entry
                    .poll_interval_minutes
                    .or(default_interval)
                    .ok_or_else(|| InventoryError::InvalidDevice {
                        device_id: entry.id.clone(),
                        reason: "poll_interval_minutes is not set and there is no default"
                            .to_string(),
                    })?;
                let class: DeviceClass = entry.class.parse()?;

                Ok(DeviceDescriptor {
                    id: entry.id,
                    address: entry.address,
                    credential: entry.token,
                    class,
                    poll_interval_minutes: interval,
                    room: entry.room,
                    name: entry.name,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(devices)
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    pub fn get(&self, id: &str) -> Option<&DeviceDescriptor> {
        self.devices.iter().find(|device| device.id == id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Devices grouped by room, in first-seen order. Unassigned devices use `None`.
    pub fn by_room(&self) -> Vec<(Option<&str>, Vec<&DeviceDescriptor>)> {
        let mut rooms: Vec<(Option<&str>, Vec<&DeviceDescriptor>)> = Vec::new();
        for device in &self.devices {
            let room = device.room.as_deref();
            match rooms.iter_mut().find(|(r, _)| *r == room) {
                Some((_, members)) => members.push(device),
                None => rooms.push((room, vec![device])),
            }
        }
        rooms
    }
}

impl IntoIterator for Inventory {
    type Item = DeviceDescriptor;
    type IntoIter = std::vec::IntoIter<DeviceDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.into_iter()
    }
}
