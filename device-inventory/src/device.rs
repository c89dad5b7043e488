//! Device descriptors and field validation.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{InventoryError, Result};

/// Family of device, which decides the property map used to poll it.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceClass {
    /// MIoT air purifier (temperature, humidity, AQI, filter life)
    AirPurifier,
    /// MIoT evaporative humidifier (temperature, humidity, target, water tank)
    Humidifier,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::AirPurifier => "air-purifier",
            DeviceClass::Humidifier => "humidifier",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceClass {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "air-purifier" | "air_purifier" | "airpurifier" => Ok(DeviceClass::AirPurifier),
            "humidifier" => Ok(DeviceClass::Humidifier),
            other => Err(InventoryError::UnknownDeviceClass(other.to_string())),
        }
    }
}

/// Device access token. `Debug` and `Display` never print the secret.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for handing to the transport.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// One polled device, as supplied by discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    /// Stable opaque identifier
    pub id: String,
    /// `host` or `host:port` used for every poll
    pub address: String,
    pub credential: Credential,
    pub class: DeviceClass,
    /// Always greater than zero once validated
    pub poll_interval_minutes: u32,
    /// Room the device lives in, if the inventory groups by room
    pub room: Option<String>,
    /// Human-readable label
    pub name: Option<String>,
}

impl DeviceDescriptor {
    /// Build and validate a descriptor.
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        credential: Credential,
        class: DeviceClass,
        poll_interval_minutes: u32,
    ) -> Result<Self> {
        let descriptor = Self {
            id: id.into(),
            address: address.into(),
            credential,
            class,
            poll_interval_minutes,
            room: None,
            name: None,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check every field; the first failure is returned.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| InventoryError::InvalidDevice {
            device_id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("device id must not be empty".to_string()));
        }
        if self.poll_interval_minutes == 0 {
            return Err(invalid(
                "poll_interval_minutes must be a positive integer".to_string(),
            ));
        }
        if self.credential.is_empty() {
            return Err(invalid("credential must not be empty".to_string()));
        }
        validate_address(&self.address).map_err(invalid)?;

        Ok(())
    }

    /// Label for log lines: name if set, otherwise the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Validate a device address.
///
/// Accepts an IP literal, `ip:port`, `[v6]:port`, a hostname, or
/// `hostname:port`. Ports must be non-zero.
pub fn validate_address(address: &str) -> std::result::Result<(), String> {
    let address = address.trim();
    if address.is_empty() {
        return Err("address must not be empty".to_string());
    }

    if address.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    if let Ok(socket) = address.parse::<SocketAddr>() {
        return if socket.port() == 0 {
            Err(format!("address '{}' has port 0", address))
        } else {
            Ok(())
        };
    }

    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (address, None),
    };

    if let Some(port) = port {
        match port.parse::<u16>() {
            Ok(0) | Err(_) => return Err(format!("address '{}' has an invalid port", address)),
            Ok(_) => {}
        }
    }

    if is_valid_hostname(host) {
        Ok(())
    } else {
        Err(format!("address '{}' is not a valid host", address))
    }
}

fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
