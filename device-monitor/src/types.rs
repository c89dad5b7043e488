//! Core types for the device-monitor crate.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MonitorError, Result};

/// Unique identifier for a monitored device.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new device ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the device ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time between the end of one poll cycle and the start of the next.
///
/// Always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PollInterval(Duration);

impl PollInterval {
    /// Interval in whole minutes, which is how devices are configured.
    pub fn from_minutes(minutes: u32) -> Result<Self> {
        if minutes == 0 {
            return Err(MonitorError::Configuration(
                "poll_interval_minutes must be a positive integer".to_string(),
            ));
        }
        Ok(Self(Duration::from_secs(u64::from(minutes) * 60)))
    }

    /// Arbitrary non-zero interval, for sub-minute cadences.
    pub fn from_duration(duration: Duration) -> Result<Self> {
        if duration.is_zero() {
            return Err(MonitorError::Configuration(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self(duration))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        if secs > 0 && secs % 60 == 0 && self.0.subsec_nanos() == 0 {
            write!(f, "{}m", secs / 60)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// A single reading in a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ParameterValue {
    /// Convert a JSON scalar. Arrays, objects and null have no reading.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Parameter name to reading. Ordered so serialized payloads are stable.
pub type Parameters = BTreeMap<String, ParameterValue>;

/// Canonical parameter names shared across device classes.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Parameter {
    Temperature,
    RelativeHumidity,
    AirQualityIndex,
    TargetHumidity,
    WaterShortageFault,
    FilterLifeRemaining,
    Mode,
}

impl Parameter {
    pub const ALL: [Parameter; 7] = [
        Parameter::Temperature,
        Parameter::RelativeHumidity,
        Parameter::AirQualityIndex,
        Parameter::TargetHumidity,
        Parameter::WaterShortageFault,
        Parameter::FilterLifeRemaining,
        Parameter::Mode,
    ];

    /// Key used in [`Parameters`].
    pub fn name(&self) -> &'static str {
        match self {
            Parameter::Temperature => "temperature",
            Parameter::RelativeHumidity => "relative_humidity",
            Parameter::AirQualityIndex => "air_quality_index",
            Parameter::TargetHumidity => "target_humidity",
            Parameter::WaterShortageFault => "water_shortage_fault",
            Parameter::FilterLifeRemaining => "filter_life_remaining",
            Parameter::Mode => "mode",
        }
    }

    /// Column name used by persisting sinks.
    pub fn column_name(&self) -> &'static str {
        match self {
            Parameter::Temperature => "trj__at",
            Parameter::RelativeHumidity => "trj__rh",
            Parameter::AirQualityIndex => "trj__aqi",
            Parameter::TargetHumidity => "trj__target_humidity",
            Parameter::WaterShortageFault => "trj__water_shortage_fault",
            Parameter::FilterLifeRemaining => "trj__filter_life_remaining",
            Parameter::Mode => "trj__mode",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a payload carries `is_error = true`.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Transport,
    Timeout,
    MalformedResponse,
    DeviceError,
    /// The device answered but flagged an internal fault
    DeviceReported,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::Transport => "transport",
            FaultKind::Timeout => "timeout",
            FaultKind::MalformedResponse => "malformed_response",
            FaultKind::DeviceError => "device_error",
            FaultKind::DeviceReported => "device_reported",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
