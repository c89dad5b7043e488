//! Normalized poll results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapter::DeviceState;
use crate::error::Fault;
use crate::types::{DeviceId, FaultKind, Parameter, ParameterValue, Parameters};

/// The normalized record produced by exactly one poll cycle.
///
/// Fields are private and there are no setters: a payload never changes after
/// the worker builds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicePayload {
    device_id: DeviceId,
    device_address: String,
    timestamp: DateTime<Utc>,
    is_error: bool,
    is_on: bool,
    parameters: Parameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fault: Option<FaultKind>,
}

impl DevicePayload {
    /// Payload for a completed exchange. A device-reported fault still yields
    /// `is_error = true` but keeps the legible parameters.
    pub fn from_state(
        device_id: DeviceId,
        device_address: impl Into<String>,
        state: &DeviceState,
        parameters: Parameters,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id,
            device_address: device_address.into(),
            timestamp,
            is_error: state.reports_fault,
            is_on: state.on,
            parameters,
            fault: state.reports_fault.then_some(FaultKind::DeviceReported),
        }
    }

    /// Payload for a failed exchange: no parameters, `is_on` false.
    pub fn from_fault(
        device_id: DeviceId,
        device_address: impl Into<String>,
        fault: &Fault,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id,
            device_address: device_address.into(),
            timestamp,
            is_error: true,
            is_on: false,
            parameters: Parameters::new(),
            fault: Some(fault.kind()),
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn device_address(&self) -> &str {
        &self.device_address
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// Last known power state. Only meaningful when `is_error()` is false.
    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameter(&self, parameter: Parameter) -> Option<&ParameterValue> {
        self.parameters.get(parameter.name())
    }

    pub fn fault(&self) -> Option<FaultKind> {
        self.fault
    }

    /// Parameters keyed by storage column name. Names outside the canonical
    /// set are prefixed the same way.
    pub fn storage_columns(&self) -> Vec<(String, &ParameterValue)> {
        self.parameters
            .iter()
            .map(|(name, value)| {
                let column = Parameter::from_name(name)
                    .map(|p| p.column_name().to_string())
                    .unwrap_or_else(|| format!("trj__{}", name));
                (column, value)
            })
            .collect()
    }
}
