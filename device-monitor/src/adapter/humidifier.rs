//! MIoT evaporative humidifier adapter.

use async_trait::async_trait;
use serde_json::Value;

use super::miot::{fault_code_set, require_power, to_fields, MiotDevice, PropertySpec};
use super::{DeviceAdapter, DeviceState};
use crate::error::Fault;
use crate::types::{Parameter, Parameters};

const PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("power", 2, 1),
    PropertySpec::new("fault", 2, 2),
    PropertySpec::new("mode", 2, 5),
    PropertySpec::new("target_humidity", 2, 6),
    PropertySpec::new("humidity", 3, 1),
    PropertySpec::new("temperature", 3, 7),
    PropertySpec::new("water_shortage_fault", 7, 1),
];

const CANONICAL: &[(&str, Parameter)] = &[
    ("temperature", Parameter::Temperature),
    ("humidity", Parameter::RelativeHumidity),
    ("target_humidity", Parameter::TargetHumidity),
    ("water_shortage_fault", Parameter::WaterShortageFault),
    ("mode", Parameter::Mode),
];

/// Humidifier reporting humidity, target humidity and water tank state.
///
/// An empty tank is treated as a device fault.
#[derive(Debug, Clone)]
pub struct HumidifierAdapter {
    device: MiotDevice,
}

impl HumidifierAdapter {
    pub fn new(device: MiotDevice) -> Self {
        Self { device }
    }
}

#[async_trait]
impl DeviceAdapter for HumidifierAdapter {
    fn device_class(&self) -> &str {
        "humidifier"
    }

    fn address(&self) -> &str {
        self.device.address()
    }

    async fn fetch(&mut self) -> Result<DeviceState, Fault> {
        let values = self.device.read_properties(PROPERTIES).await?;

        let water_shortage = values
            .get("water_shortage_fault")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(DeviceState {
            on: require_power(&values, "power")?,
            reports_fault: fault_code_set(&values, "fault") || water_shortage,
            fields: to_fields(&values),
        })
    }

    fn canonical_parameters(&self, state: &DeviceState) -> Parameters {
        state.remap(CANONICAL)
    }
}
