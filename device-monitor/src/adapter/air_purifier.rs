//! MIoT air purifier adapter.

use async_trait::async_trait;

use super::miot::{fault_code_set, require_power, to_fields, MiotDevice, PropertySpec};
use super::{DeviceAdapter, DeviceState};
use crate::error::Fault;
use crate::types::{Parameter, Parameters};

const PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("fault", 2, 1),
    PropertySpec::new("power", 2, 2),
    PropertySpec::new("mode", 2, 5),
    PropertySpec::new("aqi", 3, 6),
    PropertySpec::new("humidity", 3, 7),
    PropertySpec::new("temperature", 3, 8),
    PropertySpec::new("filter_life_remaining", 4, 3),
];

const CANONICAL: &[(&str, Parameter)] = &[
    ("temperature", Parameter::Temperature),
    ("humidity", Parameter::RelativeHumidity),
    ("aqi", Parameter::AirQualityIndex),
    ("filter_life_remaining", Parameter::FilterLifeRemaining),
    ("mode", Parameter::Mode),
];

/// Air purifier reporting temperature, humidity, AQI and filter life.
#[derive(Debug, Clone)]
pub struct AirPurifierAdapter {
    device: MiotDevice,
}

impl AirPurifierAdapter {
    pub fn new(device: MiotDevice) -> Self {
        Self { device }
    }
}

#[async_trait]
impl DeviceAdapter for AirPurifierAdapter {
    fn device_class(&self) -> &str {
        "air-purifier"
    }

    fn address(&self) -> &str {
        self.device.address()
    }

    async fn fetch(&mut self) -> Result<DeviceState, Fault> {
        let values = self.device.read_properties(PROPERTIES).await?;

        Ok(DeviceState {
            on: require_power(&values, "power")?,
            reports_fault: fault_code_set(&values, "fault"),
            fields: to_fields(&values),
        })
    }

    fn canonical_parameters(&self, state: &DeviceState) -> Parameters {
        state.remap(CANONICAL)
    }
}
