//! Device adapters
//!
//! An adapter wraps one physical device and exposes a single `fetch` operation.
//! It performs exactly one protocol exchange per call and never retries, caches
//! or normalizes. Each device class supplies its own mapping from raw fields to
//! the canonical parameter set, which the poll worker applies when building a
//! payload.

mod air_purifier;
mod humidifier;
mod miot;

pub use air_purifier::AirPurifierAdapter;
pub use humidifier::HumidifierAdapter;
pub use miot::{MiotDevice, PropertySpec};

use async_trait::async_trait;
use device_inventory::{DeviceClass, DeviceDescriptor};
use device_rpc::RpcClient;

use crate::error::Fault;
use crate::types::{Parameter, ParameterValue, Parameters};

/// Raw state returned by a successful exchange.
///
/// `fields` uses the adapter's own protocol names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceState {
    /// Power / operational state
    pub on: bool,
    /// The device flagged an internal fault condition
    pub reports_fault: bool,
    pub fields: Parameters,
}

impl DeviceState {
    pub fn new(on: bool) -> Self {
        Self {
            on,
            ..Default::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_fault(mut self, reports_fault: bool) -> Self {
        self.reports_fault = reports_fault;
        self
    }

    /// Copy the fields named in `table` into canonical names.
    pub fn remap(&self, table: &[(&str, Parameter)]) -> Parameters {
        table
            .iter()
            .filter_map(|(raw, parameter)| {
                self.fields
                    .get(*raw)
                    .map(|value| (parameter.name().to_string(), value.clone()))
            })
            .collect()
    }
}

/// Capability interface for one polled device.
///
/// An adapter is owned by exactly one poll worker and is never called
/// concurrently.
#[async_trait]
pub trait DeviceAdapter: Send {
    /// Short label for the device family, used in diagnostics
    fn device_class(&self) -> &str;

    /// Network address used for every fetch
    fn address(&self) -> &str;

    /// Perform one exchange with the device
    async fn fetch(&mut self) -> Result<DeviceState, Fault>;

    /// Map raw fields to canonical parameter names.
    ///
    /// The default passes fields through unchanged.
    fn canonical_parameters(&self, state: &DeviceState) -> Parameters {
        state.fields.clone()
    }
}

/// Build the adapter matching an inventory entry's device class.
pub fn build_adapter(descriptor: &DeviceDescriptor, client: &RpcClient) -> Box<dyn DeviceAdapter> {
    let device = MiotDevice::new(
        client.clone(),
        descriptor.address.clone(),
        descriptor.credential.clone(),
    );
    match descriptor.class {
        DeviceClass::AirPurifier => Box::new(AirPurifierAdapter::new(device)),
        DeviceClass::Humidifier => Box::new(HumidifierAdapter::new(device)),
    }
}
