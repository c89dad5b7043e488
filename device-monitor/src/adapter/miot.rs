//! Shared plumbing for MIoT property devices.

use std::collections::BTreeMap;

use device_inventory::Credential;
use device_rpc::{PropertyRequest, RpcClient};
use serde_json::Value;

use crate::error::Fault;
use crate::types::{ParameterValue, Parameters};

/// Address of one MIoT property plus the raw field name it is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySpec {
    pub did: &'static str,
    pub siid: u32,
    pub piid: u32,
}

impl PropertySpec {
    pub const fn new(did: &'static str, siid: u32, piid: u32) -> Self {
        Self { did, siid, piid }
    }
}

/// Connection details for one MIoT device.
#[derive(Debug, Clone)]
pub struct MiotDevice {
    client: RpcClient,
    address: String,
    credential: Credential,
}

impl MiotDevice {
    pub fn new(client: RpcClient, address: impl Into<String>, credential: Credential) -> Self {
        Self {
            client,
            address: address.into(),
            credential,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Read `specs` in one `get_properties` exchange.
    ///
    /// The blocking HTTP call runs on tokio's blocking pool. Illegible
    /// properties (non-zero per-property code) are left out of the result.
    pub async fn read_properties(
        &self,
        specs: &[PropertySpec],
    ) -> Result<BTreeMap<String, Value>, Fault> {
        let requests: Vec<PropertyRequest> = specs
            .iter()
            .map(|spec| PropertyRequest::new(spec.did, spec.siid, spec.piid))
            .collect();

        let client = self.client.clone();
        let address = self.address.clone();
        let credential = self.credential.clone();

        let results = tokio::task::spawn_blocking(move || {
            client.get_properties(&address, credential.expose(), &requests)
        })
        .await
        .map_err(|e| Fault::Transport(format!("rpc task failed: {}", e)))??;

        let mut values = BTreeMap::new();
        for result in results {
            match result.legible_value() {
                Some(value) => {
                    values.insert(result.did.clone(), value.clone());
                }
                None => {
                    tracing::debug!(
                        address = %self.address,
                        property = %result.did,
                        code = result.code,
                        "property not readable"
                    );
                }
            }
        }
        Ok(values)
    }
}

/// Power flag, which every class requires.
pub(crate) fn require_power(values: &BTreeMap<String, Value>, did: &str) -> Result<bool, Fault> {
    values.get(did).and_then(Value::as_bool).ok_or_else(|| {
        Fault::MalformedResponse(format!("missing or non-boolean '{}' property", did))
    })
}

/// A non-zero fault code. An unreadable code counts as no fault.
pub(crate) fn fault_code_set(values: &BTreeMap<String, Value>, did: &str) -> bool {
    values
        .get(did)
        .and_then(Value::as_i64)
        .map(|code| code != 0)
        .unwrap_or(false)
}

/// Convert every scalar value into a raw field.
pub(crate) fn to_fields(values: &BTreeMap<String, Value>) -> Parameters {
    values
        .iter()
        .filter_map(|(did, value)| ParameterValue::from_json(value).map(|v| (did.clone(), v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_require_power() {
        assert_eq!(require_power(&values(&[("power", json!(true))]), "power"), Ok(true));
        assert!(matches!(
            require_power(&values(&[("power", json!(1))]), "power"),
            Err(Fault::MalformedResponse(_))
        ));
        assert!(require_power(&values(&[]), "power").is_err());
    }

    #[test]
    fn test_fault_code_set() {
        assert!(!fault_code_set(&values(&[("fault", json!(0))]), "fault"));
        assert!(fault_code_set(&values(&[("fault", json!(2))]), "fault"));
        assert!(!fault_code_set(&values(&[]), "fault"));
    }

    #[test]
    fn test_to_fields_drops_non_scalars() {
        let fields = to_fields(&values(&[
            ("aqi", json!(12)),
            ("extra", json!({"nested": true})),
        ]));
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("aqi"), Some(&ParameterValue::Integer(12)));
    }
}
