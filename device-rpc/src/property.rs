//! MIoT property addressing.
//!
//! A property is identified by a service id (`siid`) and a property id
//! (`piid`). The `did` field is a caller-chosen label echoed back by the
//! device so results can be matched to requests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One property to read in a `get_properties` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyRequest {
    pub did: String,
    pub siid: u32,
    pub piid: u32,
}

impl PropertyRequest {
    pub fn new(did: impl Into<String>, siid: u32, piid: u32) -> Self {
        Self {
            did: did.into(),
            siid,
            piid,
        }
    }
}

/// Per-property answer. `code` is zero when `value` is legible.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PropertyResult {
    pub did: String,
    #[serde(default)]
    pub siid: u32,
    #[serde(default)]
    pub piid: u32,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub value: Option<Value>,
}

impl PropertyResult {
    /// The value, if the device reported it without error.
    pub fn legible_value(&self) -> Option<&Value> {
        if self.code == 0 {
            self.value.as_ref()
        } else {
            None
        }
    }
}
