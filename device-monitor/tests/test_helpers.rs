//! Recording sink and payload helpers shared by the integration tests.

use device_monitor::{DeviceId, DevicePayload, PayloadSink};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Records every payload together with the (possibly paused) tokio clock.
#[derive(Clone, Default)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<(Instant, DevicePayload)>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn payloads(&self) -> Vec<DevicePayload> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn payloads_for(&self, device_id: &str) -> Vec<DevicePayload> {
        self.payloads()
            .into_iter()
            .filter(|p| p.device_id().as_str() == device_id)
            .collect()
    }

    /// Gaps between consecutive payloads of one device
    pub fn gaps_for(&self, device_id: &str) -> Vec<Duration> {
        let instants: Vec<Instant> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p.device_id().as_str() == device_id)
            .map(|(at, _)| *at)
            .collect();
        instants.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

impl PayloadSink for RecordingSink {
    fn accept(&self, payload: DevicePayload) {
        self.records.lock().unwrap().push((Instant::now(), payload));
    }
}

pub fn id(value: &str) -> DeviceId {
    DeviceId::new(value)
}
