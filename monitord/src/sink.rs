//! JSON-lines payload writer

use std::io::Write;

use device_monitor::{DevicePayload, PayloadSink};
use parking_lot::Mutex;

/// Writes one JSON object per payload, flushing after every line.
///
/// Write errors are logged and the payload is dropped.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_line(&self, payload: &DevicePayload) -> std::io::Result<()> {
        let line = serde_json::to_string(payload)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()
    }
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> PayloadSink for JsonLinesSink<W> {
    fn accept(&self, payload: DevicePayload) {
        if let Err(e) = self.write_line(&payload) {
            tracing::error!(device_id = %payload.device_id(), error = %e, "failed to write payload");
        }
    }
}
