//! Device Telemetry Monitor
//!
//! Periodically polls a fleet of networked environmental devices, normalizes
//! every reading into a [`DevicePayload`] and hands it to a caller-supplied
//! sink.
//!
//! # Architecture
//!
//! ```text
//! MonitorSupervisor ──owns──▶ PollWorker (one per device, own tokio task)
//!                                  │
//!                                  ├── DeviceAdapter::fetch  (one exchange)
//!                                  ├── normalize → DevicePayload
//!                                  └── PayloadSink::accept
//! ```
//!
//! Poll failures never escape a worker: an unreachable device produces an error
//! payload and the loop keeps going at its configured cadence.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use device_monitor::prelude::*;
//!
//! let (sink, mut payloads) = ChannelSink::new();
//! let supervisor = MonitorSupervisor::new(sink);
//!
//! for descriptor in inventory.devices() {
//!     supervisor.register_descriptor(descriptor, &client)?;
//! }
//! supervisor.start_all();
//!
//! while let Some(payload) = payloads.recv().await {
//!     println!("{} on={} {:?}", payload.device_id(), payload.is_on(), payload.parameters());
//! }
//! ```

pub mod adapter;
pub mod error;
pub mod payload;
pub mod sink;
pub mod supervisor;
pub mod types;
pub mod worker;

pub use adapter::{build_adapter, AirPurifierAdapter, DeviceAdapter, DeviceState, HumidifierAdapter};
pub use error::{Fault, MonitorError, Result};
pub use payload::DevicePayload;
pub use sink::{BoundedReceiver, BoundedSink, ChannelSink, FnSink, LogSink, OverflowPolicy, PayloadSink};
pub use supervisor::{MonitorSupervisor, StartReport, SupervisorStats};
pub use types::{DeviceId, FaultKind, Parameter, ParameterValue, Parameters, PollInterval};
pub use worker::{PollWorker, StartOutcome, WorkerState, WorkerStats};

// Descriptor types callers need to build a fleet
pub use device_inventory::{Credential, DeviceClass, DeviceDescriptor, Inventory};
pub use device_rpc::{RpcClient, RpcConfig};

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::adapter::{DeviceAdapter, DeviceState};
    pub use crate::error::{Fault, MonitorError};
    pub use crate::payload::DevicePayload;
    pub use crate::sink::{ChannelSink, PayloadSink};
    pub use crate::supervisor::MonitorSupervisor;
    pub use crate::types::{DeviceId, Parameter, ParameterValue, PollInterval};
    pub use crate::worker::WorkerState;
}
