//! Error types for the device-monitor crate.

use device_inventory::InventoryError;
use device_rpc::RpcError;

use crate::types::{DeviceId, FaultKind};

/// Errors returned synchronously by supervisor and worker operations.
///
/// Per-poll failures never surface here; they become error payloads.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// A worker is already registered under this id
    #[error("Device already registered: {0}")]
    DuplicateDevice(DeviceId),

    /// No worker is registered under this id
    #[error("Device not registered: {0}")]
    UnknownDevice(DeviceId),

    /// Invalid device or interval configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Stopped workers are terminal; register a fresh one to resume polling
    #[error("Worker for {0} has stopped and cannot be restarted")]
    WorkerStopped(DeviceId),

    /// `start` was called outside a tokio runtime
    #[error("No async runtime available: {0}")]
    NoRuntime(String),
}

impl From<InventoryError> for MonitorError {
    fn from(value: InventoryError) -> Self {
        Self::Configuration(value.to_string())
    }
}

/// Outcome of a failed `fetch`. One fault per protocol exchange.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Fault {
    /// The exchange could not complete (unreachable, refused, reset)
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The device did not answer within the transport deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The device answered with something that could not be interpreted
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The device rejected the request with its own error code
    #[error("Device error {code}: {message}")]
    DeviceError { code: i64, message: String },
}

impl Fault {
    pub fn kind(&self) -> FaultKind {
        match self {
            Fault::Transport(_) => FaultKind::Transport,
            Fault::Timeout(_) => FaultKind::Timeout,
            Fault::MalformedResponse(_) => FaultKind::MalformedResponse,
            Fault::DeviceError { .. } => FaultKind::DeviceError,
        }
    }
}

impl From<RpcError> for Fault {
    fn from(value: RpcError) -> Self {
        match value {
            RpcError::Network(msg) => Fault::Transport(msg),
            RpcError::Status(code) => Fault::Transport(format!("HTTP status {}", code)),
            RpcError::Timeout(msg) => Fault::Timeout(msg),
            RpcError::Parse(msg) => Fault::MalformedResponse(msg),
            RpcError::Device { code, message } => Fault::DeviceError { code, message },
        }
    }
}

/// Convenience type alias for Results using MonitorError.
pub type Result<T> = std::result::Result<T, MonitorError>;
