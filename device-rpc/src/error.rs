//! Error types for the RPC client

use thiserror::Error;

/// Errors that can occur during a device RPC exchange
#[derive(Debug, Error)]
pub enum RpcError {
    /// Connection could not be established or was dropped
    #[error("Network error: {0}")]
    Network(String),

    /// Connect or read deadline elapsed
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Non-success HTTP status from the device endpoint
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// Response body was not a valid RPC reply
    #[error("Malformed response: {0}")]
    Parse(String),

    /// The device answered with an RPC error object
    #[error("Device error {code}: {message}")]
    Device {
        /// Device-specific error code (negative for protocol errors)
        code: i64,
        /// Message reported by the device
        message: String,
    },
}

impl RpcError {
    /// Whether the exchange failed before a complete reply was received.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_) | Self::Status(_))
    }

    pub(crate) fn from_ureq(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => Self::Status(code),
            ureq::Error::Transport(transport) => {
                if is_timeout(&transport) {
                    Self::Timeout(transport.to_string())
                } else {
                    Self::Network(transport.to_string())
                }
            }
        }
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(transport);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
        source = err.source();
    }
    false
}
