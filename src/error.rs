//! Error types shared across the protocol, transport and motion layers.

use thiserror::Error;

use crate::protocol::ErrorCode;

/// Errors that can occur while talking to a SynScan motor controller.
///
/// Covers socket faults, protocol-framing problems, faults the controller
/// reports explicitly, and local validation of requested speeds. Retries are
/// applied only to timeouts, and only inside the transport; every other
/// variant propagates to the caller unchanged.
#[derive(Error, Debug)]
pub enum SynScanError {
    /// Low-level I/O error (socket bind/send/receive failure).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No reply arrived within the timeout on any attempt.
    #[error("no reply from controller after {attempts} attempts")]
    Timeout {
        /// Number of request datagrams sent before giving up.
        attempts: u32,
    },

    /// Response bytes do not match the success or error framing.
    #[error("invalid message: {0}")]
    Protocol(String),

    /// The controller answered with an error frame.
    #[error("controller error: {0}")]
    Controller(ErrorCode),

    /// The requested speed is too fast for the controller's interrupt
    /// cadence (timer preset would drop below 10 ticks per step).
    #[error("speed {degrees_per_second} deg/s exceeds the controller maximum")]
    MaximumSpeedExceeded { degrees_per_second: f64 },

    /// The requested speed is too slow to encode in the 24-bit step period.
    #[error("speed {degrees_per_second} deg/s is below the controller minimum")]
    MinimumSpeedExceeded { degrees_per_second: f64 },
}

/// Result type for SynScan operations.
pub type SynScanResult<T> = Result<T, SynScanError>;
