//! Driver for SkyWatcher SynScan motor controllers over UDP.
//!
//! Talks the SynScan motor controller command set to Wi-Fi mounts such as
//! the AZ-GTi, translating degrees and degrees/second into the controller's
//! native step counts and timer presets.
//!
//! # Layers
//!
//! - [`protocol`] - message framing, hex transcoding and response parsing
//!   (pure, no I/O)
//! - [`transport`] - single-flight UDP exchange with timeout and bounded
//!   retry, behind the [`Transport`] trait
//! - [`axis`] - one motor channel: unit conversions, status decoding,
//!   motion-mode and speed commands
//! - [`mount`] - both axes composed into goto and tracking operations
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use synscan::{MotionSpeed, Mount};
//! use synscan::transport::{DEFAULT_PORT, DEFAULT_TIMEOUT};
//!
//! let mount = Mount::wifi_mount("192.168.4.1".parse()?, DEFAULT_PORT, DEFAULT_TIMEOUT)?;
//!
//! // Take the current pointing as (0, 0), then slew.
//! mount.set_position_degrees((0.0, 0.0))?;
//! mount.goto((30.0, 30.0), MotionSpeed::Fast, Duration::from_millis(500))?;
//!
//! // Track at 0.5 deg/s on azimuth until stopped.
//! mount.azimuth().track(0.5)?;
//! mount.stop_motion()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod axis;
pub mod error;
pub mod mount;
pub mod protocol;
pub mod transport;

pub use axis::{Axis, MotionDirection, MotionMode, MotionSpeed, MotorStatus};
pub use error::{SynScanError, SynScanResult};
pub use mount::Mount;
pub use protocol::{Channel, Command, CommandMessage, DataSegment, ErrorCode, ResponseMessage};
pub use transport::{Transport, UdpTransport};
