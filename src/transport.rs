//! UDP transport for the SynScan protocol.
//!
//! The controller speaks a strict request/response protocol with no
//! correlation identifier, so a reply can only be attributed to the request
//! that immediately preceded it. [`UdpTransport`] therefore allows a single
//! in-flight exchange at a time: a lock is held across send, wait and
//! receive of each attempt. Axis and mount operations all serialize through
//! this one choke point no matter how many of them share the transport.
//!
//! A lost datagram is indistinguishable from a slow controller, so each
//! exchange waits up to the configured timeout and then resends the request,
//! up to [`MAX_RETRIES`] attempts with no backoff. Only timeouts are
//! retried; any other socket fault propagates immediately.

use std::net::{ToSocketAddrs, UdpSocket};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{SynScanError, SynScanResult};
use crate::protocol::{parse_response, CommandMessage, ResponseMessage};

/// Default mount address when it runs its own access point.
pub const DEFAULT_ADDR: &str = "192.168.4.1";

/// UDP port the motor controller listens on.
pub const DEFAULT_PORT: u16 = 11880;

/// Default per-attempt reply timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Total send attempts before an exchange fails with a timeout.
pub const MAX_RETRIES: u32 = 3;

/// Receive buffer size; responses are at most 8 bytes in practice.
const RECV_BUFFER_SIZE: usize = 1024;

/// Capability to exchange one command for one response.
///
/// This is the seam between the motion layers and the wire: [`UdpTransport`]
/// is the only production implementation, and tests substitute a scripted
/// mock without touching axis or mount logic.
pub trait Transport: Send + Sync {
    /// Send a command and return the controller's parsed reply.
    ///
    /// An error frame from the controller surfaces as
    /// [`SynScanError::Controller`].
    fn send_command(&self, command: &CommandMessage) -> SynScanResult<ResponseMessage>;
}

/// Transport talking to a single mount over UDP.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use synscan::protocol::{Channel, Command, CommandMessage};
/// use synscan::transport::{Transport, UdpTransport, DEFAULT_PORT};
///
/// let transport = UdpTransport::connect(("192.168.4.1", DEFAULT_PORT), Duration::from_secs(2))?;
/// let version = transport.send_command(&CommandMessage::new(
///     Command::InquireMotorBoardVersion,
///     Channel::Azimuth,
/// ))?;
/// println!("board version: {:?}", version.payload);
/// # Ok::<(), synscan::SynScanError>(())
/// ```
pub struct UdpTransport {
    socket: UdpSocket,
    // Guards the whole send+wait+receive of one attempt.
    flight: Mutex<()>,
    max_retries: u32,
}

impl UdpTransport {
    /// Bind a socket and fix its peer to the given mount address.
    pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> SynScanResult<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect(addr)?;
        socket.set_read_timeout(Some(timeout))?;

        debug!("bound UDP transport to {:?}", socket.peer_addr()?);

        Ok(Self {
            socket,
            flight: Mutex::new(()),
            max_retries: MAX_RETRIES,
        })
    }

    /// Override the attempt count (primarily for tests).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// One send+wait+receive cycle under the single-flight lock.
    fn attempt(&self, frame: &[u8]) -> SynScanResult<Vec<u8>> {
        // A poisoned guard only means another caller panicked mid-exchange;
        // the socket itself is still usable.
        let _guard = self
            .flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        trace!("send: {:?}", String::from_utf8_lossy(frame));
        self.socket.send(frame)?;

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        match self.socket.recv(&mut buf) {
            Ok(n) => {
                trace!("recv: {:?}", String::from_utf8_lossy(&buf[..n]));
                Ok(buf[..n].to_vec())
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Err(SynScanError::Timeout { attempts: 1 })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Send a raw frame and return the raw reply, retrying timeouts.
    ///
    /// The lock is taken per attempt, not around the retry loop, so other
    /// callers are not starved while a retry waits out its timeout.
    fn exchange(&self, frame: &[u8]) -> SynScanResult<Vec<u8>> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.attempt(frame) {
                Ok(reply) => return Ok(reply),
                Err(SynScanError::Timeout { .. }) if attempts < self.max_retries => {
                    debug!("attempt {attempts} timed out, retrying");
                }
                Err(SynScanError::Timeout { .. }) => {
                    return Err(SynScanError::Timeout { attempts });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Transport for UdpTransport {
    fn send_command(&self, command: &CommandMessage) -> SynScanResult<ResponseMessage> {
        let reply = self.exchange(&command.serialize())?;
        parse_response(&reply)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Channel, Command};

    #[test]
    fn test_exchange_round_trip_over_loopback() {
        let device = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = device.local_addr().unwrap();

        let responder = std::thread::spawn(move || {
            let mut buf = [0u8; 64];
            let (n, peer) = device.recv_from(&mut buf).unwrap();
            assert_eq!(&buf[..n], b":j1\r");
            device.send_to(b"=000080\r", peer).unwrap();
        });

        let transport = UdpTransport::connect(addr, Duration::from_secs(1)).unwrap();
        let response = transport
            .send_command(&CommandMessage::new(
                Command::InquirePosition,
                Channel::Azimuth,
            ))
            .unwrap();
        assert_eq!(response.payload.to_int().unwrap(), 0x80_0000);

        responder.join().unwrap();
    }

    #[test]
    fn test_controller_error_frame_surfaces_as_typed_error() {
        let device = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = device.local_addr().unwrap();

        let responder = std::thread::spawn(move || {
            let mut buf = [0u8; 64];
            let (_, peer) = device.recv_from(&mut buf).unwrap();
            device.send_to(b"!2\r", peer).unwrap();
        });

        let transport = UdpTransport::connect(addr, Duration::from_secs(1)).unwrap();
        let err = transport
            .send_command(&CommandMessage::new(Command::StartMotion, Channel::Both))
            .unwrap_err();
        assert!(matches!(
            err,
            SynScanError::Controller(crate::protocol::ErrorCode::MotorNotStopped)
        ));

        responder.join().unwrap();
    }

    #[test]
    fn test_silent_peer_times_out_after_exactly_max_retries_sends() {
        let device = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = device.local_addr().unwrap();

        let transport = UdpTransport::connect(addr, Duration::from_millis(25)).unwrap();
        let err = transport
            .send_command(&CommandMessage::new(
                Command::InquireStatus,
                Channel::Azimuth,
            ))
            .unwrap_err();
        assert!(matches!(err, SynScanError::Timeout { attempts: 3 }));

        // Each attempt must have put one datagram on the wire.
        device.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 64];
        let mut datagrams = 0;
        while device.recv(&mut buf).is_ok() {
            datagrams += 1;
        }
        assert_eq!(datagrams, 3);
    }
}
