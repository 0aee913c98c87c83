//! Two-axis mount orchestration: goto, tracking and device-wide commands.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::axis::{Axis, MotionSpeed};
use crate::error::SynScanResult;
use crate::protocol::{Channel, Command, CommandMessage, DataSegment};
use crate::transport::{Transport, UdpTransport};

/// Acknowledgment sent once after connecting, before any motion command.
fn handshake() -> CommandMessage {
    CommandMessage::new(Command::InitializationDone, Channel::Both)
}

fn aux_switch(on: bool) -> CommandMessage {
    let argument = if on { b"1" } else { b"0" };
    CommandMessage::with_payload(
        Command::SetAuxSwitch,
        Channel::Azimuth,
        DataSegment::raw(argument),
    )
}

/// A two-axis motorized mount (azimuth/RA plus declination/Alt).
///
/// Both axes share one transport, so their commands serialize through its
/// single-flight lock. A `Mount` only exists after a successful handshake
/// and axis calibration; construction fails otherwise and nothing
/// half-initialized is ever handed out.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use synscan::{MotionSpeed, Mount};
///
/// let mount = Mount::wifi_mount(
///     "192.168.4.1".parse()?,
///     synscan::transport::DEFAULT_PORT,
///     Duration::from_secs(2),
/// )?;
/// mount.set_position_degrees((0.0, 0.0))?;
/// mount.goto((30.0, 30.0), MotionSpeed::Fast, Duration::from_millis(500))?;
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct Mount {
    transport: Arc<dyn Transport>,
    azimuth: Axis,
    declination: Axis,
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount").finish_non_exhaustive()
    }
}

impl Mount {
    /// Connect to a mount over Wi-Fi (UDP) and initialize both axes.
    pub fn wifi_mount(addr: IpAddr, port: u16, timeout: Duration) -> SynScanResult<Self> {
        let transport = Arc::new(UdpTransport::connect((addr, port), timeout)?);
        let mount = Self::with_transport(transport)?;
        info!(
            "connected to mount at {addr}:{port} ({} counts/rev)",
            mount.azimuth.counts_per_revolution()
        );
        Ok(mount)
    }

    /// Initialize a mount over an existing transport.
    ///
    /// Performs the handshake and queries both axes' calibration constants;
    /// any failure aborts construction.
    pub fn with_transport(transport: Arc<dyn Transport>) -> SynScanResult<Self> {
        transport.send_command(&handshake())?;

        let azimuth = Axis::initialize(Channel::Azimuth, transport.clone())?;
        let declination = Axis::initialize(Channel::Declination, transport.clone())?;

        Ok(Self {
            transport,
            azimuth,
            declination,
        })
    }

    /// Check whether a mount answers at the given address.
    ///
    /// Constructs a mount and discards it; useful with a short timeout as a
    /// reachability test during discovery.
    pub fn probe(addr: IpAddr, port: u16, timeout: Duration) -> bool {
        match Self::wifi_mount(addr, port, timeout) {
            Ok(_) => true,
            Err(e) => {
                debug!("no mount at {addr}:{port}: {e}");
                false
            }
        }
    }

    pub fn azimuth(&self) -> &Axis {
        &self.azimuth
    }

    pub fn declination(&self) -> &Axis {
        &self.declination
    }

    fn axes(&self) -> [&Axis; 2] {
        [&self.azimuth, &self.declination]
    }

    // ==================== Position ====================

    /// Current (azimuth, declination) position.
    pub fn get_position_degrees(&self) -> SynScanResult<(f64, f64)> {
        Ok((
            self.azimuth.get_position_degrees()?,
            self.declination.get_position_degrees()?,
        ))
    }

    /// Re-synchronize both axes' positions without moving them.
    pub fn set_position_degrees(&self, degrees: (f64, f64)) -> SynScanResult<()> {
        self.azimuth.set_position_degrees(degrees.0)?;
        self.declination.set_position_degrees(degrees.1)
    }

    // ==================== Motion ====================

    pub fn start_motion(&self) -> SynScanResult<()> {
        for axis in self.axes() {
            axis.start_motion()?;
        }
        Ok(())
    }

    pub fn stop_motion(&self) -> SynScanResult<()> {
        for axis in self.axes() {
            axis.stop_motion()?;
        }
        Ok(())
    }

    /// True while either axis reports a running motor.
    pub fn is_running(&self) -> SynScanResult<bool> {
        Ok(self.azimuth.get_status()?.is_running || self.declination.get_status()?.is_running)
    }

    // ==================== Goto ====================

    pub fn set_goto_mode(&self, speed: MotionSpeed) -> SynScanResult<()> {
        for axis in self.axes() {
            axis.set_goto_mode(speed)?;
        }
        Ok(())
    }

    /// Set both goto targets, stopping motion first.
    pub fn set_goto_target_degrees(&self, degrees: (f64, f64)) -> SynScanResult<()> {
        self.stop_motion()?;
        self.azimuth.set_goto_target_degrees(degrees.0)?;
        self.declination.set_goto_target_degrees(degrees.1)
    }

    pub fn get_goto_target_degrees(&self) -> SynScanResult<(f64, f64)> {
        Ok((
            self.azimuth.get_goto_target_degrees()?,
            self.declination.get_goto_target_degrees()?,
        ))
    }

    /// Slew both axes to an absolute target and block until motion stops.
    ///
    /// The controller requires mode before target before start; both axes
    /// are stopped implicitly when the mode is set. Completion is detected
    /// by polling the running flags every `poll_interval`.
    pub fn goto(
        &self,
        target_degrees: (f64, f64),
        speed: MotionSpeed,
        poll_interval: Duration,
    ) -> SynScanResult<()> {
        self.goto_sampled(target_degrees, speed, poll_interval, || ())
            .map(|_| ())
    }

    /// [`goto`](Self::goto) with a sampler invoked once per poll iteration.
    ///
    /// Returns the accumulated samples once both axes have stopped. Useful
    /// for recording the trajectory while a slew is in progress.
    pub fn goto_sampled<T>(
        &self,
        target_degrees: (f64, f64),
        speed: MotionSpeed,
        poll_interval: Duration,
        mut sampler: impl FnMut() -> T,
    ) -> SynScanResult<Vec<T>> {
        self.set_goto_mode(speed)?;
        self.set_goto_target_degrees(target_degrees)?;
        self.start_motion()?;

        let mut samples = Vec::new();
        while self.is_running()? {
            std::thread::sleep(poll_interval);
            samples.push(sampler());
        }
        Ok(samples)
    }

    // ==================== Tracking ====================

    /// Track at independent signed speeds (degrees/second) per axis.
    ///
    /// Stops both axes, then starts each in tracking mode with the
    /// direction taken from its speed's sign. Motion continues until
    /// explicitly stopped.
    pub fn track(&self, degrees_per_second: (f64, f64)) -> SynScanResult<()> {
        self.stop_motion()?;
        self.azimuth.track(degrees_per_second.0)?;
        self.declination.track(degrees_per_second.1)
    }

    // ==================== Aux Switch ====================

    /// Energize the auxiliary switch output.
    pub fn set_aux_switch_on(&self) -> SynScanResult<()> {
        self.transport.send_command(&aux_switch(true))?;
        Ok(())
    }

    /// De-energize the auxiliary switch output.
    pub fn set_aux_switch_off(&self) -> SynScanResult<()> {
        self.transport.send_command(&aux_switch(false))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SynScanError;
    use crate::protocol::ErrorCode;
    use crate::transport::mock::MockTransport;

    const POLL: Duration = Duration::from_millis(1);

    fn running_status(mock: &MockTransport, channel: Channel, running: bool) {
        mock.expect_int(Command::InquireStatus, channel, u32::from(running));
    }

    #[test]
    fn test_construction_performs_handshake_then_calibration() {
        let mock = Arc::new(MockTransport::calibrated(9216000, 64935));
        let mount = Mount::with_transport(mock.clone()).unwrap();
        assert_eq!(mount.azimuth().counts_per_revolution(), 9216000);
        assert_eq!(mount.declination().timer_interrupt_frequency(), 64935);

        let sent = mock.sent();
        assert_eq!(sent[0], (Command::InitializationDone, Channel::Both));
        assert_eq!(
            sent[1],
            (Command::InquireCountsPerRevolution, Channel::Azimuth)
        );
    }

    #[test]
    fn test_handshake_failure_aborts_construction() {
        let mock = Arc::new(MockTransport::calibrated(9216000, 64935));
        mock.expect_err(
            Command::InitializationDone,
            Channel::Both,
            SynScanError::Controller(ErrorCode::NotInitialized),
        );
        let err = Mount::with_transport(mock).unwrap_err();
        assert!(matches!(
            err,
            SynScanError::Controller(ErrorCode::NotInitialized)
        ));
    }

    #[test]
    fn test_goto_orders_mode_target_start() {
        let mock = Arc::new(MockTransport::calibrated(360, 20000));
        let mount = Mount::with_transport(mock.clone()).unwrap();

        running_status(&mock, Channel::Azimuth, false);
        running_status(&mock, Channel::Declination, false);
        mount.goto((10.0, 20.0), MotionSpeed::Fast, POLL).unwrap();

        // Skip handshake and the four calibration inquiries.
        let commands: Vec<Command> = mock.sent()[5..].iter().map(|(c, _)| *c).collect();
        assert_eq!(
            commands,
            vec![
                // set_goto_mode per axis, each stopping first
                Command::StopMotion,
                Command::SetMotionMode,
                Command::StopMotion,
                Command::SetMotionMode,
                // set_goto_target_degrees stops both, then sets targets
                Command::StopMotion,
                Command::StopMotion,
                Command::SetGotoTarget,
                Command::SetGotoTarget,
                // start, then one completed poll
                Command::StartMotion,
                Command::StartMotion,
                Command::InquireStatus,
                Command::InquireStatus,
            ]
        );
    }

    #[test]
    fn test_goto_samples_once_per_poll_iteration() {
        let mock = Arc::new(MockTransport::calibrated(360, 20000));
        let mount = Mount::with_transport(mock.clone()).unwrap();

        // Azimuth reports running for two polls; declination is only
        // consulted once azimuth has stopped.
        running_status(&mock, Channel::Azimuth, true);
        running_status(&mock, Channel::Azimuth, true);
        running_status(&mock, Channel::Azimuth, false);
        running_status(&mock, Channel::Declination, false);

        let mut polls = 0;
        let samples = mount
            .goto_sampled((180.0, 45.0), MotionSpeed::Fast, POLL, || {
                polls += 1;
                polls
            })
            .unwrap();
        assert_eq!(samples, vec![1, 2]);
    }

    #[test]
    fn test_goto_without_sampler_completes() {
        let mock = Arc::new(MockTransport::calibrated(360, 20000));
        let mount = Mount::with_transport(mock.clone()).unwrap();

        running_status(&mock, Channel::Azimuth, false);
        running_status(&mock, Channel::Declination, false);
        mount.goto((180.0, 45.0), MotionSpeed::Slow, POLL).unwrap();
    }

    #[test]
    fn test_track_stops_then_starts_each_axis() {
        let mock = Arc::new(MockTransport::calibrated(360, 20000));
        let mount = Mount::with_transport(mock.clone()).unwrap();

        mount.track((1.0, -1.0)).unwrap();

        let sent = mock.sent_messages();
        let motion = &sent[5..];
        let commands: Vec<(Command, Channel)> =
            motion.iter().map(|m| (m.command, m.channel)).collect();
        assert_eq!(
            commands,
            vec![
                (Command::StopMotion, Channel::Azimuth),
                (Command::StopMotion, Channel::Declination),
                (Command::StopMotion, Channel::Azimuth),
                (Command::SetMotionMode, Channel::Azimuth),
                (Command::SetStepPeriod, Channel::Azimuth),
                (Command::StartMotion, Channel::Azimuth),
                (Command::StopMotion, Channel::Declination),
                (Command::SetMotionMode, Channel::Declination),
                (Command::SetStepPeriod, Channel::Declination),
                (Command::StartMotion, Channel::Declination),
            ]
        );

        // Direction byte follows the speed's sign.
        assert_eq!(motion[3].payload, DataSegment::raw(b"10"));
        assert_eq!(motion[7].payload, DataSegment::raw(b"11"));
    }

    #[test]
    fn test_aux_switch_commands() {
        let mock = Arc::new(MockTransport::calibrated(360, 20000));
        let mount = Mount::with_transport(mock.clone()).unwrap();

        mount.set_aux_switch_on().unwrap();
        mount.set_aux_switch_off().unwrap();

        let sent = mock.sent_messages();
        let on = &sent[sent.len() - 2];
        let off = &sent[sent.len() - 1];
        assert_eq!(on.command, Command::SetAuxSwitch);
        assert_eq!(on.channel, Channel::Azimuth);
        assert_eq!(on.payload, DataSegment::raw(b"1"));
        assert_eq!(off.payload, DataSegment::raw(b"0"));
    }
}
