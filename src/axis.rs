//! Single motor channel: unit conversions, status decoding and motion
//! commands.
//!
//! The controller works in integer step counts; `counts_per_revolution`
//! counts make one full turn and `timer_interrupt_frequency` is the clock
//! from which step timing presets are derived. Both constants are queried
//! once from the device when the axis is initialized and never change
//! afterwards, so they can be read concurrently without synchronization.
//!
//! Position counts cross the wire offset by [`POSITION_OFFSET`] so that
//! signed-feeling positions fit the unsigned 24-bit data field. The offset
//! is added before sending and subtracted after receiving, symmetrically, at
//! every wire crossing.

use std::sync::Arc;

use bitflags::bitflags;
use clap::ValueEnum;

use crate::error::{SynScanError, SynScanResult};
use crate::protocol::{Channel, Command, CommandMessage, DataSegment, ResponseMessage};
use crate::transport::Transport;

/// Offset applied to every position count crossing the wire.
pub const POSITION_OFFSET: i64 = 0x80_0000;

bitflags! {
    /// Raw bit assignments of the status inquiry word.
    #[derive(Debug, Clone, Copy)]
    struct StatusBits: u32 {
        const RUNNING = 0x001;
        const BLOCKED = 0x002;
        const TRACKING_MODE = 0x010;
        const COUNTER_CLOCKWISE = 0x020;
        const FAST_SPEED = 0x040;
        const INITIALIZED = 0x100;
        const SWITCH_LEVEL = 0x200;
    }
}

/// Motion mode an axis is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionMode {
    /// Move to an absolute target, then stop.
    Goto,
    /// Constant-speed motion until explicitly stopped.
    Tracking,
}

/// Rotation direction as seen from above the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionDirection {
    Clockwise,
    CounterClockwise,
}

/// Speed class of a motion mode.
///
/// Tracking only distinguishes slow and fast; `Medium` can still be reported
/// by a status inquiry after a goto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MotionSpeed {
    Slow,
    Medium,
    Fast,
}

/// Decoded status inquiry result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorStatus {
    pub motion_mode: MotionMode,
    pub direction: MotionDirection,
    pub speed: MotionSpeed,
    pub is_running: bool,
    pub is_blocked: bool,
    pub is_initialized: bool,
    pub switch_position: bool,
}

impl MotorStatus {
    /// Decode the integer status word returned by a status inquiry.
    pub fn from_raw(raw: u32) -> Self {
        let bits = StatusBits::from_bits_truncate(raw);
        Self {
            motion_mode: if bits.contains(StatusBits::TRACKING_MODE) {
                MotionMode::Tracking
            } else {
                MotionMode::Goto
            },
            direction: if bits.contains(StatusBits::COUNTER_CLOCKWISE) {
                MotionDirection::CounterClockwise
            } else {
                MotionDirection::Clockwise
            },
            speed: if bits.contains(StatusBits::FAST_SPEED) {
                MotionSpeed::Fast
            } else {
                MotionSpeed::Slow
            },
            is_running: bits.contains(StatusBits::RUNNING),
            is_blocked: bits.contains(StatusBits::BLOCKED),
            is_initialized: bits.contains(StatusBits::INITIALIZED),
            switch_position: bits.contains(StatusBits::SWITCH_LEVEL),
        }
    }
}

/// One physical motor channel of the mount.
///
/// Holds the channel's calibration constants and a shared reference to the
/// transport. All commands issued here serialize through the transport's
/// single-flight lock.
pub struct Axis {
    channel: Channel,
    counts_per_revolution: u32,
    timer_interrupt_frequency: u32,
    transport: Arc<dyn Transport>,
}

impl Axis {
    /// Query the channel's calibration constants and build the axis.
    pub fn initialize(channel: Channel, transport: Arc<dyn Transport>) -> SynScanResult<Self> {
        let counts_per_revolution = transport
            .send_command(&CommandMessage::new(
                Command::InquireCountsPerRevolution,
                channel,
            ))?
            .payload
            .to_int()?;
        let timer_interrupt_frequency = transport
            .send_command(&CommandMessage::new(
                Command::InquireTimerInterruptFreq,
                channel,
            ))?
            .payload
            .to_int()?;

        Ok(Self {
            channel,
            counts_per_revolution,
            timer_interrupt_frequency,
            transport,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_calibration(
        channel: Channel,
        counts_per_revolution: u32,
        timer_interrupt_frequency: u32,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            channel,
            counts_per_revolution,
            timer_interrupt_frequency,
            transport,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn counts_per_revolution(&self) -> u32 {
        self.counts_per_revolution
    }

    pub fn timer_interrupt_frequency(&self) -> u32 {
        self.timer_interrupt_frequency
    }

    fn send(&self, command: Command, payload: DataSegment) -> SynScanResult<ResponseMessage> {
        self.transport
            .send_command(&CommandMessage::with_payload(command, self.channel, payload))
    }

    // ==================== Unit Conversions ====================

    /// Angle covered by one step count.
    pub fn degrees_per_count(&self) -> f64 {
        360.0 / self.counts_per_revolution as f64
    }

    /// Convert an angle to a step count, truncating toward zero.
    pub fn degrees_to_count(&self, degrees: f64) -> i64 {
        (degrees / self.degrees_per_count()) as i64
    }

    /// Convert a step count to the canonical single-turn angle in [0, 360).
    pub fn count_to_degrees(&self, count: i64) -> f64 {
        let reduced = count.rem_euclid(self.counts_per_revolution as i64);
        reduced as f64 * self.degrees_per_count()
    }

    /// Timer preset encoding the step period for a desired angular speed.
    ///
    /// Validates the hardware bounds before any command is sent: presets
    /// below 10 are faster than the interrupt cadence allows, presets above
    /// 0xFFFFFF do not fit the 24-bit data field.
    pub fn timer_preset_for_speed(&self, degrees_per_second: f64) -> SynScanResult<u32> {
        let counts_per_second = (degrees_per_second / self.degrees_per_count()).abs();
        let preset = (self.timer_interrupt_frequency as f64 / counts_per_second).trunc();
        if preset < 10.0 {
            return Err(SynScanError::MaximumSpeedExceeded { degrees_per_second });
        }
        if preset > 0xFF_FFFF as f64 {
            return Err(SynScanError::MinimumSpeedExceeded { degrees_per_second });
        }
        Ok(preset as u32)
    }

    // ==================== Position ====================

    /// Current position as a single-turn angle.
    pub fn get_position_degrees(&self) -> SynScanResult<f64> {
        let raw = self
            .send(Command::InquirePosition, DataSegment::empty())?
            .payload
            .to_int()?;
        Ok(self.count_to_degrees(raw as i64 - POSITION_OFFSET))
    }

    /// Re-synchronize the controller's notion of the current position.
    ///
    /// This does not move the axis.
    pub fn set_position_degrees(&self, degrees: f64) -> SynScanResult<()> {
        let count = self.degrees_to_count(degrees) + POSITION_OFFSET;
        self.send(Command::SetPosition, DataSegment::from_int(count as u32))?;
        Ok(())
    }

    // ==================== Status ====================

    /// Query and decode the axis status word.
    pub fn get_status(&self) -> SynScanResult<MotorStatus> {
        let raw = self
            .send(Command::InquireStatus, DataSegment::empty())?
            .payload
            .to_int()?;
        Ok(MotorStatus::from_raw(raw))
    }

    // ==================== Goto ====================

    /// Put the axis in goto mode.
    ///
    /// The controller rejects mode changes while a motor runs, so motion is
    /// stopped first.
    pub fn set_goto_mode(&self, speed: MotionSpeed) -> SynScanResult<()> {
        self.stop_motion()?;
        let payload = match speed {
            MotionSpeed::Slow => DataSegment::raw(b"80"),
            _ => DataSegment::raw(b"02"),
        };
        self.send(Command::SetMotionMode, payload)?;
        Ok(())
    }

    /// Set the absolute goto target.
    pub fn set_goto_target_degrees(&self, degrees: f64) -> SynScanResult<()> {
        let count = self.degrees_to_count(degrees) + POSITION_OFFSET;
        self.send(Command::SetGotoTarget, DataSegment::from_int(count as u32))?;
        Ok(())
    }

    /// Read back the goto target as a single-turn angle.
    pub fn get_goto_target_degrees(&self) -> SynScanResult<f64> {
        let raw = self
            .send(Command::InquireGotoTarget, DataSegment::empty())?
            .payload
            .to_int()?;
        Ok(self.count_to_degrees(raw as i64 - POSITION_OFFSET))
    }

    // ==================== Tracking ====================

    /// Put the axis in tracking mode.
    ///
    /// Tracking knows only two speed classes; anything but `Fast` selects
    /// the slow class. Motion is stopped first, as for goto mode.
    pub fn set_tracking_mode(
        &self,
        speed: MotionSpeed,
        direction: MotionDirection,
    ) -> SynScanResult<()> {
        self.stop_motion()?;
        let speed_byte = match speed {
            MotionSpeed::Fast => b'3',
            _ => b'1',
        };
        let direction_byte = match direction {
            MotionDirection::Clockwise => b'0',
            MotionDirection::CounterClockwise => b'1',
        };
        self.send(
            Command::SetMotionMode,
            DataSegment::raw(&[speed_byte, direction_byte]),
        )?;
        Ok(())
    }

    /// Set the tracking step period for the given angular speed.
    pub fn set_tracking_speed(&self, degrees_per_second: f64) -> SynScanResult<()> {
        let preset = self.timer_preset_for_speed(degrees_per_second)?;
        self.send(Command::SetStepPeriod, DataSegment::from_int(preset))?;
        Ok(())
    }

    /// Start tracking at a signed angular speed.
    ///
    /// The sign selects the direction. The speed is validated before any
    /// command reaches the controller.
    pub fn track(&self, degrees_per_second: f64) -> SynScanResult<()> {
        let preset = self.timer_preset_for_speed(degrees_per_second)?;
        let direction = if degrees_per_second < 0.0 {
            MotionDirection::CounterClockwise
        } else {
            MotionDirection::Clockwise
        };
        self.set_tracking_mode(MotionSpeed::Slow, direction)?;
        self.send(Command::SetStepPeriod, DataSegment::from_int(preset))?;
        self.start_motion()
    }

    // ==================== Motion ====================

    pub fn start_motion(&self) -> SynScanResult<()> {
        self.send(Command::StartMotion, DataSegment::empty())?;
        Ok(())
    }

    /// Decelerate and stop.
    pub fn stop_motion(&self) -> SynScanResult<()> {
        self.send(Command::StopMotion, DataSegment::empty())?;
        Ok(())
    }

    /// Stop immediately, without deceleration.
    pub fn instant_stop(&self) -> SynScanResult<()> {
        self.send(Command::InstantStop, DataSegment::empty())?;
        Ok(())
    }
}
