//! SynScan motor controller wire protocol.
//!
//! This module implements the textual command/response protocol spoken by
//! SkyWatcher motor controller boards (documented in the "SkyWatcher Motor
//! Controller Command Set" application note). It is pure framing and
//! transcoding with no I/O; the transport layer moves the resulting bytes.
//!
//! # Message Framing
//!
//! A command from the master has the following parts:
//!
//! ```text
//! ':' <command: 1 byte> <channel: 1 byte> <data: 0-6 hex digits> '\r'
//! ```
//!
//! A normal response is `'='` followed by 0-6 hex digits and `'\r'`. An
//! abnormal response is `'!'` followed by a 1-2 digit error code and `'\r'`.
//!
//! # Data Transcoding
//!
//! Numeric payloads are sent as ASCII hex with the digit pairs in reversed
//! order, a little-endian scheme applied to the text rather than the value:
//!
//! - 24 bit: 0x123456 is sent as `"56" "34" "12"`
//! - 16 bit: 0x1234 is sent as `"34" "12"`
//! - 8 bit: 0x12 is sent as `"12"`
//!
//! [`DataSegment`] hides this from the rest of the crate: it stores digits in
//! document order and applies [`transcode`] only when crossing the wire
//! boundary in either direction.

use std::fmt;

use strum::EnumIter;

use crate::error::{SynScanError, SynScanResult};

/// Leading byte of a command frame.
pub const COMMAND_HEADER: u8 = b':';
/// Leading byte of a success response frame.
pub const RESPONSE_HEADER: u8 = b'=';
/// Leading byte of an error response frame.
pub const ERROR_HEADER: u8 = b'!';
/// Trailing byte of every frame.
pub const MESSAGE_TERMINATOR: u8 = b'\r';

/// Motor channel a command is addressed to.
///
/// Channel 1 drives the azimuth (RA) motor, channel 2 the declination (Alt)
/// motor. `Both` addresses the two motors in a single command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Channel {
    Azimuth,
    Declination,
    Both,
}

impl Channel {
    /// Wire code for this channel.
    pub fn code(self) -> u8 {
        match self {
            Channel::Azimuth => b'1',
            Channel::Declination => b'2',
            Channel::Both => b'3',
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'1' => Some(Channel::Azimuth),
            b'2' => Some(Channel::Declination),
            b'3' => Some(Channel::Both),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code() as char)
    }
}

/// Operation codes understood by the motor controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Command {
    SetPosition,
    InitializationDone,
    SetMotionMode,
    SetGotoTarget,
    SetStepPeriod,
    StartMotion,
    StopMotion,
    InstantStop,
    SetAuxSwitch,
    InquireCountsPerRevolution,
    InquireTimerInterruptFreq,
    InquireGotoTarget,
    InquireStepPeriod,
    InquirePosition,
    InquireStatus,
    InquireHighSpeedRatio,
    InquireMotorBoardVersion,
}

impl Command {
    /// Wire code for this command.
    pub fn code(self) -> u8 {
        match self {
            Command::SetPosition => b'E',
            Command::InitializationDone => b'F',
            Command::SetMotionMode => b'G',
            Command::SetGotoTarget => b'S',
            Command::SetStepPeriod => b'I',
            Command::StartMotion => b'J',
            Command::StopMotion => b'K',
            Command::InstantStop => b'L',
            Command::SetAuxSwitch => b'O',
            Command::InquireCountsPerRevolution => b'a',
            Command::InquireTimerInterruptFreq => b'b',
            Command::InquireGotoTarget => b'h',
            Command::InquireStepPeriod => b'i',
            Command::InquirePosition => b'j',
            Command::InquireStatus => b'f',
            Command::InquireHighSpeedRatio => b'g',
            Command::InquireMotorBoardVersion => b'e',
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            b'E' => Some(Command::SetPosition),
            b'F' => Some(Command::InitializationDone),
            b'G' => Some(Command::SetMotionMode),
            b'S' => Some(Command::SetGotoTarget),
            b'I' => Some(Command::SetStepPeriod),
            b'J' => Some(Command::StartMotion),
            b'K' => Some(Command::StopMotion),
            b'L' => Some(Command::InstantStop),
            b'O' => Some(Command::SetAuxSwitch),
            b'a' => Some(Command::InquireCountsPerRevolution),
            b'b' => Some(Command::InquireTimerInterruptFreq),
            b'h' => Some(Command::InquireGotoTarget),
            b'i' => Some(Command::InquireStepPeriod),
            b'j' => Some(Command::InquirePosition),
            b'f' => Some(Command::InquireStatus),
            b'g' => Some(Command::InquireHighSpeedRatio),
            b'e' => Some(Command::InquireMotorBoardVersion),
            _ => None,
        }
    }
}

/// Fault codes the controller reports in an error frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, strum::Display)]
pub enum ErrorCode {
    UnknownCommand,
    CommandLengthError,
    MotorNotStopped,
    InvalidCharacter,
    NotInitialized,
    DriverSleeping,
    PecTrainingRunning,
    NoValidPecData,
}

impl ErrorCode {
    /// Numeric code carried in the error frame.
    pub fn value(self) -> u8 {
        match self {
            ErrorCode::UnknownCommand => 0,
            ErrorCode::CommandLengthError => 1,
            ErrorCode::MotorNotStopped => 2,
            ErrorCode::InvalidCharacter => 3,
            ErrorCode::NotInitialized => 4,
            ErrorCode::DriverSleeping => 5,
            ErrorCode::PecTrainingRunning => 7,
            ErrorCode::NoValidPecData => 8,
        }
    }

    /// Inverse of [`value`](Self::value).
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0 => Some(ErrorCode::UnknownCommand),
            1 => Some(ErrorCode::CommandLengthError),
            2 => Some(ErrorCode::MotorNotStopped),
            3 => Some(ErrorCode::InvalidCharacter),
            4 => Some(ErrorCode::NotInitialized),
            5 => Some(ErrorCode::DriverSleeping),
            7 => Some(ErrorCode::PecTrainingRunning),
            8 => Some(ErrorCode::NoValidPecData),
            _ => None,
        }
    }
}

/// Reverse the order of the two-character digit groups in a hex string.
///
/// This converts between document order and the controller's wire order and
/// is its own inverse for even-length input. A trailing group shorter than
/// two characters keeps its place, so the transform is the identity for
/// inputs of two characters or fewer (single-digit payloads such as the aux
/// switch argument pass through unchanged).
pub fn transcode(data: &[u8]) -> Vec<u8> {
    data.chunks(2).rev().flatten().copied().collect()
}

/// Numeric payload of a command or response.
///
/// Stores 0-6 ASCII hex digits in document order (most significant pair
/// first). The wire-order transform happens only in
/// [`wire_bytes`](Self::wire_bytes) and
/// [`from_wire_bytes`](Self::from_wire_bytes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSegment {
    data: Vec<u8>,
}

impl DataSegment {
    /// Empty payload, for commands that carry no data.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Payload from literal document-order digits.
    ///
    /// Used for the fixed motion-mode and aux-switch arguments that are not
    /// derived from an integer.
    pub fn raw(digits: &[u8]) -> Self {
        Self {
            data: digits.to_vec(),
        }
    }

    /// Format `value` as exactly 6 uppercase zero-padded hex digits.
    ///
    /// `value` must fit the controller's 24-bit data field.
    pub fn from_int(value: u32) -> Self {
        debug_assert!(value <= 0xFF_FFFF, "value does not fit 24 bits: {value:#X}");
        Self {
            data: format!("{value:06X}").into_bytes(),
        }
    }

    /// Parse the document-order digits as an unsigned hex integer.
    pub fn to_int(&self) -> SynScanResult<u32> {
        let digits = std::str::from_utf8(&self.data)
            .map_err(|_| SynScanError::Protocol(format!("non-ASCII payload: {:?}", self.data)))?;
        u32::from_str_radix(digits, 16)
            .map_err(|_| SynScanError::Protocol(format!("invalid hex payload: {digits:?}")))
    }

    /// Document-order digits.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Digits in the controller's transposed wire order.
    pub fn wire_bytes(&self) -> Vec<u8> {
        transcode(&self.data)
    }

    /// Build a segment from a complete wire frame.
    ///
    /// Strips the 1-byte header and the terminator, then undoes the wire
    /// transposition. An odd-length payload cannot have been produced by the
    /// pair transform and is rejected as malformed.
    pub fn from_wire_bytes(raw: &[u8]) -> SynScanResult<Self> {
        if raw.len() < 2 {
            return Err(SynScanError::Protocol(format!(
                "frame too short: {:?}",
                String::from_utf8_lossy(raw)
            )));
        }
        let payload = &raw[1..raw.len() - 1];
        if payload.len() % 2 != 0 {
            return Err(SynScanError::Protocol(format!(
                "odd-length payload: {:?}",
                String::from_utf8_lossy(payload)
            )));
        }
        Ok(Self {
            data: transcode(payload),
        })
    }
}

/// A command frame addressed to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    pub command: Command,
    pub channel: Channel,
    pub payload: DataSegment,
}

impl CommandMessage {
    /// Command with no data segment.
    pub fn new(command: Command, channel: Channel) -> Self {
        Self {
            command,
            channel,
            payload: DataSegment::empty(),
        }
    }

    /// Command carrying a data segment.
    pub fn with_payload(command: Command, channel: Channel, payload: DataSegment) -> Self {
        Self {
            command,
            channel,
            payload,
        }
    }

    /// Serialize to the bytes sent on the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(4 + self.payload.as_bytes().len());
        frame.push(COMMAND_HEADER);
        frame.push(self.command.code());
        frame.push(self.channel.code());
        frame.extend_from_slice(&self.payload.wire_bytes());
        frame.push(MESSAGE_TERMINATOR);
        frame
    }
}

/// A successful response from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMessage {
    pub payload: DataSegment,
}

/// Parse a raw response frame.
///
/// Discriminates on the leading byte: `'='` yields a [`ResponseMessage`],
/// `'!'` yields [`SynScanError::Controller`] with the decoded [`ErrorCode`],
/// anything else (including an unrecognized error code or bad framing) is
/// [`SynScanError::Protocol`].
pub fn parse_response(raw: &[u8]) -> SynScanResult<ResponseMessage> {
    let invalid = || SynScanError::Protocol(format!("invalid message: {:?}", String::from_utf8_lossy(raw)));

    if raw.len() < 2 || raw[raw.len() - 1] != MESSAGE_TERMINATOR {
        return Err(invalid());
    }

    match raw[0] {
        RESPONSE_HEADER => Ok(ResponseMessage {
            payload: DataSegment::from_wire_bytes(raw)?,
        }),
        ERROR_HEADER => {
            // Error codes are 1-2 hex digits. Pair reversal is the identity
            // at those lengths, so the digits are read directly.
            let digits = &raw[1..raw.len() - 1];
            if digits.is_empty() || digits.len() > 2 {
                return Err(invalid());
            }
            let digits = std::str::from_utf8(digits).map_err(|_| invalid())?;
            let value = u8::from_str_radix(digits, 16).map_err(|_| invalid())?;
            let code = ErrorCode::from_value(value).ok_or_else(|| {
                SynScanError::Protocol(format!("unrecognized error code: {value:#X}"))
            })?;
            Err(SynScanError::Controller(code))
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_transcode_bit_width_examples() {
        // Examples from the command set documentation.
        assert_eq!(transcode(b"123456"), b"563412");
        assert_eq!(transcode(b"1234"), b"3412");
        assert_eq!(transcode(b"12"), b"12");
        assert_eq!(transcode(b""), b"");
    }

    #[test]
    fn test_transcode_is_involution_for_even_input() {
        for input in [&b"00"[..], b"ABCD", b"563412", b"FFFFFF"] {
            assert_eq!(transcode(&transcode(input)), input);
        }
    }

    #[test]
    fn test_transcode_keeps_short_trailing_group() {
        assert_eq!(transcode(b"1"), b"1");
    }

    #[test]
    fn test_segment_int_round_trip_through_wire() {
        for value in [0u32, 1, 0x10, 0x1234, 0x123456, 0xFF_FFFF] {
            let wire = DataSegment::from_int(value).wire_bytes();
            let mut frame = vec![RESPONSE_HEADER];
            frame.extend_from_slice(&wire);
            frame.push(MESSAGE_TERMINATOR);
            let parsed = DataSegment::from_wire_bytes(&frame).unwrap();
            assert_eq!(parsed.to_int().unwrap(), value);
        }
    }

    #[test]
    fn test_from_int_is_zero_padded_uppercase() {
        assert_eq!(DataSegment::from_int(0xABC).as_bytes(), b"000ABC");
        assert_eq!(DataSegment::from_int(0).as_bytes(), b"000000");
    }

    #[test]
    fn test_serialize_set_position_at_logical_zero() {
        // Logical count 0 plus the 0x800000 offset on channel 1.
        let msg = CommandMessage::with_payload(
            Command::SetPosition,
            Channel::Azimuth,
            DataSegment::from_int(0x80_0000),
        );
        assert_eq!(msg.serialize(), b":E1000080\r");
    }

    #[test]
    fn test_serialize_handshake() {
        let msg = CommandMessage::new(Command::InitializationDone, Channel::Both);
        assert_eq!(msg.serialize(), b":F3\r");
    }

    #[test]
    fn test_serialize_single_digit_payload() {
        let msg = CommandMessage::with_payload(
            Command::SetAuxSwitch,
            Channel::Azimuth,
            DataSegment::raw(b"1"),
        );
        assert_eq!(msg.serialize(), b":O11\r");
    }

    #[test]
    fn test_parse_success_response() {
        let response = parse_response(b"=1234\r").unwrap();
        assert_eq!(response.payload.as_bytes(), b"3412");
        assert_eq!(response.payload.to_int().unwrap(), 0x3412);
    }

    #[test]
    fn test_parse_empty_success_response() {
        let response = parse_response(b"=\r").unwrap();
        assert_eq!(response.payload.as_bytes(), b"");
    }

    #[test]
    fn test_parse_controller_error() {
        let err = parse_response(b"!2\r").unwrap_err();
        assert!(matches!(
            err,
            SynScanError::Controller(ErrorCode::MotorNotStopped)
        ));

        let err = parse_response(b"!00\r").unwrap_err();
        assert!(matches!(
            err,
            SynScanError::Controller(ErrorCode::UnknownCommand)
        ));
    }

    #[test]
    fn test_parse_unrecognized_error_code() {
        let err = parse_response(b"!9\r").unwrap_err();
        assert!(matches!(err, SynScanError::Protocol(_)));
    }

    #[test]
    fn test_parse_invalid_framing() {
        assert!(matches!(
            parse_response(b"X\r").unwrap_err(),
            SynScanError::Protocol(_)
        ));
        assert!(matches!(
            parse_response(b"=1234").unwrap_err(),
            SynScanError::Protocol(_)
        ));
        assert!(matches!(
            parse_response(b"").unwrap_err(),
            SynScanError::Protocol(_)
        ));
    }

    #[test]
    fn test_parse_odd_length_payload_is_malformed() {
        let err = parse_response(b"=123\r").unwrap_err();
        assert!(matches!(err, SynScanError::Protocol(_)));
    }

    #[test]
    fn test_wire_code_tables_are_inverses() {
        for channel in Channel::iter() {
            assert_eq!(Channel::from_code(channel.code()), Some(channel));
        }
        for command in Command::iter() {
            assert_eq!(Command::from_code(command.code()), Some(command));
        }
        for code in ErrorCode::iter() {
            assert_eq!(ErrorCode::from_value(code.value()), Some(code));
        }
        assert_eq!(Command::from_code(b'z'), None);
        assert_eq!(ErrorCode::from_value(6), None);
    }
}
