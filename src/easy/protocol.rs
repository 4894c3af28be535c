//! # Easy Protocol Constants and Types
//!
//! Core definitions for the Elero Transmitter Stick "Easy" command set.
//!
//! Every datagram has the layout:
//!
//! ```text
//! [0xAA] [length] [opcode] [payload...] [checksum]
//! ```
//!
//! where `length` counts the bytes after itself, from the opcode up to and
//! including the checksum, so a datagram is `1 + length + 1` bytes long. The
//! checksum makes the byte sum of the whole datagram zero modulo 256.

use super::channels::{Channel, ChannelSet};

/// Start marker of every Easy datagram
pub const EASY_HEADER: u8 = 0xAA;

/// Longest datagram the stick ever sends (Easy_Ack: 7 bytes)
pub const MAX_DATAGRAM_LEN: usize = 7;

/// Easy_Check: ask the stick which channels are learned
pub const EASY_CHECK: u8 = 0x4A;
/// Easy_Confirm: answer to Easy_Check carrying the learned channels
pub const EASY_CONFIRM: u8 = 0x4B;
/// Easy_Send: motor command for a set of channels
pub const EASY_SEND: u8 = 0x4C;
/// Easy_Ack: motor status for one or more channels
pub const EASY_ACK: u8 = 0x4D;
/// Easy_Info: request the status of a set of channels
pub const EASY_INFO: u8 = 0x4E;

/// Length field of an Easy_Check datagram (opcode + checksum)
pub const EASY_CHECK_LEN: u8 = 0x02;
/// Length field of Easy_Info / Easy_Confirm datagrams
pub const EASY_CHANNELS_LEN: u8 = 0x04;
/// Length field of Easy_Send / Easy_Ack datagrams
pub const EASY_CHANNELS_STATE_LEN: u8 = 0x05;

/// Hex dump used by serial debug logging, e.g. `[aa 02 4a 0a]`
pub fn format_datagram(data: &[u8]) -> String {
    let bytes: Vec<String> = data.iter().map(|b| format!("{:02x}", b)).collect();
    format!("[{}]", bytes.join(" "))
}

/// Motor action carried in the last payload byte of Easy_Send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MotorAction {
    /// Drive to the top end position
    Up = 0x20,
    /// Drive to the programmed intermediate position
    Intermediate = 0x44,
    /// Drive to the programmed ventilation/tilt position
    Ventilation = 0x24,
    /// Drive to the bottom end position
    Down = 0x40,
    /// Stop immediately
    Stop = 0x10,
}

impl MotorAction {
    /// Opcode byte written to the wire
    pub fn opcode(self) -> u8 {
        self as u8
    }
}

/// Motor status reported in an Easy_Ack datagram
///
/// Unknown codes are kept as [`MotorStatus::Unknown`] rather than rejected,
/// newer motors report states this table does not list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorStatus {
    NoInformation,
    TopPositionStop,
    BottomPositionStop,
    IntermediatePositionStop,
    TiltPositionStop,
    Blocking,
    Overheated,
    Timeout,
    StartMoveUp,
    StartMoveDown,
    MovingUp,
    MovingDown,
    StopUndefinedPosition,
    TopVentilationPositionStop,
    BottomIntermediatePositionStop,
    SwitchingDeviceOff,
    SwitchingDeviceOn,
    Unknown(u8),
}

impl MotorStatus {
    /// Map a raw state byte to a status
    pub fn from_byte(value: u8) -> Self {
        match value {
            0x00 => Self::NoInformation,
            0x01 => Self::TopPositionStop,
            0x02 => Self::BottomPositionStop,
            0x03 => Self::IntermediatePositionStop,
            0x04 => Self::TiltPositionStop,
            0x05 => Self::Blocking,
            0x06 => Self::Overheated,
            0x07 => Self::Timeout,
            0x08 => Self::StartMoveUp,
            0x09 => Self::StartMoveDown,
            0x0A => Self::MovingUp,
            0x0B => Self::MovingDown,
            0x0D => Self::StopUndefinedPosition,
            0x0E => Self::TopVentilationPositionStop,
            0x0F => Self::BottomIntermediatePositionStop,
            0x10 => Self::SwitchingDeviceOff,
            0x11 => Self::SwitchingDeviceOn,
            other => Self::Unknown(other),
        }
    }

    /// Raw state byte as seen on the wire
    pub fn to_byte(self) -> u8 {
        match self {
            Self::NoInformation => 0x00,
            Self::TopPositionStop => 0x01,
            Self::BottomPositionStop => 0x02,
            Self::IntermediatePositionStop => 0x03,
            Self::TiltPositionStop => 0x04,
            Self::Blocking => 0x05,
            Self::Overheated => 0x06,
            Self::Timeout => 0x07,
            Self::StartMoveUp => 0x08,
            Self::StartMoveDown => 0x09,
            Self::MovingUp => 0x0A,
            Self::MovingDown => 0x0B,
            Self::StopUndefinedPosition => 0x0D,
            Self::TopVentilationPositionStop => 0x0E,
            Self::BottomIntermediatePositionStop => 0x0F,
            Self::SwitchingDeviceOff => 0x10,
            Self::SwitchingDeviceOn => 0x11,
            Self::Unknown(value) => value,
        }
    }
}

/// Priority of a queued command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Appended to the tail of the send queue
    Normal,
    /// Inserted at the head of the send queue
    Urgent,
}

/// What a command asks the stick to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Easy_Send: move/stop the given channels
    Send {
        channels: ChannelSet,
        action: MotorAction,
    },
    /// Easy_Info: request the status of a single channel
    ///
    /// The stick answers batched info requests with a single Easy_Ack, so
    /// callers request one channel at a time.
    Info { channel: Channel },
    /// Easy_Check: request the set of learned channels
    Check,
}

/// A command waiting to be written to the stick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub priority: Priority,
}

impl Command {
    /// Motor command; always urgent so it never waits behind polls
    pub fn send(channels: ChannelSet, action: MotorAction) -> Self {
        Self {
            kind: CommandKind::Send { channels, action },
            priority: Priority::Urgent,
        }
    }

    /// Status request for one channel
    pub fn info(channel: Channel) -> Self {
        Self {
            kind: CommandKind::Info { channel },
            priority: Priority::Normal,
        }
    }

    /// Learned-channel discovery request
    pub fn check() -> Self {
        Self {
            kind: CommandKind::Check,
            priority: Priority::Normal,
        }
    }

    pub fn is_urgent(&self) -> bool {
        self.priority == Priority::Urgent
    }
}
