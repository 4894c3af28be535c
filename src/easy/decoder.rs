//! # Easy Response Decoder
//!
//! Decodes framed datagrams from the stick into typed responses. Only two
//! response shapes exist; anything else is noise on the line.

use super::channels::{Channel, ChannelSet};
use super::checksum::{byte_sum, is_valid};
use super::protocol::*;
use crate::error::{EleroBridgeError, Result};

/// A validated response from the stick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Easy_Ack (`AA 05 4D hi lo state cs`): one status for every listed channel
    Status {
        channels: ChannelSet,
        status: MotorStatus,
    },
    /// Easy_Confirm (`AA 04 4B hi lo cs`): the full set of learned channels
    Discovery { channels: ChannelSet },
}

impl Response {
    /// Per-channel status reports carried by this response
    ///
    /// Empty for discovery responses.
    pub fn status_reports(&self) -> Vec<(Channel, MotorStatus)> {
        match *self {
            Self::Status { channels, status } => channels.iter().map(|c| (c, status)).collect(),
            Self::Discovery { .. } => Vec::new(),
        }
    }
}

/// Decode a framed datagram
///
/// # Arguments
///
/// * `datagram` - One frame produced by the framer
///
/// # Returns
///
/// * `Result<Response>` - Decoded response, or error if invalid
///
/// # Errors
///
/// Returns `Protocol` if:
/// - The byte sum is not zero
/// - The header byte is not `0xAA`
/// - The `(length, opcode)` pair is not a known response shape
///
/// These errors are recoverable line noise; callers log and carry on.
pub fn decode_response(datagram: &[u8]) -> Result<Response> {
    if datagram.len() < 3 {
        return Err(EleroBridgeError::Protocol(format!(
            "Datagram too short: {} bytes",
            datagram.len()
        )));
    }

    if !is_valid(datagram) {
        return Err(EleroBridgeError::Protocol(format!(
            "Invalid checksum: byte sum 0x{:02X}",
            byte_sum(datagram)
        )));
    }

    if datagram[0] != EASY_HEADER {
        return Err(EleroBridgeError::Protocol(format!(
            "Invalid header byte: 0x{:02X}",
            datagram[0]
        )));
    }

    match (datagram[1], datagram[2]) {
        (EASY_CHANNELS_STATE_LEN, EASY_ACK) if datagram.len() >= 7 => Ok(Response::Status {
            channels: ChannelSet::from_bytes(datagram[3], datagram[4]),
            status: MotorStatus::from_byte(datagram[5]),
        }),
        (EASY_CHANNELS_LEN, EASY_CONFIRM) if datagram.len() >= 6 => Ok(Response::Discovery {
            channels: ChannelSet::from_bytes(datagram[3], datagram[4]),
        }),
        (length, opcode) => Err(EleroBridgeError::Protocol(format!(
            "Unknown datagram shape: length 0x{:02X}, opcode 0x{:02X}",
            length, opcode
        ))),
    }
}
