//! # Easy Command Encoder
//!
//! Encodes [`Command`]s into complete datagrams, checksum included.

use bytes::{BufMut, Bytes, BytesMut};

use super::channels::ChannelSet;
use super::checksum::checksum;
use super::protocol::*;

/// Encode a command into a complete datagram
///
/// # Arguments
///
/// * `command` - Command to encode
///
/// # Returns
///
/// * `Bytes` - Datagram ready to write to the stick
///
/// | Command | Wire format |
/// |---------|-------------|
/// | Send    | `AA 05 4C <hi> <lo> <action> <cs>` |
/// | Info    | `AA 04 4E <hi> <lo> <cs>` |
/// | Check   | `AA 02 4A <cs>` |
///
/// # Examples
///
/// ```
/// use elero_bridge::easy::channels::{Channel, ChannelSet};
/// use elero_bridge::easy::encoder::encode_command;
/// use elero_bridge::easy::protocol::{Command, MotorAction};
///
/// let channels = ChannelSet::from_channels([Channel::new(0)?]);
/// let datagram = encode_command(&Command::send(channels, MotorAction::Up));
/// assert_eq!(&datagram[..], &[0xAA, 0x05, 0x4C, 0x00, 0x01, 0x20, 0xE4]);
/// # Ok::<(), elero_bridge::error::EleroBridgeError>(())
/// ```
pub fn encode_command(command: &Command) -> Bytes {
    let mut datagram = BytesMut::with_capacity(MAX_DATAGRAM_LEN);
    datagram.put_u8(EASY_HEADER);

    match command.kind {
        CommandKind::Send { channels, action } => {
            datagram.put_u8(EASY_CHANNELS_STATE_LEN);
            datagram.put_u8(EASY_SEND);
            put_channels(&mut datagram, channels);
            datagram.put_u8(action.opcode());
        }
        CommandKind::Info { channel } => {
            datagram.put_u8(EASY_CHANNELS_LEN);
            datagram.put_u8(EASY_INFO);
            put_channels(&mut datagram, ChannelSet::from_channels([channel]));
        }
        CommandKind::Check => {
            datagram.put_u8(EASY_CHECK_LEN);
            datagram.put_u8(EASY_CHECK);
        }
    }

    let cs = checksum(&datagram);
    datagram.put_u8(cs);

    datagram.freeze()
}

fn put_channels(datagram: &mut BytesMut, channels: ChannelSet) {
    let (high, low) = channels.to_bytes();
    datagram.put_u8(high);
    datagram.put_u8(low);
}
