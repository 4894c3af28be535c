//! # Channel Bitmask Codec
//!
//! The stick addresses up to 15 learned motors. A set of channels travels as
//! two bytes:
//!
//! | Byte | Bits | Channels |
//! |------|------|----------|
//! | high | 0-6  | 8-14     |
//! | low  | 0-7  | 0-7      |
//!
//! Bit 7 of the high byte is unused and ignored on decode.

use std::fmt;

use crate::error::{EleroBridgeError, Result};

/// Highest channel number the stick can learn
pub const MAX_CHANNEL: u8 = 14;

/// Number of addressable channels
pub const NUM_CHANNELS: usize = 15;

const CHANNEL_MASK: u16 = 0x7FFF;

/// A single motor address on the stick (0-14)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel(u8);

impl Channel {
    /// Validate a raw channel number
    ///
    /// # Errors
    ///
    /// Returns `InvalidChannel` for values above 14
    pub fn new(value: u8) -> Result<Self> {
        if value > MAX_CHANNEL {
            return Err(EleroBridgeError::InvalidChannel(value));
        }
        Ok(Self(value))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    fn bit(self) -> u16 {
        1 << self.0
    }
}

impl TryFrom<u8> for Channel {
    type Error = EleroBridgeError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A set of channels, stored as the 15-bit wire mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChannelSet(u16);

impl ChannelSet {
    /// The empty set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// All 15 channels
    pub const fn all() -> Self {
        Self(CHANNEL_MASK)
    }

    /// Build a set from individual channels
    pub fn from_channels<I: IntoIterator<Item = Channel>>(channels: I) -> Self {
        channels.into_iter().collect()
    }

    /// Decode the `(high, low)` byte pair from a datagram
    pub fn from_bytes(high: u8, low: u8) -> Self {
        Self(u16::from_be_bytes([high, low]) & CHANNEL_MASK)
    }

    /// Encode into the `(high, low)` byte pair used on the wire
    pub fn to_bytes(self) -> (u8, u8) {
        let [high, low] = self.0.to_be_bytes();
        (high, low)
    }

    pub fn insert(&mut self, channel: Channel) {
        self.0 |= channel.bit();
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.0 & channel.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Channels in ascending order
    pub fn iter(&self) -> impl Iterator<Item = Channel> + '_ {
        let mask = self.0;
        (0..=MAX_CHANNEL)
            .filter(move |n| mask & (1 << n) != 0)
            .map(Channel)
    }
}

impl FromIterator<Channel> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = Channel>>(iter: I) -> Self {
        let mut set = Self::empty();
        for channel in iter {
            set.insert(channel);
        }
        set
    }
}

impl fmt::Display for ChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numbers: Vec<String> = self.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", numbers.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(n: u8) -> Channel {
        Channel::new(n).unwrap()
    }

    #[test]
    fn test_channel_range() {
        assert!(Channel::new(0).is_ok());
        assert!(Channel::new(14).is_ok());
        match Channel::new(15) {
            Err(EleroBridgeError::InvalidChannel(15)) => {}
            other => panic!("Expected InvalidChannel(15), got: {:?}", other),
        }
    }

    #[test]
    fn test_low_channels_use_low_byte() {
        let set = ChannelSet::from_channels([ch(0), ch(7)]);
        assert_eq!(set.to_bytes(), (0x00, 0x81));
    }

    #[test]
    fn test_high_channels_use_high_byte() {
        let set = ChannelSet::from_channels([ch(8), ch(14)]);
        assert_eq!(set.to_bytes(), (0x41, 0x00));
    }

    #[test]
    fn test_all_channels() {
        assert_eq!(ChannelSet::all().to_bytes(), (0x7F, 0xFF));
        assert_eq!(ChannelSet::all().len(), NUM_CHANNELS);
    }

    #[test]
    fn test_decode_ignores_unused_high_bit() {
        let set = ChannelSet::from_bytes(0x80, 0x01);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![ch(0)]);
    }

    #[test]
    fn test_every_subset_survives_the_wire() {
        for mask in 0u16..=CHANNEL_MASK {
            let channels: Vec<Channel> = (0..=MAX_CHANNEL)
                .filter(|n| mask & (1 << n) != 0)
                .map(ch)
                .collect();

            let (high, low) = ChannelSet::from_channels(channels.iter().copied()).to_bytes();
            let decoded: Vec<Channel> = ChannelSet::from_bytes(high, low).iter().collect();

            assert_eq!(decoded, channels, "mask 0x{:04X}", mask);
        }
    }

    #[test]
    fn test_iter_is_ascending() {
        let set = ChannelSet::from_channels([ch(12), ch(3), ch(9)]);
        let numbers: Vec<u8> = set.iter().map(Channel::number).collect();
        assert_eq!(numbers, vec![3, 9, 12]);
        assert_eq!(set.to_string(), "[3, 9, 12]");
    }

    #[test]
    fn test_empty_set() {
        let set = ChannelSet::empty();
        assert!(set.is_empty());
        assert_eq!(set.to_bytes(), (0, 0));
        assert!(!set.contains(ch(0)));
    }
}
