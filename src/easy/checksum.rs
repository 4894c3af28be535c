//! # Easy Protocol Checksum
//!
//! The stick uses a plain additive checksum: the final byte is chosen so the
//! sum of every byte in the datagram is `0` modulo 256.

/// Sum of all bytes modulo 256
///
/// A well-formed datagram (checksum byte included) sums to `0`.
pub fn byte_sum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte))
}

/// Checksum byte to append after `data`
///
/// # Arguments
///
/// * `data` - Datagram bytes from the header up to the last payload byte
///
/// # Returns
///
/// * `u8` - `0x100 - (sum & 0xFF)`, truncated to a byte
///
/// # Examples
///
/// ```
/// use elero_bridge::easy::checksum::{checksum, byte_sum};
///
/// let data = [0xAA, 0x02, 0x4A];
/// let cs = checksum(&data);
/// assert_eq!(cs, 0x0A);
/// assert_eq!(byte_sum(&[0xAA, 0x02, 0x4A, cs]), 0);
/// ```
pub fn checksum(data: &[u8]) -> u8 {
    0u8.wrapping_sub(byte_sum(data))
}

/// True if `datagram` (checksum included) sums to zero
pub fn is_valid(datagram: &[u8]) -> bool {
    byte_sum(datagram) == 0
}
