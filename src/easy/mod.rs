//! # Easy Protocol Module
//!
//! Implementation of the Elero Transmitter Stick "Easy" serial protocol.
//!
//! This module handles:
//! - Framing the raw serial byte stream into datagrams
//! - Additive sum-to-zero checksum
//! - Channel bitmask encoding (15 channels in two bytes)
//! - Encoding motor, info and check commands
//! - Decoding status and discovery responses

pub mod protocol;
pub mod channels;
pub mod checksum;
pub mod framer;
pub mod encoder;
pub mod decoder;
