//! # Elero Bridge Library
//!
//! Drive Elero RF blind motors through an Elero Transmitter Stick.
//!
//! This library provides the Easy protocol codec, the serial stick
//! controller, per-channel position estimation and the glue that ties them
//! together.

pub mod bridge;
pub mod config;
pub mod easy;
pub mod error;
pub mod serial;
pub mod shutter;
pub mod stick;
pub mod telemetry;
