//! # Error Types
//!
//! Custom error types for Elero Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for Elero Bridge
#[derive(Debug, Error)]
pub enum EleroBridgeError {
    /// Easy protocol errors (framing, checksum, unknown datagram shape)
    #[error("Easy protocol error: {0}")]
    Protocol(String),

    /// Channel number outside the stick's 0-14 range
    #[error("Invalid channel: {0} (must be 0-14)")]
    InvalidChannel(u8),

    /// Command line typed by the user that could not be parsed
    #[error("Invalid command: {0}")]
    InvalidIntent(String),

    /// Position outside 0-100%
    #[error("Invalid position: {0} (must be 0-100)")]
    InvalidPosition(f64),

    /// Serial transport errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial ports could be opened
    #[error("No Elero stick found (tried: {0})")]
    SerialPortNotFound(String),

    /// The stick controller task has shut down
    #[error("Stick controller is no longer running")]
    StickUnavailable,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Status journal serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Elero Bridge
pub type Result<T> = std::result::Result<T, EleroBridgeError>;
