//! # Serial Communication Module
//!
//! Handles serial communication with the Elero Transmitter Stick.
//!
//! This module handles:
//! - Opening the stick's USB serial port at 38,400 baud (8N1)
//! - Splitting the port into independent read and write halves
//! - Reopening the port whenever the stick controller asks for it

pub mod port_trait;

use crate::error::{EleroBridgeError, Result};
use port_trait::{Connector, Transport};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Baud rate of the Elero Transmitter Stick
pub const STICK_BAUD_RATE: u32 = 38_400;

/// Default stick device paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // FTDI-based stick
    "/dev/ttyACM0", // USB CDC adapters
];

/// Connector that opens the stick's serial port
///
/// Tries each candidate path in order and keeps the first one that opens.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    /// Device paths to try
    paths: Vec<String>,
    /// Baud rate to configure
    baud_rate: u32,
}

impl SerialConnector {
    /// Connector for a single configured device path
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use elero_bridge::serial::SerialConnector;
    /// use elero_bridge::serial::port_trait::Connector;
    ///
    /// let mut connector = SerialConnector::new("/dev/ttyUSB0", 38_400);
    /// let transport = connector.open()?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(path: &str, baud_rate: u32) -> Self {
        Self {
            paths: vec![path.to_string()],
            baud_rate,
        }
    }

    /// Connector that tries the default device paths
    pub fn auto_detect(baud_rate: u32) -> Self {
        Self::with_paths(DEFAULT_DEVICE_PATHS, baud_rate)
    }

    /// Connector that tries custom device paths
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyUSB0"])
    /// * `baud_rate` - Serial speed
    pub fn with_paths(paths: &[&str], baud_rate: u32) -> Self {
        Self {
            paths: paths.iter().map(|p| p.to_string()).collect(),
            baud_rate,
        }
    }

    /// Open a specific serial port with stick settings
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g., "/dev/ttyUSB0")
    /// * `baud_rate` - Serial speed
    ///
    /// # Returns
    ///
    /// * `Result<SerialStream>` - Opened serial port
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| EleroBridgeError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }
}

impl Connector for SerialConnector {
    fn open(&mut self) -> Result<Transport> {
        for path in &self.paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, self.baud_rate) {
                Ok(port) => {
                    info!("Successfully opened Elero stick at {}", path);
                    return Ok(Transport::from_stream(port));
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(EleroBridgeError::SerialPortNotFound(self.paths.join(", ")))
    }

    fn describe(&self) -> String {
        self.paths.join(" | ")
    }
}
