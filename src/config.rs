//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::bridge::AccessoryKind;
use crate::easy::channels::MAX_CHANNEL;
use crate::error::{EleroBridgeError, Result};
use crate::serial::STICK_BAUD_RATE;
use crate::shutter::estimator::EstimatorConfig;
use crate::stick::StickSettings;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub motors: Vec<MotorConfig>,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Device path, or `auto` to try the usual USB serial paths
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default)]
    pub debug_serial: bool,
}

/// Status polling cadence
#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    #[serde(default = "default_moving_update_interval_ms")]
    pub moving_update_interval_ms: u64,

    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

/// One motor learned on the stick
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MotorConfig {
    pub channel: u8,

    #[serde(rename = "type", default)]
    pub kind: AccessoryKind,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub display_name: Option<String>,

    /// Full travel time; 0 disables position extrapolation
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,

    #[serde(default)]
    pub start_delay_ms: u64,

    #[serde(default)]
    pub reverse: bool,
}

/// Status journal configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Also write a daily rolling log file into this directory
    #[serde(default)]
    pub directory: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { STICK_BAUD_RATE }
fn default_send_interval_ms() -> u64 { 250 }
fn default_reconnect_interval_ms() -> u64 { 1000 }

fn default_update_interval_ms() -> u64 { 5000 }
fn default_moving_update_interval_ms() -> u64 { 1500 }
fn default_min_interval_ms() -> u64 { 500 }

fn default_duration_ms() -> u64 { 10_000 }
/// Travel time assumed for a discovered channel without a `[[motors]]` entry
fn default_discovered_duration_ms() -> u64 { 20_000 }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            send_interval_ms: default_send_interval_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            debug_serial: false,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: default_update_interval_ms(),
            moving_update_interval_ms: default_moving_update_interval_ms(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            polling: PollingConfig::default(),
            motors: Vec::new(),
            telemetry: TelemetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MotorConfig {
    /// Settings used for a discovered channel without a `[[motors]]` entry
    pub fn default_for(channel: u8) -> Self {
        Self {
            channel,
            kind: AccessoryKind::default(),
            name: None,
            display_name: None,
            duration_ms: default_discovered_duration_ms(),
            start_delay_ms: 0,
            reverse: false,
        }
    }

    /// Name shown in logs and status updates
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| format!("Channel {}", self.channel))
    }

    pub fn estimator_config(&self, polling: &PollingConfig) -> EstimatorConfig {
        EstimatorConfig {
            travel_duration: Duration::from_millis(self.duration_ms),
            start_delay: Duration::from_millis(self.start_delay_ms),
            reverse: self.reverse,
            default_interval: polling.default_interval(),
            moving_interval: polling.moving_interval(),
        }
    }
}

impl PollingConfig {
    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn moving_interval(&self) -> Duration {
        Duration::from_millis(self.moving_update_interval_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use elero_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Controller task settings derived from `[serial]`
    pub fn stick_settings(&self) -> StickSettings {
        StickSettings {
            send_interval: Duration::from_millis(self.serial.send_interval_ms),
            reconnect_interval: Duration::from_millis(self.serial.reconnect_interval_ms),
            debug_serial: self.serial.debug_serial,
            ..StickSettings::default()
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if self.serial.baud_rate == 0 {
            return Err(invalid("baud_rate must be greater than 0"));
        }

        if self.serial.send_interval_ms == 0 || self.serial.send_interval_ms > 10000 {
            return Err(invalid("send_interval_ms must be between 1 and 10000"));
        }

        if self.serial.reconnect_interval_ms == 0 || self.serial.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        // Polling cadence
        if self.polling.update_interval_ms == 0 {
            return Err(invalid("update_interval_ms must be greater than 0"));
        }

        if self.polling.moving_update_interval_ms == 0 {
            return Err(invalid("moving_update_interval_ms must be greater than 0"));
        }

        if self.polling.moving_update_interval_ms > self.polling.update_interval_ms {
            return Err(invalid(
                "moving_update_interval_ms cannot be larger than update_interval_ms",
            ));
        }

        if self.polling.min_interval_ms == 0 {
            return Err(invalid("min_interval_ms must be greater than 0"));
        }

        // Motors
        let mut seen = [false; MAX_CHANNEL as usize + 1];
        for motor in &self.motors {
            if motor.channel > MAX_CHANNEL {
                return Err(invalid(format!(
                    "motor channel {} out of range (0-{})",
                    motor.channel, MAX_CHANNEL
                )));
            }

            let slot = &mut seen[motor.channel as usize];
            if *slot {
                return Err(invalid(format!(
                    "motor channel {} configured more than once",
                    motor.channel
                )));
            }
            *slot = true;
        }

        // Status journal
        if self.telemetry.enabled {
            if self.telemetry.log_dir.is_empty() {
                return Err(invalid("telemetry log_dir cannot be empty when enabled"));
            }

            if self.telemetry.max_records_per_file == 0 {
                return Err(invalid("max_records_per_file must be greater than 0"));
            }

            if self.telemetry.max_files_to_keep == 0 {
                return Err(invalid("max_files_to_keep must be greater than 0"));
            }
        }

        Ok(())
    }
}

fn invalid<T: std::fmt::Display>(message: T) -> EleroBridgeError {
    EleroBridgeError::Config(toml::de::Error::custom(message))
}
