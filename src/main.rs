//! # Elero Bridge
//!
//! Drive Elero RF blind motors through an Elero Transmitter Stick.
//!
//! The application opens the stick's serial port, discovers the learned
//! channels, keeps a position estimate for every shutter and accepts simple
//! commands on stdin:
//!
//! ```text
//! set 3 40     drive channel 3 to 40%
//! hold 3       stop channel 3 where it is
//! ```
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- config/default.toml
//! RUST_LOG=elero_bridge=debug cargo run
//! ```

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use elero_bridge::bridge::{Bridge, BridgeHandle, Intent};
use elero_bridge::config::{Config, LoggingConfig};
use elero_bridge::serial::SerialConnector;
use elero_bridge::stick::StickController;
use elero_bridge::telemetry::StatusJournal;

/// Configuration file used when none is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// `serial.port` value that tries the usual device paths
const AUTO_DETECT_PORT: &str = "auto";

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&path).with_context(|| format!("Failed to load {}", path))?;

    // Keep the guard alive so buffered file output is flushed on exit
    let _guard = init_logging(&config.logging);

    info!("Elero Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let connector = if config.serial.port == AUTO_DETECT_PORT {
        SerialConnector::auto_detect(config.serial.baud_rate)
    } else {
        SerialConnector::new(&config.serial.port, config.serial.baud_rate)
    };

    let (stick, events) = StickController::spawn(connector, config.stick_settings());
    info!("Using Elero stick at {}", stick.port());

    let journal = if config.telemetry.enabled {
        Some(StatusJournal::open(&config.telemetry).context("Failed to open status journal")?)
    } else {
        None
    };

    let (mut bridge, intents) = Bridge::new(config, stick);
    if let Some(journal) = journal {
        bridge = bridge.with_journal(journal);
    }

    tokio::spawn(read_intents(intents));

    info!("Press Ctrl+C to exit");

    tokio::select! {
        _ = bridge.run(events) => {
            info!("Stick controller stopped");
        }

        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    Ok(())
}

/// Install the tracing subscriber
///
/// Logs go to stderr, and additionally to a daily rolling file when a log
/// directory is configured. `RUST_LOG` overrides the default `info` level.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "elero-bridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();

            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// Forward commands typed on stdin to the bridge
async fn read_intents(bridge: BridgeHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Intent>() {
            Ok(intent) => {
                if bridge.send(intent).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!("{} (expected 'set <channel> <0-100>' or 'hold <channel>')", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_file_is_valid() {
        let config = Config::load(DEFAULT_CONFIG_PATH).unwrap();
        assert_eq!(config.serial.baud_rate, 38_400);
        assert!(!config.motors.is_empty());
    }

    #[test]
    fn test_auto_detect_keyword() {
        assert_eq!(AUTO_DETECT_PORT, "auto");
    }
}
