//! # Stick Controller Module
//!
//! Runs the Elero Transmitter Stick connection as a single tokio task.
//!
//! This module handles:
//! - Opening the transport and reopening it every time it closes
//! - Framing and decoding the incoming byte stream
//! - Publishing discovery and per-channel status events
//! - Accepting motor, info and discovery commands through [`StickHandle`]
//!
//! All mutation of the transport and the send queue happens inside the
//! controller task, so ordering is that of the request channel.
//!
//! ## Usage
//!
//! ```no_run
//! use elero_bridge::easy::channels::ChannelSet;
//! use elero_bridge::serial::SerialConnector;
//! use elero_bridge::stick::{StickController, StickEvent, StickSettings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let connector = SerialConnector::new("/dev/ttyUSB0", 38_400);
//!     let (stick, mut events) = StickController::spawn(connector, StickSettings::default());
//!
//!     stick.request_discovery().await?;
//!     while let Some(event) = events.recv().await {
//!         if let StickEvent::Discovered(channels) = event {
//!             stick.request_info(channels).await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod scheduler;

use std::io;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use crate::easy::channels::{Channel, ChannelSet};
use crate::easy::decoder::{decode_response, Response};
use crate::easy::framer::FrameDecoder;
use crate::easy::protocol::{format_datagram, Command, MotorAction, MotorStatus};
use crate::error::{EleroBridgeError, Result};
use crate::serial::port_trait::{Connector, TransportReader};
use scheduler::{SendScheduler, DEFAULT_SEND_INTERVAL};

/// Size of a single read from the transport
const READ_BUFFER_SIZE: usize = 64;

/// Notification published by the stick controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickEvent {
    /// The stick reported its learned channels
    Discovered(ChannelSet),
    /// The stick reported the state of one channel
    Status {
        channel: Channel,
        status: MotorStatus,
    },
}

/// Tuning knobs for the controller task
#[derive(Debug, Clone)]
pub struct StickSettings {
    /// Minimum delay between two datagrams
    pub send_interval: Duration,
    /// Delay before retrying a failed reopen
    pub reconnect_interval: Duration,
    /// Log raw serial traffic
    pub debug_serial: bool,
    /// Capacity of the event channel
    pub event_capacity: usize,
}

impl Default for StickSettings {
    fn default() -> Self {
        Self {
            send_interval: DEFAULT_SEND_INTERVAL,
            reconnect_interval: Duration::from_millis(1000),
            debug_serial: false,
            event_capacity: 64,
        }
    }
}

/// Request travelling from a handle to the controller task
#[derive(Debug)]
struct Submit {
    command: Command,
    reply: oneshot::Sender<Result<()>>,
}

/// Cloneable handle used to send commands to the stick
#[derive(Debug, Clone)]
pub struct StickHandle {
    requests: mpsc::UnboundedSender<Submit>,
    port: String,
}

impl StickHandle {
    /// Description of the transport this handle talks to
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Move the given channels up
    pub async fn command_up(&self, channels: ChannelSet) -> Result<()> {
        debug!(%channels, "commandUp");
        self.motor(channels, MotorAction::Up).await
    }

    /// Move the given channels down
    pub async fn command_down(&self, channels: ChannelSet) -> Result<()> {
        debug!(%channels, "commandDown");
        self.motor(channels, MotorAction::Down).await
    }

    /// Stop the given channels
    pub async fn command_stop(&self, channels: ChannelSet) -> Result<()> {
        debug!(%channels, "commandStop");
        self.motor(channels, MotorAction::Stop).await
    }

    /// Drive the given channels to their intermediate position
    pub async fn command_intermediate(&self, channels: ChannelSet) -> Result<()> {
        debug!(%channels, "commandIntermediatePosition");
        self.motor(channels, MotorAction::Intermediate).await
    }

    /// Drive the given channels to their ventilation position
    pub async fn command_ventilation(&self, channels: ChannelSet) -> Result<()> {
        debug!(%channels, "commandVentilationPosition");
        self.motor(channels, MotorAction::Ventilation).await
    }

    /// Request the status of each channel
    ///
    /// Queues one request per channel since the stick only acknowledges one
    /// channel at a time. An empty set means all 15 channels.
    pub async fn request_info(&self, channels: ChannelSet) -> Result<()> {
        let channels = if channels.is_empty() {
            ChannelSet::all()
        } else {
            channels
        };
        debug!(%channels, "easyInfo");

        for channel in channels.iter() {
            self.submit(Command::info(channel)).await?;
        }
        Ok(())
    }

    /// Ask the stick which channels it has learned
    pub async fn request_discovery(&self) -> Result<()> {
        debug!("easyCheck");
        self.submit(Command::check()).await
    }

    async fn motor(&self, channels: ChannelSet, action: MotorAction) -> Result<()> {
        if channels.is_empty() {
            warn!("Ignoring {:?} without channels", action);
            return Ok(());
        }
        self.submit(Command::send(channels, action)).await
    }

    /// Hand a command to the controller and wait until it is written or queued
    async fn submit(&self, command: Command) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Submit { command, reply })
            .map_err(|_| EleroBridgeError::StickUnavailable)?;

        response
            .await
            .map_err(|_| EleroBridgeError::StickUnavailable)?
    }
}

/// The controller task state
pub struct StickController<C: Connector> {
    connector: C,
    scheduler: SendScheduler,
    framer: FrameDecoder,
    reader: Option<TransportReader>,
    reconnect_at: Option<Instant>,
    requests: mpsc::UnboundedReceiver<Submit>,
    events: mpsc::Sender<StickEvent>,
    settings: StickSettings,
    channels: ChannelSet,
}

impl<C: Connector> StickController<C> {
    /// Start the controller task
    ///
    /// # Arguments
    ///
    /// * `connector` - Opens the transport, now and after every close
    /// * `settings` - Pacing, reconnect and logging settings
    ///
    /// # Returns
    ///
    /// * `(StickHandle, Receiver<StickEvent>)` - Command handle and event stream
    ///
    /// The task stops once every handle is dropped.
    pub fn spawn(connector: C, settings: StickSettings) -> (StickHandle, mpsc::Receiver<StickEvent>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(settings.event_capacity.max(1));

        let handle = StickHandle {
            requests: request_tx,
            port: connector.describe(),
        };

        let controller = Self {
            connector,
            scheduler: SendScheduler::new(settings.send_interval, settings.debug_serial),
            framer: FrameDecoder::new(),
            reader: None,
            reconnect_at: None,
            requests: request_rx,
            events: event_tx,
            settings,
            channels: ChannelSet::empty(),
        };

        tokio::spawn(controller.run());

        (handle, event_rx)
    }

    async fn run(mut self) {
        self.connect();

        let mut buf = [0u8; READ_BUFFER_SIZE];

        loop {
            let pacing = self.scheduler.deadline();
            let reconnect = self.reconnect_at;

            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Submit { command, reply }) => {
                        let result = self.scheduler.submit(command).await;
                        let _ = reply.send(result);
                    }
                    None => {
                        debug!("All stick handles dropped, stopping controller");
                        break;
                    }
                },

                read = read_some(&mut self.reader, &mut buf) => match read {
                    Ok(0) => self.transport_closed("end of stream".to_string()).await,
                    Ok(n) => self.incoming(&buf[..n]).await,
                    Err(e) => self.transport_closed(e.to_string()).await,
                },

                _ = sleep_until(pacing.unwrap_or_else(Instant::now)), if pacing.is_some() => {
                    if let Err(e) = self.scheduler.send_next().await {
                        warn!("Dropped queued command: {}", e);
                    }
                }

                _ = sleep_until(reconnect.unwrap_or_else(Instant::now)), if reconnect.is_some() => {
                    self.reconnect_at = None;
                    self.connect();
                }
            }
        }
    }

    /// Open the transport, or schedule another attempt
    fn connect(&mut self) {
        match self.connector.open() {
            Ok(transport) => {
                info!("Serial port connected: {}", self.connector.describe());
                self.reader = Some(transport.reader);
                self.scheduler.attach(transport.writer);
            }
            Err(e) => {
                warn!(
                    "Failed to open {}: {}, retrying in {:?}",
                    self.connector.describe(),
                    e,
                    self.settings.reconnect_interval
                );
                self.reconnect_at = Some(Instant::now() + self.settings.reconnect_interval);
            }
        }
    }

    async fn transport_closed(&mut self, reason: String) {
        debug!("Serial port closed ({})", reason);

        if let Some(partial) = self.framer.finish() {
            self.handle_frame(&partial).await;
        }

        self.reader = None;
        self.scheduler.detach();
        self.connect();
    }

    async fn incoming(&mut self, chunk: &[u8]) {
        if self.settings.debug_serial {
            trace!("Received data from elero stick: {}", format_datagram(chunk));
        }

        let frames: Vec<Vec<u8>> = self.framer.feed(chunk).collect();
        for frame in frames {
            self.handle_frame(&frame).await;
        }
    }

    async fn handle_frame(&mut self, frame: &[u8]) {
        if self.settings.debug_serial {
            debug!("Incoming data: {}", format_datagram(frame));
        }

        let response = match decode_response(frame) {
            Ok(response) => response,
            Err(e) => {
                warn!("Discarding {}: {}", format_datagram(frame), e);
                return;
            }
        };

        match response {
            Response::Discovery { channels } => {
                info!("Stick reported channels: {}", channels);
                self.channels = channels;
                self.publish(StickEvent::Discovered(channels)).await;
            }
            Response::Status { .. } => {
                for (channel, status) in response.status_reports() {
                    if !self.channels.is_empty() && !self.channels.contains(channel) {
                        debug!(%channel, "Status for a channel the stick did not report as learned");
                    }
                    debug!(%channel, "Status of channel: {:?}", status);
                    self.publish(StickEvent::Status { channel, status }).await;
                }
            }
        }

        // A response frees the stick; don't wait for the pacing timer
        if let Err(e) = self.scheduler.send_next().await {
            warn!("Dropped queued command: {}", e);
        }
    }

    async fn publish(&mut self, event: StickEvent) {
        if self.events.send(event).await.is_err() {
            trace!("No subscriber for {:?}", event);
        }
    }
}

async fn read_some(reader: &mut Option<TransportReader>, buf: &mut [u8]) -> io::Result<usize> {
    match reader {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::easy::checksum::checksum;
    use crate::serial::port_trait::{MockConnector, Transport};
    use mockall::Sequence;
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn ch(n: u8) -> Channel {
        Channel::new(n).unwrap()
    }

    fn with_checksum(data: &[u8]) -> Vec<u8> {
        let mut datagram = data.to_vec();
        datagram.push(checksum(data));
        datagram
    }

    fn settings(send_interval: Duration) -> StickSettings {
        StickSettings {
            send_interval,
            reconnect_interval: Duration::from_millis(10),
            debug_serial: true,
            event_capacity: 16,
        }
    }

    /// Controller wired to one in-memory pipe; returns the stick side
    fn spawn_with_pipe(
        send_interval: Duration,
    ) -> (StickHandle, mpsc::Receiver<StickEvent>, DuplexStream) {
        let (local, remote) = tokio::io::duplex(256);

        let mut connector = MockConnector::new();
        connector
            .expect_open()
            .times(1)
            .return_once(move || Ok(Transport::from_stream(local)));
        connector.expect_describe().return_const("mock".to_string());

        let (handle, events) = StickController::spawn(connector, settings(send_interval));
        (handle, events, remote)
    }

    async fn next_event(events: &mut mpsc::Receiver<StickEvent>) -> StickEvent {
        timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn read_datagram(remote: &mut DuplexStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        timeout(WAIT, remote.read_exact(&mut buf))
            .await
            .expect("timed out waiting for datagram")
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_discovery_datagram_yields_one_event() {
        let (_stick, mut events, mut remote) = spawn_with_pipe(DEFAULT_SEND_INTERVAL);

        remote
            .write_all(&with_checksum(&[0xAA, 0x04, 0x4B, 0x01, 0x00]))
            .await
            .unwrap();

        // High byte 0x01 is channel 8
        assert_eq!(
            next_event(&mut events).await,
            StickEvent::Discovered(ChannelSet::from_channels([ch(8)]))
        );
        assert!(events.try_recv().is_err(), "exactly one event expected");
    }

    #[tokio::test]
    async fn test_status_datagram_yields_status_event() {
        let (_stick, mut events, mut remote) = spawn_with_pipe(DEFAULT_SEND_INTERVAL);

        remote
            .write_all(&with_checksum(&[0xAA, 0x05, 0x4D, 0x00, 0x01, 0x02]))
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut events).await,
            StickEvent::Status {
                channel: ch(0),
                status: MotorStatus::BottomPositionStop
            }
        );
    }

    #[tokio::test]
    async fn test_repeated_discovery_is_reported_twice() {
        let (_stick, mut events, mut remote) = spawn_with_pipe(DEFAULT_SEND_INTERVAL);
        let confirm = with_checksum(&[0xAA, 0x04, 0x4B, 0x00, 0x01]);

        remote.write_all(&confirm).await.unwrap();
        remote.write_all(&confirm).await.unwrap();

        let first = next_event(&mut events).await;
        let second = next_event(&mut events).await;
        assert_eq!(first, StickEvent::Discovered(ChannelSet::from_channels([ch(0)])));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_noise_is_discarded() {
        let (_stick, mut events, mut remote) = spawn_with_pipe(DEFAULT_SEND_INTERVAL);

        let mut stream = vec![0x00, 0x13, 0xFF];
        // Well-framed but wrong checksum
        stream.extend_from_slice(&[0xAA, 0x04, 0x4B, 0x00, 0x01, 0x00]);
        stream.extend_from_slice(&with_checksum(&[0xAA, 0x05, 0x4D, 0x00, 0x04, 0x01]));
        remote.write_all(&stream).await.unwrap();

        assert_eq!(
            next_event(&mut events).await,
            StickEvent::Status {
                channel: ch(2),
                status: MotorStatus::TopPositionStop
            }
        );
    }

    #[tokio::test]
    async fn test_command_up_writes_easy_send() {
        let (stick, _events, mut remote) = spawn_with_pipe(DEFAULT_SEND_INTERVAL);

        stick
            .command_up(ChannelSet::from_channels([ch(0)]))
            .await
            .unwrap();

        assert_eq!(
            read_datagram(&mut remote, 7).await,
            vec![0xAA, 0x05, 0x4C, 0x00, 0x01, 0x20, 0xE4]
        );
    }

    #[tokio::test]
    async fn test_request_info_polls_every_channel_separately() {
        let (stick, _events, mut remote) = spawn_with_pipe(Duration::from_millis(1));

        stick.request_info(ChannelSet::empty()).await.unwrap();

        for n in 0..=14u8 {
            let datagram = read_datagram(&mut remote, 6).await;
            let (high, low) = ChannelSet::from_channels([ch(n)]).to_bytes();
            assert_eq!(&datagram[..5], &[0xAA, 0x04, 0x4E, high, low], "channel {}", n);
        }
    }

    #[tokio::test]
    async fn test_response_releases_next_command_early() {
        // Pacing long enough that only the response can advance the queue
        let (stick, _events, mut remote) = spawn_with_pipe(Duration::from_secs(60));

        stick.request_discovery().await.unwrap();
        stick.request_info(ChannelSet::from_channels([ch(3)])).await.unwrap();

        assert_eq!(read_datagram(&mut remote, 4).await, vec![0xAA, 0x02, 0x4A, 0x0A]);

        remote
            .write_all(&with_checksum(&[0xAA, 0x04, 0x4B, 0x00, 0x08]))
            .await
            .unwrap();

        let info = read_datagram(&mut remote, 6).await;
        assert_eq!(&info[..5], &[0xAA, 0x04, 0x4E, 0x00, 0x08]);
    }

    #[tokio::test]
    async fn test_empty_motor_command_is_ignored() {
        let (stick, _events, mut remote) = spawn_with_pipe(DEFAULT_SEND_INTERVAL);

        stick.command_stop(ChannelSet::empty()).await.unwrap();
        stick.request_discovery().await.unwrap();

        // The first thing on the wire is the discovery request
        assert_eq!(read_datagram(&mut remote, 4).await, vec![0xAA, 0x02, 0x4A, 0x0A]);
    }

    #[tokio::test]
    async fn test_reconnects_after_close() {
        let (first_local, first_remote) = tokio::io::duplex(64);
        let (second_local, mut second_remote) = tokio::io::duplex(64);

        let mut seq = Sequence::new();
        let mut connector = MockConnector::new();
        connector
            .expect_open()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(move || Ok(Transport::from_stream(first_local)));
        connector
            .expect_open()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(|| Err(EleroBridgeError::Serial("busy".to_string())));
        connector
            .expect_open()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(move || Ok(Transport::from_stream(second_local)));
        connector.expect_describe().return_const("mock".to_string());

        let (_stick, mut events) =
            StickController::spawn(connector, settings(DEFAULT_SEND_INTERVAL));

        // Unplug
        drop(first_remote);

        second_remote
            .write_all(&with_checksum(&[0xAA, 0x04, 0x4B, 0x00, 0x03]))
            .await
            .unwrap();

        assert_eq!(
            next_event(&mut events).await,
            StickEvent::Discovered(ChannelSet::from_channels([ch(0), ch(1)]))
        );
    }

    #[tokio::test]
    async fn test_write_error_reaches_caller_while_disconnected() {
        let mut connector = MockConnector::new();
        connector
            .expect_open()
            .returning(|| Err(EleroBridgeError::Serial("absent".to_string())));
        connector.expect_describe().return_const("mock".to_string());

        let (stick, events) = StickController::spawn(connector, settings(DEFAULT_SEND_INTERVAL));
        assert_eq!(stick.port(), "mock");
        drop(events);

        // Not connected: the write fails and the error reaches the caller
        match stick.request_discovery().await {
            Err(EleroBridgeError::Serial(_)) => {}
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }
}
