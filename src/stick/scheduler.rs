//! # Send Scheduler
//!
//! Serializes outgoing commands so the stick only ever sees one datagram in
//! flight.
//!
//! ```text
//!            submit()                      submit() -> queue
//!   IDLE ─────────────► BUSY ◄──────────────────────┐
//!     ▲   (write now)    │ │                        │
//!     │                  │ └────────────────────────┘
//!     │  send_next()     │ send_next() with queue non-empty
//!     └──────────────────┘ -> write head, stay BUSY
//!       queue empty or
//!       write failure
//! ```
//!
//! `send_next` is driven by the controller when the pacing deadline passes
//! and whenever a response datagram arrives, whichever happens first.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error};

use crate::easy::encoder::encode_command;
use crate::easy::protocol::{format_datagram, Command, Priority};
use crate::error::{EleroBridgeError, Result};
use crate::serial::port_trait::TransportWriter;

/// Default minimum delay between two datagrams
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(250);

/// Whether a command is currently in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Busy,
}

/// Owns the transport's write half and the pending command queue
pub struct SendScheduler {
    writer: Option<TransportWriter>,
    queue: VecDeque<Command>,
    state: SchedulerState,
    send_interval: Duration,
    deadline: Option<Instant>,
    debug_serial: bool,
}

impl std::fmt::Debug for SendScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendScheduler")
            .field("state", &self.state)
            .field("queued", &self.queue.len())
            .field("send_interval", &self.send_interval)
            .field("deadline", &self.deadline)
            .field("connected", &self.writer.is_some())
            .finish()
    }
}

impl SendScheduler {
    /// Create an idle scheduler without a transport
    ///
    /// # Arguments
    ///
    /// * `send_interval` - Pacing delay armed after every write
    /// * `debug_serial` - Log every datagram written
    pub fn new(send_interval: Duration, debug_serial: bool) -> Self {
        Self {
            writer: None,
            queue: VecDeque::new(),
            state: SchedulerState::Idle,
            send_interval,
            deadline: None,
            debug_serial,
        }
    }

    /// Install the write half of a freshly opened transport
    pub fn attach(&mut self, writer: TransportWriter) {
        self.writer = Some(writer);
    }

    /// Drop the write half after the transport closed
    pub fn detach(&mut self) {
        self.writer = None;
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Number of commands waiting behind the one in flight
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// When the pacing timer expires, if armed
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Submit a command
    ///
    /// Writes immediately when idle. When busy, urgent commands jump to the
    /// head of the queue and normal ones join the tail.
    ///
    /// # Errors
    ///
    /// Returns the write error if an immediate write fails. The command is
    /// dropped and the scheduler returns to idle.
    pub async fn submit(&mut self, command: Command) -> Result<()> {
        if self.state == SchedulerState::Busy {
            match command.priority {
                Priority::Urgent => self.queue.push_front(command),
                Priority::Normal => self.queue.push_back(command),
            }
            debug!(queued = self.queue.len(), "Stick busy, queued {:?}", command.kind);
            return Ok(());
        }

        self.state = SchedulerState::Busy;
        self.transmit(command).await
    }

    /// Write the next queued command, or go idle if there is none
    ///
    /// Calling this while idle with an empty queue is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the write error if the queued command could not be written.
    pub async fn send_next(&mut self) -> Result<()> {
        match self.queue.pop_front() {
            Some(command) => {
                self.state = SchedulerState::Busy;
                self.transmit(command).await
            }
            None => {
                self.state = SchedulerState::Idle;
                self.deadline = None;
                Ok(())
            }
        }
    }

    /// True once the armed pacing deadline has passed
    pub fn pacing_elapsed(&self, now: Instant) -> bool {
        self.deadline.map_or(false, |deadline| now >= deadline)
    }

    async fn transmit(&mut self, command: Command) -> Result<()> {
        let datagram = encode_command(&command);

        if let Err(e) = self.write(&datagram).await {
            self.state = SchedulerState::Idle;
            self.deadline = None;
            error!("Error on write: {}", e);
            return Err(e);
        }

        if self.debug_serial {
            debug!("Sent datagram {}", format_datagram(&datagram));
        }

        self.deadline = Some(Instant::now() + self.send_interval);
        Ok(())
    }

    async fn write(&mut self, datagram: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| EleroBridgeError::Serial("Stick is not connected".to_string()))?;

        writer
            .write_all(datagram)
            .await
            .map_err(|e| EleroBridgeError::Serial(format!("Failed to write datagram: {}", e)))?;

        writer
            .flush()
            .await
            .map_err(|e| EleroBridgeError::Serial(format!("Failed to flush serial port: {}", e)))?;

        Ok(())
    }
}
