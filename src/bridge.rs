//! # Bridge Module
//!
//! Glue between the stick controller and the per-channel estimators.
//!
//! This module handles:
//! - Registering one accessory per configured or discovered channel
//! - Polling channel status at the fastest cadence any channel needs
//! - Routing user intents (target position, hold) to motor commands
//! - Fanning out status snapshots to subscribers and the status journal
//!
//! Stick commands are forwarded by a separate dispatch task so the bridge
//! loop never waits on the controller while the controller waits on it.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::{Config, MotorConfig};
use crate::easy::channels::{Channel, ChannelSet};
use crate::easy::protocol::MotorAction;
use crate::error::{EleroBridgeError, Result};
use crate::shutter::estimator::PositionEstimator;
use crate::shutter::{poll_interval, ChannelStatus};
use crate::stick::{StickEvent, StickHandle};
use crate::telemetry::StatusJournal;

/// Capacity of the intent channel
const INTENT_CAPACITY: usize = 32;

/// What kind of window covering sits on a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessoryKind {
    #[default]
    Shutter,
    Shades,
}

impl AccessoryKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Shutter => "shutter",
            Self::Shades => "shades",
        }
    }
}

/// User request for one channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    /// Drive to a position (0-100%)
    SetTarget { channel: Channel, position: f64 },
    /// Stop where it is
    Hold { channel: Channel },
}

impl FromStr for Intent {
    type Err = EleroBridgeError;

    /// Parse `set <channel> <position>` or `hold <channel>`
    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default();

        let channel = words
            .next()
            .and_then(|w| w.parse::<u8>().ok())
            .ok_or_else(|| EleroBridgeError::InvalidIntent(format!("Missing channel in '{}'", line)))
            .and_then(Channel::new)?;

        match verb {
            "set" => {
                let position = words
                    .next()
                    .and_then(|w| w.parse::<f64>().ok())
                    .ok_or_else(|| {
                        EleroBridgeError::InvalidIntent(format!("Missing position in '{}'", line))
                    })?;
                Ok(Self::SetTarget { channel, position })
            }
            "hold" => Ok(Self::Hold { channel }),
            other => Err(EleroBridgeError::InvalidIntent(format!(
                "Unknown command '{}'",
                other
            ))),
        }
    }
}

/// Cloneable handle for submitting intents
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    intents: mpsc::Sender<Intent>,
}

impl BridgeHandle {
    pub async fn set_target_position(&self, channel: Channel, position: f64) -> Result<()> {
        self.send(Intent::SetTarget { channel, position }).await
    }

    pub async fn hold_position(&self, channel: Channel) -> Result<()> {
        self.send(Intent::Hold { channel }).await
    }

    pub async fn send(&self, intent: Intent) -> Result<()> {
        self.intents
            .send(intent)
            .await
            .map_err(|_| EleroBridgeError::StickUnavailable)
    }
}

/// Stick command queued for the dispatch task
#[derive(Debug, Clone, Copy, PartialEq)]
enum Outgoing {
    Motor(ChannelSet, MotorAction),
    Info(ChannelSet),
    Discovery,
}

struct Accessory {
    kind: AccessoryKind,
    estimator: PositionEstimator,
}

/// Per-channel state and the loop that drives it
pub struct Bridge {
    config: Config,
    accessories: BTreeMap<Channel, Accessory>,
    discovered: ChannelSet,
    outbox: mpsc::UnboundedSender<Outgoing>,
    intents: mpsc::Receiver<Intent>,
    subscribers: Vec<mpsc::Sender<ChannelStatus>>,
    journal: Option<StatusJournal>,
}

impl Bridge {
    /// Build the bridge and start forwarding its commands to the stick
    ///
    /// Every `[[motors]]` entry is registered immediately so its status is
    /// tracked even before discovery completes.
    pub fn new(config: Config, stick: StickHandle) -> (Self, BridgeHandle) {
        let (outbox, pending) = mpsc::unbounded_channel();
        let (intent_tx, intents) = mpsc::channel(INTENT_CAPACITY);

        tokio::spawn(dispatch(stick, pending));

        let mut bridge = Self {
            config,
            accessories: BTreeMap::new(),
            discovered: ChannelSet::empty(),
            outbox,
            intents,
            subscribers: Vec::new(),
            journal: None,
        };

        let configured: Vec<MotorConfig> = bridge.config.motors.clone();
        for motor in &configured {
            if let Ok(channel) = Channel::new(motor.channel) {
                bridge.register(channel, motor);
            }
        }

        (bridge, BridgeHandle { intents: intent_tx })
    }

    /// Journal every status update
    pub fn with_journal(mut self, journal: StatusJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Receive every status update
    pub fn subscribe(&mut self, capacity: usize) -> mpsc::Receiver<ChannelStatus> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.subscribers.push(tx);
        rx
    }

    /// Channels with a registered accessory
    pub fn channels(&self) -> ChannelSet {
        self.accessories.keys().copied().collect()
    }

    /// Current snapshot of one channel
    pub fn status(&self, channel: Channel) -> Option<ChannelStatus> {
        self.accessories
            .get(&channel)
            .map(|accessory| accessory.estimator.status())
    }

    /// Run until the stick event stream ends
    ///
    /// Starts with one discovery request and an immediate poll.
    pub async fn run(mut self, mut events: mpsc::Receiver<StickEvent>) {
        self.queue(Outgoing::Discovery);
        let mut next_poll = Instant::now();

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        debug!("Stick event stream closed, stopping bridge");
                        break;
                    }
                },

                Some(intent) = self.intents.recv() => {
                    self.handle_intent(intent);
                    // A new move wants the faster cadence right away
                    next_poll = next_poll.min(Instant::now() + self.poll_interval());
                }

                _ = sleep_until(next_poll) => {
                    self.poll();
                    next_poll = Instant::now() + self.poll_interval();
                }
            }
        }
    }

    fn handle_event(&mut self, event: StickEvent) {
        match event {
            StickEvent::Discovered(channels) => {
                self.discovered = channels;
                for channel in channels.iter() {
                    if !self.accessories.contains_key(&channel) {
                        let motor = MotorConfig::default_for(channel.number());
                        self.register(channel, &motor);
                    }
                }
            }
            StickEvent::Status { channel, status } => {
                let Some(accessory) = self.accessories.get_mut(&channel) else {
                    trace!(%channel, "Status for unregistered channel {:?}", status);
                    return;
                };

                let outcome = accessory.estimator.process_state(status, Instant::now());
                if outcome.stop_requested {
                    self.queue(Outgoing::Motor(
                        ChannelSet::from_channels([channel]),
                        MotorAction::Stop,
                    ));
                }

                self.publish(channel);
            }
        }
    }

    fn handle_intent(&mut self, intent: Intent) {
        let channel = match intent {
            Intent::SetTarget { channel, .. } | Intent::Hold { channel } => channel,
        };

        let Some(accessory) = self.accessories.get_mut(&channel) else {
            warn!(%channel, "No accessory on channel, ignoring {:?}", intent);
            return;
        };

        let action = match intent {
            Intent::SetTarget { position, .. } => {
                match accessory.estimator.set_target_position(position) {
                    Ok(action) => action,
                    Err(e) => {
                        warn!(%channel, "Rejected target: {}", e);
                        return;
                    }
                }
            }
            Intent::Hold { .. } => Some(accessory.estimator.hold_position()),
        };

        match action {
            Some(action) => {
                self.queue(Outgoing::Motor(ChannelSet::from_channels([channel]), action));
            }
            None => debug!(%channel, "Already at target"),
        }

        self.publish(channel);
    }

    fn poll(&mut self) {
        // Before discovery the set is empty and every channel is polled
        self.queue(Outgoing::Info(self.discovered));
    }

    fn poll_interval(&self) -> std::time::Duration {
        let polling = &self.config.polling;
        poll_interval(
            self.accessories
                .values()
                .map(|accessory| accessory.estimator.reporting_interval()),
            polling.default_interval(),
            polling.min_interval(),
        )
    }

    fn register(&mut self, channel: Channel, motor: &MotorConfig) {
        let name = motor.label();
        info!(%channel, kind = motor.kind.label(), "Registering {}", name);

        let estimator = PositionEstimator::new(
            channel,
            &name,
            motor.estimator_config(&self.config.polling),
            Instant::now(),
        );
        self.accessories.insert(
            channel,
            Accessory {
                kind: motor.kind,
                estimator,
            },
        );
    }

    /// Kind of accessory registered on a channel
    pub fn kind(&self, channel: Channel) -> Option<AccessoryKind> {
        self.accessories.get(&channel).map(|accessory| accessory.kind)
    }

    fn publish(&mut self, channel: Channel) {
        let Some(status) = self.status(channel) else {
            return;
        };

        if let Some(journal) = self.journal.as_mut() {
            if let Err(e) = journal.record(&status) {
                warn!("Failed to write status journal: {}", e);
            }
        }

        self.subscribers.retain(|subscriber| match subscriber.try_send(status.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!(%channel, "Subscriber lagging, dropped status update");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    fn queue(&self, outgoing: Outgoing) {
        if self.outbox.send(outgoing).is_err() {
            warn!("Stick dispatcher stopped, dropping {:?}", outgoing);
        }
    }
}

/// Forward queued commands to the stick in order
async fn dispatch(stick: StickHandle, mut pending: mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(outgoing) = pending.recv().await {
        let result = match outgoing {
            Outgoing::Motor(channels, action) => match action {
                MotorAction::Up => stick.command_up(channels).await,
                MotorAction::Down => stick.command_down(channels).await,
                MotorAction::Stop => stick.command_stop(channels).await,
                MotorAction::Intermediate => stick.command_intermediate(channels).await,
                MotorAction::Ventilation => stick.command_ventilation(channels).await,
            },
            Outgoing::Info(channels) => stick.request_info(channels).await,
            Outgoing::Discovery => stick.request_discovery().await,
        };

        match result {
            Ok(()) => {}
            Err(EleroBridgeError::StickUnavailable) => {
                debug!("Stick controller gone, stopping dispatcher");
                break;
            }
            Err(e) => warn!("Failed to send {:?} to {}: {}", outgoing, stick.port(), e),
        }
    }
}
