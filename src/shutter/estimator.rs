//! # Position Estimator
//!
//! Per-channel motion simulation. Between two status reports the estimator
//! assumes the motor travelled at constant speed in its last known direction:
//!
//! ```text
//! delta = 100 * elapsed / travel_duration
//! ```
//!
//! ## Status transitions
//!
//! | Status | Motion | Position / target | Poll cadence | Monitoring | Jammed |
//! |--------|--------|-------------------|--------------|------------|--------|
//! | BOTTOM_POS_STOP | stopped | 0 / 0 | default | off | no |
//! | TOP_POS_STOP | stopped | 100 / 100 | default | off | no |
//! | (START_)MOVING_DOWN | decreasing | kept | moving | kept | no |
//! | (START_)MOVING_UP | increasing | kept | moving | kept | no |
//! | BLOCKING, OVERHEATED | stopped | kept | default | off | yes |
//! | STOP_UNDEFINED_POS | stopped | target := position | default | off | no |
//! | anything else | stopped | kept | default | kept | no |
//!
//! While monitoring a move it started itself towards an intermediate target,
//! the estimator asks for a STOP once the estimate reaches the target. End
//! positions (0 and 100) are left to the motor's own end-stop reports.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info};

use super::{ChannelStatus, MotionState};
use crate::easy::channels::Channel;
use crate::easy::protocol::{MotorAction, MotorStatus};
use crate::error::{EleroBridgeError, Result};

/// Lowest valid position
pub const POSITION_MIN: f64 = 0.0;
/// Highest valid position
pub const POSITION_MAX: f64 = 100.0;

/// Per-channel motion parameters
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    /// Time for a full 0 -> 100 traversal; zero disables extrapolation
    pub travel_duration: Duration,
    /// Dead time after START_MOVE_* before the shutter actually moves
    pub start_delay: Duration,
    /// Report `100 - position` so that 100 means closed
    pub reverse: bool,
    /// Poll cadence while stopped
    pub default_interval: Duration,
    /// Poll cadence while moving
    pub moving_interval: Duration,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            travel_duration: Duration::from_millis(20_000),
            start_delay: Duration::ZERO,
            reverse: false,
            default_interval: Duration::from_millis(5_000),
            moving_interval: Duration::from_millis(1_500),
        }
    }
}

/// Result of feeding one status report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessOutcome {
    /// The estimate reached an intermediate target: send an urgent STOP
    pub stop_requested: bool,
}

/// Estimated state of one shutter
#[derive(Debug)]
pub struct PositionEstimator {
    channel: Channel,
    name: String,
    config: EstimatorConfig,

    last_position: f64,
    target_position: f64,
    motion: MotionState,
    jammed: bool,
    /// Set while a move we commanded is in progress; a move started from a
    /// wall switch is never interrupted
    monitoring: bool,
    held: bool,
    last_status: Instant,
    reporting_interval: Duration,

    last_info: String,
}

impl PositionEstimator {
    /// Create an estimator for a closed, stopped shutter
    ///
    /// # Arguments
    ///
    /// * `channel` - Stick channel of the motor
    /// * `name` - Display name used in log lines
    /// * `config` - Travel time, direction and poll cadences
    /// * `now` - Baseline for the first elapsed-time computation
    pub fn new(channel: Channel, name: &str, config: EstimatorConfig, now: Instant) -> Self {
        let reporting_interval = config.default_interval;
        Self {
            channel,
            name: name.to_string(),
            config,
            last_position: POSITION_MIN,
            target_position: POSITION_MIN,
            motion: MotionState::Stopped,
            jammed: false,
            monitoring: false,
            held: false,
            last_status: now,
            reporting_interval,
            last_info: String::new(),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Estimated position in motor terms (0 = bottom end stop)
    pub fn last_position(&self) -> f64 {
        self.last_position
    }

    /// Target in motor terms
    pub fn target_position(&self) -> f64 {
        self.target_position
    }

    pub fn motion(&self) -> MotionState {
        self.motion
    }

    pub fn is_jammed(&self) -> bool {
        self.jammed
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    /// Poll cadence this channel currently wants
    pub fn reporting_interval(&self) -> Duration {
        self.reporting_interval
    }

    /// Snapshot in the caller's orientation (reverse applied)
    pub fn status(&self) -> ChannelStatus {
        let motion = if self.config.reverse {
            self.motion.reversed()
        } else {
            self.motion
        };

        ChannelStatus {
            channel: self.channel.number(),
            name: self.name.clone(),
            position: self.external(self.last_position),
            target: self.external(self.target_position),
            motion,
            jammed: self.jammed,
            held: self.held,
        }
    }

    /// Feed a status report received at `now`
    ///
    /// Advances the estimate for the time spent moving since the previous
    /// report, then applies the status transition.
    ///
    /// # Returns
    ///
    /// * `ProcessOutcome` - Whether the caller must stop the motor now
    pub fn process_state(&mut self, status: MotorStatus, now: Instant) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::default();
        let mut new_position = self.last_position;
        let mut new_target = self.target_position;

        self.jammed = false;

        if self.motion != MotionState::Stopped {
            if let Some(position) = self.extrapolate(now) {
                new_position = position;
                self.apply_position(position);

                if self.monitoring && self.is_intermediate_target() && self.reached(position) {
                    debug!(channel = %self.channel, position, target = self.target_position,
                        "Intermediate target reached, stopping");
                    outcome.stop_requested = true;
                }
            }
        }

        // A report inside the start dead time keeps the postponed baseline
        let mut baseline = now.max(self.last_status);

        let (motion, interval) = match status {
            MotorStatus::BottomPositionStop => {
                new_position = POSITION_MIN;
                new_target = POSITION_MIN;
                self.monitoring = false;
                (MotionState::Stopped, self.config.default_interval)
            }
            MotorStatus::TopPositionStop => {
                new_position = POSITION_MAX;
                new_target = POSITION_MAX;
                self.monitoring = false;
                (MotionState::Stopped, self.config.default_interval)
            }
            MotorStatus::StartMoveDown => {
                baseline = now + self.config.start_delay;
                (MotionState::Decreasing, self.config.moving_interval)
            }
            MotorStatus::MovingDown => (MotionState::Decreasing, self.config.moving_interval),
            MotorStatus::StartMoveUp => {
                baseline = now + self.config.start_delay;
                (MotionState::Increasing, self.config.moving_interval)
            }
            MotorStatus::MovingUp => (MotionState::Increasing, self.config.moving_interval),
            MotorStatus::Blocking | MotorStatus::Overheated => {
                self.jammed = true;
                self.monitoring = false;
                (MotionState::Stopped, self.config.default_interval)
            }
            MotorStatus::StopUndefinedPosition => {
                new_target = new_position;
                self.monitoring = false;
                (MotionState::Stopped, self.config.default_interval)
            }
            _ => (MotionState::Stopped, self.config.default_interval),
        };

        self.last_status = baseline;

        self.apply_target(new_target);
        self.apply_position(new_position);
        self.motion = motion;
        self.reporting_interval = interval;

        debug!(channel = %self.channel, "Updating reportingInterval to {:?}", interval);
        self.log_summary();

        outcome
    }

    /// User asks for a target position (caller's orientation)
    ///
    /// # Returns
    ///
    /// * `Result<Option<MotorAction>>` - Command to send, `None` if the
    ///   shutter is already there
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` for values outside 0-100; nothing changes.
    pub fn set_target_position(&mut self, position: f64) -> Result<Option<MotorAction>> {
        validate_position(position)?;

        let target = self.external(position);
        debug!(channel = %self.channel, "Set TargetPosition: {}", position);

        self.target_position = target;
        self.held = false;

        let action = if target < self.last_position || target <= POSITION_MIN {
            Some(MotorAction::Down)
        } else if target > self.last_position || target >= POSITION_MAX {
            Some(MotorAction::Up)
        } else {
            None
        };

        if action.is_some() {
            self.reporting_interval = self.config.moving_interval;
            self.monitoring = true;
        }

        Ok(action)
    }

    /// User asks to stop wherever the shutter is
    pub fn hold_position(&mut self) -> MotorAction {
        debug!(channel = %self.channel, "Set HoldPosition");
        self.held = true;
        self.monitoring = false;
        MotorAction::Stop
    }

    /// Seed the estimate with a known position (caller's orientation),
    /// e.g. one remembered from a previous run
    ///
    /// # Errors
    ///
    /// Returns `InvalidPosition` for values outside 0-100; the previous
    /// estimate is kept.
    pub fn restore_position(&mut self, position: f64) -> Result<()> {
        if let Err(e) = validate_position(position) {
            error!(channel = %self.channel, name = %self.name,
                "Updating lastPosition with illegal value: {}", position);
            return Err(e);
        }

        let internal = self.external(position);
        self.last_position = internal;
        self.target_position = internal;
        Ok(())
    }

    /// Position reached after travelling from the last baseline until `now`
    fn extrapolate(&self, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.last_status);
        if elapsed.is_zero() || self.config.travel_duration.is_zero() {
            return None;
        }

        let delta = 100.0 * elapsed.as_secs_f64() / self.config.travel_duration.as_secs_f64();
        let direction = match self.motion {
            MotionState::Decreasing => -1.0,
            _ => 1.0,
        };

        Some((self.last_position + direction * delta).clamp(POSITION_MIN, POSITION_MAX))
    }

    fn is_intermediate_target(&self) -> bool {
        self.target_position > POSITION_MIN && self.target_position < POSITION_MAX
    }

    fn reached(&self, position: f64) -> bool {
        match self.motion {
            MotionState::Increasing => position >= self.target_position,
            MotionState::Decreasing => position <= self.target_position,
            MotionState::Stopped => false,
        }
    }

    fn apply_position(&mut self, value: f64) {
        if validate_position(value).is_ok() {
            self.last_position = value;
        } else {
            error!(channel = %self.channel, name = %self.name,
                "Updating lastPosition with illegal value: {}", value);
        }
    }

    fn apply_target(&mut self, value: f64) {
        if validate_position(value).is_ok() {
            self.target_position = value;
        } else {
            error!(channel = %self.channel, name = %self.name,
                "Updating currentTargetPosition with illegal value: {}", value);
        }
    }

    /// Map between motor and caller orientation (the mapping is its own inverse)
    fn external(&self, value: f64) -> f64 {
        if self.config.reverse {
            POSITION_MAX - value
        } else {
            value
        }
    }

    /// Log a one-line summary, only when it changed
    fn log_summary(&mut self) {
        let label = if self.jammed {
            "JAMMED"
        } else {
            match self.motion {
                MotionState::Decreasing => "CLOSING",
                MotionState::Increasing => "OPENING",
                MotionState::Stopped => "STOPPED",
            }
        };

        let info = format!(
            "[{}] {} {} [{:.0}]",
            self.channel, self.name, label, self.last_position
        );

        if info != self.last_info {
            info!("{}", info);
            self.last_info = info;
        }
    }
}

fn validate_position(value: f64) -> Result<()> {
    if (POSITION_MIN..=POSITION_MAX).contains(&value) {
        Ok(())
    } else {
        Err(EleroBridgeError::InvalidPosition(value))
    }
}
