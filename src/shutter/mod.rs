//! # Shutter Module
//!
//! Continuous position estimation for Elero window coverings.
//!
//! The stick never reports where a shutter actually is, only discrete motor
//! states (moving up, at the top, blocked, ...). Each channel gets its own
//! [`estimator::PositionEstimator`] that integrates travel time between
//! status reports to produce a 0-100% position.

pub mod estimator;

use std::time::Duration;

use serde::Serialize;

/// Direction of travel as seen from the position value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionState {
    Stopped,
    /// Opening, position growing towards 100
    Increasing,
    /// Closing, position shrinking towards 0
    Decreasing,
}

impl MotionState {
    /// The same movement seen from the other end of the scale
    pub fn reversed(self) -> Self {
        match self {
            Self::Stopped => Self::Stopped,
            Self::Increasing => Self::Decreasing,
            Self::Decreasing => Self::Increasing,
        }
    }
}

/// Externally visible state of one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatus {
    pub channel: u8,
    pub name: String,
    /// Estimated position (0-100%), direction-corrected
    pub position: f64,
    /// Position the shutter is heading for
    pub target: f64,
    pub motion: MotionState,
    pub jammed: bool,
    /// The user asked the shutter to stay where it is
    pub held: bool,
}

/// Delay until the next status poll
///
/// The fastest cadence any channel asks for, never slower than `default`
/// and never faster than `floor`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use elero_bridge::shutter::poll_interval;
///
/// let intervals = [Duration::from_millis(1500), Duration::from_millis(5000)];
/// let next = poll_interval(intervals, Duration::from_millis(5000), Duration::from_millis(500));
/// assert_eq!(next, Duration::from_millis(1500));
/// ```
pub fn poll_interval<I>(reporting_intervals: I, default: Duration, floor: Duration) -> Duration
where
    I: IntoIterator<Item = Duration>,
{
    reporting_intervals
        .into_iter()
        .fold(default, Duration::min)
        .max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: Duration = Duration::from_millis(5000);
    const FLOOR: Duration = Duration::from_millis(500);

    #[test]
    fn test_reversed_motion() {
        assert_eq!(MotionState::Stopped.reversed(), MotionState::Stopped);
        assert_eq!(MotionState::Increasing.reversed(), MotionState::Decreasing);
        assert_eq!(MotionState::Decreasing.reversed(), MotionState::Increasing);
    }

    #[test]
    fn test_poll_interval_without_channels_is_default() {
        assert_eq!(poll_interval(Vec::<Duration>::new(), DEFAULT, FLOOR), DEFAULT);
    }

    #[test]
    fn test_poll_interval_never_exceeds_default() {
        let slow = [Duration::from_secs(60)];
        assert_eq!(poll_interval(slow, DEFAULT, FLOOR), DEFAULT);
    }

    #[test]
    fn test_poll_interval_respects_floor() {
        let fast = [Duration::from_millis(100), Duration::from_millis(1500)];
        assert_eq!(poll_interval(fast, DEFAULT, FLOOR), FLOOR);
    }

    #[test]
    fn test_status_serializes_motion_in_snake_case() {
        let status = ChannelStatus {
            channel: 3,
            name: "Kitchen".to_string(),
            position: 42.0,
            target: 50.0,
            motion: MotionState::Increasing,
            jammed: false,
            held: true,
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"motion\":\"increasing\""));
        assert!(json.contains("\"held\":true"));
    }
}
