//! # Mission configuration
//!
//! The tour constants live here as defaults. The binary overrides some of them
//! from the command line.

use crate::geo::Location;
use std::str::FromStr;
use std::time::Duration;

/// Altitude ceiling in metres
pub const MAX_ALTITUDE: f64 = 10.0;
/// Takeoff altitude in metres
pub const TARGET_ALTITUDE: f64 = 5.0;
/// Commanded groundspeed in AUTO, m/s
pub const GROUNDSPEED: f64 = 1.0;

/// Latitude of the take-off point (Gates building)
pub const START_LAT: f64 = 37.428182;
/// Longitude of the take-off point (Gates building)
pub const START_LONG: f64 = -122.173539;
/// Latitude of the destination (Hewlett building)
pub const DESTINATION_LAT: f64 = 37.428689;
/// Longitude of the destination (Hewlett building)
pub const DESTINATION_LONG: f64 = -122.175781;

/// Takeoff is considered complete at this fraction of the target altitude
pub const TAKEOFF_THRESHOLD: f64 = 0.95;

/// Where the pause flag is honoured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PauseScope {
    /// Only while monitoring the autonomous legs
    #[default]
    Monitoring,
    /// Also before arming, takeoff and mission start
    Mission,
}

impl FromStr for PauseScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "monitoring" => Ok(PauseScope::Monitoring),
            "mission" => Ok(PauseScope::Mission),
            other => Err(format!("unknown pause scope '{}'", other)),
        }
    }
}

/// Bounds of every blocking wait
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeouts {
    /// Link opened until first heartbeat and position
    pub connect: Duration,
    /// Vehicle reporting armable
    pub armable: Duration,
    /// Vehicle reporting armed once armable
    pub arm: Duration,
    /// Climb to the takeoff altitude
    pub takeoff: Duration,
    /// Un-paused time spent monitoring the mission
    pub mission: Duration,
    /// Descent to the ground
    pub landing: Duration,
    /// Mission upload acknowledgement
    pub mission_ack: Duration,
    /// Age after which a position report is stale
    pub telemetry_stale: Duration,
    /// Interval between two reads of a polling loop
    pub poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            armable: Duration::from_secs(60),
            arm: Duration::from_secs(10),
            takeoff: Duration::from_secs(60),
            mission: Duration::from_secs(900),
            landing: Duration::from_secs(120),
            mission_ack: Duration::from_secs(5),
            telemetry_stale: Duration::from_secs(3),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Retry policy for reads hitting a telemetry gap
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled after each one
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry`, counted from 0. Saturates instead of
    /// overflowing.
    pub fn backoff(&self, retry: u32) -> Duration {
        self.initial_backoff.saturating_mul(2u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
        }
    }
}

/// Everything the mission runner needs to know
#[derive(Debug, Clone, PartialEq)]
pub struct MissionConfig {
    /// Altitude ceiling enforced by the watchdog, metres
    pub max_altitude: f64,
    /// Takeoff altitude, metres
    pub target_altitude: f64,
    /// Groundspeed commanded in AUTO, m/s
    pub groundspeed: f64,
    /// Take-off point, also the simulator home
    pub start: Location,
    /// Tour destination
    pub destination: Location,
    /// Altitude at or below which the vehicle is on the ground
    pub ground_altitude: f64,
    /// Delay after subscribing the watchdog before flying
    pub listener_settle: Duration,
    /// Key toggling pause
    pub pause_key: String,
    /// Where pause is honoured
    pub pause_scope: PauseScope,
    /// Wait bounds
    pub timeouts: Timeouts,
    /// Telemetry gap handling
    pub telemetry_retry: RetryPolicy,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            max_altitude: MAX_ALTITUDE,
            target_altitude: TARGET_ALTITUDE,
            groundspeed: GROUNDSPEED,
            start: Location::new(START_LAT, START_LONG),
            destination: Location::new(DESTINATION_LAT, DESTINATION_LONG),
            ground_altitude: 0.0,
            listener_settle: Duration::from_secs(2),
            pause_key: "p".to_owned(),
            pause_scope: PauseScope::default(),
            timeouts: Timeouts::default(),
            telemetry_retry: RetryPolicy::default(),
        }
    }
}
