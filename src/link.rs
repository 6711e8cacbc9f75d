//! # Vehicle link
//!
//! The link is the transport to the vehicle-control service. Messages are
//! already decoded: [Uplink] is what the ground sends, [Downlink] what the
//! vehicle reports. Wire encoding is the link implementation's business.
//!
//! Links are opened from a connection string by a [LinkContext]. The only
//! transport shipped with the crate is the in-process [simulator](crate::sim):
//!
//! - `sim://<lat>,<lon>` starts a new simulated vehicle with home at the given
//!   position,
//! - `sim://instance/<n>` attaches to a simulator previously started with
//!   [LinkContext::start_sitl()].

use crate::geo::Location;
use crate::mission::Waypoint;
use crate::sim::{SimConfig, SimLink};
use crate::{Error, Result};
use async_trait::async_trait;
use num_enum::{FromPrimitive, IntoPrimitive};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering::Relaxed};
use std::sync::{Mutex, PoisonError};

const SIM_SCHEME: &str = "sim://";
const SIM_INSTANCE_PREFIX: &str = "instance/";

/// Autopilot flight mode, numbered as ArduCopter custom modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FlightMode {
    /// Follow the uploaded mission
    Auto = 3,
    /// Accept direct commands from the ground
    Guided = 4,
    /// Descend and land at the current position
    Land = 9,
    /// Any mode this crate does not drive
    #[num_enum(default)]
    Unknown = 255,
}

impl std::fmt::Display for FlightMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlightMode::Auto => "AUTO",
            FlightMode::Guided => "GUIDED",
            FlightMode::Land => "LAND",
            FlightMode::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Mission transaction acknowledged by the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionOp {
    /// All mission items removed
    Clear,
    /// New mission items stored
    Upload,
}

/// Outcome of a mission transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionResult {
    /// Stored
    Accepted,
    /// The vehicle cannot hold that many items
    NoSpace,
    /// Not accepted while armed
    Denied,
    /// Malformed mission (empty, bad sequence)
    Invalid,
}

impl std::fmt::Display for MissionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            MissionResult::Accepted => "accepted",
            MissionResult::NoSpace => "vehicle rejected the waypoint count",
            MissionResult::Denied => "vehicle rejected the mission while armed",
            MissionResult::Invalid => "vehicle rejected a malformed mission",
        };
        f.write_str(reason)
    }
}

/// Message sent to the vehicle
#[derive(Debug, Clone, PartialEq)]
pub enum Uplink {
    /// Switch flight mode, numeric custom mode
    SetMode(u8),
    /// Arm (true) or disarm (false) the motors
    Arm(bool),
    /// Climb vertically to the given relative altitude, GUIDED only
    Takeoff(f64),
    /// Write the groundspeed attribute, m/s
    SetGroundspeed(f64),
    /// Speed change command, m/s, honoured in every mode
    ChangeSpeed(f64),
    /// Remove all mission items
    MissionClear,
    /// Replace the mission items
    MissionUpload(Vec<Waypoint>),
    /// Set the autopilot waypoint cursor (0 is home)
    SetCurrentWaypoint(u16),
}

/// Message reported by the vehicle
#[derive(Debug, Clone, PartialEq)]
pub enum Downlink {
    /// Periodic status
    Heartbeat {
        /// Pre-arm checks passed
        armable: bool,
        /// Motors armed
        armed: bool,
        /// Numeric custom mode, see [FlightMode]
        custom_mode: u8,
    },
    /// Global position, altitude relative to home
    Position {
        /// Position of the vehicle
        location: Location,
        /// Airspeed in m/s
        airspeed: f64,
    },
    /// Current autopilot waypoint index (0 is home)
    MissionCurrent(u16),
    /// Answer to a mission transaction
    MissionAck(MissionOp, MissionResult),
}

/// Connection to a vehicle
#[async_trait]
pub trait Link: Send + Sync {
    /// Send a message, fails with [Error::Disconnected] once the link is closed
    async fn send(&self, message: Uplink) -> Result<()>;
    /// Receive the next message, fails with [Error::Disconnected] once the link is closed
    async fn recv(&self) -> Result<Downlink>;
    /// Close the link, further send and recv fail
    async fn close(&self);
}

/// Opens links from connection strings
///
/// Keeps track of the simulators started on it until a link attaches to them.
#[derive(Debug, Default)]
pub struct LinkContext {
    simulators: Mutex<BTreeMap<u32, SimLink>>,
    next_instance: AtomicU32,
}

impl LinkContext {
    /// New context without any simulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a simulated vehicle at `home` and return its connection string.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_sitl(&self, home: Location, config: SimConfig) -> String {
        let instance = self.next_instance.fetch_add(1, Relaxed);
        let link = SimLink::start(home, config);
        self.simulators
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(instance, link);

        format!("{}{}{}", SIM_SCHEME, SIM_INSTANCE_PREFIX, instance)
    }

    /// Open a link to the vehicle at `uri`
    ///
    /// Returns [Error::ConnectionError] if no transport handles the uri or if
    /// the simulator it names does not exist or is already attached.
    pub async fn open_link(&self, uri: &str) -> Result<Box<dyn Link>> {
        let unreachable = |reason: &str| Error::ConnectionError(format!("{} '{}'", reason, uri));

        let target = uri
            .strip_prefix(SIM_SCHEME)
            .ok_or_else(|| unreachable("no transport available for"))?;

        if let Some(instance) = target.strip_prefix(SIM_INSTANCE_PREFIX) {
            let instance: u32 = instance
                .parse()
                .map_err(|_| unreachable("invalid simulator instance in"))?;
            let link = self
                .simulators
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&instance)
                .ok_or_else(|| unreachable("no simulator listening at"))?;
            return Ok(Box::new(link));
        }

        let home = parse_home(target)
            .ok_or_else(|| unreachable("invalid simulator home in"))?;
        Ok(Box::new(SimLink::start(home, SimConfig::default())))
    }
}

fn parse_home(target: &str) -> Option<Location> {
    let (lat, lon) = target.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }
    Some(Location::new(lat, lon))
}
