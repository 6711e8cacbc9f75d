//! # Mission builder
//!
//! A [Mission] is a flat, ordered list of [Waypoint]s. Its last waypoint is a
//! sentinel: a point the vehicle is never meant to reach. The autopilot moving
//! on to the sentinel is how the tour detects that the real legs are done.
//!
//! ## Waypoint numbering
//!
//! Waypoints carry zero-based, dense sequence numbers. The autopilot reports
//! its current target with index 0 reserved for the home position, so the
//! waypoint with `seq = i` is reported as index `i + 1`. Use
//! [Mission::target_for()] to map an autopilot index back to a waypoint.

use crate::geo::{self, Location};
use crate::{Error, Result};
use log::debug;

/// Number of real waypoints in the tour built by [build_mission()].
///
/// The monitoring loop leaves the mission once the autopilot index reaches
/// `NUM_WAYPOINTS + 1`, i.e. when the sentinel becomes the current target.
pub const NUM_WAYPOINTS: u16 = 1;

/// Offset, in degrees on both axes, of the sentinel from the destination.
pub const SENTINEL_OFFSET_DEG: f64 = -1.0;

/// Mission waypoint, immutable once uploaded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Altitude above home in metres, `0.0` holds the current altitude
    pub altitude: f64,
    /// Zero-based position in the mission
    pub seq: u16,
}

impl Waypoint {
    /// Position of the waypoint
    pub fn location(&self) -> Location {
        Location {
            lat: self.latitude,
            lon: self.longitude,
            alt: self.altitude,
        }
    }
}

/// Ordered list of waypoints ending with the sentinel
#[derive(Debug, Clone, PartialEq)]
pub struct Mission {
    waypoints: Vec<Waypoint>,
}

impl Mission {
    /// Create a mission from waypoints, the last one being the sentinel.
    ///
    /// Returns [Error::InvalidMission] if the list is empty or if the sequence
    /// numbers are not `0, 1, 2, ...` in order.
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self> {
        if waypoints.is_empty() {
            return Err(Error::InvalidMission("a mission needs at least one waypoint".into()));
        }
        if waypoints.len() > u16::MAX as usize {
            return Err(Error::InvalidMission(format!("too many waypoints: {}", waypoints.len())));
        }
        for (i, wp) in waypoints.iter().enumerate() {
            if wp.seq as usize != i {
                return Err(Error::InvalidMission(format!(
                    "waypoint {} has sequence number {}",
                    i, wp.seq
                )));
            }
        }
        Ok(Self { waypoints })
    }

    /// All waypoints, sentinel included, in traversal order
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// Number of waypoints, sentinel included
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Always false, a mission is never empty
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// The sentinel waypoint
    pub fn sentinel(&self) -> &Waypoint {
        // Mission::new() guarantees a non-empty list
        &self.waypoints[self.waypoints.len() - 1]
    }

    /// Number of waypoints the vehicle is meant to reach (sentinel excluded)
    pub fn num_waypoints(&self) -> u16 {
        (self.waypoints.len() - 1) as u16
    }

    /// Autopilot index at which the sentinel becomes the current target
    pub fn exit_index(&self) -> u16 {
        self.num_waypoints() + 1
    }

    /// Waypoint targeted when the autopilot reports `next_index`.
    ///
    /// Index 0 is the home position and returns `None`, as does an index past
    /// the end of the mission.
    pub fn target_for(&self, next_index: u16) -> Option<&Waypoint> {
        if next_index == 0 {
            return None;
        }
        self.waypoints.get(next_index as usize - 1)
    }
}

/// Build the engineering quad tour: fly to `destination`, then bail out as
/// soon as the autopilot heads for the sentinel placed 1° south-west of it.
///
/// `start` is only used to report the length of the leg.
pub fn build_mission(start: &Location, destination: &Location) -> Mission {
    debug!(
        "Building tour, leg length {:.1}m",
        geo::distance(start, destination)
    );

    let waypoints = vec![
        Waypoint {
            latitude: destination.lat,
            longitude: destination.lon,
            altitude: 0.0,
            seq: 0,
        },
        // Sentinel, its position only needs to be far away
        Waypoint {
            latitude: destination.lat + SENTINEL_OFFSET_DEG,
            longitude: destination.lon + SENTINEL_OFFSET_DEG,
            altitude: 0.0,
            seq: 1,
        },
    ];

    Mission { waypoints }
}
