//! # Quad tour
//!
//! This crate flies a single multirotor through a scripted two-waypoint tour of the engineering quad, enforcing a
//! hard altitude ceiling and allowing the mission to be paused and resumed from the keyboard.
//!
//! ## Status
//!
//! The vehicle-control service is reached through a [Link](link::Link). The only transport shipped with the crate is
//! an in-process [simulator](sim), started automatically when no connection target is given.
//!
//! | Component | Module |
//! |-----------|--------|
//! | Geodesy | [geo] |
//! | Vehicle control | [Vehicle], [subsystems] |
//! | Mission builder | [mission] |
//! | Altitude watchdog | [watchdog] |
//! | Mission state machine | [runner] |
//! | Pause/resume | [pause] |
//!
//! ## Usage
//!
//! The basic procedure to use the lib is:
//!  - Get a connection string, either from the user or by starting a simulator with
//!    [LinkContext::start_sitl()](link::LinkContext::start_sitl)
//!  - Create a [Vehicle] from the connection string, this will connect and wait for the first telemetry
//!  - Build the mission and hand both to a [MissionRunner]
//!  - The runner lands and closes the vehicle, whatever happens
//!
//! All vehicle functions are only taking an un-mutable reference to self (`&self`), the intention is for the
//! Vehicle object to be shared between tasks using `Arc<>`.
//!
//! For example:
//! ``` no_run
//! # async fn tour() -> Result<(), Box<dyn std::error::Error>> {
//! use quad_tour::{build_mission, CancelToken, MissionConfig, MissionFlags, MissionRunner, Vehicle};
//! use quad_tour::link::LinkContext;
//! use quad_tour::sim::SimConfig;
//! use std::sync::Arc;
//!
//! let config = MissionConfig::default();
//! let context = LinkContext::new();
//! let uri = context.start_sitl(config.start, SimConfig::default());
//!
//! let cancel = CancelToken::new();
//! let vehicle = Arc::new(Vehicle::connect(&context, &uri, config.timeouts, cancel.clone()).await?);
//!
//! let mission = build_mission(&config.start, &config.destination);
//! let flags = Arc::new(MissionFlags::new());
//! let report = MissionRunner::new(vehicle, config, flags, cancel).run(&mission).await?;
//!
//! println!("Landed, altitude: {}", report.final_altitude);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod dispatch;
mod error;
mod state;
mod vehicle;

pub mod config;
pub mod geo;
pub mod link;
pub mod mission;
pub mod pause;
pub mod poll;
pub mod runner;
pub mod sim;
pub mod subsystems;
pub mod watchdog;

pub use crate::config::{MissionConfig, PauseScope, RetryPolicy, Timeouts};
pub use crate::error::{Error, Result};
pub use crate::geo::Location;
pub use crate::link::FlightMode;
pub use crate::mission::{build_mission, Mission, Waypoint, NUM_WAYPOINTS};
pub use crate::runner::{MissionPhase, MissionReport, MissionRunner};
pub use crate::state::{CancelToken, MissionFlags};
pub use crate::subsystems::telemetry::{AltitudeCallback, SubscriptionId, VehicleState};
pub use crate::vehicle::{Vehicle, VehicleControl};
pub use crate::watchdog::{AltitudeWatchdog, Lander, WatchdogState};
