//! # Vehicle subsystems
//!
//! The vehicle-control service is organized in logical subsystems, each with one role. They are
//! available as public fields of the [Vehicle](crate::Vehicle) struct and are the main way to
//! communicate and interact with the vehicle.

pub mod commander;
pub mod mission;
pub mod telemetry;
