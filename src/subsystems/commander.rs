//! # Commander subsystem
//!
//! Arming, takeoff, flight mode and speed commands.
//!
//! The waits in this module are bounded by the [Timeouts](crate::config::Timeouts)
//! given when connecting, and stop early when the vehicle's
//! [CancelToken](crate::CancelToken) is cancelled.
//!
//! ## Landing
//!
//! [Commander::land()] switches to GUIDED before LAND. Some autopilot
//! configurations refuse LAND when coming straight from AUTO.

use crate::config::{Timeouts, TAKEOFF_THRESHOLD};
use crate::link::{FlightMode, Uplink};
use crate::poll::poll_until;
use crate::state::CancelToken;
use crate::subsystems::telemetry::StateCell;
use crate::{Error, Result};
use flume::Sender;
use log::{info, warn};
use std::sync::Arc;

/// # Access to the commander subsystem
///
/// See the [commander module documentation](crate::subsystems::commander) for more context and information.
#[derive(Debug)]
pub struct Commander {
    uplink: Sender<Uplink>,
    state: Arc<StateCell>,
    timeouts: Timeouts,
    cancel: CancelToken,
}

impl Commander {
    pub(crate) fn new(
        uplink: Sender<Uplink>,
        state: Arc<StateCell>,
        timeouts: Timeouts,
        cancel: CancelToken,
    ) -> Self {
        Self {
            uplink,
            state,
            timeouts,
            cancel,
        }
    }

    async fn send(&self, message: Uplink) -> Result<()> {
        self.uplink
            .send_async(message)
            .await
            .map_err(|_| Error::Disconnected)
    }

    /// Request a flight mode change
    pub async fn set_mode(&self, mode: FlightMode) -> Result<()> {
        self.send(Uplink::SetMode(mode.into())).await
    }

    /// Set the groundspeed, in m/s.
    ///
    /// The target attribute is written and a speed change command is sent as
    /// well: some autopilot firmware ignores attribute writes in AUTO.
    pub async fn set_groundspeed(&self, speed: f64) -> Result<()> {
        self.send(Uplink::SetGroundspeed(speed)).await?;
        self.send(Uplink::ChangeSpeed(speed)).await
    }

    /// Wait for pre-arm checks, then arm in GUIDED and wait for the motors to be armed.
    ///
    /// Returns [Error::ArmError] if the vehicle does not become armable, or
    /// does not arm, within the configured bounds.
    pub async fn arm(&self) -> Result<()> {
        info!("Basic pre-arm checks");
        poll_until(
            "vehicle armable",
            self.timeouts.poll_interval,
            self.timeouts.armable,
            &self.cancel,
            || async {
                if self.state.snapshot().armable {
                    Ok(Some(()))
                } else {
                    info!(" Waiting for vehicle to initialise...");
                    Ok(None)
                }
            },
        )
        .await
        .map_err(into_arm_error)?;

        info!("Arming motors");
        self.set_mode(FlightMode::Guided).await?;
        self.send(Uplink::Arm(true)).await?;

        poll_until(
            "motors armed",
            self.timeouts.poll_interval,
            self.timeouts.arm,
            &self.cancel,
            || async {
                if self.state.snapshot().armed {
                    Ok(Some(()))
                } else {
                    info!(" Waiting for arming...");
                    Ok(None)
                }
            },
        )
        .await
        .map_err(into_arm_error)
    }

    /// Take off to `target_altitude` metres and wait until 95% of it is reached.
    ///
    /// The vehicle must be armed in GUIDED. Returns [Error::Timeout] if the
    /// altitude is not reached within the configured bound.
    pub async fn takeoff(&self, target_altitude: f64) -> Result<()> {
        info!("Taking off!");
        self.send(Uplink::Takeoff(target_altitude)).await?;

        poll_until(
            "takeoff altitude",
            self.timeouts.poll_interval,
            self.timeouts.takeoff,
            &self.cancel,
            || async {
                match self.state.fresh_position(self.timeouts.telemetry_stale) {
                    Ok((position, _)) => {
                        info!(" Altitude: {:.2}", position.alt);
                        if position.alt >= target_altitude * TAKEOFF_THRESHOLD {
                            info!("Reached target altitude");
                            Ok(Some(()))
                        } else {
                            Ok(None)
                        }
                    }
                    Err(Error::TelemetryTimeout) => {
                        warn!(" No altitude report, still waiting");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            },
        )
        .await
    }

    /// Land at the current location, going through GUIDED first
    pub async fn land(&self) -> Result<()> {
        self.set_mode(FlightMode::Guided).await?;
        info!("Landing...");
        self.set_mode(FlightMode::Land).await
    }
}

fn into_arm_error(error: Error) -> Error {
    match error {
        Error::Timeout(what) => Error::ArmError(format!("timed out waiting for {}", what)),
        other => other,
    }
}
