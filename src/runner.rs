//! # Mission state machine
//!
//! Flies a [Mission] from the ground back to the ground:
//!
//! ```text
//! Init -> Arming -> Takeoff -> MissionStart -> Monitoring -> Landing -> Closed
//!                       \__________________________________/
//!                         ceiling breached: straight to Landing
//! ```
//!
//! Any error, cancellation included, moves the runner to [MissionPhase::Failed]
//! where it still tries to land and always tears the connection down.
//!
//! Teardown removes the altitude listener before closing the vehicle, so the
//! watchdog never touches a closed connection.

use crate::config::{MissionConfig, PauseScope};
use crate::geo;
use crate::link::FlightMode;
use crate::mission::Mission;
use crate::poll::{poll_until, retry_telemetry, sleep_or_cancel};
use crate::state::{CancelToken, MissionFlags};
use crate::subsystems::telemetry::SubscriptionId;
use crate::vehicle::VehicleControl;
use crate::watchdog::{AltitudeWatchdog, Lander};
use crate::{Error, Result};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Phases of a mission run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionPhase {
    /// Watchdog subscription and mission upload
    Init,
    /// Waiting for pre-arm checks and arming
    Arming,
    /// Climbing to the takeoff altitude
    Takeoff,
    /// Switching to AUTO
    MissionStart,
    /// Following the waypoints
    Monitoring,
    /// Descending to the ground
    Landing,
    /// Connection closed after a complete run
    Closed,
    /// Connection closed after an error
    Failed,
}

impl std::fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MissionPhase::Init => "INIT",
            MissionPhase::Arming => "ARMING",
            MissionPhase::Takeoff => "TAKEOFF",
            MissionPhase::MissionStart => "MISSION_START",
            MissionPhase::Monitoring => "MONITORING",
            MissionPhase::Landing => "LANDING",
            MissionPhase::Closed => "CLOSED",
            MissionPhase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Outcome of a complete mission run
#[derive(Debug, Clone, PartialEq)]
pub struct MissionReport {
    /// Every phase entered, in order
    pub phases: Vec<MissionPhase>,
    /// The altitude ceiling was exceeded during the run
    pub breached: bool,
    /// Autopilot index at which monitoring left the mission, if it did so
    /// because the sentinel became the current waypoint
    pub exit_index: Option<u16>,
    /// Last altitude read while landing
    pub final_altitude: f64,
}

/// True when the autopilot heads for the sentinel, i.e. every real waypoint
/// has been reached
pub fn leg_complete(next_index: u16, num_waypoints: u16) -> bool {
    next_index == num_waypoints + 1
}

/// Drives a vehicle through a mission
pub struct MissionRunner<V> {
    vehicle: Arc<V>,
    config: MissionConfig,
    flags: Arc<MissionFlags>,
    cancel: CancelToken,
    phases: Vec<MissionPhase>,
}

impl<V> MissionRunner<V>
where
    V: VehicleControl + 'static,
{
    /// New runner in [MissionPhase::Init]
    pub fn new(
        vehicle: Arc<V>,
        config: MissionConfig,
        flags: Arc<MissionFlags>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            vehicle,
            config,
            flags,
            cancel,
            phases: vec![MissionPhase::Init],
        }
    }

    /// Current phase
    pub fn phase(&self) -> MissionPhase {
        // phases always starts with Init
        self.phases[self.phases.len() - 1]
    }

    /// Every phase entered so far
    pub fn phases(&self) -> &[MissionPhase] {
        &self.phases
    }

    fn enter(&mut self, phase: MissionPhase) {
        info!("[{}] -> [{}]", self.phase(), phase);
        self.phases.push(phase);
    }

    /// Fly `mission` and close the vehicle.
    ///
    /// The vehicle is closed whatever the outcome. On error the runner has
    /// already attempted to land.
    pub async fn run(mut self, mission: &Mission) -> Result<MissionReport> {
        self.flags.reset_breach();
        if self.config.target_altitude >= self.config.max_altitude {
            warn!(
                "Takeoff altitude {:.1}m is not below the {:.1}m ceiling",
                self.config.target_altitude, self.config.max_altitude
            );
        }

        let lander: Arc<dyn Lander> = self.vehicle.clone();
        let watchdog = Arc::new(AltitudeWatchdog::new(
            self.config.max_altitude,
            self.flags.clone(),
            lander,
        ));

        let subscription = match self.vehicle.subscribe_altitude(watchdog.callback()).await {
            Ok(id) => Some(id),
            Err(e) => return Err(self.fail(e, None, &watchdog).await),
        };

        match self.fly(mission).await {
            Ok((exit_index, final_altitude)) => {
                self.teardown(subscription, &watchdog).await;
                self.enter(MissionPhase::Closed);
                Ok(MissionReport {
                    phases: self.phases,
                    breached: self.flags.is_breached(),
                    exit_index,
                    final_altitude,
                })
            }
            Err(e) => Err(self.fail(e, subscription, &watchdog).await),
        }
    }

    async fn fail(
        &mut self,
        error: Error,
        subscription: Option<SubscriptionId>,
        watchdog: &AltitudeWatchdog,
    ) -> Error {
        error!("Mission failed in {}: {}", self.phase(), error);
        self.enter(MissionPhase::Failed);

        if self.vehicle.is_armed() {
            warn!("Attempting to land");
            if let Err(e) = VehicleControl::land(&*self.vehicle).await {
                error!("Landing request failed: {}", e);
            }
        }

        self.teardown(subscription, watchdog).await;
        error
    }

    async fn teardown(&self, subscription: Option<SubscriptionId>, watchdog: &AltitudeWatchdog) {
        if let Some(id) = subscription {
            if let Err(e) = self.vehicle.unsubscribe_altitude(id).await {
                warn!("Could not remove altitude listener: {}", e);
            }
        }
        if let Err(e) = watchdog.settle().await {
            error!("Ceiling breach landing task failed: {}", e);
        }

        info!("Close vehicle object");
        self.vehicle.close().await;
    }

    async fn fly(&mut self, mission: &Mission) -> Result<(Option<u16>, f64)> {
        let exit_index = self.launch(mission).await?;

        self.enter(MissionPhase::Landing);
        let final_altitude = self.land_and_wait().await?;

        Ok((exit_index, final_altitude))
    }

    /// Everything before landing. Returns early, without error, as soon as
    /// the ceiling is found breached at a phase boundary.
    async fn launch(&mut self, mission: &Mission) -> Result<Option<u16>> {
        // Let the watchdog see a few updates before anything moves
        sleep_or_cancel(self.config.listener_settle, &self.cancel).await?;
        if self.breach_latched("mission upload") {
            return Ok(None);
        }

        info!("Clear any existing commands");
        self.vehicle.clear_mission().await?;
        info!("Upload new commands to vehicle");
        self.vehicle.upload_mission(mission).await?;
        if self.breach_latched("arming") {
            return Ok(None);
        }

        self.enter(MissionPhase::Arming);
        self.hold_while_paused().await?;
        tokio::select! {
            armed = self.vehicle.arm() => armed?,
            _ = self.flags.breached() => (),
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
        }
        if self.breach_latched("takeoff") {
            return Ok(None);
        }

        self.enter(MissionPhase::Takeoff);
        self.hold_while_paused().await?;
        tokio::select! {
            reached = self.vehicle.takeoff(self.config.target_altitude) => reached?,
            _ = self.flags.breached() => (),
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
        }
        if self.breach_latched("mission start") {
            return Ok(None);
        }

        self.enter(MissionPhase::MissionStart);
        self.hold_while_paused().await?;
        if self.breach_latched("mission start") {
            return Ok(None);
        }
        info!("Starting mission.");
        self.vehicle.set_mode(FlightMode::Auto).await?;
        self.vehicle.set_groundspeed(self.config.groundspeed).await?;

        self.enter(MissionPhase::Monitoring);
        self.monitor(mission).await
    }

    fn breach_latched(&self, skipped: &str) -> bool {
        let breached = self.flags.is_breached();
        if breached {
            warn!("Ceiling breached in {}, skipping {}", self.phase(), skipped);
        }
        breached
    }

    /// Block at a phase boundary while paused, if the pause scope covers the whole mission
    async fn hold_while_paused(&self) -> Result<()> {
        if self.config.pause_scope != PauseScope::Mission || !self.flags.is_paused() {
            return Ok(());
        }

        info!("Paused before {}", self.phase());
        tokio::select! {
            _ = self.flags.resumed() => Ok(()),
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
        }
    }

    /// Poll the mission progress until the sentinel becomes the current
    /// waypoint. Returns the autopilot index in that case, `None` if the
    /// mission was left because of a breach or because the vehicle is on the
    /// ground.
    async fn monitor(&self, mission: &Mission) -> Result<Option<u16>> {
        let vehicle = &*self.vehicle;
        let retry = &self.config.telemetry_retry;
        let interval = self.config.timeouts.poll_interval;
        let mut active = Duration::ZERO;
        let mut holding = false;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if self.flags.is_breached() {
                warn!("Ceiling breached, leaving the mission");
                return Ok(None);
            }

            if self.flags.is_paused() {
                if !holding {
                    info!("Holding position");
                    vehicle.set_mode(FlightMode::Guided).await?;
                    holding = true;
                }
                sleep_or_cancel(interval, &self.cancel).await?;
                continue;
            }
            if holding {
                info!("Continuing mission");
                vehicle.set_mode(FlightMode::Auto).await?;
                vehicle.set_groundspeed(self.config.groundspeed).await?;
                holding = false;
            }

            let started = Instant::now();
            let position =
                retry_telemetry(retry, &self.cancel, || async { vehicle.read_position() }).await?;
            let airspeed =
                retry_telemetry(retry, &self.cancel, || async { vehicle.read_airspeed() }).await?;
            let next = vehicle.read_next_waypoint_index();

            info!("Current lat, lon: {}, {}", position.lat, position.lon);
            match mission.target_for(next) {
                Some(waypoint) => info!(
                    "Distance to waypoint ({}): {:.1}m",
                    next,
                    geo::distance(&position, &waypoint.location())
                ),
                None => info!("Distance to waypoint ({}): n/a", next),
            }
            info!("Airspeed: {:.2}m/s", airspeed);

            if leg_complete(next, mission.num_waypoints()) {
                info!("Exit 'standard' mission when start heading to final waypoint");
                vehicle.set_next_waypoint_index(0).await?;
                vehicle.clear_mission().await?;
                return Ok(Some(next));
            }
            if position.alt <= self.config.ground_altitude {
                warn!("Vehicle is on the ground, leaving the mission");
                return Ok(None);
            }
            if active >= self.config.timeouts.mission {
                return Err(Error::Timeout("mission waypoints".to_owned()));
            }

            sleep_or_cancel(interval, &self.cancel).await?;
            active += started.elapsed();
        }
    }

    async fn land_and_wait(&self) -> Result<f64> {
        let vehicle = &*self.vehicle;
        let retry = &self.config.telemetry_retry;
        let ground = self.config.ground_altitude;

        info!("Land");
        vehicle.set_mode(FlightMode::Land).await?;

        poll_until(
            "landing",
            self.config.timeouts.poll_interval,
            self.config.timeouts.landing,
            &self.cancel,
            || async {
                let position = retry_telemetry(retry, &self.cancel, || async {
                    vehicle.read_position()
                })
                .await?;
                info!(" Altitude: {:.2}", position.alt);
                Ok::<_, Error>((position.alt <= ground).then_some(position.alt))
            },
        )
        .await
    }
}
