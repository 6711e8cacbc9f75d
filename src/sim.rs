//! # Simulated vehicle
//!
//! Kinematic stand-in for a multirotor autopilot, good enough to fly the tour
//! without hardware. There is no physics: the vehicle climbs, descends and
//! travels at constant rates, and reports its state every tick.
//!
//! The simulator mimics the autopilot behaviours the tour relies on:
//! - pre-arm checks pass after [SimConfig::armable_after],
//! - arming and takeoff are only accepted in GUIDED,
//! - in AUTO the groundspeed attribute is ignored, only the speed change
//!   command is honoured,
//! - a waypoint at altitude 0 holds the current altitude,
//! - the mission cannot be replaced while armed,
//! - LAND descends to the ground and disarms.

use crate::geo::{self, Location};
use crate::link::{Downlink, FlightMode, Link, MissionOp, MissionResult, Uplink};
use crate::mission::Waypoint;
use crate::{Error, Result};
use async_trait::async_trait;
use flume::{Receiver, Sender};
use log::debug;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Tunables of the simulated vehicle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    /// Simulation step
    pub tick: Duration,
    /// Time after start before pre-arm checks pass
    pub armable_after: Duration,
    /// Vertical speed when climbing, m/s
    pub climb_rate: f64,
    /// Vertical speed in LAND, m/s
    pub descent_rate: f64,
    /// Speed in AUTO until a speed change command is received, m/s
    pub default_auto_speed: f64,
    /// Horizontal distance at which a waypoint counts as reached, metres
    pub acceptance_radius: f64,
    /// Metres climbed past the requested takeoff altitude
    pub takeoff_overshoot: f64,
    /// Largest mission accepted
    pub max_mission_items: usize,
    /// Interval between heartbeats
    pub heartbeat_period: Duration,
    /// When false the vehicle never reports heartbeat nor position
    pub emit_telemetry: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            armable_after: Duration::from_secs(3),
            climb_rate: 2.5,
            descent_rate: 1.5,
            default_auto_speed: 5.0,
            acceptance_radius: 1.0,
            takeoff_overshoot: 0.0,
            max_mission_items: 100,
            heartbeat_period: Duration::from_secs(1),
            emit_telemetry: true,
        }
    }
}

/// Link to a simulated vehicle
#[derive(Debug)]
pub struct SimLink {
    uplink: Sender<Uplink>,
    downlink: Receiver<Downlink>,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimLink {
    /// Spawn a simulated vehicle on the ground at `home`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(home: Location, config: SimConfig) -> Self {
        let (uplink, uplink_rx) = flume::unbounded();
        let (downlink_tx, downlink) = flume::unbounded();

        let vehicle = SimVehicle::new(home, config);
        let task = tokio::spawn(vehicle.run(uplink_rx, downlink_tx));

        Self {
            uplink,
            downlink,
            closed: AtomicBool::new(false),
            task: Mutex::new(Some(task)),
        }
    }
}

#[async_trait]
impl Link for SimLink {
    async fn send(&self, message: Uplink) -> Result<()> {
        if self.closed.load(Relaxed) {
            return Err(Error::Disconnected);
        }
        self.uplink.send_async(message).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Downlink> {
        if self.closed.load(Relaxed) {
            return Err(Error::Disconnected);
        }
        Ok(self.downlink.recv_async().await?)
    }

    async fn close(&self) {
        self.closed.store(true, Relaxed);
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for SimLink {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

struct SimVehicle {
    config: SimConfig,
    location: Location,
    airspeed: f64,
    mode: FlightMode,
    armed: bool,
    uptime: Duration,
    takeoff_target: Option<f64>,
    speed_command: Option<f64>,
    mission: Vec<Waypoint>,
    current: u16,
}

impl SimVehicle {
    fn new(home: Location, config: SimConfig) -> Self {
        Self {
            config,
            location: home.with_alt(0.0),
            airspeed: 0.0,
            mode: FlightMode::Unknown,
            armed: false,
            uptime: Duration::ZERO,
            takeoff_target: None,
            speed_command: None,
            mission: Vec::new(),
            current: 0,
        }
    }

    async fn run(mut self, uplink: Receiver<Uplink>, downlink: Sender<Downlink>) {
        let mut ticker = interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let heartbeat_every =
            (self.config.heartbeat_period.as_nanos() / self.config.tick.as_nanos().max(1)).max(1);
        let mut ticks: u128 = 0;

        loop {
            tokio::select! {
                message = uplink.recv_async() => {
                    let Ok(message) = message else { return };
                    if let Some(answer) = self.handle(message) {
                        if downlink.send_async(answer).await.is_err() {
                            return;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.step(self.config.tick);
                    if !self.config.emit_telemetry {
                        continue;
                    }
                    let mut reports = vec![
                        Downlink::Position { location: self.location, airspeed: self.airspeed },
                        Downlink::MissionCurrent(self.current),
                    ];
                    if ticks % heartbeat_every == 0 {
                        reports.push(self.heartbeat());
                    }
                    ticks += 1;
                    for report in reports {
                        if downlink.send_async(report).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    fn heartbeat(&self) -> Downlink {
        Downlink::Heartbeat {
            armable: self.is_armable(),
            armed: self.armed,
            custom_mode: self.mode.into(),
        }
    }

    fn is_armable(&self) -> bool {
        self.uptime >= self.config.armable_after
    }

    fn handle(&mut self, message: Uplink) -> Option<Downlink> {
        debug!("sim <- {:?}", message);
        match message {
            Uplink::SetMode(mode) => {
                self.mode = FlightMode::from(mode);
                if self.mode != FlightMode::Guided {
                    self.takeoff_target = None;
                }
                if self.mode == FlightMode::Auto && self.current == 0 && !self.mission.is_empty() {
                    self.current = 1;
                }
                None
            }
            Uplink::Arm(arm) => {
                if arm && self.is_armable() && self.mode == FlightMode::Guided {
                    self.armed = true;
                } else if !arm && self.location.alt <= 0.0 {
                    self.armed = false;
                }
                None
            }
            Uplink::Takeoff(altitude) => {
                if self.armed && self.mode == FlightMode::Guided && self.location.alt <= 0.0 {
                    self.takeoff_target = Some(altitude + self.config.takeoff_overshoot);
                }
                None
            }
            Uplink::SetGroundspeed(speed) => {
                debug!("sim ignores groundspeed attribute {} in {}", speed, self.mode);
                None
            }
            Uplink::ChangeSpeed(speed) => {
                self.speed_command = Some(speed);
                None
            }
            Uplink::MissionClear => {
                self.mission.clear();
                self.current = 0;
                Some(Downlink::MissionAck(MissionOp::Clear, MissionResult::Accepted))
            }
            Uplink::MissionUpload(items) => {
                let result = if self.armed {
                    MissionResult::Denied
                } else if items.is_empty() {
                    MissionResult::Invalid
                } else if items.len() > self.config.max_mission_items {
                    MissionResult::NoSpace
                } else {
                    self.mission = items;
                    self.current = 0;
                    MissionResult::Accepted
                };
                Some(Downlink::MissionAck(MissionOp::Upload, result))
            }
            Uplink::SetCurrentWaypoint(index) => {
                if index as usize <= self.mission.len() {
                    self.current = index;
                }
                None
            }
        }
    }

    fn step(&mut self, dt: Duration) {
        self.uptime += dt;
        let dt = dt.as_secs_f64();
        let before = self.location;

        if self.armed {
            match self.mode {
                FlightMode::Guided => {
                    if let Some(target) = self.takeoff_target {
                        self.climb_towards(target, dt);
                    }
                }
                FlightMode::Auto => self.follow_mission(dt),
                FlightMode::Land => {
                    let descent = self.config.descent_rate * dt;
                    self.location.alt = (self.location.alt - descent).max(0.0);
                    if self.location.alt <= 0.0 {
                        self.armed = false;
                    }
                }
                FlightMode::Unknown => (),
            }
        }

        let travelled = geo::distance(&before, &self.location);
        let climbed = self.location.alt - before.alt;
        self.airspeed = (travelled * travelled + climbed * climbed).sqrt() / dt;
    }

    fn climb_towards(&mut self, target: f64, dt: f64) {
        let step = self.config.climb_rate * dt;
        let delta = target - self.location.alt;
        self.location.alt += delta.clamp(-step, step);
    }

    fn follow_mission(&mut self, dt: f64) {
        if self.current == 0 {
            return;
        }
        let Some(waypoint) = self.mission.get(self.current as usize - 1).copied() else {
            return;
        };

        if waypoint.altitude > 0.0 {
            self.climb_towards(waypoint.altitude, dt);
        }

        let target = waypoint.location();
        let remaining = geo::distance(&self.location, &target);
        let step = self.speed_command.unwrap_or(self.config.default_auto_speed) * dt;
        if remaining <= step {
            self.location.lat = target.lat;
            self.location.lon = target.lon;
        } else {
            let ratio = step / remaining;
            self.location.lat += (target.lat - self.location.lat) * ratio;
            self.location.lon += (target.lon - self.location.lon) * ratio;
        }

        if geo::distance(&self.location, &target) <= self.config.acceptance_radius
            && (self.current as usize) < self.mission.len()
        {
            self.current += 1;
            debug!("sim reached waypoint {}", waypoint.seq);
        }
    }
}
