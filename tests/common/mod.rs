// Scripted vehicle shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use quad_tour::{
    AltitudeCallback, Error, FlightMode, Location, Mission, Result, SubscriptionId, VehicleControl,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Every interaction with the vehicle, in call order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ClearMission,
    UploadMission(usize),
    Arm,
    Takeoff(f64),
    SetMode(FlightMode),
    SetGroundspeed(f64),
    SetNextWaypoint(u16),
    Subscribe,
    Unsubscribe,
    Land,
    Close,
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    altitude: f64,
    armed: bool,
    indices: VecDeque<u16>,
    last_index: u16,
    listeners: BTreeMap<u64, AltitudeCallback>,
    next_id: u64,
    position_gaps: usize,
    position_reads: usize,
}

/// Vehicle double replaying a climb profile and a sequence of waypoint indices
#[derive(Default)]
pub struct ScriptedVehicle {
    inner: Mutex<Inner>,
    climb: Vec<f64>,
    arm_error: Option<Error>,
    takeoff_error: Option<Error>,
    land_panics: bool,
}

impl ScriptedVehicle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Altitude samples reported to the listeners during takeoff
    pub fn with_climb(mut self, climb: Vec<f64>) -> Self {
        self.climb = climb;
        self
    }

    /// Waypoint indices returned by successive reads, the last one repeats
    pub fn with_indices(self, indices: Vec<u16>) -> Self {
        self.lock().indices = indices.into();
        self
    }

    pub fn failing_arm(mut self, error: Error) -> Self {
        self.arm_error = Some(error);
        self
    }

    pub fn failing_takeoff(mut self, error: Error) -> Self {
        self.takeoff_error = Some(error);
        self
    }

    /// The next `gaps` position reads fail with [Error::TelemetryTimeout]
    pub fn with_position_gaps(self, gaps: usize) -> Self {
        self.lock().position_gaps = gaps;
        self
    }

    pub fn panicking_land(mut self) -> Self {
        self.land_panics = true;
        self
    }

    pub fn position_reads(&self) -> usize {
        self.lock().position_reads
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn position_of(&self, call: &Call) -> Option<usize> {
        self.lock().calls.iter().position(|c| c == call)
    }

    pub fn modes(&self) -> Vec<FlightMode> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::SetMode(mode) => Some(*mode),
                _ => None,
            })
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Report an altitude sample to every listener
    pub fn report_altitude(&self, altitude: f64) {
        let listeners: Vec<AltitudeCallback> = {
            let mut inner = self.lock();
            inner.altitude = altitude;
            inner.listeners.values().cloned().collect()
        };
        for listener in listeners {
            listener(altitude);
        }
    }
}

#[async_trait]
impl VehicleControl for ScriptedVehicle {
    async fn clear_mission(&self) -> Result<()> {
        self.record(Call::ClearMission);
        Ok(())
    }

    async fn upload_mission(&self, mission: &Mission) -> Result<()> {
        self.record(Call::UploadMission(mission.len()));
        Ok(())
    }

    async fn arm(&self) -> Result<()> {
        self.record(Call::Arm);
        if let Some(e) = &self.arm_error {
            return Err(e.clone());
        }
        self.lock().armed = true;
        Ok(())
    }

    async fn takeoff(&self, target_altitude: f64) -> Result<()> {
        self.record(Call::Takeoff(target_altitude));
        if let Some(e) = &self.takeoff_error {
            return Err(e.clone());
        }
        for altitude in self.climb.clone() {
            self.report_altitude(altitude);
            tokio::task::yield_now().await;
        }
        if self.climb.is_empty() {
            self.report_altitude(target_altitude);
        }
        Ok(())
    }

    async fn set_mode(&self, mode: FlightMode) -> Result<()> {
        self.record(Call::SetMode(mode));
        if mode == FlightMode::Land {
            let mut inner = self.lock();
            inner.altitude = 0.0;
            inner.armed = false;
        }
        Ok(())
    }

    async fn set_groundspeed(&self, speed: f64) -> Result<()> {
        self.record(Call::SetGroundspeed(speed));
        Ok(())
    }

    fn read_position(&self) -> Result<Location> {
        let mut inner = self.lock();
        inner.position_reads += 1;
        if inner.position_gaps > 0 {
            inner.position_gaps -= 1;
            return Err(Error::TelemetryTimeout);
        }
        Ok(Location::new(37.4282, -122.1735).with_alt(inner.altitude))
    }

    fn read_airspeed(&self) -> Result<f64> {
        Ok(1.0)
    }

    fn read_next_waypoint_index(&self) -> u16 {
        let mut inner = self.lock();
        if let Some(index) = inner.indices.pop_front() {
            inner.last_index = index;
        }
        inner.last_index
    }

    async fn set_next_waypoint_index(&self, index: u16) -> Result<()> {
        self.record(Call::SetNextWaypoint(index));
        Ok(())
    }

    fn is_armable(&self) -> bool {
        true
    }

    fn is_armed(&self) -> bool {
        self.lock().armed
    }

    async fn subscribe_altitude(&self, callback: AltitudeCallback) -> Result<SubscriptionId> {
        self.record(Call::Subscribe);
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.insert(id, callback);
        Ok(SubscriptionId(id))
    }

    async fn unsubscribe_altitude(&self, id: SubscriptionId) -> Result<()> {
        self.record(Call::Unsubscribe);
        self.lock().listeners.remove(&id.0);
        Ok(())
    }

    async fn land(&self) -> Result<()> {
        self.record(Call::Land);
        if self.land_panics {
            panic!("landing command lost");
        }
        self.set_mode(FlightMode::Guided).await?;
        self.set_mode(FlightMode::Land).await
    }

    async fn close(&self) {
        self.record(Call::Close);
    }
}
