//! # Telemetry subsystem
//!
//! The vehicle reports its status (heartbeat), position and current waypoint
//! continuously. The latest values are kept in a [VehicleState] snapshot that
//! can be read at any time.
//!
//! ## Altitude listeners
//!
//! A callback can be subscribed to every relative altitude update. Each
//! subscription gets its own notification task, so a callback never runs on
//! the caller's task and never blocks telemetry reception:
//! ``` no_run
//! # async fn watch(vehicle: &quad_tour::Vehicle) -> quad_tour::Result<()> {
//! use std::sync::Arc;
//!
//! let id = vehicle
//!     .telemetry
//!     .subscribe_altitude(Arc::new(|alt: f64| println!("Altitude: {:.2}", alt)))?;
//!
//! // ...
//!
//! vehicle.telemetry.unsubscribe_altitude(id).await;
//! # Ok(())
//! # }
//! ```
//!
//! Once [Telemetry::unsubscribe_altitude()] returns, the callback will not be
//! called anymore.

use crate::geo::Location;
use crate::link::FlightMode;
use crate::{Error, Result};
use async_broadcast::{InactiveReceiver, RecvError};
use log::debug;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Callback invoked with the relative altitude, in metres, of every position update
pub type AltitudeCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Identifies an altitude subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// Last known state of the vehicle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    /// Pre-arm checks passed
    pub armable: bool,
    /// Motors armed
    pub armed: bool,
    /// Current flight mode
    pub mode: FlightMode,
    /// Global position, altitude relative to home
    pub position: Location,
    /// Airspeed in m/s
    pub airspeed: f64,
    /// Autopilot waypoint index, 0 is home
    pub next_waypoint_index: u16,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self {
            armable: false,
            armed: false,
            mode: FlightMode::Unknown,
            position: Location::default(),
            airspeed: 0.0,
            next_waypoint_index: 0,
        }
    }
}

#[derive(Debug, Default)]
struct Tracked {
    state: VehicleState,
    heartbeat_seen: bool,
    position_at: Option<Instant>,
}

/// Vehicle state written by the downlink dispatcher only
#[derive(Debug, Default)]
pub(crate) struct StateCell {
    inner: Mutex<Tracked>,
}

impl StateCell {
    fn tracked(&self) -> std::sync::MutexGuard<'_, Tracked> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn update_heartbeat(&self, armable: bool, armed: bool, mode: FlightMode) {
        let mut tracked = self.tracked();
        tracked.heartbeat_seen = true;
        tracked.state.armable = armable;
        tracked.state.armed = armed;
        tracked.state.mode = mode;
    }

    pub(crate) fn update_position(&self, position: Location, airspeed: f64) {
        let mut tracked = self.tracked();
        tracked.position_at = Some(Instant::now());
        tracked.state.position = position;
        tracked.state.airspeed = airspeed;
    }

    pub(crate) fn update_next_waypoint(&self, index: u16) {
        self.tracked().state.next_waypoint_index = index;
    }

    pub(crate) fn snapshot(&self) -> VehicleState {
        self.tracked().state
    }

    /// A heartbeat and a position have both been received
    pub(crate) fn is_ready(&self) -> bool {
        let tracked = self.tracked();
        tracked.heartbeat_seen && tracked.position_at.is_some()
    }

    /// Position and airspeed, if the last position report is fresh enough
    pub(crate) fn fresh_position(&self, stale_after: Duration) -> Result<(Location, f64)> {
        let tracked = self.tracked();
        match tracked.position_at {
            Some(at) if at.elapsed() <= stale_after => {
                Ok((tracked.state.position, tracked.state.airspeed))
            }
            _ => Err(Error::TelemetryTimeout),
        }
    }
}

/// # Access to the telemetry subsystem
///
/// See the [telemetry module documentation](crate::subsystems::telemetry) for more context and information.
pub struct Telemetry {
    state: Arc<StateCell>,
    altitude: InactiveReceiver<f64>,
    listeners: Mutex<BTreeMap<SubscriptionId, JoinHandle<()>>>,
    next_id: AtomicU64,
    stale_after: Duration,
}

impl Telemetry {
    pub(crate) fn new(
        state: Arc<StateCell>,
        altitude: InactiveReceiver<f64>,
        stale_after: Duration,
    ) -> Self {
        Self {
            state,
            altitude,
            listeners: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
            stale_after,
        }
    }

    /// Snapshot of the last known vehicle state
    pub fn state(&self) -> VehicleState {
        self.state.snapshot()
    }

    /// Current position.
    ///
    /// Returns [Error::TelemetryTimeout] if no position was reported recently.
    pub fn position(&self) -> Result<Location> {
        Ok(self.state.fresh_position(self.stale_after)?.0)
    }

    /// Current airspeed in m/s.
    ///
    /// Returns [Error::TelemetryTimeout] if no position was reported recently.
    pub fn airspeed(&self) -> Result<f64> {
        Ok(self.state.fresh_position(self.stale_after)?.1)
    }

    /// Autopilot waypoint index, 0 is home
    pub fn next_waypoint_index(&self) -> u16 {
        self.state.snapshot().next_waypoint_index
    }

    /// Pre-arm checks passed
    pub fn is_armable(&self) -> bool {
        self.state.snapshot().armable
    }

    /// Motors armed
    pub fn is_armed(&self) -> bool {
        self.state.snapshot().armed
    }

    /// Call `callback` on every altitude update, from a dedicated task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe_altitude(&self, callback: AltitudeCallback) -> Result<SubscriptionId> {
        if self.altitude.is_closed() {
            return Err(Error::Disconnected);
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Relaxed));
        let mut updates = self.altitude.activate_cloned();

        let task = tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(altitude) => callback(altitude),
                    Err(RecvError::Overflowed(missed)) => {
                        debug!("Altitude listener missed {} updates", missed)
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        });

        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, task);
        debug!("Altitude listener {:?} subscribed", id);

        Ok(id)
    }

    /// Stop calling the callback registered as `id`.
    ///
    /// When this returns the callback is not running and will never be called
    /// again. Unknown ids are ignored.
    pub async fn unsubscribe_altitude(&self, id: SubscriptionId) {
        let task = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        if let Some(task) = task {
            task.abort();
            let _ = task.await;
            debug!("Altitude listener {:?} removed", id);
        }
    }

    /// Remove every altitude listener
    pub(crate) async fn unsubscribe_all(&self) {
        let tasks: Vec<_> = std::mem::take(
            &mut *self.listeners.lock().unwrap_or_else(PoisonError::into_inner),
        )
        .into_values()
        .collect();

        for task in tasks {
            task.abort();
            let _ = task.await;
        }
    }
}
