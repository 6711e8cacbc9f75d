use crate::config::Timeouts;
use crate::dispatch::TelemetryDispatch;
use crate::geo::Location;
use crate::link::{FlightMode, Link, LinkContext, Uplink};
use crate::mission::Mission;
use crate::poll::poll_until;
use crate::state::CancelToken;
use crate::subsystems::commander::Commander;
use crate::subsystems::mission::MissionControl;
use crate::subsystems::telemetry::{AltitudeCallback, StateCell, SubscriptionId, Telemetry};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::lock::Mutex;
use log::{debug, info};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Depth of the altitude notification queue, older samples are dropped first
const ALTITUDE_QUEUE_DEPTH: usize = 64;

/// Interval at which the connection checks for the first telemetry
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Operations the mission runner needs from a vehicle
///
/// Implemented by [Vehicle]. Having the runner written against this trait
/// allows driving it with a test double.
#[async_trait]
pub trait VehicleControl: Send + Sync {
    /// Remove all mission items
    async fn clear_mission(&self) -> Result<()>;
    /// Replace the mission, fails with [Error::UploadError] if rejected
    async fn upload_mission(&self, mission: &Mission) -> Result<()>;
    /// Wait until armable, switch to GUIDED and arm
    async fn arm(&self) -> Result<()>;
    /// Take off and wait for 95% of `target_altitude`
    async fn takeoff(&self, target_altitude: f64) -> Result<()>;
    /// Request a flight mode
    async fn set_mode(&self, mode: FlightMode) -> Result<()>;
    /// Set the groundspeed attribute and send a speed change command
    async fn set_groundspeed(&self, speed: f64) -> Result<()>;
    /// Current position, altitude relative to home
    fn read_position(&self) -> Result<Location>;
    /// Current airspeed in m/s
    fn read_airspeed(&self) -> Result<f64>;
    /// Autopilot waypoint index, 0 is home
    fn read_next_waypoint_index(&self) -> u16;
    /// Move the autopilot waypoint cursor
    async fn set_next_waypoint_index(&self, index: u16) -> Result<()>;
    /// Pre-arm checks passed
    fn is_armable(&self) -> bool;
    /// Motors armed
    fn is_armed(&self) -> bool;
    /// Call `callback` on every altitude update, from a notification task
    async fn subscribe_altitude(&self, callback: AltitudeCallback) -> Result<SubscriptionId>;
    /// Remove a listener, it is guaranteed not to run anymore once this returns
    async fn unsubscribe_altitude(&self, id: SubscriptionId) -> Result<()>;
    /// Land at the current location (GUIDED then LAND)
    async fn land(&self) -> Result<()>;
    /// Release the connection, safe to call more than once
    async fn close(&self);
}

/// # The vehicle
///
/// This struct is one-time use: Creating it will connect to a vehicle and once closed, either as requested
/// by the lib user or as a result of a connection loss, the object cannot be reconnected. A new one need to be created
/// to connect again.
///
/// See the [quad-tour crate root documentation](crate) for more context and information.
pub struct Vehicle {
    /// Telemetry subsystem access
    pub telemetry: Telemetry,
    /// Arming, takeoff and mode commands
    pub commander: Commander,
    /// Mission upload and waypoint cursor
    pub mission: MissionControl,
    uplink_task: Mutex<Option<JoinHandle<()>>>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    disconnect: Arc<AtomicBool>,
    closed: AtomicBool,
    link: Arc<dyn Link>,
}

impl Vehicle {
    /// Connect to the vehicle at `uri`
    ///
    /// This function opens a link using `context` and calls [Vehicle::connect_from_link()].
    ///
    /// An error is returned either if the link cannot be opened or if the vehicle never becomes ready.
    pub async fn connect(
        context: &LinkContext,
        uri: &str,
        timeouts: Timeouts,
        cancel: CancelToken,
    ) -> Result<Self> {
        info!("Connecting to {}...", uri);
        let link: Arc<dyn Link> = Arc::from(context.open_link(uri).await?);

        Self::connect_from_link(link, timeouts, cancel).await
    }

    /// Connect a vehicle using an existing link
    ///
    /// Starts the uplink and downlink tasks, then waits for a heartbeat and a position report. Returns
    /// [Error::ConnectionError] if they do not arrive within `timeouts.connect`; the link is closed in that case.
    ///
    /// `cancel` bounds every wait done by the vehicle afterward (arming, takeoff).
    pub async fn connect_from_link(
        link: Arc<dyn Link>,
        timeouts: Timeouts,
        cancel: CancelToken,
    ) -> Result<Self> {
        let disconnect = Arc::new(AtomicBool::new(false));
        let state = Arc::new(StateCell::default());

        // Uplink queue
        let disconnect_uplink = disconnect.clone();
        let (uplink, rx) = flume::unbounded::<Uplink>();
        let link_uplink = link.clone();
        let uplink_task = tokio::spawn(async move {
            while !disconnect_uplink.load(Relaxed) {
                match tokio::time::timeout(Duration::from_millis(100), rx.recv_async()).await {
                    Ok(Ok(message)) => {
                        if link_uplink.send(message).await.is_err() {
                            return;
                        }
                    }
                    Err(_) => (),
                    Ok(Err(flume::RecvError::Disconnected)) => return,
                }
            }
            // Flush what was queued before the disconnect request
            while let Ok(message) = rx.try_recv() {
                if link_uplink.send(message).await.is_err() {
                    return;
                }
            }
        });

        // Downlink dispatcher
        let (mut altitude_tx, altitude_rx) = async_broadcast::broadcast(ALTITUDE_QUEUE_DEPTH);
        altitude_tx.set_overflow(true);
        let (ack_tx, ack_rx) = flume::unbounded();
        let dispatch_task = TelemetryDispatch::new(
            link.clone(),
            state.clone(),
            altitude_tx,
            ack_tx,
            disconnect.clone(),
        )
        .run();

        let vehicle = Vehicle {
            telemetry: Telemetry::new(
                state.clone(),
                altitude_rx.deactivate(),
                timeouts.telemetry_stale,
            ),
            commander: Commander::new(uplink.clone(), state.clone(), timeouts, cancel.clone()),
            mission: MissionControl::new(uplink, ack_rx, state.clone(), timeouts),
            uplink_task: Mutex::new(Some(uplink_task)),
            dispatch_task: Mutex::new(Some(dispatch_task)),
            disconnect,
            closed: AtomicBool::new(false),
            link,
        };

        let ready = poll_until(
            "first heartbeat and position",
            READY_POLL_INTERVAL,
            timeouts.connect,
            &cancel,
            || async { Ok(state.is_ready().then_some(())) },
        )
        .await;

        match ready {
            Ok(()) => {
                info!("Vehicle ready");
                Ok(vehicle)
            }
            Err(e) => {
                vehicle.close().await;
                match e {
                    Error::Cancelled => Err(Error::Cancelled),
                    e => Err(Error::ConnectionError(format!("vehicle never became ready: {}", e))),
                }
            }
        }
    }

    /// Close the connection
    ///
    /// Removes all altitude listeners, sends what is still queued, stops the background tasks and closes the
    /// link. Calling it again does nothing.
    ///
    /// Once closed, any methods that uses the communication to the vehicle will return the error
    /// [Error::Disconnected]
    pub async fn close(&self) {
        if self.closed.swap(true, Relaxed) {
            return;
        }

        self.telemetry.unsubscribe_all().await;

        // Set disconnect to true, will make both uplink and dispatcher task quit
        self.disconnect.store(true, Relaxed);

        // Wait for both task to finish
        if let Some(uplink_task) = self.uplink_task.lock().await.take() {
            let _ = uplink_task.await;
        }
        if let Some(dispatch_task) = self.dispatch_task.lock().await.take() {
            let _ = dispatch_task.await;
        }

        self.link.close().await;
        debug!("Vehicle link closed");
    }

    /// Snapshot of the last known vehicle state
    pub fn state(&self) -> crate::VehicleState {
        self.telemetry.state()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Relaxed) {
            Err(Error::Disconnected)
        } else {
            Ok(())
        }
    }
}

impl Drop for Vehicle {
    fn drop(&mut self) {
        self.disconnect.store(true, Relaxed);
    }
}

#[async_trait]
impl VehicleControl for Vehicle {
    async fn clear_mission(&self) -> Result<()> {
        self.ensure_open()?;
        self.mission.clear().await
    }

    async fn upload_mission(&self, mission: &Mission) -> Result<()> {
        self.ensure_open()?;
        self.mission.upload(mission).await
    }

    async fn arm(&self) -> Result<()> {
        self.ensure_open()?;
        self.commander.arm().await
    }

    async fn takeoff(&self, target_altitude: f64) -> Result<()> {
        self.ensure_open()?;
        self.commander.takeoff(target_altitude).await
    }

    async fn set_mode(&self, mode: FlightMode) -> Result<()> {
        self.ensure_open()?;
        self.commander.set_mode(mode).await
    }

    async fn set_groundspeed(&self, speed: f64) -> Result<()> {
        self.ensure_open()?;
        self.commander.set_groundspeed(speed).await
    }

    fn read_position(&self) -> Result<Location> {
        self.telemetry.position()
    }

    fn read_airspeed(&self) -> Result<f64> {
        self.telemetry.airspeed()
    }

    fn read_next_waypoint_index(&self) -> u16 {
        self.mission.next()
    }

    async fn set_next_waypoint_index(&self, index: u16) -> Result<()> {
        self.ensure_open()?;
        self.mission.set_next(index).await
    }

    fn is_armable(&self) -> bool {
        self.telemetry.is_armable()
    }

    fn is_armed(&self) -> bool {
        self.telemetry.is_armed()
    }

    async fn subscribe_altitude(&self, callback: AltitudeCallback) -> Result<SubscriptionId> {
        self.ensure_open()?;
        self.telemetry.subscribe_altitude(callback)
    }

    async fn unsubscribe_altitude(&self, id: SubscriptionId) -> Result<()> {
        self.telemetry.unsubscribe_altitude(id).await;
        Ok(())
    }

    async fn land(&self) -> Result<()> {
        self.ensure_open()?;
        self.commander.land().await
    }

    async fn close(&self) {
        Vehicle::close(self).await
    }
}
