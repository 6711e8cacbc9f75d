//! # Altitude watchdog
//!
//! Forces a landing the first time the vehicle climbs above the ceiling.
//!
//! The watchdog has two states, [WatchdogState::ArmedSafe] and the terminal
//! [WatchdogState::Breached]. It is fed every altitude sample by a telemetry
//! subscription (see [AltitudeWatchdog::callback()]) and shares the safety
//! flag with the mission runner through [MissionFlags].
//!
//! The landing command is issued from its own task: the notification task
//! calling the watchdog never waits on the vehicle.

use crate::state::MissionFlags;
use crate::subsystems::telemetry::AltitudeCallback;
use crate::vehicle::VehicleControl;
use crate::Result;
use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

/// Something that can be asked to land
#[async_trait]
pub trait Lander: Send + Sync {
    /// Land at the current location
    async fn land(&self) -> Result<()>;
}

#[async_trait]
impl<T> Lander for T
where
    T: VehicleControl + ?Sized,
{
    async fn land(&self) -> Result<()> {
        VehicleControl::land(self).await
    }
}

/// State of the watchdog within a mission run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Below the ceiling so far
    ArmedSafe,
    /// The ceiling was exceeded and a landing was requested
    Breached,
}

/// Lands the vehicle once when the altitude goes above `max_altitude`
pub struct AltitudeWatchdog {
    max_altitude: f64,
    flags: Arc<MissionFlags>,
    lander: Arc<dyn Lander>,
    landing: Mutex<Option<JoinHandle<()>>>,
}

impl AltitudeWatchdog {
    /// New watchdog sharing `flags` with the mission runner
    pub fn new(max_altitude: f64, flags: Arc<MissionFlags>, lander: Arc<dyn Lander>) -> Self {
        Self {
            max_altitude,
            flags,
            lander,
            landing: Mutex::new(None),
        }
    }

    /// Altitude ceiling in metres
    pub fn max_altitude(&self) -> f64 {
        self.max_altitude
    }

    /// Current state, derived from the shared safety flag
    pub fn state(&self) -> WatchdogState {
        if self.flags.is_breached() {
            WatchdogState::Breached
        } else {
            WatchdogState::ArmedSafe
        }
    }

    /// Feed one altitude sample.
    ///
    /// Returns `true` when this sample triggered the landing. Only the first
    /// sample above the ceiling does; later ones are ignored. Must be called
    /// from within a tokio runtime.
    pub fn observe(&self, altitude: f64) -> bool {
        if altitude <= self.max_altitude || !self.flags.latch_breach() {
            return false;
        }

        warn!(
            "Altitude is past set limit: {:.2}m > {:.2}m",
            altitude, self.max_altitude
        );
        let lander = self.lander.clone();
        let landing = tokio::spawn(async move {
            match lander.land().await {
                Ok(()) => info!("Ceiling breach landing requested"),
                Err(e) => error!("Could not land after ceiling breach: {}", e),
            }
        });
        *self.landing.lock().unwrap_or_else(PoisonError::into_inner) = Some(landing);

        true
    }

    /// Callback to subscribe to the vehicle altitude updates
    pub fn callback(self: &Arc<Self>) -> AltitudeCallback {
        let watchdog = Arc::clone(self);
        Arc::new(move |altitude: f64| {
            watchdog.observe(altitude);
        })
    }

    /// Wait for an in-flight landing command to be sent.
    ///
    /// Returns [Error::SystemError](crate::Error::SystemError) if the landing
    /// task panicked or was aborted.
    pub async fn settle(&self) -> Result<()> {
        let landing = self
            .landing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(landing) = landing {
            landing.await?;
        }
        Ok(())
    }
}
