//! Downlink dispatch utils used by the lib
//!
//! These functionalities are currently all private, some might be useful for the user code as well, lets make them
//! public when needed.

use crate::link::{Downlink, FlightMode, Link, MissionOp, MissionResult};
use crate::subsystems::telemetry::StateCell;
use crate::{Error, Result};
use async_broadcast::Sender as BroadcastSender;
use async_trait::async_trait;
use flume::{Receiver, Sender};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Routes every downlink message to the subsystem that owns it
pub(crate) struct TelemetryDispatch {
    link: Arc<dyn Link>,
    state: Arc<StateCell>,
    altitude: BroadcastSender<f64>,
    mission_acks: Sender<(MissionOp, MissionResult)>,
    disconnect: Arc<AtomicBool>,
}

impl TelemetryDispatch {
    pub fn new(
        link: Arc<dyn Link>,
        state: Arc<StateCell>,
        altitude: BroadcastSender<f64>,
        mission_acks: Sender<(MissionOp, MissionResult)>,
        disconnect: Arc<AtomicBool>,
    ) -> Self {
        TelemetryDispatch {
            link,
            state,
            altitude,
            mission_acks,
            disconnect,
        }
    }

    pub fn run(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            while !self.disconnect.load(Relaxed) {
                match tokio::time::timeout(Duration::from_millis(200), self.link.recv()).await {
                    Ok(Ok(message)) => self.dispatch(message),
                    Err(_) => continue,
                    Ok(Err(_)) => return, // Link closed
                }
            }
        })
    }

    fn dispatch(&self, message: Downlink) {
        match message {
            Downlink::Heartbeat {
                armable,
                armed,
                custom_mode,
            } => self
                .state
                .update_heartbeat(armable, armed, FlightMode::from(custom_mode)),
            Downlink::Position { location, airspeed } => {
                self.state.update_position(location, airspeed);
                // Overflow mode, a slow listener loses old samples and never blocks us
                let _ = self.altitude.try_broadcast(location.alt);
            }
            Downlink::MissionCurrent(index) => self.state.update_next_waypoint(index),
            Downlink::MissionAck(op, result) => {
                let _ = self.mission_acks.send((op, result));
            }
        }
    }
}

#[async_trait]
pub(crate) trait WaitForAck {
    async fn wait_ack(&self, op: MissionOp) -> Result<MissionResult>;
}

#[async_trait]
impl WaitForAck for Receiver<(MissionOp, MissionResult)> {
    async fn wait_ack(&self, op: MissionOp) -> Result<MissionResult> {
        loop {
            let (ack_op, result) = self.recv_async().await.map_err(|_| Error::Disconnected)?;
            if ack_op == op {
                return Ok(result);
            }
        }
    }
}
