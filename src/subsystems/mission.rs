//! # Mission subsystem
//!
//! Uploads waypoint lists to the vehicle and manipulates the autopilot's
//! waypoint cursor. Clear and upload are acknowledged by the vehicle; the
//! acknowledgement is awaited for at most
//! [Timeouts::mission_ack](crate::config::Timeouts::mission_ack).

use crate::config::Timeouts;
use crate::dispatch::WaitForAck;
use crate::link::{MissionOp, MissionResult, Uplink};
use crate::mission::Mission;
use crate::subsystems::telemetry::StateCell;
use crate::{Error, Result};
use flume::{Receiver, Sender};
use futures::lock::Mutex;
use std::sync::Arc;

/// # Access to the mission subsystem
///
/// See the [mission module documentation](crate::subsystems::mission) for more context and information.
#[derive(Debug)]
pub struct MissionControl {
    uplink: Sender<Uplink>,
    ack_downlink: Mutex<Receiver<(MissionOp, MissionResult)>>,
    state: Arc<StateCell>,
    timeouts: Timeouts,
}

impl MissionControl {
    pub(crate) fn new(
        uplink: Sender<Uplink>,
        ack_downlink: Receiver<(MissionOp, MissionResult)>,
        state: Arc<StateCell>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            uplink,
            ack_downlink: Mutex::new(ack_downlink),
            state,
            timeouts,
        }
    }

    async fn transaction(&self, op: MissionOp, message: Uplink) -> Result<()> {
        let ack_downlink = self.ack_downlink.lock().await;

        // Answers to transactions that timed out earlier
        while ack_downlink.try_recv().is_ok() {}

        self.uplink
            .send_async(message)
            .await
            .map_err(|_| Error::Disconnected)?;

        let result = tokio::time::timeout(self.timeouts.mission_ack, ack_downlink.wait_ack(op))
            .await
            .map_err(|_| Error::UploadError(format!("no acknowledgement for mission {:?}", op)))??;

        match result {
            MissionResult::Accepted => Ok(()),
            rejected => Err(Error::UploadError(rejected.to_string())),
        }
    }

    /// Remove all mission items from the vehicle
    pub async fn clear(&self) -> Result<()> {
        self.transaction(MissionOp::Clear, Uplink::MissionClear).await
    }

    /// Replace the vehicle mission.
    ///
    /// Returns [Error::UploadError] if the vehicle rejects the mission (too
    /// many waypoints, armed) or does not acknowledge it.
    pub async fn upload(&self, mission: &Mission) -> Result<()> {
        self.transaction(
            MissionOp::Upload,
            Uplink::MissionUpload(mission.waypoints().to_vec()),
        )
        .await
    }

    /// Autopilot waypoint index, 0 is home
    pub fn next(&self) -> u16 {
        self.state.snapshot().next_waypoint_index
    }

    /// Move the autopilot waypoint cursor, 0 is home
    pub async fn set_next(&self, index: u16) -> Result<()> {
        self.uplink
            .send_async(Uplink::SetCurrentWaypoint(index))
            .await
            .map_err(|_| Error::Disconnected)
    }
}
