mod common;

use common::{Call, ScriptedVehicle};
use quad_tour::{AltitudeWatchdog, Error, Lander, MissionFlags, VehicleControl, WatchdogState};
use std::sync::Arc;

fn watchdog(vehicle: &Arc<ScriptedVehicle>, flags: &Arc<MissionFlags>) -> Arc<AltitudeWatchdog> {
    let lander: Arc<dyn Lander> = vehicle.clone();
    Arc::new(AltitudeWatchdog::new(10.0, flags.clone(), lander))
}

#[tokio::test]
async fn lands_once_on_first_sample_above_ceiling() {
    let vehicle = Arc::new(ScriptedVehicle::new());
    let flags = Arc::new(MissionFlags::new());
    let watchdog = watchdog(&vehicle, &flags);

    let triggered: Vec<bool> = [2.0, 5.0, 9.0, 11.0, 12.0, 8.0]
        .into_iter()
        .map(|altitude| watchdog.observe(altitude))
        .collect();
    watchdog.settle().await.unwrap();

    assert_eq!(triggered, vec![false, false, false, true, false, false]);
    assert_eq!(vehicle.count(&Call::Land), 1);
    assert!(flags.is_breached());
}

#[tokio::test]
async fn ceiling_itself_is_not_a_breach() {
    let vehicle = Arc::new(ScriptedVehicle::new());
    let flags = Arc::new(MissionFlags::new());
    let watchdog = watchdog(&vehicle, &flags);

    assert!(!watchdog.observe(10.0));
    watchdog.settle().await.unwrap();

    assert_eq!(watchdog.state(), WatchdogState::ArmedSafe);
    assert_eq!(vehicle.count(&Call::Land), 0);
}

#[tokio::test]
async fn state_follows_the_safety_flag() {
    let vehicle = Arc::new(ScriptedVehicle::new());
    let flags = Arc::new(MissionFlags::new());
    let watchdog = watchdog(&vehicle, &flags);

    assert_eq!(watchdog.state(), WatchdogState::ArmedSafe);
    watchdog.observe(10.5);
    assert_eq!(watchdog.state(), WatchdogState::Breached);

    // A new run starts safe again
    flags.reset_breach();
    assert_eq!(watchdog.state(), WatchdogState::ArmedSafe);
}

#[tokio::test]
async fn callback_feeds_subscribed_samples() {
    let vehicle = Arc::new(ScriptedVehicle::new());
    let flags = Arc::new(MissionFlags::new());
    let watchdog = watchdog(&vehicle, &flags);

    let id = vehicle.subscribe_altitude(watchdog.callback()).await.unwrap();
    for altitude in [3.0, 10.2, 14.0, 11.0] {
        vehicle.report_altitude(altitude);
    }
    watchdog.settle().await.unwrap();
    vehicle.unsubscribe_altitude(id).await.unwrap();

    assert_eq!(vehicle.count(&Call::Land), 1);
    assert_eq!(vehicle.listener_count(), 0);
}

#[tokio::test]
async fn latch_is_won_by_a_single_caller() {
    let flags = Arc::new(MissionFlags::new());

    let contenders: Vec<_> = (0..8)
        .map(|_| {
            let flags = flags.clone();
            tokio::spawn(async move { flags.latch_breach() })
        })
        .collect();

    let mut winners = 0;
    for contender in contenders {
        if contender.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn lost_landing_task_is_reported() {
    let vehicle = Arc::new(ScriptedVehicle::new().panicking_land());
    let flags = Arc::new(MissionFlags::new());
    let watchdog = watchdog(&vehicle, &flags);

    assert!(watchdog.observe(11.0));

    assert!(matches!(watchdog.settle().await, Err(Error::SystemError(_))));
    assert!(flags.is_breached());
}
