mod common;

use common::{Call, ScriptedVehicle};
use quad_tour::runner::leg_complete;
use quad_tour::{
    build_mission, CancelToken, Error, FlightMode, Mission, MissionConfig, MissionFlags,
    MissionPhase, MissionRunner, PauseScope,
};
use std::sync::Arc;
use std::time::Duration;

fn tour(config: &MissionConfig) -> Mission {
    build_mission(&config.start, &config.destination)
}

#[test]
fn leg_is_complete_when_heading_for_the_sentinel() {
    assert!(!leg_complete(0, 1));
    assert!(!leg_complete(1, 1));
    assert!(leg_complete(2, 1));
    assert!(leg_complete(4, 3));
}

#[tokio::test(start_paused = true)]
async fn exits_mission_when_index_reaches_sentinel() {
    let vehicle = Arc::new(ScriptedVehicle::new().with_indices(vec![0, 1, 2]));
    let config = MissionConfig::default();
    let mission = tour(&config);

    let report = MissionRunner::new(
        vehicle.clone(),
        config,
        Arc::new(MissionFlags::new()),
        CancelToken::new(),
    )
    .run(&mission)
    .await
    .unwrap();

    assert_eq!(report.exit_index, Some(2));
    assert!(!report.breached);
    assert_eq!(report.final_altitude, 0.0);
    assert_eq!(
        report.phases,
        vec![
            MissionPhase::Init,
            MissionPhase::Arming,
            MissionPhase::Takeoff,
            MissionPhase::MissionStart,
            MissionPhase::Monitoring,
            MissionPhase::Landing,
            MissionPhase::Closed,
        ]
    );

    // Leaving the mission resets the cursor and clears the items
    let calls = vehicle.calls();
    let reset = vehicle.position_of(&Call::SetNextWaypoint(0)).unwrap();
    assert_eq!(calls[reset + 1], Call::ClearMission);
    assert_eq!(vehicle.modes(), vec![FlightMode::Auto, FlightMode::Land]);
    assert_eq!(vehicle.count(&Call::UploadMission(2)), 1);
}

#[tokio::test(start_paused = true)]
async fn mission_is_uploaded_before_arming() {
    let vehicle = Arc::new(ScriptedVehicle::new().with_indices(vec![2]));
    let config = MissionConfig::default();
    let mission = tour(&config);

    MissionRunner::new(
        vehicle.clone(),
        config,
        Arc::new(MissionFlags::new()),
        CancelToken::new(),
    )
    .run(&mission)
    .await
    .unwrap();

    let calls = vehicle.calls();
    assert_eq!(calls[0], Call::Subscribe);
    assert_eq!(calls[1], Call::ClearMission);
    assert_eq!(calls[2], Call::UploadMission(2));
    assert_eq!(calls[3], Call::Arm);
    assert_eq!(calls[4], Call::Takeoff(5.0));
    assert_eq!(calls[5], Call::SetMode(FlightMode::Auto));
    assert_eq!(calls[6], Call::SetGroundspeed(1.0));
}

#[tokio::test(start_paused = true)]
async fn listener_is_removed_before_closing() {
    let vehicle = Arc::new(ScriptedVehicle::new().with_indices(vec![1, 2]));
    let config = MissionConfig::default();
    let mission = tour(&config);

    MissionRunner::new(
        vehicle.clone(),
        config,
        Arc::new(MissionFlags::new()),
        CancelToken::new(),
    )
    .run(&mission)
    .await
    .unwrap();

    let unsubscribe = vehicle.position_of(&Call::Unsubscribe).unwrap();
    let close = vehicle.position_of(&Call::Close).unwrap();
    assert!(unsubscribe < close);
    assert_eq!(vehicle.calls().last(), Some(&Call::Close));
    assert_eq!(vehicle.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn breach_during_takeoff_skips_the_mission() {
    let vehicle = Arc::new(
        ScriptedVehicle::new()
            .with_climb(vec![2.0, 5.0, 9.0, 11.0, 12.0, 8.0])
            .with_indices(vec![1]),
    );
    let config = MissionConfig {
        target_altitude: 12.0,
        ..MissionConfig::default()
    };
    let mission = tour(&config);

    let report = MissionRunner::new(
        vehicle.clone(),
        config,
        Arc::new(MissionFlags::new()),
        CancelToken::new(),
    )
    .run(&mission)
    .await
    .unwrap();

    assert!(report.breached);
    assert_eq!(report.exit_index, None);
    assert!(!report.phases.contains(&MissionPhase::MissionStart));
    assert!(!report.phases.contains(&MissionPhase::Monitoring));
    assert_eq!(vehicle.count(&Call::Land), 1);
    assert!(!vehicle.modes().contains(&FlightMode::Auto));
}

#[tokio::test(start_paused = true)]
async fn arming_failure_closes_without_landing() {
    let vehicle = Arc::new(
        ScriptedVehicle::new().failing_arm(Error::ArmError("not armable".to_owned())),
    );
    let config = MissionConfig::default();
    let mission = tour(&config);

    let error = MissionRunner::new(
        vehicle.clone(),
        config,
        Arc::new(MissionFlags::new()),
        CancelToken::new(),
    )
    .run(&mission)
    .await
    .unwrap_err();

    assert!(matches!(error, Error::ArmError(_)));
    assert_eq!(vehicle.count(&Call::Land), 0);
    assert_eq!(vehicle.count(&Call::Unsubscribe), 1);
    assert_eq!(vehicle.calls().last(), Some(&Call::Close));
}

#[tokio::test(start_paused = true)]
async fn failure_in_the_air_lands_then_closes() {
    let vehicle = Arc::new(
        ScriptedVehicle::new().failing_takeoff(Error::Timeout("takeoff altitude".to_owned())),
    );
    let config = MissionConfig::default();
    let mission = tour(&config);

    let error = MissionRunner::new(
        vehicle.clone(),
        config,
        Arc::new(MissionFlags::new()),
        CancelToken::new(),
    )
    .run(&mission)
    .await
    .unwrap_err();

    assert_eq!(error, Error::Timeout("takeoff altitude".to_owned()));
    let land = vehicle.position_of(&Call::Land).unwrap();
    let close = vehicle.position_of(&Call::Close).unwrap();
    assert!(land < close);
}

#[tokio::test(start_paused = true)]
async fn pause_holds_position_then_resumes() {
    let vehicle = Arc::new(ScriptedVehicle::new().with_indices(vec![1, 1, 1, 2]));
    let config = MissionConfig::default();
    let mission = tour(&config);
    let flags = Arc::new(MissionFlags::new());

    // Only honoured once monitoring, arming and takeoff go ahead
    flags.toggle_pause();
    let resume = {
        let flags = flags.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            flags.toggle_pause();
        })
    };

    let report = MissionRunner::new(vehicle.clone(), config, flags, CancelToken::new())
        .run(&mission)
        .await
        .unwrap();
    resume.await.unwrap();

    assert_eq!(report.exit_index, Some(2));
    assert_eq!(
        vehicle.modes(),
        vec![
            FlightMode::Auto,
            FlightMode::Guided,
            FlightMode::Auto,
            FlightMode::Land
        ]
    );
    assert_eq!(vehicle.count(&Call::SetGroundspeed(1.0)), 2);
}

#[tokio::test(start_paused = true)]
async fn mission_scope_pause_holds_before_arming() {
    let vehicle = Arc::new(ScriptedVehicle::new().with_indices(vec![2]));
    let config = MissionConfig {
        pause_scope: PauseScope::Mission,
        ..MissionConfig::default()
    };
    let mission = tour(&config);
    let flags = Arc::new(MissionFlags::new());
    flags.toggle_pause();

    let resume = {
        let flags = flags.clone();
        let vehicle = vehicle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            let armed_while_paused = vehicle.count(&Call::Arm) > 0;
            flags.toggle_pause();
            armed_while_paused
        })
    };

    let report = MissionRunner::new(vehicle.clone(), config, flags, CancelToken::new())
        .run(&mission)
        .await
        .unwrap();

    assert!(!resume.await.unwrap());
    assert_eq!(vehicle.count(&Call::Arm), 1);
    assert_eq!(report.phases.last(), Some(&MissionPhase::Closed));
}

#[tokio::test(start_paused = true)]
async fn cancel_aborts_and_closes() {
    let vehicle = Arc::new(ScriptedVehicle::new().with_indices(vec![1]));
    let config = MissionConfig::default();
    let mission = tour(&config);
    let cancel = CancelToken::new();

    let trigger = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(20)).await;
            cancel.cancel();
        })
    };

    let error = MissionRunner::new(vehicle.clone(), config, Arc::new(MissionFlags::new()), cancel)
        .run(&mission)
        .await
        .unwrap_err();
    trigger.await.unwrap();

    assert_eq!(error, Error::Cancelled);
    assert_eq!(vehicle.count(&Call::Land), 1);
    assert_eq!(vehicle.calls().last(), Some(&Call::Close));
}

#[tokio::test(start_paused = true)]
async fn breach_before_takeoff_skips_arming() {
    let vehicle = Arc::new(ScriptedVehicle::new().with_indices(vec![1]));
    let config = MissionConfig::default();
    let mission = tour(&config);

    // Reported while the listener settles, before anything is uploaded
    let gust = {
        let vehicle = vehicle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            vehicle.report_altitude(11.0);
        })
    };

    let report = MissionRunner::new(
        vehicle.clone(),
        config,
        Arc::new(MissionFlags::new()),
        CancelToken::new(),
    )
    .run(&mission)
    .await
    .unwrap();
    gust.await.unwrap();

    assert!(report.breached);
    assert_eq!(
        report.phases,
        vec![MissionPhase::Init, MissionPhase::Landing, MissionPhase::Closed]
    );
    assert_eq!(vehicle.count(&Call::Land), 1);
    assert_eq!(vehicle.count(&Call::UploadMission(2)), 0);
    assert_eq!(vehicle.count(&Call::Arm), 0);
    assert_eq!(vehicle.count(&Call::Takeoff(5.0)), 0);
    assert_eq!(
        vehicle.modes(),
        vec![FlightMode::Guided, FlightMode::Land, FlightMode::Land]
    );
}

#[tokio::test(start_paused = true)]
async fn breach_while_monitoring_leaves_the_mission() {
    let vehicle = Arc::new(ScriptedVehicle::new().with_indices(vec![1]));
    let config = MissionConfig::default();
    let mission = tour(&config);

    let gust = {
        let vehicle = vehicle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            vehicle.report_altitude(11.0);
        })
    };

    let report = MissionRunner::new(
        vehicle.clone(),
        config,
        Arc::new(MissionFlags::new()),
        CancelToken::new(),
    )
    .run(&mission)
    .await
    .unwrap();
    gust.await.unwrap();

    assert!(report.breached);
    assert_eq!(report.exit_index, None);
    assert_eq!(report.final_altitude, 0.0);
    assert_eq!(
        report.phases[report.phases.len() - 3..],
        [MissionPhase::Monitoring, MissionPhase::Landing, MissionPhase::Closed]
    );
    assert_eq!(vehicle.count(&Call::Land), 1);
    assert_eq!(vehicle.count(&Call::SetNextWaypoint(0)), 0);
}

#[tokio::test(start_paused = true)]
async fn telemetry_gaps_within_retries_are_recovered() {
    let vehicle = Arc::new(
        ScriptedVehicle::new()
            .with_indices(vec![2])
            .with_position_gaps(3),
    );
    let config = MissionConfig::default();
    let mission = tour(&config);

    let report = MissionRunner::new(
        vehicle.clone(),
        config,
        Arc::new(MissionFlags::new()),
        CancelToken::new(),
    )
    .run(&mission)
    .await
    .unwrap();

    assert_eq!(report.exit_index, Some(2));
    // Three failed reads and one good one while monitoring, one while landing
    assert_eq!(vehicle.position_reads(), 5);
    assert_eq!(report.phases.last(), Some(&MissionPhase::Closed));
}

#[tokio::test(start_paused = true)]
async fn telemetry_gap_past_retries_fails_the_run() {
    let vehicle = Arc::new(
        ScriptedVehicle::new()
            .with_indices(vec![1])
            .with_position_gaps(4),
    );
    let config = MissionConfig::default();
    let mission = tour(&config);

    let error = MissionRunner::new(
        vehicle.clone(),
        config,
        Arc::new(MissionFlags::new()),
        CancelToken::new(),
    )
    .run(&mission)
    .await
    .unwrap_err();

    assert_eq!(error, Error::TelemetryTimeout);
    assert_eq!(vehicle.position_reads(), 4);
    let land = vehicle.position_of(&Call::Land).unwrap();
    let unsubscribe = vehicle.position_of(&Call::Unsubscribe).unwrap();
    let close = vehicle.position_of(&Call::Close).unwrap();
    assert!(land < unsubscribe && unsubscribe < close);
}
