use clap::builder::{PossibleValuesParser, TypedValueParser};
use clap::{value_parser, Arg, ArgMatches, Command};
use log::{debug, error, info, warn};
use quad_tour::link::LinkContext;
use quad_tour::pause::{KeyReader, PauseController};
use quad_tour::sim::SimConfig;
use quad_tour::{
    build_mission, CancelToken, MissionConfig, MissionFlags, MissionReport, MissionRunner,
    PauseScope, Vehicle,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    // The key reader puts the terminal in raw mode, lines need an explicit carriage return
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            write!(
                buf,
                "[{} {:<5} {}] {}\r\n",
                buf.timestamp(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let matches = command().get_matches();
    let config = config_from(&matches);
    debug!("{:?}", config);

    let target = matches.get_one::<String>("connection").cloned();

    // A line reader thread blocked on stdin would keep the runtime alive, leave through exit()
    let code = match run(target, config).await {
        Ok(report) => {
            info!("Landed, altitude: {:.2}", report.final_altitude);
            if report.breached {
                warn!("The altitude ceiling was exceeded during the tour");
            }
            0
        }
        Err(e) => {
            error!("Tour aborted: {}", e);
            1
        }
    };
    std::process::exit(code);
}

fn command() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("connection")
                .value_name("CONNECTION")
                .help("Vehicle connection string, a simulator is started when omitted"),
        )
        .arg(
            Arg::new("max-altitude")
                .long("max-altitude")
                .value_name("METRES")
                .help("Altitude ceiling, the vehicle lands when it is exceeded [default: 10]")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("target-altitude")
                .long("target-altitude")
                .value_name("METRES")
                .help("Takeoff altitude [default: 5]")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("groundspeed")
                .long("groundspeed")
                .value_name("M/S")
                .help("Groundspeed during the tour [default: 1]")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("pause-key")
                .long("pause-key")
                .value_name("KEY")
                .help("Key pausing and resuming the mission [default: p]"),
        )
        .arg(
            Arg::new("pause-scope")
                .long("pause-scope")
                .value_name("SCOPE")
                .help("Where pause is honoured: monitoring or mission")
                .value_parser(
                    PossibleValuesParser::new(["monitoring", "mission"])
                        .try_map(|scope| scope.parse::<PauseScope>()),
                )
                .default_value("monitoring"),
        )
        .arg(
            Arg::new("poll-interval-ms")
                .long("poll-interval-ms")
                .value_name("MS")
                .help("Interval between two status reads [default: 1000]")
                .value_parser(value_parser!(u64)),
        )
}

fn config_from(matches: &ArgMatches) -> MissionConfig {
    let mut config = MissionConfig::default();
    if let Some(pause_scope) = matches.get_one::<PauseScope>("pause-scope") {
        config.pause_scope = *pause_scope;
    }
    if let Some(max_altitude) = matches.get_one::<f64>("max-altitude") {
        config.max_altitude = *max_altitude;
    }
    if let Some(target_altitude) = matches.get_one::<f64>("target-altitude") {
        config.target_altitude = *target_altitude;
    }
    if let Some(groundspeed) = matches.get_one::<f64>("groundspeed") {
        config.groundspeed = *groundspeed;
    }
    if let Some(key) = matches.get_one::<String>("pause-key") {
        config.pause_key = key.clone();
    }
    if let Some(interval) = matches.get_one::<u64>("poll-interval-ms") {
        config.timeouts.poll_interval = Duration::from_millis(*interval);
    }
    config
}

async fn run(target: Option<String>, config: MissionConfig) -> quad_tour::Result<MissionReport> {
    let context = LinkContext::new();
    let target = match target {
        Some(target) => target,
        None => {
            info!("No connection target, starting a simulated vehicle");
            context.start_sitl(config.start, SimConfig::default())
        }
    };

    let cancel = CancelToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, aborting the tour");
            interrupt.cancel();
        }
    });

    let vehicle = Vehicle::connect(&context, &target, config.timeouts, cancel.clone()).await?;
    let vehicle = Arc::new(vehicle);

    let flags = Arc::new(MissionFlags::new());
    let stop_keys = CancelToken::new();
    info!(
        "Press '{}' to pause or resume the mission",
        config.pause_key
    );
    let (keyboard, keys) = KeyReader::start(cancel.clone());
    let pause = PauseController::new(flags.clone(), config.pause_key.clone())
        .spawn(keys, stop_keys.clone());

    let mission = build_mission(&config.start, &config.destination);
    let report = MissionRunner::new(vehicle, config, flags, cancel)
        .run(&mission)
        .await;

    stop_keys.cancel();
    if let Err(e) = pause.await {
        warn!("Pause controller failed: {}", e);
    }
    keyboard.stop().await;

    report
}
