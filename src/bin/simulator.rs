use adcs::config::AdcsConfig;
use adcs::hal::SystemClock;
use adcs::persistence::{FileNvm, InMemoryNvm, NvmDevice};
use adcs::sim::{FaultInjector, Mission, Scenario, SimPlatform};
use clap::{App, Arg};
use std::path::Path;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let matches = App::new("adcs-simulator")
        .version("0.1.0")
        .about("Real-time ADCS supervisor simulation")
        .arg(
            Arg::with_name("scenario")
                .long("scenario")
                .takes_value(true)
                .possible_values(&["deployment", "power-dip", "tumble", "stuck-sensor", "critical", "random"])
                .default_value("random"),
        )
        .arg(
            Arg::with_name("seed")
                .long("seed")
                .takes_value(true)
                .default_value("305419896"),
        )
        .arg(
            Arg::with_name("nvm")
                .long("nvm")
                .value_name("PATH")
                .help("Persist state to this file so restarts boot from it")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("config")
                .long("config")
                .value_name("FILE")
                .takes_value(true),
        )
        .get_matches();

    let config = match matches.value_of("config") {
        Some(path) => AdcsConfig::from_file(Path::new(path))?,
        None => AdcsConfig::default(),
    };
    let scenario = matches
        .value_of("scenario")
        .and_then(Scenario::parse)
        .unwrap_or(Scenario::Random);
    let seed: u64 = matches.value_of("seed").unwrap_or("0").parse()?;

    println!("🛰️  ADCS Supervisor Simulator");
    println!("============================");

    let (model, injector) = scenario.build(seed);
    info!(scenario = %scenario, period_ms = config.cycle_period_ms, "starting simulation");

    match matches.value_of("nvm") {
        Some(path) => run(config, SimPlatform::new(model, SystemClock::new()), injector, FileNvm::new(path)).await?,
        None => run(config, SimPlatform::new(model, SystemClock::new()), injector, InMemoryNvm::new()).await?,
    }

    println!("🚀 ADCS Simulator stopped");
    Ok(())
}

async fn run<D: NvmDevice + Clone>(
    config: AdcsConfig,
    platform: SimPlatform<SystemClock>,
    injector: FaultInjector,
    device: D,
) -> Result<(), Box<dyn std::error::Error>> {
    let period_ms = config.cycle_period_ms;
    let mut mission = Mission::new(config, platform, injector, device)?;

    // 1 Hz control cycle by default
    let mut interval = time::interval(Duration::from_millis(u64::from(period_ms)));
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }

        let step = mission.step()?;

        for snapshot in mission.platform().telemetry().drain() {
            match snapshot.to_json() {
                Ok(json) => info!("📡 TELEMETRY: {}", json),
                Err(e) => error!("failed to encode telemetry: {}", e),
            }
        }
        if let Some(cause) = step.rebooted {
            warn!(?cause, reboots = mission.reboots(), "supervisor rebooted");
        }

        mission.platform().step(period_ms);
    }

    let stats = mission.injector().stats();
    info!(
        cycles = mission.steps(),
        reboots = mission.reboots(),
        faults_injected = stats.total_faults_injected,
        "simulation finished"
    );
    Ok(())
}
