use adcs::config::{deg_per_s_to_rad_per_s, AdcsConfig};
use adcs::persistence::{
    inspect_block, FileNvm, InMemoryNvm, NvmDevice, PersistentRecord, PersistentStateStore,
    StoredRecord, RECORD_SIZE,
};
use adcs::sim::{InjectionEvent, ManualClock, Mission, MissionStep, Scenario, SimPlatform};
use adcs::state::AdcsMode;
use adcs::state_machine::{decide_boot, BootReason, BootReport};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use std::path::Path;

const DEFAULT_NVM_PATH: &str = "adcs_state.bin";
const DEFAULT_CYCLES: &str = "60";
const DEFAULT_SEED: &str = "305419896";

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> CliResult {
    let matches = App::new("adcs")
        .version("0.1.0")
        .author("Space Systems Engineering Team")
        .about("🛰️  ADCS supervisor tooling - persisted state inspection and simulation")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("nvm")
                .short("n")
                .long("nvm")
                .value_name("PATH")
                .help("File backing the persisted state record")
                .takes_value(true)
                .default_value(DEFAULT_NVM_PATH)
                .global(true),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file (defaults apply when omitted)")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table", "compact"])
                .default_value("table")
                .global(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log supervisor activity to stderr")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("inspect")
                .about("🔍 Decode and validate the persisted state record"),
        )
        .subcommand(
            SubCommand::with_name("boot")
                .about("🚀 Predict the boot mode the supervisor would choose"),
        )
        .subcommand(
            SubCommand::with_name("init")
                .about("💾 Write a freshly sealed state record")
                .arg(
                    Arg::with_name("mode")
                        .long("mode")
                        .value_name("MODE")
                        .help("Mode name, e.g. NOMINAL_POINTING")
                        .takes_value(true)
                        .default_value("DETUMBLING"),
                )
                .arg(
                    Arg::with_name("power")
                        .long("power")
                        .value_name("WATTS")
                        .takes_value(true)
                        .default_value("5.0")
                        .validator(|v| match v.parse::<f32>() {
                            Ok(w) if w.is_finite() => Ok(()),
                            _ => Err("Power must be a number of watts".into()),
                        }),
                )
                .arg(
                    Arg::with_name("rate")
                        .long("rate")
                        .value_name("X,Y,Z")
                        .help("Body rates in rad/s, or one value for all axes")
                        .takes_value(true)
                        .default_value("0,0,0"),
                )
                .arg(
                    Arg::with_name("deg")
                        .long("deg")
                        .help("Interpret --rate in deg/s"),
                )
                .arg(
                    Arg::with_name("resets")
                        .long("resets")
                        .value_name("COUNT")
                        .help("Consecutive software reset count")
                        .takes_value(true)
                        .default_value("0")
                        .validator(|v| match v.parse::<u8>() {
                            Ok(_) => Ok(()),
                            Err(_) => Err("Reset count must be 0-255".into()),
                        }),
                )
                .arg(
                    Arg::with_name("entry-time")
                        .long("entry-time")
                        .value_name("MS")
                        .takes_value(true)
                        .default_value("0"),
                ),
        )
        .subcommand(
            SubCommand::with_name("corrupt")
                .about("⚡ Flip one bit of the stored record")
                .arg(
                    Arg::with_name("bit")
                        .help("Bit index, 0-239")
                        .required(true)
                        .validator(|v| match v.parse::<usize>() {
                            Ok(bit) if bit < RECORD_SIZE * 8 => Ok(()),
                            _ => Err(format!("Bit index must be below {}", RECORD_SIZE * 8)),
                        }),
                ),
        )
        .subcommand(
            SubCommand::with_name("erase")
                .about("🧹 Reset the record to erased flash (all 0xFF)")
                .arg(
                    Arg::with_name("force")
                        .long("force")
                        .help("Confirm erasing the record"),
                ),
        )
        .subcommand(
            SubCommand::with_name("simulate")
                .about("🛰️  Run the supervisor against a simulated spacecraft")
                .arg(
                    Arg::with_name("scenario")
                        .short("s")
                        .long("scenario")
                        .takes_value(true)
                        .possible_values(&["deployment", "power-dip", "tumble", "stuck-sensor", "critical", "random"])
                        .default_value("deployment"),
                )
                .arg(
                    Arg::with_name("cycles")
                        .long("cycles")
                        .takes_value(true)
                        .default_value(DEFAULT_CYCLES)
                        .validator(|v| match v.parse::<u32>() {
                            Ok(n) if n > 0 => Ok(()),
                            _ => Err("Cycle count must be a positive number".into()),
                        }),
                )
                .arg(
                    Arg::with_name("seed")
                        .long("seed")
                        .takes_value(true)
                        .default_value(DEFAULT_SEED)
                        .validator(|v| match v.parse::<u64>() {
                            Ok(_) => Ok(()),
                            Err(_) => Err("Seed must be a number".into()),
                        }),
                )
                .arg(
                    Arg::with_name("persist")
                        .long("persist")
                        .help("Use the --nvm file instead of volatile storage"),
                ),
        )
        .subcommand(SubCommand::with_name("config").about("⚙️  Print the effective configuration"))
        .get_matches();

    let nvm_path = matches.value_of("nvm").unwrap_or(DEFAULT_NVM_PATH);
    let format = matches.value_of("format").unwrap_or("table");
    let verbose = matches.is_present("verbose");

    if verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = match matches.value_of("config") {
        Some(path) => AdcsConfig::from_file(Path::new(path))?,
        None => AdcsConfig::default(),
    };

    match matches.subcommand() {
        ("inspect", Some(_)) => handle_inspect(nvm_path, format)?,
        ("boot", Some(_)) => handle_boot(nvm_path, &config, format)?,
        ("init", Some(sub_matches)) => handle_init(sub_matches, nvm_path, format)?,
        ("corrupt", Some(sub_matches)) => handle_corrupt(sub_matches, nvm_path)?,
        ("erase", Some(sub_matches)) => handle_erase(sub_matches, nvm_path)?,
        ("simulate", Some(sub_matches)) => handle_simulate(sub_matches, nvm_path, &config, format)?,
        ("config", Some(_)) => println!("{}", serde_json::to_string_pretty(&config)?),
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
        }
    }

    Ok(())
}

fn handle_inspect(nvm_path: &str, format: &str) -> CliResult {
    let mut store = PersistentStateStore::new(FileNvm::new(nvm_path));
    let stored = store.read()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&stored)?),
        "compact" => println!("{}", compact_stored(&stored)),
        _ => print_stored_table(nvm_path, &stored),
    }
    Ok(())
}

fn handle_boot(nvm_path: &str, config: &AdcsConfig, format: &str) -> CliResult {
    let mut store = PersistentStateStore::new(FileNvm::new(nvm_path));
    let outcome = store.read();
    let boot = decide_boot(&outcome, config);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&boot)?),
        "compact" => println!("{}", boot.mode),
        _ => print_boot_table(&boot),
    }
    Ok(())
}

fn handle_init(matches: &ArgMatches<'_>, nvm_path: &str, format: &str) -> CliResult {
    let mode_name = matches.value_of("mode").unwrap_or("DETUMBLING");
    let mode = AdcsMode::parse(mode_name).ok_or_else(|| format!("unknown mode '{}'", mode_name))?;
    let power: f32 = matches.value_of("power").unwrap_or("5.0").parse()?;
    let mut rates = parse_rates(matches.value_of("rate").unwrap_or("0,0,0"))?;
    if matches.is_present("deg") {
        for rate in &mut rates {
            *rate = deg_per_s_to_rad_per_s(*rate);
        }
    }
    let resets: u8 = matches.value_of("resets").unwrap_or("0").parse()?;
    let entry_time: u32 = matches.value_of("entry-time").unwrap_or("0").parse()?;

    let record = PersistentRecord::new(mode, entry_time, rates, power, entry_time as f32 / 1000.0, resets);
    let mut store = PersistentStateStore::new(FileNvm::new(nvm_path));
    let sealed = store.write(&record)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&sealed)?),
        _ => println!(
            "{} {} {} {}",
            "✅".green(),
            "Record written:".bright_green(),
            mode_label(sealed.mode),
            format!("crc=0x{:08X}", sealed.checksum).dimmed()
        ),
    }
    Ok(())
}

fn handle_corrupt(matches: &ArgMatches<'_>, nvm_path: &str) -> CliResult {
    let bit: usize = matches.value_of("bit").ok_or("bit index required")?.parse()?;
    let mut device = FileNvm::new(nvm_path);
    let mut block = device.read_block()?.ok_or("no record stored")?;
    block[bit / 8] ^= 1 << (bit % 8);
    device.write_block(&block)?;

    println!(
        "{} {} {}",
        "⚡".yellow(),
        format!("Flipped bit {} (byte {}, mask 0x{:02X})", bit, bit / 8, 1u8 << (bit % 8)).yellow(),
        compact_stored(&inspect_block(&block))
    );
    Ok(())
}

fn handle_erase(matches: &ArgMatches<'_>, nvm_path: &str) -> CliResult {
    if !matches.is_present("force") {
        println!("{}", "Erasing the record requires --force".yellow());
        return Ok(());
    }
    FileNvm::new(nvm_path).write_block(&[0xFF; RECORD_SIZE])?;
    println!("{} {}", "🧹".bright_white(), "Record erased".bright_white());
    Ok(())
}

fn handle_simulate(matches: &ArgMatches<'_>, nvm_path: &str, config: &AdcsConfig, format: &str) -> CliResult {
    let scenario_name = matches.value_of("scenario").unwrap_or("deployment");
    let scenario = Scenario::parse(scenario_name).ok_or_else(|| format!("unknown scenario '{}'", scenario_name))?;
    let cycles: u32 = matches.value_of("cycles").unwrap_or(DEFAULT_CYCLES).parse()?;
    let seed: u64 = matches.value_of("seed").unwrap_or(DEFAULT_SEED).parse()?;

    if format == "table" {
        println!(
            "{} {} {}",
            "🛰️".bright_blue(),
            "Scenario".bright_blue().bold(),
            scenario.name().bright_white()
        );
    }

    if matches.is_present("persist") {
        run_scenario(scenario, seed, cycles, config, FileNvm::new(nvm_path), format)
    } else {
        run_scenario(scenario, seed, cycles, config, InMemoryNvm::new(), format)
    }
}

fn run_scenario<D: NvmDevice + Clone>(
    scenario: Scenario,
    seed: u64,
    cycles: u32,
    config: &AdcsConfig,
    device: D,
    format: &str,
) -> CliResult {
    let (model, injector) = scenario.build(seed);
    let platform = SimPlatform::new(model, ManualClock::new());
    let mut ticker = platform.ticker(config.cycle_period_ms);
    let mut mission = Mission::new(config.clone(), platform, injector, device)?;

    if format == "table" {
        print_boot_table(mission.machine().boot_report());
    }

    let mut json_error = None;
    mission.run(&mut ticker, cycles, |step, _machine| match format {
        "json" => match serde_json::to_string(step) {
            Ok(line) => println!("{}", line),
            Err(e) => json_error = Some(e),
        },
        "compact" => println!("{}", compact_step(step)),
        _ => print_step_row(step),
    })?;
    if let Some(e) = json_error {
        return Err(e.into());
    }

    if format == "table" {
        let machine = mission.machine();
        println!();
        println!("{}", "Summary".bright_blue().bold());
        println!("  {:<22} {}", "Final mode:".bright_white(), mode_label(machine.mode()));
        println!("  {:<22} {}", "Reboots:".bright_white(), mission.reboots());
        println!(
            "  {:<22} {}",
            "Software resets:".bright_white(),
            machine.escalation().count()
        );
        println!(
            "  {:<22} {}",
            "Faults injected:".bright_white(),
            mission.injector().stats().total_faults_injected
        );
        println!(
            "  {:<22} {}",
            "Power cycle requests:".bright_white(),
            mission.platform().model().commands.power_cycle_requests
        );
        if let Some(probe) = mission.platform().watchdog() {
            println!(
                "  {:<22} {} ms (timeout {} ms)",
                "Max watchdog gap:".bright_white(),
                probe.max_gap_ms(),
                config.watchdog_timeout_ms
            );
        }
    }
    Ok(())
}

fn print_step_row(step: &MissionStep) {
    for event in &step.events {
        let text = match event {
            InjectionEvent::Injected(fault) => format!("inject  {:?}", fault).bright_magenta(),
            InjectionEvent::Recovered(fault) => format!("recover {:?}", fault).dimmed(),
        };
        println!("        {} {}", "↯".bright_magenta(), text);
    }

    let report = &step.report;
    let mut line = format!(
        "{:>6}  {:<18}",
        step.step.to_string().dimmed(),
        mode_label(report.mode).to_string()
    );
    for transition in &report.transitions {
        line.push_str(&format!(" {} → {}", transition.from, transition.to).bright_cyan().to_string());
    }
    if !report.fault.is_none() {
        line.push_str(&format!(" fault={:?}", report.fault).bright_yellow().to_string());
    }
    if let Some(action) = report.reset_action {
        line.push_str(&format!(" reset={:?}", action).bright_red().to_string());
    }
    if report.persist_failed {
        line.push_str(&" persist-failed".red().to_string());
    }
    if let Some(cause) = step.rebooted {
        line.push_str(&format!(" REBOOT({:?})", cause).bright_red().bold().to_string());
    }
    println!("{}", line);
}

fn compact_step(step: &MissionStep) -> String {
    format!(
        "{} {} {:?}{}",
        step.step,
        step.report.mode,
        step.report.fault,
        if step.rebooted.is_some() { " reboot" } else { "" }
    )
}

fn print_stored_table(nvm_path: &str, stored: &StoredRecord) {
    println!("{} {}", "💾".bright_blue(), "Persisted State".bright_blue().bold());
    println!("  {:<22} {}", "File:".bright_white(), nvm_path);
    match stored {
        StoredRecord::Absent => {
            println!("  {:<22} {}", "Status:".bright_white(), "ABSENT (first boot)".yellow());
        }
        StoredRecord::Valid(record) => {
            println!("  {:<22} {}", "Status:".bright_white(), "VALID".bright_green());
            print_record_fields(record);
        }
        StoredRecord::Invalid(corrupt) => {
            println!(
                "  {:<22} {} {}",
                "Status:".bright_white(),
                "INVALID".bright_red(),
                format!("{:?}", corrupt.reason).red()
            );
            println!(
                "  {:<22} 0x{:08X} (computed 0x{:08X})",
                "Stored CRC:".bright_white(),
                corrupt.stored_checksum,
                corrupt.computed_checksum
            );
            if let Some(record) = &corrupt.decoded {
                println!("  {}", "Decoded anyway (untrusted):".dimmed());
                print_record_fields(record);
            }
            println!("  {:<22} {}", "Raw:".bright_white(), hex(&corrupt.raw).dimmed());
        }
    }
}

fn print_record_fields(record: &PersistentRecord) {
    println!("  {:<22} {}", "Mode:".bright_white(), mode_label(record.mode));
    println!("  {:<22} {} ms", "Mode entry time:".bright_white(), record.mode_entry_time);
    println!(
        "  {:<22} [{:.4}, {:.4}, {:.4}] rad/s",
        "Angular velocity:".bright_white(),
        record.angular_velocity[0],
        record.angular_velocity[1],
        record.angular_velocity[2]
    );
    println!("  {:<22} {:.2} W", "Power level:".bright_white(), record.power_level);
    println!("  {:<22} {:.3} s", "Timestamp:".bright_white(), record.timestamp);
    println!(
        "  {:<22} {}",
        "Software resets:".bright_white(),
        record.consecutive_software_reset_count
    );
    println!("  {:<22} 0x{:08X}", "Checksum:".bright_white(), record.checksum);
}

fn print_boot_table(boot: &BootReport) {
    let reason = match boot.reason {
        BootReason::FirstBoot => "no persisted state".to_string(),
        BootReason::ValidAndSafe { persisted_mode } => format!("valid and safe (was {})", persisted_mode),
        BootReason::Corrupt(corruption) => format!("corrupt record: {:?}", corruption),
        BootReason::Unsafe(reason) => format!("unsafe state: {:?}", reason),
        BootReason::StorageUnavailable => "storage unavailable".to_string(),
    };
    println!(
        "{} {} {} {}",
        "🚀".bright_blue(),
        "Boot mode:".bright_blue().bold(),
        mode_label(boot.mode),
        format!("({})", reason).dimmed()
    );
    if boot.restored_reset_count > 0 {
        println!(
            "   {} {}",
            "Restored software reset count:".bright_white(),
            boot.restored_reset_count
        );
    }
}

fn compact_stored(stored: &StoredRecord) -> String {
    match stored {
        StoredRecord::Absent => "ABSENT".to_string(),
        StoredRecord::Valid(record) => format!("VALID {}", record.mode),
        StoredRecord::Invalid(corrupt) => format!("INVALID {:?}", corrupt.reason),
    }
}

fn mode_label(mode: AdcsMode) -> ColoredString {
    match mode {
        AdcsMode::NominalPointing => mode.name().bright_green(),
        AdcsMode::SunAcquisition => mode.name().bright_cyan(),
        AdcsMode::Detumbling => mode.name().bright_yellow(),
        AdcsMode::SafeMode => mode.name().bright_red(),
        AdcsMode::FaultRecovery => mode.name().bright_magenta(),
    }
}

fn parse_rates(text: &str) -> Result<[f32; 3], Box<dyn std::error::Error>> {
    let values = text
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()?;
    match values.as_slice() {
        [all] => Ok([*all; 3]),
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err("rates must be one value or three comma-separated values".into()),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(" ")
}
