//! isdb-scanner: Channel scanner for Japanese digital TV (ISDB-T/ISDB-S).
//!
//! Tunes physical channels through the recisdb CLI, decodes the NIT/SDT
//! tables out of each capture and writes the discovered channel layout
//! to Channels.json.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{error, info};

mod logging;
mod output;
mod scan;
mod sections;
mod tuner;

use scan::ScanOptions;
use tuner::{discover_tuners, TunerDevice, TunerType, Voltage, HELPER_COMMAND};

/// isdb-scanner - Scans Japanese TV broadcast channels (ISDB-T/ISDB-S) and
/// saves the results as Channels.json (depends on recisdb)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Output scan results to the specified directory
    #[arg(default_value = "scanned")]
    output: PathBuf,

    /// Exclude pay-TV networks (CS1/CS2) from the scan plan
    #[arg(long)]
    exclude_pay_tv: bool,

    /// Output recisdb log to stderr
    #[arg(long)]
    output_recisdb_log: bool,

    /// List available ISDB-T/ISDB-S tuners and exit
    #[arg(long)]
    list_tuners: bool,

    /// LNB voltage for satellite antenna power supply
    #[arg(long, value_enum, default_value = "low")]
    lnb: Voltage,

    /// Tuner device path; may be given multiple times to bypass discovery
    #[arg(long)]
    device: Vec<PathBuf>,

    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory where log files are stored (console only when unset)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Number of days to keep log files
    #[arg(long, default_value = "7")]
    log_retention_days: u64,
}

/// Configuration file format.
#[derive(Debug, serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    scan: ScanSection,
    #[serde(default)]
    tuner: TunerSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, serde::Deserialize, Default)]
struct ScanSection {
    terrestrial_capture_seconds: Option<f64>,
    satellite_capture_seconds: Option<f64>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct TunerSection {
    lnb: Option<Voltage>,
    tuning_timeout_seconds: Option<f64>,
    min_capture_bytes: Option<usize>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<String>,
    retention_days: Option<u64>,
    level: Option<String>,
}

fn load_config(path: &PathBuf) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Whether the recisdb executable resolves through PATH.
fn recisdb_available() -> bool {
    std::process::Command::new(HELPER_COMMAND)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn print_tuner_list(devices: &[TunerDevice]) {
    println!("Available ISDB-T tuners:");
    for device in devices
        .iter()
        .filter(|device| device.tuner_type() == TunerType::Terrestrial)
    {
        println!("  {} ({})", device.name(), device.path().display());
    }
    println!("Available ISDB-S tuners:");
    for device in devices
        .iter()
        .filter(|device| device.tuner_type() == TunerType::Satellite)
    {
        println!("  {} ({})", device.name(), device.path().display());
    }
    println!("Available ISDB-T/ISDB-S multi tuners:");
    for device in devices
        .iter()
        .filter(|device| device.tuner_type() == TunerType::Multi)
    {
        println!("  {} ({})", device.name(), device.path().display());
    }
}

fn seconds_or(configured: Option<f64>, default: Duration) -> Duration {
    configured.map_or(default, Duration::from_secs_f64)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > default
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from("isdb-scanner.toml");
        if default_path.exists() {
            Some(default_path)
        } else {
            None
        }
    });
    let file_config = if let Some(config_path) = &config_path {
        match load_config(config_path) {
            Ok(config) => {
                eprintln!("Loaded config from: {}", config_path.display());
                config
            }
            Err(error) => {
                eprintln!("Failed to load config file: {}", error);
                return Err(error);
            }
        }
    } else {
        ConfigFile::default()
    };

    // Merge logging configs (command line takes precedence)
    let log_dir = args
        .log_dir
        .clone()
        .or_else(|| file_config.logging.log_dir.as_deref().map(PathBuf::from));
    let log_retention_days = if args.log_retention_days != 7 {
        args.log_retention_days
    } else {
        file_config.logging.retention_days.unwrap_or(7)
    };

    // Initialize logging with optional file output and rotation
    let log_level = file_config.logging.level.as_deref();
    logging::init_logging(
        log_dir.as_deref(),
        log_retention_days,
        args.verbose,
        log_level,
    )
    .expect("Failed to initialize logging");

    info!("isdb-scanner version {}", env!("CARGO_PKG_VERSION"));

    if !recisdb_available() {
        error!("recisdb not found.");
        error!("Please install recisdb and try again.");
        return Ok(());
    }

    if args.list_tuners {
        print_tuner_list(&discover_tuners(&args.device));
        return Ok(());
    }

    // Merge tuner configs (command line takes precedence)
    let lnb = if args.lnb != Voltage::Low {
        args.lnb
    } else {
        file_config.tuner.lnb.unwrap_or(args.lnb)
    };

    let defaults = ScanOptions::default();
    let options = ScanOptions {
        exclude_pay_tv: args.exclude_pay_tv,
        lnb: Some(lnb),
        echo_helper_log: args.output_recisdb_log,
        devices: args.device.clone(),
        terrestrial_capture: seconds_or(
            file_config.scan.terrestrial_capture_seconds,
            defaults.terrestrial_capture,
        ),
        satellite_capture: seconds_or(
            file_config.scan.satellite_capture_seconds,
            defaults.satellite_capture,
        ),
        tune_timeout: seconds_or(
            file_config.tuner.tuning_timeout_seconds,
            defaults.tune_timeout,
        ),
        min_capture_bytes: file_config
            .tuner
            .min_capture_bytes
            .unwrap_or(defaults.min_capture_bytes),
    };

    let scan_started = Instant::now();
    let result = scan::run_scan(&options).await;
    output::write_channels_json(&args.output, &result)?;
    info!(
        "Finished in {:.2} seconds.",
        scan_started.elapsed().as_secs_f64()
    );

    Ok(())
}
