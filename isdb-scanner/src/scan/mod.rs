//! Channel scan orchestration.
//!
//! One control task walks the scan plan channel by channel, trying every
//! capable tuner until a capture analyzes. Terrestrial channels are tried
//! exhaustively and deduplicated afterwards; each satellite network is
//! represented by a single physical channel whose NIT describes all of
//! its sibling transport streams.

mod dedup;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use isdb_scanner_model::channels::{
    satellite_scan_channels, terrestrial_scan_channels, DEFAULT_TUNE_TIMEOUT,
    SATELLITE_CAPTURE_DURATION, TERRESTRIAL_CAPTURE_DURATION,
};
use isdb_scanner_model::{build_channel_model, BroadcastType, ScanResult, TransportStreamInfo};

use crate::sections::collect_si_records;
use crate::tuner::{
    discover_tuners, SessionConfig, TuneError, TunerDevice, TunerSession, Voltage,
    DEFAULT_MIN_CAPTURE_BYTES,
};

/// Scan-run configuration assembled from the command line and config file.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Skip the CS1/CS2 networks, which carry pay TV only.
    pub exclude_pay_tv: bool,
    /// LNB power supply voltage for satellite antennas.
    pub lnb: Option<Voltage>,
    /// Pass the helper's log output through to the terminal.
    pub echo_helper_log: bool,
    /// Explicit tuner device paths; empty probes the known chardev paths.
    pub devices: Vec<PathBuf>,
    /// Capture length per terrestrial channel.
    pub terrestrial_capture: Duration,
    /// Capture length per satellite channel.
    pub satellite_capture: Duration,
    /// How long a tune may stay silent before it is abandoned.
    pub tune_timeout: Duration,
    /// Minimum capture size for a channel to count as received.
    pub min_capture_bytes: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            exclude_pay_tv: false,
            lnb: Some(Voltage::Low),
            echo_helper_log: false,
            devices: Vec::new(),
            terrestrial_capture: TERRESTRIAL_CAPTURE_DURATION,
            satellite_capture: SATELLITE_CAPTURE_DURATION,
            tune_timeout: DEFAULT_TUNE_TIMEOUT,
            min_capture_bytes: DEFAULT_MIN_CAPTURE_BYTES,
        }
    }
}

impl ScanOptions {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            lnb: self.lnb,
            echo_helper_log: self.echo_helper_log,
            tune_timeout: self.tune_timeout,
            min_capture_bytes: self.min_capture_bytes,
        }
    }
}

/// Run a full scan: every terrestrial channel, then one representative
/// physical channel per satellite network.
pub async fn run_scan(options: &ScanOptions) -> ScanResult {
    let devices = discover_tuners(&options.devices);

    info!("Scanning ISDB-T (Terrestrial) channels...");
    let mut terrestrial_sessions =
        sessions_for(&devices, TunerDevice::can_tune_terrestrial, options);
    if terrestrial_sessions.is_empty() {
        error!("No ISDB-T tuner found.");
        error!("Please connect an ISDB-T tuner and try again.");
    }
    let mut terrestrial = scan_terrestrial_band(
        &mut terrestrial_sessions,
        &terrestrial_scan_channels(),
        options.terrestrial_capture,
    )
    .await;
    dedup::resolve_duplicates(&mut terrestrial, &mut terrestrial_sessions).await;
    terrestrial.sort_by(|a, b| a.physical_channel.cmp(&b.physical_channel));

    info!("Scanning ISDB-S (Satellite) channels...");
    let mut satellite_sessions = sessions_for(&devices, TunerDevice::can_tune_satellite, options);
    if satellite_sessions.is_empty() {
        error!("No ISDB-S tuner found.");
        error!("Please connect an ISDB-S tuner and try again.");
    }
    let (mut bs, mut cs) = scan_satellite_band(
        &mut satellite_sessions,
        &satellite_scan_channels(options.exclude_pay_tv),
        options.satellite_capture,
    )
    .await;
    bs.sort_by(|a, b| a.physical_channel.cmp(&b.physical_channel));
    cs.sort_by(|a, b| a.physical_channel.cmp(&b.physical_channel));

    ScanResult {
        terrestrial,
        bs,
        cs,
    }
}

/// Open one session per device with the wanted band capability,
/// dedicated tuners ahead of multi tuners.
fn sessions_for(
    devices: &[TunerDevice],
    capability: fn(&TunerDevice) -> bool,
    options: &ScanOptions,
) -> Vec<TunerSession> {
    let sessions: Vec<TunerSession> = devices
        .iter()
        .filter(|device| capability(device))
        .map(|device| TunerSession::new(device.clone(), options.session_config()))
        .collect();
    for session in &sessions {
        info!(
            "Found Tuner: {} ({})",
            session.device().name(),
            session.device().path().display()
        );
    }
    sessions
}

/// Scan the full terrestrial channel range.
///
/// A tuner-level failure moves on to the next tuner; a channel-level
/// failure marks the channel unreceived and moves on to the next channel.
async fn scan_terrestrial_band(
    sessions: &mut [TunerSession],
    channels: &[String],
    capture_duration: Duration,
) -> Vec<TransportStreamInfo> {
    let mut ts_infos: Vec<TransportStreamInfo> = Vec::new();
    'channels: for channel in channels {
        for session in sessions.iter_mut() {
            if session.last_opening_failed() {
                continue;
            }
            info!(
                "  Channel: Terrestrial - {}ch",
                channel.trim_start_matches('T')
            );
            info!(
                "    Tuner: {} ({})",
                session.device().name(),
                session.device().path().display()
            );
            let started = Instant::now();
            let captured = session.capture(channel, capture_duration).await;
            info!("Tune Time: {:.2} seconds", started.elapsed().as_secs_f64());
            match captured {
                Ok(data) => {
                    let records = collect_si_records(&data);
                    match build_channel_model(&records.nits, &records.sdts, channel) {
                        Ok(infos) => {
                            log_stream_infos(&infos);
                            ts_infos.extend(infos);
                            continue 'channels;
                        }
                        Err(analyze_error) => {
                            error!("Failed to analyze transport stream. {}", analyze_error);
                            error!("Trying again with the next tuner...");
                        }
                    }
                }
                Err(tune_error @ TuneError::OpeningFailed { .. }) => {
                    error!("Failed to open tuner. {}", tune_error);
                    error!("Trying again with the next tuner...");
                }
                Err(tune_error @ (TuneError::TuningFailed { .. } | TuneError::TuningTimeout)) => {
                    warn!("{}", tune_error);
                    warn!("Channel may not be received in your area. Skipping...");
                    continue 'channels;
                }
                Err(TuneError::OutputTooSmall { .. }) => {
                    warn!("Failed to receive data.");
                    warn!("Channel may not be received in your area. Skipping...");
                    continue 'channels;
                }
                Err(tune_error @ TuneError::Io(_)) => {
                    warn!("Failed to run the tuning helper. {}", tune_error);
                    warn!("Channel may not be received in your area. Skipping...");
                    continue 'channels;
                }
            }
        }
    }
    ts_infos
}

/// Scan the satellite networks, splitting results into BS and CS.
///
/// One capture describes a whole network, so every failure kind just
/// moves on to the next tuner.
async fn scan_satellite_band(
    sessions: &mut [TunerSession],
    channels: &[String],
    capture_duration: Duration,
) -> (Vec<TransportStreamInfo>, Vec<TransportStreamInfo>) {
    let mut bs_infos: Vec<TransportStreamInfo> = Vec::new();
    let mut cs_infos: Vec<TransportStreamInfo> = Vec::new();
    for channel in channels {
        let probe = channel_probe(channel);
        let band = match probe.broadcast_type() {
            Some(band) => band,
            None => {
                warn!("Unrecognized satellite channel {} in the scan plan. Skipping...", channel);
                continue;
            }
        };
        let helper_channel = probe.physical_channel_recisdb();
        for session in sessions.iter_mut() {
            if session.last_opening_failed() {
                continue;
            }
            info!("  Channel: {} (All channels)", band.name());
            info!(
                "    Tuner: {} ({})",
                session.device().name(),
                session.device().path().display()
            );
            let started = Instant::now();
            let captured = session.capture(&helper_channel, capture_duration).await;
            info!("Tune Time: {:.2} seconds", started.elapsed().as_secs_f64());
            let data = match captured {
                Ok(data) => data,
                Err(tune_error @ TuneError::OpeningFailed { .. }) => {
                    error!("Failed to open tuner. {}", tune_error);
                    error!("Trying again with the next tuner...");
                    continue;
                }
                Err(TuneError::OutputTooSmall { .. }) => {
                    error!("Failed to receive data.");
                    error!("Trying again with the next tuner...");
                    continue;
                }
                Err(tune_error) => {
                    error!("{}", tune_error);
                    error!("Trying again with the next tuner...");
                    continue;
                }
            };
            let records = collect_si_records(&data);
            match build_channel_model(&records.nits, &records.sdts, channel) {
                Ok(infos) => {
                    log_stream_infos(&infos);
                    if band == BroadcastType::BS {
                        bs_infos.extend(infos);
                    } else {
                        cs_infos.extend(infos);
                    }
                    break;
                }
                Err(analyze_error) => {
                    error!("Failed to analyze transport stream. {}", analyze_error);
                    error!("Trying again with the next tuner...");
                }
            }
        }
    }
    (bs_infos, cs_infos)
}

/// Placeholder stream entry for a scan plan channel, giving access to its
/// helper syntax and band classification.
fn channel_probe(physical_channel: &str) -> TransportStreamInfo {
    let mut probe = TransportStreamInfo::new(0);
    probe.physical_channel = physical_channel.to_string();
    probe
}

fn log_stream_infos(infos: &[TransportStreamInfo]) {
    for ts_info in infos {
        info!("Transport Stream: {}", ts_info);
        for service_info in &ts_info.services {
            info!("         Service: {}", service_info);
        }
    }
}
