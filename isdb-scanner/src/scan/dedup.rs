//! Terrestrial duplicate resolution.
//!
//! Areas covered by more than one relay station can receive the same
//! broadcast on several physical channels, which confuses downstream
//! recorder software. Terrestrial TSIDs are unique per broadcaster
//! nationwide, so entries sharing a TSID are the same channel; only the
//! one with the strongest mean signal level is kept.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use isdb_scanner_model::TransportStreamInfo;

use crate::tuner::TunerSession;

/// Signal level recorded when no tuner could measure a channel, low
/// enough to lose against any real measurement.
const UNMEASURED_SIGNAL_LEVEL: f64 = -99.99;

/// Drop duplicate TSID entries, keeping the strongest physical channel.
///
/// Every physical channel of a duplicated TSID is remeasured through the
/// same tuner pool the scan used. Ties keep the channel encountered
/// first, and a channel nothing could measure loses against any
/// measured one.
pub(crate) async fn resolve_duplicates(
    ts_infos: &mut Vec<TransportStreamInfo>,
    sessions: &mut [TunerSession],
) {
    let mut groups: BTreeMap<u16, (String, Vec<String>)> = BTreeMap::new();
    for ts_info in ts_infos.iter() {
        let entry = groups
            .entry(ts_info.transport_stream_id)
            .or_insert_with(|| (ts_info.network_name.clone(), Vec::new()));
        entry.1.push(ts_info.physical_channel.clone());
    }

    for (transport_stream_id, (network_name, channels)) in groups {
        if channels.len() < 2 {
            continue;
        }
        warn!(
            "{} (TSID: {}) was detected redundantly across multiple physical channels.",
            network_name, transport_stream_id
        );
        warn!("Keeping only the physical channel with the highest signal level...");

        let mut levels: Vec<(String, f64)> = Vec::new();
        for channel in channels {
            match measure_signal_level(sessions, &channel).await {
                Some(level) => {
                    info!(
                        "Physical Channel: {}ch | Signal Level: {:.2} dB",
                        channel.trim_start_matches('T'),
                        level
                    );
                    levels.push((channel, level));
                }
                None => {
                    info!(
                        "Physical Channel: {}ch | Signal Level: Failed to get signal level",
                        channel.trim_start_matches('T')
                    );
                    levels.push((channel, UNMEASURED_SIGNAL_LEVEL));
                }
            }
        }

        let mut best_index = 0;
        for (index, (_, level)) in levels.iter().enumerate() {
            if *level > levels[best_index].1 {
                best_index = index;
            }
        }
        let (best_channel, best_level) = &levels[best_index];
        info!(
            "Selected Physical Channel: {}ch | Signal Level: {:.2} dB",
            best_channel.trim_start_matches('T'),
            best_level
        );
        ts_infos.retain(|ts_info| {
            ts_info.transport_stream_id != transport_stream_id
                || &ts_info.physical_channel == best_channel
        });
    }
}

/// Mean signal level of a channel through the first tuner that can
/// measure it, skipping tuners whose last open failed.
async fn measure_signal_level(sessions: &mut [TunerSession], channel: &str) -> Option<f64> {
    for session in sessions.iter_mut() {
        if session.last_opening_failed() {
            continue;
        }
        match session.sample_signal_mean(channel).await {
            Ok(Some(level)) => return Some(level),
            Ok(None) => continue,
            Err(error) => {
                debug!(
                    "Signal level sampling failed on {}: {}",
                    session.device().path().display(),
                    error
                );
                continue;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;
    use std::time::Duration;

    use crate::tuner::testing::{Script, ScriptedSpawner};
    use crate::tuner::{discover_tuners, SessionConfig};

    fn ts_info(transport_stream_id: u16, physical_channel: &str) -> TransportStreamInfo {
        let mut info = TransportStreamInfo::new(transport_stream_id);
        info.physical_channel = physical_channel.to_string();
        info.network_id = 0x7FE8;
        info.network_name = "テスト放送".to_string();
        info
    }

    fn scripted_session(path: &str, scripts: Vec<Script>) -> (TunerSession, ScriptedSpawner) {
        let device = discover_tuners(&[PathBuf::from(path)]).remove(0);
        let spawner = ScriptedSpawner::with_queue(scripts);
        let config = SessionConfig {
            tune_timeout: Duration::from_millis(200),
            min_capture_bytes: 1,
            ..SessionConfig::default()
        };
        let session = TunerSession::with_spawner(device, config, Box::new(spawner.clone()));
        (session, spawner)
    }

    fn signal_script(level: &str) -> Script {
        let line = format!("{level}dB\r");
        Script {
            stdout: line.repeat(6).into_bytes(),
            run_until_interrupt: true,
            ..Script::default()
        }
    }

    #[tokio::test]
    async fn test_keeps_strongest_duplicate() {
        let mut ts_infos = vec![
            ts_info(0x7FE0, "T13"),
            ts_info(0x7FE1, "T15"),
            ts_info(0x7FE0, "T21"),
        ];
        let (session, spawner) = scripted_session(
            "/dev/pt3video2",
            vec![signal_script("12.50"), signal_script("18.00")],
        );
        let mut sessions = vec![session];

        resolve_duplicates(&mut ts_infos, &mut sessions).await;

        let channels: Vec<&str> = ts_infos
            .iter()
            .map(|info| info.physical_channel.as_str())
            .collect();
        assert_eq!(channels, vec!["T15", "T21"]);
        assert_eq!(spawner.commands.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unmeasurable_channel_loses_against_measured_one() {
        let mut ts_infos = vec![ts_info(0x7FE0, "T13"), ts_info(0x7FE0, "T21")];
        let early_exit = Script {
            exit_code: 1,
            ..Script::default()
        };
        let (session, _spawner) = scripted_session(
            "/dev/pt3video2",
            vec![signal_script("18.00"), early_exit],
        );
        let mut sessions = vec![session];

        resolve_duplicates(&mut ts_infos, &mut sessions).await;

        assert_eq!(ts_infos.len(), 1);
        assert_eq!(ts_infos[0].physical_channel, "T13");
    }

    #[tokio::test]
    async fn test_unique_streams_are_not_remeasured() {
        let mut ts_infos = vec![ts_info(0x7FE0, "T13"), ts_info(0x7FE1, "T15")];
        let (session, spawner) = scripted_session("/dev/pt3video2", vec![Script::default()]);
        let mut sessions = vec![session];

        resolve_duplicates(&mut ts_infos, &mut sessions).await;

        assert_eq!(ts_infos.len(), 2);
        assert!(spawner.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_opening_failed_tuner_is_not_consulted() {
        let opening_failed = Script {
            stderr: b"ERROR: The tuner device is already in use.\n".to_vec(),
            exit_code: 1,
            ..Script::default()
        };
        let (mut failed_session, failed_spawner) =
            scripted_session("/dev/pt3video2", vec![opening_failed]);
        failed_session
            .capture("T13", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(failed_session.last_opening_failed());

        let (healthy_session, healthy_spawner) = scripted_session(
            "/dev/pt3video6",
            vec![signal_script("10.00"), signal_script("20.00")],
        );
        let mut sessions = vec![failed_session, healthy_session];
        let mut ts_infos = vec![ts_info(0x7FE0, "T13"), ts_info(0x7FE0, "T21")];

        resolve_duplicates(&mut ts_infos, &mut sessions).await;

        assert_eq!(ts_infos[0].physical_channel, "T21");
        // Only the capture that set the flag reached the failed tuner.
        assert_eq!(failed_spawner.commands.lock().unwrap().len(), 1);
        assert_eq!(healthy_spawner.commands.lock().unwrap().len(), 2);
    }
}
