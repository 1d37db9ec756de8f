//! Tuner device discovery and recisdb process control.
//!
//! Every tuner operation shells out to the recisdb CLI:
//! - `tune` captures a transport stream sample from a physical channel
//! - `checksignal` reports the C/N level of a physical channel
//!
//! Submodules:
//! - `device`: chardev enumeration and tuner model naming
//! - `session`: per-device process lifecycle, capture and signal sampling
//! - `parse`: parsers for the helper's diagnostic and signal output

mod device;
mod parse;
mod session;

pub use device::{discover_tuners, TunerDevice, TunerType};
pub use session::{SessionConfig, TunerSession, DEFAULT_MIN_CAPTURE_BYTES};
pub(crate) use session::HELPER_COMMAND;

#[cfg(test)]
pub(crate) use session::testing;

/// LNB power supply voltage for satellite antennas.
///
/// Passed through to recisdb's `--lnb` option. Power is only supplied while
/// tuning BS/CS channels, never for terrestrial ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, serde::Deserialize)]
pub enum Voltage {
    /// 11V
    #[serde(rename = "11v")]
    _11v,
    /// 15V
    #[serde(rename = "15v")]
    _15v,
    /// No power supply
    #[serde(rename = "low")]
    Low,
}

impl Voltage {
    /// recisdb `--lnb` argument string.
    pub fn as_arg(&self) -> &'static str {
        match self {
            Voltage::_11v => "11v",
            Voltage::_15v => "15v",
            Voltage::Low => "low",
        }
    }
}

/// Errors raised while driving the recisdb helper process.
#[derive(Debug, thiserror::Error)]
pub enum TuneError {
    /// The tuner device itself could not be opened. The orchestrator skips
    /// this device for the rest of the run.
    #[error("{message}")]
    OpeningFailed { message: String },

    /// Channel selection or reception failed on an otherwise working tuner.
    #[error("{message}")]
    TuningFailed { message: String },

    /// No TS data arrived within the tune timeout.
    #[error("Channel selection timed out.")]
    TuningTimeout,

    /// The helper exited cleanly but produced too little data to analyze.
    #[error("The tuner output is too small ({received} bytes).")]
    OutputTooSmall { received: usize },

    /// Failed to spawn or communicate with the helper process.
    #[error("Tuner process I/O error: {0}")]
    Io(#[from] std::io::Error),
}
