//! Scan result persistence.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;
use thiserror::Error;

use isdb_scanner_model::ScanResult;

/// Failure while writing scan results to disk.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The output directory or file could not be written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The channel model could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Write `Channels.json` under `output_dir`, creating the directory first.
///
/// The file always carries every discovered service, pay TV included;
/// scan plan filters never narrow what is saved.
pub fn write_channels_json(output_dir: &Path, result: &ScanResult) -> Result<PathBuf, OutputError> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join("Channels.json");

    // Channels.json consumers diff against 4-space indented raw UTF-8,
    // so to_string_pretty's 2-space default is not used here.
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    result.serialize(&mut serializer)?;
    fs::write(&path, buffer)?;

    info!("Saved scan results to {}", path.display());
    Ok(path)
}
