//! Error types for channel model analysis.

use thiserror::Error;

/// Errors raised while consolidating SI records into the channel model.
///
/// Any of these discards the whole capture: the caller retries the channel
/// on another tuner instead of repairing a half-built model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// A tuned terrestrial capture must describe exactly one transport stream.
    #[error("Expected exactly one transport stream on {tuned}, found {count}")]
    UnexpectedStreamCount { tuned: String, count: usize },

    /// Terrestrial channel numbers cannot be derived without a remote control key.
    #[error(
        "Transport stream 0x{transport_stream_id:04X} carries no remote control key id \
         (required for service 0x{service_id:04X})"
    )]
    MissingRemoteControlKey {
        transport_stream_id: u16,
        service_id: u16,
    },

    /// The NID/label combination matches no known broadcast plan.
    #[error(
        "Cannot classify transport stream 0x{transport_stream_id:04X} \
         (NID 0x{network_id:04X}, physical channel {physical_channel:?})"
    )]
    UnknownBroadcastType {
        transport_stream_id: u16,
        network_id: u16,
        physical_channel: String,
    },
}
