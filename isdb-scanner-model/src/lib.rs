//! Channel model and SI analysis for the ISDB channel scanner.
//!
//! This crate turns decoded broadcast service information (NIT/SDT
//! records) into a deduplicated, semantically corrected map of transport
//! streams and services:
//!
//! - [`si`]: the hand-over vocabulary for already-parsed SI records
//! - [`analyzer`]: the channel model builder (NIT/SDT consolidation,
//!   satellite addressing reconstruction, channel number derivation)
//! - [`types`]: [`TransportStreamInfo`] / [`ServiceInfo`] and the
//!   [`BroadcastType`] classification
//! - [`normalize`]: full-width/half-width SI text normalization
//! - [`channels`]: the scan plan (physical channel lists and timings)
//!
//! # Example
//!
//! ```rust
//! use isdb_scanner_model::si::{Descriptor, NitRecord, NitTransportStream, TsInformationDescriptor};
//! use isdb_scanner_model::build_channel_model;
//!
//! let nit = NitRecord {
//!     network_id: 0x7FE8,
//!     network_descriptors: vec![],
//!     transport_streams: vec![NitTransportStream {
//!         transport_stream_id: 0x7FE8,
//!         descriptors: vec![Descriptor::TsInformation(TsInformationDescriptor {
//!             remote_control_key_id: 1,
//!             ts_name: "ＮＨＫ総合".to_string(),
//!         })],
//!     }],
//! };
//!
//! let streams = build_channel_model(&[nit], &[], "T27").unwrap();
//! assert_eq!(streams[0].physical_channel, "T27");
//! assert_eq!(streams[0].network_name, "NHK総合");
//! ```

pub mod analyzer;
pub mod channels;
pub mod error;
pub mod normalize;
pub mod si;
pub mod types;

pub use analyzer::build_channel_model;
pub use error::AnalysisError;
pub use normalize::normalize_si_text;
pub use types::{BroadcastType, ScanResult, ServiceInfo, TransportStreamInfo};
