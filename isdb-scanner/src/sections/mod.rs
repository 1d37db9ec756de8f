//! MPEG-TS section decoding for channel scanning.
//!
//! Captured transport streams are reduced to the two SI tables the channel
//! model needs:
//!
//! - NIT (Network Information Table) on PID 0x0010, actual network only
//! - SDT (Service Description Table) on PID 0x0011, actual and other
//!
//! SDT-other matters on satellite networks, where services of sibling
//! transport streams are described only there.
//!
//! Sections are reassembled across packets, CRC-checked and parsed into
//! [`isdb_scanner_model::si`] records; broken sections are dropped, never
//! fatal.

mod collector;
mod packet;
mod psi;
mod tables;
mod text;

pub use collector::{SiCollector, SiRecords};

/// Well-known PIDs.
pub mod pid {
    /// Network Information Table (actual) PID.
    pub const NIT: u16 = 0x0010;
    /// Service Description Table PID.
    pub const SDT: u16 = 0x0011;
}

/// Table IDs for SI sections.
pub mod table_id {
    /// Network Information Section - actual network.
    pub const NIT_ACTUAL: u8 = 0x40;
    /// Service Description Section - actual transport stream.
    pub const SDT_ACTUAL: u8 = 0x42;
    /// Service Description Section - other transport stream.
    pub const SDT_OTHER: u8 = 0x46;
}

/// Descriptor tags used in NIT/SDT descriptor loops.
pub mod descriptor_tag {
    /// Network name descriptor (0x40).
    pub const NETWORK_NAME: u8 = 0x40;
    /// Satellite delivery system descriptor (0x43).
    pub const SATELLITE_DELIVERY: u8 = 0x43;
    /// Service descriptor (0x48).
    pub const SERVICE: u8 = 0x48;
    /// TS information descriptor (0xCD for ISDB).
    pub const TS_INFORMATION: u8 = 0xCD;
    /// Partial reception descriptor (0xFB for ISDB-T 1seg).
    pub const PARTIAL_RECEPTION: u8 = 0xFB;
}

/// Decode every NIT/SDT record carried in a captured transport stream.
pub fn collect_si_records(data: &[u8]) -> SiRecords {
    let mut collector = SiCollector::new();
    collector.feed(data);
    collector.into_records()
}
