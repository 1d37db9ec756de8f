//! Streaming SI record collection over captured TS data.

use std::collections::{HashMap, HashSet};

use log::debug;

use isdb_scanner_model::si::{NitRecord, SdtRecord};

use super::packet::TsPacketIterator;
use super::psi::{Section, SectionAssembler};
use super::{pid, table_id, tables};

/// Every NIT/SDT record decoded from a capture.
#[derive(Debug, Default)]
pub struct SiRecords {
    /// NIT records for the actual network.
    pub nits: Vec<NitRecord>,
    /// SDT records for the actual and other transport streams.
    pub sdts: Vec<SdtRecord>,
}

/// Collects SI records from TS data, fed in arbitrary chunks.
///
/// Each (table, extension, section, version) combination is decoded once;
/// the repetitions that pile up over a capture are dropped cheaply.
#[derive(Debug, Default)]
pub struct SiCollector {
    assemblers: HashMap<u16, SectionAssembler>,
    seen: HashSet<(u8, u16, u8, u8)>,
    records: SiRecords,
}

impl SiCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a chunk of captured TS data.
    pub fn feed(&mut self, data: &[u8]) {
        let mut sections = Vec::new();
        for packet in TsPacketIterator::new(data) {
            if packet.transport_error || packet.scrambled || packet.payload.is_empty() {
                continue;
            }
            if packet.pid != pid::NIT && packet.pid != pid::SDT {
                continue;
            }

            let assembler = self.assemblers.entry(packet.pid).or_default();
            sections.clear();
            assembler.push(
                packet.payload,
                packet.continuity_counter,
                packet.unit_start,
                &mut sections,
            );
            for raw in &sections {
                self.process_section(packet.pid, raw);
            }
        }
    }

    /// Hand over everything decoded so far.
    pub fn into_records(self) -> SiRecords {
        self.records
    }

    fn process_section(&mut self, packet_pid: u16, raw: &[u8]) {
        let section = match Section::parse(raw) {
            Ok(section) => section,
            Err(reason) => {
                debug!("Dropped a broken section on PID 0x{packet_pid:04X}: {reason}");
                return;
            }
        };
        // Sections describing a future table version do not apply yet.
        if !section.current_next {
            return;
        }
        let key = (
            section.table_id,
            section.table_id_extension,
            section.section_number,
            section.version_number,
        );
        if self.seen.contains(&key) {
            return;
        }

        match (packet_pid, section.table_id) {
            (pid::NIT, table_id::NIT_ACTUAL) => match tables::parse_nit(&section) {
                Ok(record) => self.records.nits.push(record),
                Err(reason) => {
                    debug!("Dropped an unparsable NIT section: {reason}");
                    return;
                }
            },
            (pid::SDT, table_id::SDT_ACTUAL | table_id::SDT_OTHER) => {
                match tables::parse_sdt(&section) {
                    Ok(record) => self.records.sdts.push(record),
                    Err(reason) => {
                        debug!("Dropped an unparsable SDT section: {reason}");
                        return;
                    }
                }
            }
            // NIT-other, BAT and anything else sharing these PIDs.
            _ => return,
        }
        self.seen.insert(key);
    }
}
