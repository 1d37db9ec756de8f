//! SI section reassembly and header parsing.
//!
//! NIT and SDT always use the long (syntax indicator 1) section form, so
//! only that form is accepted here.

/// A parsed SI section with a verified CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section<'a> {
    /// Table ID.
    pub table_id: u8,
    /// Table ID extension (network ID for NIT, TSID for SDT).
    pub table_id_extension: u16,
    /// Version number (5 bits).
    pub version_number: u8,
    /// Current/next indicator.
    pub current_next: bool,
    /// Section number.
    pub section_number: u8,
    /// Last section number.
    pub last_section_number: u8,
    /// Table body between the extended header and the CRC.
    pub payload: &'a [u8],
}

impl<'a> Section<'a> {
    /// Parse one complete section, verifying its CRC32.
    ///
    /// `data` must start at the table_id byte and contain the whole
    /// section including the trailing CRC.
    pub fn parse(data: &'a [u8]) -> Result<Self, &'static str> {
        if data.len() < 12 {
            return Err("section too short");
        }
        if data[1] & 0x80 == 0 {
            return Err("short-form section");
        }

        let section_length = ((data[1] as usize & 0x0F) << 8) | data[2] as usize;
        if section_length < 9 {
            return Err("section length too small");
        }
        let total_length = 3 + section_length;
        if data.len() < total_length {
            return Err("truncated section");
        }

        // MPEG-2 CRC32 over a section including its own CRC leaves zero.
        let body = &data[..total_length];
        if crc32_mpeg2(body) != 0 {
            return Err("CRC mismatch");
        }

        Ok(Section {
            table_id: data[0],
            table_id_extension: ((data[3] as u16) << 8) | data[4] as u16,
            version_number: (data[5] >> 1) & 0x1F,
            current_next: data[5] & 0x01 != 0,
            section_number: data[6],
            last_section_number: data[7],
            payload: &body[8..total_length - 4],
        })
    }
}

/// Reassembles sections from the payloads of one PID.
///
/// Handles sections spanning several packets, several sections packed into
/// one packet, and the pointer-field case where the head of a packet closes
/// out the previous section.
#[derive(Debug, Default)]
pub struct SectionAssembler {
    buffer: Vec<u8>,
    last_counter: Option<u8>,
}

impl SectionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet payload, appending each completed raw section to
    /// `sections`.
    pub fn push(
        &mut self,
        payload: &[u8],
        counter: u8,
        unit_start: bool,
        sections: &mut Vec<Vec<u8>>,
    ) {
        if let Some(last) = self.last_counter {
            if counter != (last + 1) & 0x0F && !unit_start {
                // Lost a packet mid-section.
                self.buffer.clear();
            }
        }
        self.last_counter = Some(counter);

        if unit_start {
            if payload.is_empty() {
                self.buffer.clear();
                return;
            }
            let pointer = payload[0] as usize;
            if 1 + pointer > payload.len() {
                self.buffer.clear();
                return;
            }
            if !self.buffer.is_empty() {
                // The bytes before the pointer target belong to the
                // section started in an earlier packet.
                self.buffer.extend_from_slice(&payload[1..1 + pointer]);
                self.drain_complete(sections);
            }
            self.buffer.clear();
            self.buffer.extend_from_slice(&payload[1 + pointer..]);
        } else {
            if self.buffer.is_empty() {
                return;
            }
            self.buffer.extend_from_slice(payload);
        }

        self.drain_complete(sections);
    }

    fn drain_complete(&mut self, sections: &mut Vec<Vec<u8>>) {
        loop {
            if self.buffer.first() == Some(&0xFF) {
                // Stuffing runs to the end of the payload.
                self.buffer.clear();
                return;
            }
            if self.buffer.len() < 3 {
                return;
            }
            let section_length = ((self.buffer[1] as usize & 0x0F) << 8) | self.buffer[2] as usize;
            let total_length = 3 + section_length;
            if self.buffer.len() < total_length {
                return;
            }
            sections.push(self.buffer[..total_length].to_vec());
            self.buffer.drain(..total_length);
        }
    }
}

/// CRC32 as used by MPEG-2 sections (polynomial 0x04C11DB7, no reflection).
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    static CRC_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = (i as u32) << 24;
            let mut j = 0;
            while j < 8 {
                if crc & 0x8000_0000 != 0 {
                    crc = (crc << 1) ^ 0x04C1_1DB7;
                } else {
                    crc <<= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        let index = ((crc >> 24) ^ byte as u32) as usize;
        crc = (crc << 8) ^ CRC_TABLE[index];
    }
    crc
}

/// Build a complete long-form section with a valid CRC.
#[cfg(test)]
pub(crate) fn make_section(table_id: u8, extension: u16, body: &[u8]) -> Vec<u8> {
    let section_length = 5 + body.len() + 4;
    assert!(section_length <= 0x0FFF);
    let mut section = vec![
        table_id,
        0xB0 | ((section_length >> 8) as u8 & 0x0F),
        section_length as u8,
        (extension >> 8) as u8,
        extension as u8,
        0xC1, // version 0, current
        0x00,
        0x00,
    ];
    section.extend_from_slice(body);
    let crc = crc32_mpeg2(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    section
}
