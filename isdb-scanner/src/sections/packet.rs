//! 188-byte transport stream packet parsing.

/// TS packet size in bytes.
pub const TS_PACKET_SIZE: usize = 188;

/// TS sync byte (0x47).
pub const SYNC_BYTE: u8 = 0x47;

/// A parsed TS packet.
///
/// Only the header fields needed for SI section reassembly are kept; the
/// adaptation field is skipped over, not parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsPacket<'a> {
    /// Packet Identifier (13 bits).
    pub pid: u16,
    /// Transport error indicator.
    pub transport_error: bool,
    /// Payload unit start indicator.
    pub unit_start: bool,
    /// Transport scrambling control is non-zero.
    pub scrambled: bool,
    /// Continuity counter (4 bits).
    pub continuity_counter: u8,
    /// Payload data after the header and any adaptation field.
    pub payload: &'a [u8],
}

impl<'a> TsPacket<'a> {
    /// Parse a TS packet from the first 188 bytes of `data`.
    pub fn parse(data: &'a [u8]) -> Result<Self, &'static str> {
        if data.len() < TS_PACKET_SIZE {
            return Err("packet too short");
        }
        if data[0] != SYNC_BYTE {
            return Err("sync byte missing");
        }

        let adaptation_field_control = (data[3] >> 4) & 0x03;
        let mut offset = 4;
        if adaptation_field_control & 0x02 != 0 {
            offset += 1 + data[4] as usize;
        }
        let payload = if adaptation_field_control & 0x01 != 0 && offset < TS_PACKET_SIZE {
            &data[offset..TS_PACKET_SIZE]
        } else {
            &[]
        };

        Ok(TsPacket {
            pid: ((data[1] as u16 & 0x1F) << 8) | data[2] as u16,
            transport_error: data[1] & 0x80 != 0,
            unit_start: data[1] & 0x40 != 0,
            scrambled: (data[3] >> 6) & 0x03 != 0,
            continuity_counter: data[3] & 0x0F,
            payload,
        })
    }
}

/// Iterator over TS packets in a captured byte stream.
///
/// Skips forward to the next sync byte whenever alignment is lost, so a
/// capture that starts mid-packet or contains garbage still yields every
/// intact packet after it.
pub struct TsPacketIterator<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> TsPacketIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }
}

impl<'a> Iterator for TsPacketIterator<'a> {
    type Item = TsPacket<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.offset + TS_PACKET_SIZE <= self.data.len() {
            if self.data[self.offset] != SYNC_BYTE {
                self.offset += 1;
                continue;
            }
            match TsPacket::parse(&self.data[self.offset..]) {
                Ok(packet) => {
                    self.offset += TS_PACKET_SIZE;
                    return Some(packet);
                }
                Err(_) => self.offset += 1,
            }
        }
        None
    }
}
