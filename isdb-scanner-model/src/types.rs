//! Channel model types shared across the scanner.

use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

/// Broadcast type classification.
///
/// Based on ARIB STD-B10 and TR-B14/TR-B15 standards, broadcasts are classified into:
/// - Terrestrial (地上波): Digital terrestrial television
/// - BS: BS satellite broadcasts
/// - CS1: 110度CS satellite broadcasts (旧プラット・ワン系)
/// - CS2: 110度CS satellite broadcasts (旧スカイパーフェクTV!2系)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BroadcastType {
    /// Digital terrestrial television (地上波デジタル)
    Terrestrial,
    /// BS satellite (BS衛星)
    BS,
    /// 110度CS satellite, CS1 network (NID 0x0006)
    CS1,
    /// 110度CS satellite, CS2 network (NID 0x0007)
    CS2,
}

impl BroadcastType {
    /// Classify broadcast type from NID (Network ID) and physical channel label.
    ///
    /// Based on ARIB STD-B10 第2部 付録N and TR-B14/TR-B15 standards:
    /// - Terrestrial: NID 0x7880-0x7FE8 (region specific), or a "T.." label
    /// - BS: NID 0x0004, or a "BS.." label
    /// - CS1: NID 0x0006, or the ND02/ND08/ND10 transponders
    /// - CS2: NID 0x0007, or any other "ND.." transponder
    ///
    /// The label fallback covers streams whose NIT entry was never seen
    /// (e.g. a capture that only yielded SDT sections). Returns `None` for
    /// combinations outside every known broadcast plan.
    ///
    /// ref: https://www.arib.or.jp/english/html/overview/doc/6-STD-B10v5_13-E1.pdf
    pub fn classify(network_id: u16, physical_channel: &str) -> Option<Self> {
        if (0x7880..=0x7FE8).contains(&network_id) || physical_channel.starts_with('T') {
            Some(BroadcastType::Terrestrial)
        } else if network_id == 4 || physical_channel.starts_with("BS") {
            Some(BroadcastType::BS)
        } else if network_id == 6 || matches!(physical_channel, "ND02" | "ND08" | "ND10") {
            Some(BroadcastType::CS1)
        } else if network_id == 7 || physical_channel.starts_with("ND") {
            Some(BroadcastType::CS2)
        } else {
            None
        }
    }

    /// Get display name.
    pub fn name(&self) -> &'static str {
        match self {
            BroadcastType::Terrestrial => "Terrestrial",
            BroadcastType::BS => "BS",
            BroadcastType::CS1 => "CS1",
            BroadcastType::CS2 => "CS2",
        }
    }

    /// Returns true for either of the two 110度CS networks.
    pub fn is_cs(&self) -> bool {
        matches!(self, BroadcastType::CS1 | BroadcastType::CS2)
    }
}

impl fmt::Display for BroadcastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One broadcast service carried inside a transport stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// 3-digit channel number (BS/CS: identical to the service ID).
    pub channel_number: String,
    /// Service ID (SID).
    pub service_id: u16,
    /// Service type (0x01: TV, 0xA1: temporary TV, 0xC0: data/oneseg).
    pub service_type: Option<u8>,
    /// Service name (from SDT).
    pub service_name: String,
    /// Free-to-air flag (inverse of the CA mode bit).
    pub is_free: bool,
    /// Listed in the partial reception descriptor (ワンセグ).
    pub is_oneseg: bool,
}

impl ServiceInfo {
    /// Create a new ServiceInfo with everything but the id left at its
    /// pre-analysis placeholder.
    pub fn new(service_id: u16) -> Self {
        Self {
            channel_number: "Unknown".to_string(),
            service_id,
            service_type: None,
            service_name: "Unknown".to_string(),
            is_free: true,
            is_oneseg: false,
        }
    }

    /// Whether the service type counts as a video service.
    ///
    /// ref: https://github.com/xtne6f/EDCB/blob/work-plus-s-230823/BonCtrl/ChSetUtil.h#L66-L74
    pub fn is_video_service(&self) -> bool {
        matches!(self.service_type, Some(0x01) | Some(0xA5) | Some(0xAD))
    }
}

impl fmt::Display for ServiceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut message = format!("Ch: {} | {} ", self.channel_number, self.service_name);
        match self.service_type {
            Some(0x02) => message += "[Radio]",
            Some(st) if (0xA1..=0xA3).contains(&st) => message += "[Temporary]",
            Some(0xA4) => message += "[Engineering Service]",
            Some(st) if (0xA5..=0xA7).contains(&st) => message += "[Promotion]",
            Some(0xC0) if !self.is_oneseg => message += "[Data]",
            _ => {}
        }
        if !self.is_free {
            message += "[Pay TV]";
        }
        if self.is_oneseg {
            message += "[OneSeg]";
        }
        f.write_str(message.trim_end())
    }
}

/// One physical/logical transport stream discovered during a scan.
///
/// Unique by `transport_stream_id` within one scan run. Later SI records
/// for the same id overwrite fields in place and union into `services`,
/// they never create a second entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportStreamInfo {
    /// Physical channel label (e.g. "T13", "BS23/TS3", "ND04").
    pub physical_channel: String,
    /// Transport stream ID (TSID).
    pub transport_stream_id: u16,
    /// Network ID (NID).
    pub network_id: u16,
    /// Terrestrial: TS name / BS/CS: network name.
    pub network_name: String,
    /// Remote control key id (リモコンキー ID), terrestrial only.
    pub remote_control_key_id: Option<u8>,
    /// Frequency in GHz, BS/CS only.
    pub satellite_frequency: Option<f64>,
    /// Transponder number, BS/CS only.
    pub satellite_transponder: Option<u8>,
    /// Relative TS number within the transponder, BS only.
    pub satellite_slot_number: Option<u8>,
    /// Services carried by this stream, ordered by service id.
    pub services: Vec<ServiceInfo>,
}

impl TransportStreamInfo {
    /// Create a new TransportStreamInfo for a freshly seen TSID.
    pub fn new(transport_stream_id: u16) -> Self {
        Self {
            physical_channel: "Unknown".to_string(),
            transport_stream_id,
            network_id: 0,
            network_name: "Unknown".to_string(),
            remote_control_key_id: None,
            satellite_frequency: None,
            satellite_transponder: None,
            satellite_slot_number: None,
            services: Vec::new(),
        }
    }

    /// Classify this stream, preferring the NID and falling back to the
    /// physical channel label.
    pub fn broadcast_type(&self) -> Option<BroadcastType> {
        BroadcastType::classify(self.network_id, &self.physical_channel)
    }

    /// Physical channel in the syntax recisdb accepts.
    ///
    /// T13 -> T13, BS23/TS3 -> BS23_3, ND04 -> CS04
    pub fn physical_channel_recisdb(&self) -> String {
        match self.broadcast_type() {
            Some(BroadcastType::BS) => self.physical_channel.replace("/TS", "_"),
            Some(bt) if bt.is_cs() => self.physical_channel.replace("ND", "CS"),
            _ => self.physical_channel.clone(),
        }
    }

    /// Physical channel in the syntax recpt1 accepts.
    ///
    /// T13 -> 13, BS23/TS3 -> BS23_3, ND04 -> CS4
    pub fn physical_channel_recpt1(&self) -> String {
        match self.broadcast_type() {
            Some(BroadcastType::Terrestrial) => self.physical_channel.replace('T', ""),
            Some(BroadcastType::BS) => self.physical_channel.replace("/TS", "_"),
            Some(bt) if bt.is_cs() => self.physical_channel.replace("ND", "CS").replace("CS0", "CS"),
            _ => self.physical_channel.clone(),
        }
    }
}

// Serialized by hand so the derived syntaxes ride along with the stored
// fields, keeping the Channels.json entry self-contained for consumers
// that know nothing about ARIB channel plans.
impl Serialize for TransportStreamInfo {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let broadcast_type = self.broadcast_type().ok_or_else(|| {
            serde::ser::Error::custom(format!(
                "cannot classify transport stream 0x{:04X} (NID 0x{:04X}, physical channel {:?})",
                self.transport_stream_id, self.network_id, self.physical_channel
            ))
        })?;

        let mut state = serializer.serialize_struct("TransportStreamInfo", 12)?;
        state.serialize_field("physical_channel", &self.physical_channel)?;
        state.serialize_field("transport_stream_id", &self.transport_stream_id)?;
        state.serialize_field("network_id", &self.network_id)?;
        state.serialize_field("network_name", &self.network_name)?;
        state.serialize_field("remote_control_key_id", &self.remote_control_key_id)?;
        state.serialize_field("satellite_frequency", &self.satellite_frequency)?;
        state.serialize_field("satellite_transponder", &self.satellite_transponder)?;
        state.serialize_field("satellite_slot_number", &self.satellite_slot_number)?;
        state.serialize_field("services", &self.services)?;
        state.serialize_field("broadcast_type", &broadcast_type)?;
        state.serialize_field("physical_channel_recisdb", &self.physical_channel_recisdb())?;
        state.serialize_field("physical_channel_recpt1", &self.physical_channel_recpt1())?;
        state.end()
    }
}

impl fmt::Display for TransportStreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let broadcast_type = self.broadcast_type();
        let physical_channel = match broadcast_type {
            Some(BroadcastType::Terrestrial) => {
                format!("{}ch", self.physical_channel.replace('T', ""))
            }
            _ => self.physical_channel.clone(),
        };
        let band = broadcast_type.map_or("Unknown", |bt| bt.name());
        let mut message = format!(
            "{} - {} / TSID: {} ",
            band, physical_channel, self.transport_stream_id
        );
        if broadcast_type == Some(BroadcastType::Terrestrial) {
            match self.remote_control_key_id {
                Some(key) => message += &format!("| {:02}: {}", key, self.network_name),
                None => message += &format!("| {}", self.network_name),
            }
        } else {
            match self.satellite_frequency {
                Some(freq) => {
                    message += &format!("/ Frequency: {:.5} GHz | {}", freq, self.network_name)
                }
                None => message += &format!("| {}", self.network_name),
            }
        }
        f.write_str(message.trim_end())
    }
}

/// Final result of one scan run: the three band lists handed to the
/// output formatters, each ordered by physical channel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    #[serde(rename = "Terrestrial")]
    pub terrestrial: Vec<TransportStreamInfo>,
    #[serde(rename = "BS")]
    pub bs: Vec<TransportStreamInfo>,
    #[serde(rename = "CS")]
    pub cs: Vec<TransportStreamInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_nid() {
        assert_eq!(
            BroadcastType::classify(0x7FE8, "Unknown"),
            Some(BroadcastType::Terrestrial)
        );
        assert_eq!(BroadcastType::classify(4, "Unknown"), Some(BroadcastType::BS));
        assert_eq!(BroadcastType::classify(6, "Unknown"), Some(BroadcastType::CS1));
        assert_eq!(BroadcastType::classify(7, "Unknown"), Some(BroadcastType::CS2));
        assert_eq!(BroadcastType::classify(0x000A, "Unknown"), None);
    }

    #[test]
    fn test_classify_by_label_fallback() {
        assert_eq!(
            BroadcastType::classify(0, "T27"),
            Some(BroadcastType::Terrestrial)
        );
        assert_eq!(BroadcastType::classify(0, "BS03/TS1"), Some(BroadcastType::BS));
        assert_eq!(BroadcastType::classify(0, "ND08"), Some(BroadcastType::CS1));
        assert_eq!(BroadcastType::classify(0, "ND24"), Some(BroadcastType::CS2));
    }

    #[test]
    fn test_channel_syntax_conversions() {
        let mut ts = TransportStreamInfo::new(0x40F1);
        ts.network_id = 4;
        ts.physical_channel = "BS23/TS3".to_string();
        assert_eq!(ts.physical_channel_recisdb(), "BS23_3");
        assert_eq!(ts.physical_channel_recpt1(), "BS23_3");

        let mut ts = TransportStreamInfo::new(0x6020);
        ts.network_id = 7;
        ts.physical_channel = "ND04".to_string();
        assert_eq!(ts.physical_channel_recisdb(), "CS04");
        assert_eq!(ts.physical_channel_recpt1(), "CS4");

        let mut ts = TransportStreamInfo::new(0x6080);
        ts.network_id = 6;
        ts.physical_channel = "ND10".to_string();
        assert_eq!(ts.physical_channel_recisdb(), "CS10");
        assert_eq!(ts.physical_channel_recpt1(), "CS10");

        let mut ts = TransportStreamInfo::new(0x7FE8);
        ts.network_id = 0x7FE8;
        ts.physical_channel = "T13".to_string();
        assert_eq!(ts.physical_channel_recisdb(), "T13");
        assert_eq!(ts.physical_channel_recpt1(), "13");
    }

    #[test]
    fn test_serialize_includes_derived_fields() {
        let mut ts = TransportStreamInfo::new(0x40F1);
        ts.network_id = 4;
        ts.physical_channel = "BS15/TS1".to_string();
        ts.network_name = "BS日テレ".to_string();
        ts.satellite_transponder = Some(15);
        ts.satellite_slot_number = Some(1);
        ts.services.push(ServiceInfo::new(141));

        let value = serde_json::to_value(&ts).unwrap();
        assert_eq!(value["broadcast_type"], "BS");
        assert_eq!(value["physical_channel_recisdb"], "BS15_1");
        assert_eq!(value["physical_channel_recpt1"], "BS15_1");
        assert_eq!(value["services"][0]["service_id"], 141);
        assert_eq!(value["services"][0]["is_free"], true);
    }

    #[test]
    fn test_serialize_unclassifiable_stream_fails() {
        let ts = TransportStreamInfo::new(0x1234);
        assert!(serde_json::to_value(&ts).is_err());
    }

    #[test]
    fn test_video_service_detection() {
        let mut service = ServiceInfo::new(1024);
        service.service_type = Some(0x01);
        assert!(service.is_video_service());
        service.service_type = Some(0xC0);
        assert!(!service.is_video_service());
        service.service_type = None;
        assert!(!service.is_video_service());
    }

    #[test]
    fn test_service_display_labels() {
        let mut service = ServiceInfo::new(1432);
        service.channel_number = "531".to_string();
        service.service_name = "ワンセグ".to_string();
        service.service_type = Some(0xC0);
        service.is_oneseg = true;
        assert_eq!(service.to_string(), "Ch: 531 | ワンセグ [OneSeg]");

        service.is_oneseg = false;
        assert_eq!(service.to_string(), "Ch: 531 | ワンセグ [Data]");
    }
}
