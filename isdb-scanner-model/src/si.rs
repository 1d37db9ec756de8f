//! Parsed SI records consumed by the channel model builder.
//!
//! The scanner does not demultiplex transport streams itself: a section
//! decoder hands over NIT/SDT records with their descriptors already
//! unpacked, and this module defines that hand-over vocabulary.
//!
//! Descriptors are a closed sum type, one variant per descriptor tag the
//! builder consumes. "First descriptor wins" lookups are provided as
//! accessors on the owning records.

/// Network name descriptor (0x40).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetworkNameDescriptor {
    /// Network name.
    pub network_name: String,
}

/// Satellite delivery system descriptor (0x43).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SatelliteDeliverySystemDescriptor {
    /// Frequency in GHz.
    pub frequency: f64,
}

/// Service descriptor (0x48).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceDescriptor {
    /// Service type.
    pub service_type: u8,
    /// Service name.
    pub service_name: String,
}

/// TS information descriptor (0xCD).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TsInformationDescriptor {
    /// Remote control key ID (リモコンキー ID).
    pub remote_control_key_id: u8,
    /// TS name.
    pub ts_name: String,
}

/// Partial reception descriptor (0xFB).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartialReceptionDescriptor {
    /// Service IDs carried in the partial reception (ワンセグ) segment.
    pub service_ids: Vec<u16>,
}

/// One descriptor from an SI descriptor loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    /// Network name descriptor (0x40).
    NetworkName(NetworkNameDescriptor),
    /// Satellite delivery system descriptor (0x43).
    SatelliteDeliverySystem(SatelliteDeliverySystemDescriptor),
    /// Service descriptor (0x48).
    Service(ServiceDescriptor),
    /// TS information descriptor (0xCD).
    TsInformation(TsInformationDescriptor),
    /// Partial reception descriptor (0xFB).
    PartialReception(PartialReceptionDescriptor),
}

/// Transport stream entry in a NIT record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NitTransportStream {
    /// Transport stream ID.
    pub transport_stream_id: u16,
    /// Transport descriptors.
    pub descriptors: Vec<Descriptor>,
}

impl NitTransportStream {
    /// First TS information descriptor, if any.
    pub fn ts_information(&self) -> Option<&TsInformationDescriptor> {
        self.descriptors.iter().find_map(|d| match d {
            Descriptor::TsInformation(desc) => Some(desc),
            _ => None,
        })
    }

    /// First partial reception descriptor, if any.
    pub fn partial_reception(&self) -> Option<&PartialReceptionDescriptor> {
        self.descriptors.iter().find_map(|d| match d {
            Descriptor::PartialReception(desc) => Some(desc),
            _ => None,
        })
    }

    /// Satellite delivery system descriptors, in loop order.
    pub fn satellite_deliveries(&self) -> impl Iterator<Item = &SatelliteDeliverySystemDescriptor> {
        self.descriptors.iter().filter_map(|d| match d {
            Descriptor::SatelliteDeliverySystem(desc) => Some(desc),
            _ => None,
        })
    }
}

/// One NIT (Network Information Table) record for the actual network.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NitRecord {
    /// Network ID.
    pub network_id: u16,
    /// Network-level descriptors.
    pub network_descriptors: Vec<Descriptor>,
    /// Transport stream loop.
    pub transport_streams: Vec<NitTransportStream>,
}

impl NitRecord {
    /// First network name descriptor in the network loop, if any.
    pub fn network_name(&self) -> Option<&NetworkNameDescriptor> {
        self.network_descriptors.iter().find_map(|d| match d {
            Descriptor::NetworkName(desc) => Some(desc),
            _ => None,
        })
    }
}

/// Service entry in an SDT record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SdtService {
    /// Service ID (program number).
    pub service_id: u16,
    /// Free CA mode (true when the service is scrambled).
    pub free_ca_mode: bool,
    /// Service descriptors.
    pub descriptors: Vec<Descriptor>,
}

impl SdtService {
    /// First service descriptor, if any.
    pub fn service_descriptor(&self) -> Option<&ServiceDescriptor> {
        self.descriptors.iter().find_map(|d| match d {
            Descriptor::Service(desc) => Some(desc),
            _ => None,
        })
    }
}

/// One SDT (Service Description Table) record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SdtRecord {
    /// Transport stream ID.
    pub transport_stream_id: u16,
    /// Service loop.
    pub services: Vec<SdtService>,
}
