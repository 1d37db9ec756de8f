//! NIT/SDT table parsing into channel model records.

use isdb_scanner_model::si::{
    Descriptor, NetworkNameDescriptor, NitRecord, NitTransportStream, PartialReceptionDescriptor,
    SatelliteDeliverySystemDescriptor, SdtRecord, SdtService, ServiceDescriptor,
    TsInformationDescriptor,
};

use super::descriptor_tag;
use super::psi::Section;
use super::text::decode_arib_text;

/// Parse a NIT section body. The caller has already filtered by table ID.
pub fn parse_nit(section: &Section) -> Result<NitRecord, &'static str> {
    let data = section.payload;
    if data.len() < 2 {
        return Err("NIT body too short");
    }

    let network_descriptors_length = ((data[0] as usize & 0x0F) << 8) | data[1] as usize;
    let ts_loop_offset = 2 + network_descriptors_length;
    if data.len() < ts_loop_offset + 2 {
        return Err("network descriptor loop overruns the section");
    }
    let network_descriptors = parse_descriptor_loop(&data[2..ts_loop_offset]);

    let ts_loop_length =
        ((data[ts_loop_offset] as usize & 0x0F) << 8) | data[ts_loop_offset + 1] as usize;
    let mut offset = ts_loop_offset + 2;
    let ts_loop_end = offset + ts_loop_length;
    if data.len() < ts_loop_end {
        return Err("transport stream loop overruns the section");
    }

    let mut transport_streams = Vec::new();
    while offset + 6 <= ts_loop_end {
        let transport_stream_id = ((data[offset] as u16) << 8) | data[offset + 1] as u16;
        // original_network_id at offset + 2 is not needed here
        let descriptors_length =
            ((data[offset + 4] as usize & 0x0F) << 8) | data[offset + 5] as usize;
        offset += 6;

        if offset + descriptors_length > ts_loop_end {
            break;
        }
        let descriptors = parse_descriptor_loop(&data[offset..offset + descriptors_length]);
        offset += descriptors_length;

        transport_streams.push(NitTransportStream {
            transport_stream_id,
            descriptors,
        });
    }

    Ok(NitRecord {
        network_id: section.table_id_extension,
        network_descriptors,
        transport_streams,
    })
}

/// Parse an SDT section body. The caller has already filtered by table ID.
pub fn parse_sdt(section: &Section) -> Result<SdtRecord, &'static str> {
    let data = section.payload;
    if data.len() < 3 {
        return Err("SDT body too short");
    }
    // data[0..2] is original_network_id, data[2] reserved

    let mut services = Vec::new();
    let mut offset = 3;
    while offset + 5 <= data.len() {
        let service_id = ((data[offset] as u16) << 8) | data[offset + 1] as u16;
        let free_ca_mode = data[offset + 3] & 0x10 != 0;
        let descriptors_length =
            ((data[offset + 3] as usize & 0x0F) << 8) | data[offset + 4] as usize;
        offset += 5;

        if offset + descriptors_length > data.len() {
            break;
        }
        let descriptors = parse_descriptor_loop(&data[offset..offset + descriptors_length]);
        offset += descriptors_length;

        services.push(SdtService {
            service_id,
            free_ca_mode,
            descriptors,
        });
    }

    Ok(SdtRecord {
        transport_stream_id: section.table_id_extension,
        services,
    })
}

/// Walk a descriptor loop, keeping the descriptors the channel model
/// consumes and skipping everything else.
fn parse_descriptor_loop(data: &[u8]) -> Vec<Descriptor> {
    let mut descriptors = Vec::new();
    let mut offset = 0;

    while offset + 2 <= data.len() {
        let tag = data[offset];
        let length = data[offset + 1] as usize;
        offset += 2;

        if offset + length > data.len() {
            break;
        }
        let body = &data[offset..offset + length];
        offset += length;

        let descriptor = match tag {
            descriptor_tag::NETWORK_NAME => Some(Descriptor::NetworkName(NetworkNameDescriptor {
                network_name: decode_arib_text(body),
            })),
            descriptor_tag::SATELLITE_DELIVERY => parse_satellite_delivery(body)
                .map(Descriptor::SatelliteDeliverySystem),
            descriptor_tag::SERVICE => parse_service(body).map(Descriptor::Service),
            descriptor_tag::TS_INFORMATION => {
                parse_ts_information(body).map(Descriptor::TsInformation)
            }
            descriptor_tag::PARTIAL_RECEPTION => Some(Descriptor::PartialReception(
                parse_partial_reception(body),
            )),
            _ => None,
        };
        if let Some(descriptor) = descriptor {
            descriptors.push(descriptor);
        }
    }

    descriptors
}

fn parse_satellite_delivery(body: &[u8]) -> Option<SatelliteDeliverySystemDescriptor> {
    if body.len() < 11 {
        return None;
    }
    // Frequency is 8 BCD digits giving GHz with five decimals.
    let frequency = bcd_to_u32(&body[0..4]) as f64 / 100_000.0;
    Some(SatelliteDeliverySystemDescriptor { frequency })
}

fn parse_service(body: &[u8]) -> Option<ServiceDescriptor> {
    if body.len() < 3 {
        return None;
    }
    let service_type = body[0];
    let provider_name_length = body[1] as usize;
    let name_length_offset = 2 + provider_name_length;
    if body.len() < name_length_offset + 1 {
        return None;
    }
    let service_name_length = body[name_length_offset] as usize;
    let name_offset = name_length_offset + 1;
    if body.len() < name_offset + service_name_length {
        return None;
    }
    Some(ServiceDescriptor {
        service_type,
        service_name: decode_arib_text(&body[name_offset..name_offset + service_name_length]),
    })
}

fn parse_ts_information(body: &[u8]) -> Option<TsInformationDescriptor> {
    if body.len() < 2 {
        return None;
    }
    let remote_control_key_id = body[0];
    let ts_name_length = (body[1] >> 2) as usize;
    if body.len() < 2 + ts_name_length {
        return None;
    }
    Some(TsInformationDescriptor {
        remote_control_key_id,
        ts_name: decode_arib_text(&body[2..2 + ts_name_length]),
    })
}

fn parse_partial_reception(body: &[u8]) -> PartialReceptionDescriptor {
    let service_ids = body
        .chunks_exact(2)
        .map(|pair| ((pair[0] as u16) << 8) | pair[1] as u16)
        .collect();
    PartialReceptionDescriptor { service_ids }
}

fn bcd_to_u32(data: &[u8]) -> u32 {
    let mut value = 0u32;
    for &byte in data {
        value = value * 100 + ((byte >> 4) as u32) * 10 + (byte & 0x0F) as u32;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::psi::make_section;
    use crate::sections::table_id;

    /// ＢＳ朝日１ in JIS X 0208 code points.
    const BS_ASAHI: &[u8] = &[0x23, 0x42, 0x23, 0x53, 0x44, 0x2B, 0x46, 0x7C, 0x23, 0x31];

    fn nit_body() -> Vec<u8> {
        let mut body = Vec::new();
        // Network descriptor loop: network name ＢＳ朝日１ (reusing the
        // TS name bytes; contents are arbitrary here).
        let network_loop_len = 2 + BS_ASAHI.len();
        body.push(0xF0 | (network_loop_len >> 8) as u8);
        body.push(network_loop_len as u8);
        body.push(0x40);
        body.push(BS_ASAHI.len() as u8);
        body.extend_from_slice(BS_ASAHI);

        // One TS entry with a satellite delivery descriptor (11.72748 GHz)
        // and a TS information descriptor.
        let mut ts_descriptors = Vec::new();
        ts_descriptors.extend_from_slice(&[
            0x43, 0x0B, 0x01, 0x17, 0x27, 0x48, 0x01, 0x10, 0x60, 0x02, 0x88, 0x70, 0x01,
        ]);
        ts_descriptors.push(0xCD);
        ts_descriptors.push(2 + BS_ASAHI.len() as u8);
        ts_descriptors.push(0x01); // remote control key ID
        ts_descriptors.push((BS_ASAHI.len() as u8) << 2);
        ts_descriptors.extend_from_slice(BS_ASAHI);

        body.extend_from_slice(&[0xF0, (6 + ts_descriptors.len()) as u8]);
        body.extend_from_slice(&[0x40, 0x10, 0x00, 0x04]); // TSID 0x4010, ONID 0x0004
        body.push(0xF0 | (ts_descriptors.len() >> 8) as u8);
        body.push(ts_descriptors.len() as u8);
        body.extend_from_slice(&ts_descriptors);
        body
    }

    #[test]
    fn test_parse_nit_section() {
        let raw = make_section(table_id::NIT_ACTUAL, 0x0004, &nit_body());
        let section = Section::parse(&raw).unwrap();
        let nit = parse_nit(&section).unwrap();

        assert_eq!(nit.network_id, 0x0004);
        assert_eq!(
            nit.network_name().unwrap().network_name,
            "ＢＳ朝日１"
        );
        assert_eq!(nit.transport_streams.len(), 1);

        let ts = &nit.transport_streams[0];
        assert_eq!(ts.transport_stream_id, 0x4010);
        let info = ts.ts_information().unwrap();
        assert_eq!(info.remote_control_key_id, 1);
        assert_eq!(info.ts_name, "ＢＳ朝日１");
        let frequencies: Vec<f64> = ts.satellite_deliveries().map(|d| d.frequency).collect();
        assert_eq!(frequencies, vec![11.72748]);
    }

    #[test]
    fn test_parse_sdt_section() {
        // ＮＨＫ総合１・東京
        let service_name: &[u8] = &[
            0x23, 0x4E, 0x23, 0x48, 0x23, 0x4B, 0x41, 0x6D, 0x39, 0x67, 0x23, 0x31, 0x21, 0x26,
            0x45, 0x6C, 0x35, 0x7E,
        ];

        let mut service_descriptor = vec![0x48];
        service_descriptor.push(3 + service_name.len() as u8);
        service_descriptor.push(0x01); // digital TV service
        service_descriptor.push(0x00); // no provider name
        service_descriptor.push(service_name.len() as u8);
        service_descriptor.extend_from_slice(service_name);

        let mut body = vec![0x7F, 0xE0, 0xFF]; // ONID + reserved
        body.extend_from_slice(&[0x04, 0x08]); // service_id 0x0408
        body.push(0xFC); // EIT flags
        body.push(0x80 | ((service_descriptor.len() >> 8) as u8 & 0x0F));
        body.push(service_descriptor.len() as u8);
        body.extend_from_slice(&service_descriptor);

        // A scrambled service without descriptors.
        body.extend_from_slice(&[0x04, 0x09, 0xFC, 0x90, 0x00]);

        let raw = make_section(table_id::SDT_ACTUAL, 0x7FE1, &body);
        let section = Section::parse(&raw).unwrap();
        let sdt = parse_sdt(&section).unwrap();

        assert_eq!(sdt.transport_stream_id, 0x7FE1);
        assert_eq!(sdt.services.len(), 2);

        let service = &sdt.services[0];
        assert_eq!(service.service_id, 0x0408);
        assert!(!service.free_ca_mode);
        let descriptor = service.service_descriptor().unwrap();
        assert_eq!(descriptor.service_type, 0x01);
        assert_eq!(descriptor.service_name, "ＮＨＫ総合１・東京");

        let scrambled = &sdt.services[1];
        assert_eq!(scrambled.service_id, 0x0409);
        assert!(scrambled.free_ca_mode);
        assert!(scrambled.service_descriptor().is_none());
    }

    #[test]
    fn test_partial_reception_service_ids() {
        let body = [0x5C, 0x39, 0x5C, 0x3A];
        let descriptor = parse_partial_reception(&body);
        assert_eq!(descriptor.service_ids, vec![0x5C39, 0x5C3A]);
    }

    #[test]
    fn test_descriptor_loop_skips_unknown_tags() {
        // Logo transmission descriptor followed by a partial reception one.
        let data = [0xCF, 0x03, 0x01, 0x02, 0x03, 0xFB, 0x02, 0x5C, 0x39];
        let descriptors = parse_descriptor_loop(&data);
        assert_eq!(descriptors.len(), 1);
        assert!(matches!(descriptors[0], Descriptor::PartialReception(_)));
    }

    #[test]
    fn test_descriptor_loop_stops_at_overrun() {
        let data = [0xFB, 0x10, 0x5C, 0x39];
        assert!(parse_descriptor_loop(&data).is_empty());
    }

    #[test]
    fn test_satellite_delivery_requires_full_length() {
        assert!(parse_satellite_delivery(&[0x01, 0x17, 0x27, 0x48]).is_none());
    }

    #[test]
    fn test_bcd_to_u32() {
        assert_eq!(bcd_to_u32(&[0x01, 0x17, 0x27, 0x48]), 1_172_748);
        assert_eq!(bcd_to_u32(&[0x99, 0x99]), 9999);
        assert_eq!(bcd_to_u32(&[]), 0);
    }
}
