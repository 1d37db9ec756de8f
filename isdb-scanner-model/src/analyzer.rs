//! Channel model builder.
//!
//! Consolidates the NIT/SDT records decoded from one capture into
//! [`TransportStreamInfo`] entries:
//!
//! - The NIT pass (actual network only) discovers transport streams and
//!   reconstructs satellite addressing from bit fields inside the TSID
//! - BS slot numbers are renumbered into a dense 0-based sequence per
//!   transponder
//! - The SDT pass attaches services to already-known transport streams
//! - A final pass derives the 3-digit channel number of every service
//!
//! Streams are keyed by TSID, which is unique across all Japanese
//! broadcast networks in practice. A record seen twice overwrites the
//! existing entry instead of duplicating it.

use std::collections::BTreeMap;

use log::debug;

use crate::error::AnalysisError;
use crate::normalize::normalize_si_text;
use crate::si::{NitRecord, SdtRecord};
use crate::types::{ServiceInfo, TransportStreamInfo};

/// Build the channel model from the SI records of one capture.
///
/// `tuned_channel` is the physical channel the capture was taken on
/// (e.g. "T13", "BS01/TS0", "ND04"). Terrestrial SI carries no physical
/// channel self-reference, so a terrestrial capture must yield exactly
/// one transport stream and is labeled with `tuned_channel`; satellite
/// captures are sorted by the labels derived from their TSIDs.
///
/// # Arguments
///
/// * `nit_records` - NIT records for the actual network, in stream order
/// * `sdt_records` - SDT records, in stream order
/// * `tuned_channel` - Physical channel the capture was tuned to
///
/// # Returns
///
/// Transport streams ordered by physical channel, or an
/// [`AnalysisError`] discarding the whole capture.
pub fn build_channel_model(
    nit_records: &[NitRecord],
    sdt_records: &[SdtRecord],
    tuned_channel: &str,
) -> Result<Vec<TransportStreamInfo>, AnalysisError> {
    let mut ts_infos: BTreeMap<u16, TransportStreamInfo> = BTreeMap::new();

    ingest_nit(&mut ts_infos, nit_records);
    renumber_bs_slots(&mut ts_infos);

    // 地上波の PSI/SI からは受信中の物理チャンネルを判定できないので、
    // 選局した物理チャンネルをここでセットする
    if tuned_channel.starts_with('T') {
        if ts_infos.len() != 1 {
            return Err(AnalysisError::UnexpectedStreamCount {
                tuned: tuned_channel.to_string(),
                count: ts_infos.len(),
            });
        }
        if let Some(ts_info) = ts_infos.values_mut().next() {
            ts_info.physical_channel = tuned_channel.to_string();
        }
    }

    ingest_sdt(&mut ts_infos, sdt_records);
    assign_channel_numbers(&mut ts_infos)?;

    // A capture from a tuned channel always belongs to a known broadcast
    // plan; anything unclassifiable means the capture cannot be trusted.
    for ts_info in ts_infos.values() {
        if ts_info.broadcast_type().is_none() {
            return Err(AnalysisError::UnknownBroadcastType {
                transport_stream_id: ts_info.transport_stream_id,
                network_id: ts_info.network_id,
                physical_channel: ts_info.physical_channel.clone(),
            });
        }
    }

    let mut result: Vec<TransportStreamInfo> = ts_infos.into_values().collect();
    if !tuned_channel.starts_with('T') {
        result.sort_by(|a, b| a.physical_channel.cmp(&b.physical_channel));
    }
    Ok(result)
}

fn ingest_nit(ts_infos: &mut BTreeMap<u16, TransportStreamInfo>, nit_records: &[NitRecord]) {
    for nit in nit_records {
        for transport_stream in &nit.transport_streams {
            let ts_info = ts_infos
                .entry(transport_stream.transport_stream_id)
                .or_insert_with(|| TransportStreamInfo::new(transport_stream.transport_stream_id));
            ts_info.network_id = nit.network_id;

            // BS の TSID は ARIB TR-B15 第三分冊 第一部 第七編 8.1.1 により
            // (NID下位4bit:4bit)(放送開始時期フラグ:3bit)(トランスポンダ番号:5bit)(予約:1bit)(スロット番号:3bit)
            // の 16bit で構成されるので、ビット演算で取り出す
            if ts_info.network_id == 4 {
                let transponder = ((ts_info.transport_stream_id >> 4) & 0b11111) as u8;
                let slot = (ts_info.transport_stream_id & 0b111) as u8;
                ts_info.satellite_transponder = Some(transponder);
                ts_info.satellite_slot_number = Some(slot);
                ts_info.physical_channel = format!("BS{:02}/TS{}", transponder, slot);
            // CS110 の TSID は ARIB TR-B15 第四分冊 第二部 第七編 8.1.1 により
            // (NID下位4bit:4bit)(予約:3bit)(トランスポンダ番号:5bit)(予約:1bit)(スロット番号:3bit)
            // の 16bit で構成される (スロット番号は常に 0 なので取得しない)
            } else if ts_info.network_id == 6 || ts_info.network_id == 7 {
                let transponder = ((ts_info.transport_stream_id >> 4) & 0b11111) as u8;
                ts_info.satellite_transponder = Some(transponder);
                ts_info.physical_channel = format!("ND{:02}", transponder);
            }

            if (0x7880..=0x7FE8).contains(&ts_info.network_id) {
                // TS 情報記述子 (地上波のみ): TS 名をネットワーク名として設定する
                if let Some(ts_information) = transport_stream.ts_information() {
                    ts_info.network_name = normalize_si_text(&ts_information.ts_name);
                    ts_info.remote_control_key_id = Some(ts_information.remote_control_key_id);
                }
                // 部分受信記述子 (地上波のみ): ワンセグ放送のサービスを特定する
                if let Some(partial_reception) = transport_stream.partial_reception() {
                    for &service_id in &partial_reception.service_ids {
                        let service_info = find_or_insert_service(&mut ts_info.services, service_id);
                        service_info.is_oneseg = true;
                    }
                }
            } else {
                // 衛星分配システム記述子 (衛星放送のみ)
                for satellite_delivery in transport_stream.satellite_deliveries() {
                    ts_info.satellite_frequency = Some(satellite_delivery.frequency);
                }
                // ネットワーク名記述子
                // (地上波では "関東広域0" のような値になるので利用しない)
                if let Some(network_name) = nit.network_name() {
                    ts_info.network_name = normalize_si_text(&network_name.network_name);
                }
            }
        }
    }
    debug!(
        "[Analyzer] NIT pass discovered {} transport stream(s)",
        ts_infos.len()
    );
}

/// Renumber BS slot numbers into a dense 0-based sequence per transponder.
///
/// The slot number in the TSID is defined to match the relative TS number
/// of the ISDB-S TMCC signal, but band reorganization and station closure
/// leave gaps in it, while drivers expect a contiguous 0-based relative TS
/// number at tuning time. Raw slots `[0, 1, 3, 5]` therefore become
/// `[0, 1, 2, 3]`, preserving the original relative order.
fn renumber_bs_slots(ts_infos: &mut BTreeMap<u16, TransportStreamInfo>) {
    let mut bs_groups: BTreeMap<u8, Vec<u16>> = BTreeMap::new();
    for ts_info in ts_infos.values() {
        if ts_info.network_id == 4 {
            if let Some(transponder) = ts_info.satellite_transponder {
                bs_groups
                    .entry(transponder)
                    .or_default()
                    .push(ts_info.transport_stream_id);
            }
        }
    }

    for (transponder, mut group) in bs_groups {
        group.sort_by_key(|tsid| {
            ts_infos
                .get(tsid)
                .and_then(|ts_info| ts_info.satellite_slot_number)
                .map_or(-1, i16::from)
        });
        for (new_slot, tsid) in group.iter().enumerate() {
            let new_slot = new_slot as u8;
            if let Some(ts_info) = ts_infos.get_mut(tsid) {
                if ts_info.satellite_slot_number != Some(new_slot) {
                    debug!(
                        "[Analyzer] BS{:02}: TSID 0x{:04X} slot {:?} -> {}",
                        transponder, tsid, ts_info.satellite_slot_number, new_slot
                    );
                }
                ts_info.satellite_slot_number = Some(new_slot);
                ts_info.physical_channel = format!("BS{:02}/TS{}", transponder, new_slot);
            }
        }
    }
}

fn ingest_sdt(ts_infos: &mut BTreeMap<u16, TransportStreamInfo>, sdt_records: &[SdtRecord]) {
    for sdt in sdt_records {
        // NIT に現れなかった TS のサービスは取り込まない
        let ts_info = match ts_infos.get_mut(&sdt.transport_stream_id) {
            Some(ts_info) => ts_info,
            None => continue,
        };
        for service in &sdt.services {
            let service_info = find_or_insert_service(&mut ts_info.services, service.service_id);
            service_info.is_free = !service.free_ca_mode;
            if let Some(descriptor) = service.service_descriptor() {
                service_info.service_type = Some(descriptor.service_type);
                service_info.service_name = normalize_si_text(&descriptor.service_name);
            }
        }
        ts_info.services.sort_by_key(|service| service.service_id);
    }
}

fn assign_channel_numbers(
    ts_infos: &mut BTreeMap<u16, TransportStreamInfo>,
) -> Result<(), AnalysisError> {
    for ts_info in ts_infos.values_mut() {
        let is_terrestrial = (0x7880..=0x7FE8).contains(&ts_info.network_id);
        for service_info in &mut ts_info.services {
            if is_terrestrial {
                let remote_control_key_id = ts_info.remote_control_key_id.ok_or_else(|| {
                    AnalysisError::MissingRemoteControlKey {
                        transport_stream_id: ts_info.transport_stream_id,
                        service_id: service_info.service_id,
                    }
                })?;
                // 地上波のサービス ID は ARIB TR-B14 第五分冊 第七編 9.1 により
                // (地域種別:6bit)(県複フラグ:1bit)(サービス種別:2bit)(地域事業者識別:4bit)(サービス番号:3bit)
                // の 16bit で構成されるので、サービス種別とサービス番号を取り出し、
                // 9.1.3 (d) の「3桁番号」の通りに組み立てる
                let service_type = (service_info.service_id & 0b0000_0001_1000_0000) >> 7;
                let service_number = (service_info.service_id & 0b0000_0000_0000_0111) + 1;
                service_info.channel_number = format!(
                    "{:03}",
                    service_type * 200
                        + u16::from(remote_control_key_id) * 10
                        + service_number
                );
            } else {
                // BS/CS はサービス ID と同一
                service_info.channel_number = format!("{:03}", service_info.service_id);
            }
        }
    }
    Ok(())
}

/// Look up a service by id, inserting a fresh entry when absent.
fn find_or_insert_service(services: &mut Vec<ServiceInfo>, service_id: u16) -> &mut ServiceInfo {
    match services.iter().position(|service| service.service_id == service_id) {
        Some(index) => &mut services[index],
        None => {
            services.push(ServiceInfo::new(service_id));
            let last = services.len() - 1;
            &mut services[last]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::si::{
        Descriptor, NetworkNameDescriptor, NitTransportStream, PartialReceptionDescriptor,
        SatelliteDeliverySystemDescriptor, SdtService, ServiceDescriptor,
        TsInformationDescriptor,
    };

    fn bs_nit(transport_stream_ids: &[u16]) -> NitRecord {
        NitRecord {
            network_id: 4,
            network_descriptors: vec![Descriptor::NetworkName(NetworkNameDescriptor {
                network_name: "ＢＳデジタル".to_string(),
            })],
            transport_streams: transport_stream_ids
                .iter()
                .map(|&transport_stream_id| NitTransportStream {
                    transport_stream_id,
                    descriptors: vec![Descriptor::SatelliteDeliverySystem(
                        SatelliteDeliverySystemDescriptor { frequency: 11.72748 },
                    )],
                })
                .collect(),
        }
    }

    fn terrestrial_nit(transport_stream_id: u16, remote_control_key_id: u8) -> NitRecord {
        NitRecord {
            network_id: 0x7FE8,
            network_descriptors: vec![],
            transport_streams: vec![NitTransportStream {
                transport_stream_id,
                descriptors: vec![Descriptor::TsInformation(TsInformationDescriptor {
                    remote_control_key_id,
                    ts_name: "ＮＨＫ総合・東京".to_string(),
                })],
            }],
        }
    }

    fn sdt_with_service(transport_stream_id: u16, service_id: u16, name: &str) -> SdtRecord {
        SdtRecord {
            transport_stream_id,
            services: vec![SdtService {
                service_id,
                free_ca_mode: false,
                descriptors: vec![Descriptor::Service(ServiceDescriptor {
                    service_type: 0x01,
                    service_name: name.to_string(),
                })],
            }],
        }
    }

    #[test]
    fn test_bs_tsid_bit_extraction() {
        // TSID 0x0711: transponder (0x0711 >> 4) & 0x1F = 17, slot 0x0711 & 0x7 = 1
        let result = build_channel_model(&[bs_nit(&[0x0711])], &[], "BS01/TS0").unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].satellite_transponder, Some(17));
        assert_eq!(result[0].satellite_slot_number, Some(1));
        assert_eq!(result[0].physical_channel, "BS17/TS1");
        assert_eq!(result[0].network_name, "BSデジタル");
        assert_eq!(result[0].satellite_frequency, Some(11.72748));
    }

    #[test]
    fn test_bs_slot_renumbering_closes_gaps() {
        // Four streams on transponder 1 with raw slots [0, 1, 3, 5]
        let tsids = [0x0010, 0x0011, 0x0013, 0x0015];
        let result = build_channel_model(&[bs_nit(&tsids)], &[], "BS01/TS0").unwrap();

        let slots: Vec<(u16, u8)> = result
            .iter()
            .map(|ts| (ts.transport_stream_id, ts.satellite_slot_number.unwrap()))
            .collect();
        assert_eq!(
            slots,
            vec![(0x0010, 0), (0x0011, 1), (0x0013, 2), (0x0015, 3)]
        );
        assert_eq!(result[2].physical_channel, "BS01/TS2");
        assert_eq!(result[3].physical_channel, "BS01/TS3");
    }

    #[test]
    fn test_renumbering_groups_by_transponder() {
        // Transponder 1 slots [1, 3] and transponder 3 slot [2] renumber
        // independently of each other
        let result =
            build_channel_model(&[bs_nit(&[0x0011, 0x0013, 0x0032])], &[], "BS01/TS0").unwrap();
        let labels: Vec<&str> = result.iter().map(|ts| ts.physical_channel.as_str()).collect();
        assert_eq!(labels, vec!["BS01/TS0", "BS01/TS1", "BS03/TS0"]);
    }

    #[test]
    fn test_cs_transponder_extraction() {
        // TSID 0x6020: transponder (0x6020 >> 4) & 0x1F = 2, ND02
        let nit = NitRecord {
            network_id: 6,
            network_descriptors: vec![],
            transport_streams: vec![NitTransportStream {
                transport_stream_id: 0x6020,
                descriptors: vec![],
            }],
        };
        let result = build_channel_model(&[nit], &[], "ND02").unwrap();
        assert_eq!(result[0].satellite_transponder, Some(2));
        assert_eq!(result[0].satellite_slot_number, None);
        assert_eq!(result[0].physical_channel, "ND02");
    }

    #[test]
    fn test_terrestrial_capture_labeled_with_tuned_channel() {
        let nit = terrestrial_nit(0x7FE8, 1);
        let sdt = sdt_with_service(0x7FE8, 1024, "ＮＨＫ総合１・東京");
        let result = build_channel_model(&[nit], &[sdt], "T27").unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].physical_channel, "T27");
        assert_eq!(result[0].network_name, "NHK総合・東京");
        assert_eq!(result[0].remote_control_key_id, Some(1));
        assert_eq!(result[0].services[0].service_name, "NHK総合1・東京");
    }

    #[test]
    fn test_terrestrial_channel_number_formula() {
        // service_id with service category 1 and service number bits 2,
        // remote control key 5: 1*200 + 5*10 + (2+1) = 253
        let service_id = (1 << 7) | 2;
        let nit = terrestrial_nit(0x7FE8, 5);
        let sdt = sdt_with_service(0x7FE8, service_id, "テスト");
        let result = build_channel_model(&[nit], &[sdt], "T13").unwrap();
        assert_eq!(result[0].services[0].channel_number, "253");
    }

    #[test]
    fn test_satellite_channel_number_is_service_id() {
        let result = build_channel_model(
            &[bs_nit(&[0x0711])],
            &[sdt_with_service(0x0711, 101, "ＮＨＫ ＢＳ")],
            "BS01/TS0",
        )
        .unwrap();
        assert_eq!(result[0].services[0].channel_number, "101");
        assert_eq!(result[0].services[0].service_name, "NHK BS");
    }

    #[test]
    fn test_repeated_ingestion_overwrites_never_duplicates() {
        let nit = bs_nit(&[0x0711]);
        let sdt_records = vec![
            sdt_with_service(0x0711, 101, "旧サービス名"),
            sdt_with_service(0x0711, 101, "新サービス名"),
        ];
        let result =
            build_channel_model(&[nit.clone(), nit], &sdt_records, "BS01/TS0").unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].services.len(), 1);
        assert_eq!(result[0].services[0].service_name, "新サービス名");
    }

    #[test]
    fn test_sdt_for_unknown_stream_skipped() {
        let result = build_channel_model(
            &[bs_nit(&[0x0711])],
            &[sdt_with_service(0x4010, 151, "他ネットワーク")],
            "BS01/TS0",
        )
        .unwrap();
        assert_eq!(result.len(), 1);
        assert!(result[0].services.is_empty());
    }

    #[test]
    fn test_partial_reception_marks_oneseg() {
        let mut nit = terrestrial_nit(0x7FE8, 1);
        nit.transport_streams[0]
            .descriptors
            .push(Descriptor::PartialReception(PartialReceptionDescriptor {
                service_ids: vec![1408],
            }));
        let sdt = SdtRecord {
            transport_stream_id: 0x7FE8,
            services: vec![
                SdtService {
                    service_id: 1024,
                    free_ca_mode: false,
                    descriptors: vec![Descriptor::Service(ServiceDescriptor {
                        service_type: 0x01,
                        service_name: "ＮＨＫ総合１".to_string(),
                    })],
                },
                SdtService {
                    service_id: 1408,
                    free_ca_mode: false,
                    descriptors: vec![Descriptor::Service(ServiceDescriptor {
                        service_type: 0xC0,
                        service_name: "ＮＨＫ携帯Ｇ".to_string(),
                    })],
                },
            ],
        };
        let result = build_channel_model(&[nit], &[sdt], "T27").unwrap();

        let services = &result[0].services;
        assert_eq!(services.len(), 2);
        assert!(!services[0].is_oneseg);
        assert!(services[1].is_oneseg);
        assert_eq!(services[1].service_name, "NHK携帯G");
        assert_eq!(services[1].service_type, Some(0xC0));
    }

    #[test]
    fn test_services_sorted_by_service_id() {
        let sdt = SdtRecord {
            transport_stream_id: 0x0711,
            services: vec![
                SdtService {
                    service_id: 103,
                    free_ca_mode: false,
                    descriptors: vec![],
                },
                SdtService {
                    service_id: 101,
                    free_ca_mode: false,
                    descriptors: vec![],
                },
            ],
        };
        let result = build_channel_model(&[bs_nit(&[0x0711])], &[sdt], "BS01/TS0").unwrap();
        let service_ids: Vec<u16> =
            result[0].services.iter().map(|service| service.service_id).collect();
        assert_eq!(service_ids, vec![101, 103]);
    }

    #[test]
    fn test_free_ca_mode_inverted() {
        let mut sdt = sdt_with_service(0x6020, 237, "スターチャンネル");
        sdt.services[0].free_ca_mode = true;
        let nit = NitRecord {
            network_id: 7,
            network_descriptors: vec![],
            transport_streams: vec![NitTransportStream {
                transport_stream_id: 0x6020,
                descriptors: vec![],
            }],
        };
        let result = build_channel_model(&[nit], &[sdt], "ND02").unwrap();
        assert!(!result[0].services[0].is_free);
    }

    #[test]
    fn test_terrestrial_capture_with_multiple_streams_is_error() {
        let mut nit = terrestrial_nit(0x7FE8, 1);
        nit.transport_streams.push(NitTransportStream {
            transport_stream_id: 0x7FE9,
            descriptors: vec![],
        });
        let error = build_channel_model(&[nit], &[], "T13").unwrap_err();
        assert_eq!(
            error,
            AnalysisError::UnexpectedStreamCount {
                tuned: "T13".to_string(),
                count: 2,
            }
        );
    }

    #[test]
    fn test_missing_remote_control_key_is_error() {
        let nit = NitRecord {
            network_id: 0x7FE8,
            network_descriptors: vec![],
            transport_streams: vec![NitTransportStream {
                transport_stream_id: 0x7FE8,
                descriptors: vec![],
            }],
        };
        let sdt = sdt_with_service(0x7FE8, 1024, "テスト");
        let error = build_channel_model(&[nit], &[sdt], "T13").unwrap_err();
        assert!(matches!(
            error,
            AnalysisError::MissingRemoteControlKey {
                transport_stream_id: 0x7FE8,
                service_id: 1024,
            }
        ));
    }

    #[test]
    fn test_satellite_results_sorted_by_physical_channel() {
        // Transponder 13 (TSID 0x40D0) sorts after transponder 1 (0x0011)
        let result = build_channel_model(&[bs_nit(&[0x40D0, 0x0011])], &[], "BS01/TS0").unwrap();
        let labels: Vec<&str> = result.iter().map(|ts| ts.physical_channel.as_str()).collect();
        assert_eq!(labels, vec!["BS01/TS0", "BS13/TS0"]);
    }

    #[test]
    fn test_unknown_network_is_error() {
        let nit = NitRecord {
            network_id: 0x000A,
            network_descriptors: vec![],
            transport_streams: vec![NitTransportStream {
                transport_stream_id: 0x1234,
                descriptors: vec![],
            }],
        };
        let error = build_channel_model(&[nit], &[], "BS01/TS0").unwrap_err();
        assert_eq!(
            error,
            AnalysisError::UnknownBroadcastType {
                transport_stream_id: 0x1234,
                network_id: 0x000A,
                physical_channel: "Unknown".to_string(),
            }
        );
    }
}
