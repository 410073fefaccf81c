//! Integration tests for the BLE sniffer decoder
//!
//! These tests drive whole frames through the public API:
//! - Current and legacy UART framing with start-to-start timing
//! - Advertising PDUs with nested AD structures
//! - Data channel control PDUs
//! - SLIP stream to capture layout to decoded frame
//! - Length validation on malformed input
//! - Packet counter gaps across a session

use btle_protocol::ad::{AdData, IntervalMax, ServiceUuid, UuidListKind};
use btle_protocol::advertising::SleepClockAccuracy;
use btle_protocol::control::LlControlPdu;
use btle_protocol::data::DataPayload;
use btle_protocol::slip::{SLIP_END, SLIP_ESC, SLIP_ESC_END, SLIP_START};
use btle_protocol::{
    decode_frame, to_capture_layout, AdvertisingPdu, CaptureSession, DecodeError, Finding, FrameFormat, Llid, Pdu,
    SlipCodec, TimingState,
};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    /// Wrap a BLE packet in a current-layout frame
    pub fn current_frame(delta_us: u32, ble: &[u8]) -> Vec<u8> {
        let mut frame = vec![
            0x00,
            0x06,
            (10 + ble.len()) as u8,
            0x01,
            0x01,
            0x00,
            0x06,
            0x0A,
            0x01,
            0x25,
            0x3C,
            0x00,
            0x00,
        ];
        frame.extend_from_slice(&delta_us.to_le_bytes());
        frame.extend_from_slice(ble);
        frame
    }

    /// Wrap a BLE packet in a legacy frame with a consistent length byte
    pub fn legacy_frame(ble: &[u8]) -> Vec<u8> {
        let mut frame = vec![
            0xBE, 0xEF, 0x06, 0x09, 0x00, 0x00, 0x00, 0x00, 0x03, 0x27, 0x45, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00,
        ];
        frame.extend_from_slice(ble);
        frame[7] = (frame.len() - 8) as u8;
        frame
    }

    /// Manufacturer data record filling `len` bytes in total
    pub fn manufacturer_record(len: usize) -> Vec<u8> {
        let mut record = vec![(len - 1) as u8, 0xFF];
        record.resize(len, 0x5A);
        record
    }

    /// Advertising channel packet with the given header byte and payload
    pub fn advertising(header: u8, payload: &[u8]) -> Vec<u8> {
        let mut ble = vec![0xD6, 0xBE, 0x89, 0x8E, header, payload.len() as u8];
        ble.extend_from_slice(payload);
        ble.extend_from_slice(&[0x00, 0x00, 0x00]);
        ble
    }

    /// ADV_NONCONN_IND from AA:BB:CC:DD:EE:FF carrying `ad`
    pub fn adv_nonconn(ad: &[u8]) -> Vec<u8> {
        let mut payload = vec![0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA];
        payload.extend_from_slice(ad);
        advertising(0x42, &payload)
    }

    /// Data channel packet on connection 0xAF9A3471
    pub fn data(header: u8, payload: &[u8]) -> Vec<u8> {
        let mut ble = vec![0x71, 0x34, 0x9A, 0xAF, header, payload.len() as u8];
        ble.extend_from_slice(payload);
        ble.extend_from_slice(&[0x00, 0x00, 0x00]);
        ble
    }
}

// ============================================================================
// Advertising Channel Tests
// ============================================================================

mod advertising_tests {
    use super::*;

    #[test]
    fn test_adv_nonconn_ind_flags() {
        let frame = helpers::current_frame(500, &helpers::adv_nonconn(&[0x02, 0x01, 0x06]));
        let decoded = CaptureSession::new().decode(&frame).unwrap();

        assert_eq!(decoded.format, FrameFormat::Current);
        assert!(decoded.findings.is_empty());

        let Pdu::Advertising(pdu) = &decoded.packet.pdu else {
            panic!("expected advertising PDU");
        };
        assert!(matches!(pdu, AdvertisingPdu::AdvNonconnInd { .. }));
        assert_eq!(pdu.adv_address().unwrap().to_string(), "AA:BB:CC:DD:EE:FF");

        let structures = pdu.ad_structures();
        assert_eq!(structures.len(), 1);
        assert_eq!(structures[0].type_name(), "Flags");
        let AdData::Flags(flags) = structures[0].data else {
            panic!("expected flags");
        };
        assert!(flags.le_general_discoverable);
        assert!(flags.br_edr_not_supported);
        assert!(!flags.le_limited_discoverable);
        assert!(!flags.simultaneous_le_br_edr_controller);
        assert!(!flags.simultaneous_le_br_edr_host);
    }

    #[test]
    fn test_uuid128_byte_order() {
        let mut ad = vec![0x11, 0x07];
        ad.extend(0x01..=0x10u8);
        let frame = helpers::current_frame(0, &helpers::adv_nonconn(&ad));
        let decoded = CaptureSession::new().decode(&frame).unwrap();

        let Pdu::Advertising(pdu) = &decoded.packet.pdu else {
            panic!("expected advertising PDU");
        };
        let AdData::ServiceUuids { kind, uuids } = &pdu.ad_structures()[0].data else {
            panic!("expected UUID list");
        };
        assert_eq!(*kind, UuidListKind::Complete);
        let ServiceUuid::U128(uuid) = uuids[0] else {
            panic!("expected 128-bit UUID");
        };
        let expected: Vec<u8> = (0x01..=0x10u8).rev().collect();
        assert_eq!(uuid.bytes().to_vec(), expected);
        assert_eq!(uuid.to_string(), "100f0e0d-0c0b-0a09-0807-060504030201");
    }

    #[test]
    fn test_unbounded_connection_interval() {
        let ad = [0x05, 0x12, 0x06, 0x00, 0xFF, 0xFF];
        let frame = helpers::current_frame(0, &helpers::adv_nonconn(&ad));
        let decoded = CaptureSession::new().decode(&frame).unwrap();

        let Pdu::Advertising(pdu) = &decoded.packet.pdu else {
            panic!("expected advertising PDU");
        };
        let AdData::ConnIntervalRange { min, max } = &pdu.ad_structures()[0].data else {
            panic!("expected connection interval range");
        };
        assert_eq!(min.as_micros(), 7500);
        assert_eq!(*max, IntervalMax::Unbounded);
    }

    #[test]
    fn test_empty_ad_payload() {
        let frame = helpers::current_frame(0, &helpers::adv_nonconn(&[]));
        let decoded = CaptureSession::new().decode(&frame).unwrap();
        let Pdu::Advertising(pdu) = &decoded.packet.pdu else {
            panic!("expected advertising PDU");
        };
        assert!(pdu.ad_structures().is_empty());
    }

    #[test]
    fn test_overrunning_ad_record_fails() {
        // Name record claims 9 bytes, only 3 follow
        let frame = helpers::current_frame(0, &helpers::adv_nonconn(&[0x09, 0x09, b'a', b'b', b'c']));
        let result = CaptureSession::new().decode(&frame);
        assert!(matches!(
            result,
            Err(DecodeError::Truncated {
                field: "AD structure",
                ..
            })
        ));
    }

    #[test]
    fn test_connect_req() {
        let mut payload = vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66]; // InitA
        payload.extend_from_slice(&[0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]); // AdvA
        payload.extend_from_slice(&[0x71, 0x34, 0x9A, 0xAF]); // AA
        payload.extend_from_slice(&[0x55, 0x55, 0x55]); // CRCInit
        payload.push(0x02); // WinSize
        payload.extend_from_slice(&[0x00, 0x00]); // WinOffset
        payload.extend_from_slice(&[0x18, 0x00]); // Interval
        payload.extend_from_slice(&[0x00, 0x00]); // Latency
        payload.extend_from_slice(&[0x48, 0x00]); // Timeout
        payload.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]); // ChM
        payload.push(0xA7); // SCA 5, Hop 7

        let frame = helpers::current_frame(0, &helpers::advertising(0x05, &payload));
        let decoded = CaptureSession::new().decode(&frame).unwrap();
        assert!(decoded.findings.is_empty());

        let Pdu::Advertising(AdvertisingPdu::ConnectReq {
            init_address,
            adv_address,
            params,
        }) = &decoded.packet.pdu
        else {
            panic!("expected CONNECT_REQ");
        };
        assert_eq!(init_address.to_string(), "66:55:44:33:22:11");
        assert_eq!(adv_address.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(params.access_address, 0xAF9A_3471);
        assert_eq!(params.crc_init, 0x55_5555);
        assert_eq!(params.interval.as_micros(), 30_000);
        assert_eq!(params.timeout.as_millis(), 720);
        assert_eq!(params.channel_map.enabled_channels().len(), 37);
        assert_eq!(params.hop_increment, 7);
        assert_eq!(params.sleep_clock_accuracy, SleepClockAccuracy::Ppm31To50);
    }
}

// ============================================================================
// Data Channel Tests
// ============================================================================

mod data_channel_tests {
    use super::*;

    #[test]
    fn test_version_ind() {
        let ble = helpers::data(0x03, &[0x0C, 0x09, 0x59, 0x00, 0x01, 0x00]);
        let frame = helpers::current_frame(0, &ble);
        let decoded = CaptureSession::new().decode(&frame).unwrap();

        let Pdu::Data(data) = &decoded.packet.pdu else {
            panic!("expected data PDU");
        };
        assert_eq!(data.llid, Llid::Control);
        assert_eq!(
            data.payload,
            DataPayload::Control(LlControlPdu::VersionInd {
                version: 0x09,
                company_id: 0x0059,
                subversion: 0x0001,
            })
        );
    }

    #[test]
    fn test_upper_layer_payload_is_opaque() {
        let l2cap = [0x05, 0x00, 0x04, 0x00, 0x0A, 0x03, 0x00];
        let frame = helpers::current_frame(0, &helpers::data(0x1E, &l2cap));
        let decoded = CaptureSession::new().decode(&frame).unwrap();

        let Pdu::Data(data) = &decoded.packet.pdu else {
            panic!("expected data PDU");
        };
        assert_eq!(data.llid, Llid::Start);
        assert!(data.sn);
        assert!(data.md);
        assert_eq!(data.payload, DataPayload::UpperLayer(l2cap.to_vec()));
    }

    #[test]
    fn test_unsupported_opcode_reported() {
        let frame = helpers::current_frame(0, &helpers::data(0x03, &[0x14, 0x00]));
        let decoded = CaptureSession::new().decode(&frame).unwrap();
        assert_eq!(decoded.findings, vec![Finding::UnsupportedOpcode(0x14)]);
    }
}

// ============================================================================
// Framing and Timing Tests
// ============================================================================

mod framing_tests {
    use super::*;

    #[test]
    fn test_start_to_start_after_twenty_byte_packet() {
        let mut timing = TimingState::new();

        // 20-byte payload: address plus a 14-byte name record
        let mut ad = vec![0x0D, 0x09];
        ad.extend_from_slice(b"sensor-node");
        ad.push(b'1');
        let first = helpers::current_frame(0, &helpers::adv_nonconn(&ad));
        decode_frame(&first, &mut timing).unwrap();
        assert_eq!(timing.previous_ble_length, 20);

        let second = helpers::current_frame(500, &helpers::adv_nonconn(&[]));
        let decoded = decode_frame(&second, &mut timing).unwrap();
        assert_eq!(decoded.metadata.delta_time_start_to_start_us, 740);
    }

    #[test]
    fn test_legacy_frame() {
        let frame = helpers::legacy_frame(&helpers::adv_nonconn(&[0x02, 0x01, 0x06]));

        let decoded = CaptureSession::new().decode(&frame).unwrap();
        assert_eq!(decoded.format, FrameFormat::Legacy);
        assert_eq!(decoded.metadata.channel, 39);
        assert_eq!(decoded.metadata.rssi, -69);
        assert!(decoded.findings.is_empty());
    }

    #[test]
    fn test_bad_crc_and_mic_from_flags() {
        let mut frame = helpers::current_frame(0, &helpers::adv_nonconn(&[0x02, 0x01, 0x06]));
        // Encrypted, CRC and MIC both failed
        frame[8] = 0x04;

        let decoded = CaptureSession::new().decode(&frame).unwrap();
        assert_eq!(decoded.findings, vec![Finding::BadCrc, Finding::BadMic]);
        assert!(decoded.metadata.flags.encrypted);
        assert_eq!(decoded.metadata.flags.mic_ok, Some(false));
        assert!(matches!(decoded.packet.pdu, Pdu::Advertising(_)));
    }

    #[test]
    fn test_current_length_too_long() {
        let ad = helpers::manufacturer_record(40);
        let frame = helpers::current_frame(0, &helpers::adv_nonconn(&ad));
        assert_eq!(frame.len() - 1, 71);

        let decoded = CaptureSession::new().decode(&frame).unwrap();
        assert_eq!(
            decoded.findings,
            vec![Finding::LengthTooLong {
                declared: 71,
                maximum: 66
            }]
        );
        assert_eq!(decoded.packet.header.length, 46);
    }

    #[test]
    fn test_legacy_length_bounds() {
        // 17 + 50 bytes is the largest legacy frame
        let largest = helpers::legacy_frame(&helpers::adv_nonconn(&helpers::manufacturer_record(35)));
        assert_eq!(largest.len(), 67);
        let decoded = CaptureSession::new().decode(&largest).unwrap();
        assert!(decoded.findings.is_empty());

        let too_long = helpers::legacy_frame(&helpers::adv_nonconn(&helpers::manufacturer_record(36)));
        let decoded = CaptureSession::new().decode(&too_long).unwrap();
        assert_eq!(
            decoded.findings,
            vec![Finding::LengthTooLong {
                declared: 68,
                maximum: 67
            }]
        );

        // Empty data PDU is exactly the minimum
        let smallest = helpers::legacy_frame(&helpers::data(0x01, &[]));
        assert_eq!(smallest.len(), 26);
        assert!(CaptureSession::new().decode(&smallest).unwrap().findings.is_empty());

        // Same packet with one CRC byte missing
        let mut short_ble = helpers::data(0x01, &[]);
        short_ble.pop();
        let too_short = helpers::legacy_frame(&short_ble);
        let decoded = CaptureSession::new().decode(&too_short).unwrap();
        assert_eq!(
            decoded.findings,
            vec![
                Finding::LengthTooShort {
                    declared: 25,
                    minimum: 26
                },
                Finding::PacketTooShort {
                    declared: 0,
                    actual: 8
                },
            ]
        );
        assert_eq!(decoded.packet.crc, None);
    }

    #[test]
    fn test_length_mismatch_still_decodes() {
        let mut frame = helpers::current_frame(0, &helpers::adv_nonconn(&[0x02, 0x01, 0x06]));
        frame[2] = 0x30;

        let decoded = CaptureSession::new().decode(&frame).unwrap();
        assert!(matches!(decoded.findings[0], Finding::LengthMismatch { .. }));
        assert!(decoded.has_errors());
        assert!(matches!(decoded.packet.pdu, Pdu::Advertising(_)));
    }

    #[test]
    fn test_slip_stream_to_decoded_frame() {
        // Serial packet with the 10-byte BLE header padding byte after the length
        let mut serial = vec![0x06, 0x1D, 0x01, 0x05, 0x00, 0x06];
        serial.extend_from_slice(&[0x0A, 0x01, 0x25, 0x3C, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00]);
        serial.extend_from_slice(&[0xD6, 0xBE, 0x89, 0x8E, 0x42, 0x09, 0x00]);
        serial.extend_from_slice(&[0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA, 0x02, 0x01, 0x06]);
        serial.extend_from_slice(&[0x00, 0x00, SLIP_END]);

        let mut stream = vec![0x00, SLIP_START];
        for byte in serial {
            if byte == SLIP_END {
                stream.extend_from_slice(&[SLIP_ESC, SLIP_ESC_END]);
            } else {
                stream.push(byte);
            }
        }
        stream.push(SLIP_END);

        let mut codec = SlipCodec::new();
        codec.push_bytes(&stream);
        let packet = codec.next_frame().unwrap();
        let frame = to_capture_layout(2, &packet);

        let decoded = CaptureSession::new().decode(&frame).unwrap();
        assert_eq!(decoded.metadata.board_id, 2);
        assert_eq!(decoded.metadata.packet_counter, 5);
        assert_eq!(decoded.metadata.delta_time_us, 0x20);
        assert_eq!(decoded.packet.crc, Some(0x00_00BC));
        assert!(decoded.findings.is_empty());
    }

    #[test]
    fn test_counter_gap_across_frames() {
        let mut session = CaptureSession::new();
        let mut first = helpers::current_frame(0, &helpers::adv_nonconn(&[]));
        first[4] = 0x05;
        let mut second = first.clone();
        second[4] = 0x09;

        assert!(session.decode(&first).unwrap().findings.is_empty());
        let decoded = session.decode(&second).unwrap();
        assert_eq!(
            decoded.findings,
            vec![Finding::PacketsLost {
                expected: 6,
                received: 9
            }]
        );
    }

    #[test]
    fn test_empty_frame() {
        assert_eq!(CaptureSession::new().decode(&[]).unwrap_err(), DecodeError::Empty);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use btle_protocol::ad::{decode_ad_sequence, tx_power_from_raw};
    use btle_protocol::ByteReader;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn tx_power_offset_round_trips(dbm in -127i16..=128) {
            prop_assert_eq!(tx_power_from_raw((dbm + 127) as u8), dbm);
        }

        #[test]
        fn arbitrary_frames_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..96)) {
            let mut timing = TimingState::new();
            let _ = decode_frame(&bytes, &mut timing);
        }

        #[test]
        fn length_mismatch_always_reported(extra in prop::collection::vec(any::<u8>(), 1..16)) {
            let mut frame = helpers::current_frame(0, &helpers::adv_nonconn(&[0x02, 0x01, 0x06]));
            frame.extend_from_slice(&extra);

            let mut timing = TimingState::new();
            let decoded = decode_frame(&frame, &mut timing).unwrap();
            let mismatch = decoded
                .findings
                .iter()
                .any(|f| matches!(f, Finding::LengthMismatch { .. }));
            prop_assert!(mismatch);
        }

        #[test]
        fn ad_sequences_stay_in_bounds(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let mut findings = Vec::new();
            if let Ok(structures) = decode_ad_sequence(&ByteReader::new(&bytes), &mut findings) {
                let consumed: usize = structures.iter().map(|s| usize::from(s.length) + 1).sum();
                prop_assert_eq!(consumed, bytes.len());
            }
        }

        #[test]
        fn slip_codec_never_panics(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..8)) {
            let mut codec = SlipCodec::new();
            for chunk in &chunks {
                codec.push_bytes(chunk);
                while codec.next_frame().is_some() {}
            }
        }
    }
}
