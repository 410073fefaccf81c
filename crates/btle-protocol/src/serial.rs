//! Sniffer serial packets
//!
//! Packets read from the sniffer's serial port carry the current UART
//! header without a board id. [`to_capture_layout`] turns them into the
//! frame layout decoded by [`crate::uart`]; [`decode_response`] reads the
//! payload of the firmware's replies to host commands.

use crate::error::DecodeError;
use crate::reader::ByteReader;

/// Offset of the payload length byte in a serial packet
const PAYLOAD_LEN_POS: usize = 1;
/// Offset of the packet id byte in a serial packet
const ID_POS: usize = 5;
/// Offset of the BLE header length byte in a serial packet
const BLE_HEADER_LEN_POS: usize = 6;
/// Offset of the payload in a serial packet
const PAYLOAD_POS: usize = 6;
/// Offset of the BLE packet in a serial packet
const BLE_PACKET_POS: usize = 16;
/// Hardware padding byte inside an event packet's BLE packet
const PADDING_POS: usize = BLE_PACKET_POS + 6;

/// BLE header length reported by firmware that inserts the padding byte
const PADDED_BLE_HEADER_LEN: u8 = 10;

/// UART packet ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PacketId {
    ReqFollow,
    RespFollow,
    EventDevice,
    ReqSinglePacket,
    RespSinglePacket,
    EventConnect,
    EventPacket,
    ReqScanCont,
    RespScanCont,
    EventDisconnect,
    EventError,
    EventEmptyDataPacket,
    SetTemporaryKey,
    PingReq,
    PingResp,
    TestCommandId,
    TestResultId,
    UartTestStart,
    UartDummyPacket,
    SwitchBaudRateReq,
    SwitchBaudRateResp,
    UartOutStart,
    UartOutStop,
    SetAdvChannelHopSeq,
    GoIdle,
    Unknown(u8),
}

impl From<u8> for PacketId {
    fn from(value: u8) -> Self {
        match value {
            0x00 => PacketId::ReqFollow,
            0x01 => PacketId::RespFollow,
            0x02 => PacketId::EventDevice,
            0x03 => PacketId::ReqSinglePacket,
            0x04 => PacketId::RespSinglePacket,
            0x05 => PacketId::EventConnect,
            0x06 => PacketId::EventPacket,
            0x07 => PacketId::ReqScanCont,
            0x08 => PacketId::RespScanCont,
            0x09 => PacketId::EventDisconnect,
            0x0A => PacketId::EventError,
            0x0B => PacketId::EventEmptyDataPacket,
            0x0C => PacketId::SetTemporaryKey,
            0x0D => PacketId::PingReq,
            0x0E => PacketId::PingResp,
            0x0F => PacketId::TestCommandId,
            0x10 => PacketId::TestResultId,
            0x11 => PacketId::UartTestStart,
            0x12 => PacketId::UartDummyPacket,
            0x13 => PacketId::SwitchBaudRateReq,
            0x14 => PacketId::SwitchBaudRateResp,
            0x15 => PacketId::UartOutStart,
            0x16 => PacketId::UartOutStop,
            0x17 => PacketId::SetAdvChannelHopSeq,
            0xFE => PacketId::GoIdle,
            other => PacketId::Unknown(other),
        }
    }
}

impl PacketId {
    /// Raw id byte
    pub fn code(&self) -> u8 {
        match self {
            PacketId::ReqFollow => 0x00,
            PacketId::RespFollow => 0x01,
            PacketId::EventDevice => 0x02,
            PacketId::ReqSinglePacket => 0x03,
            PacketId::RespSinglePacket => 0x04,
            PacketId::EventConnect => 0x05,
            PacketId::EventPacket => 0x06,
            PacketId::ReqScanCont => 0x07,
            PacketId::RespScanCont => 0x08,
            PacketId::EventDisconnect => 0x09,
            PacketId::EventError => 0x0A,
            PacketId::EventEmptyDataPacket => 0x0B,
            PacketId::SetTemporaryKey => 0x0C,
            PacketId::PingReq => 0x0D,
            PacketId::PingResp => 0x0E,
            PacketId::TestCommandId => 0x0F,
            PacketId::TestResultId => 0x10,
            PacketId::UartTestStart => 0x11,
            PacketId::UartDummyPacket => 0x12,
            PacketId::SwitchBaudRateReq => 0x13,
            PacketId::SwitchBaudRateResp => 0x14,
            PacketId::UartOutStart => 0x15,
            PacketId::UartOutStop => 0x16,
            PacketId::SetAdvChannelHopSeq => 0x17,
            PacketId::GoIdle => 0xFE,
            PacketId::Unknown(code) => *code,
        }
    }

    /// Returns true for packets that carry a sniffed BLE packet
    pub fn carries_ble_packet(&self) -> bool {
        matches!(self, PacketId::EventPacket)
    }
}

/// Payload of a firmware reply or baud rate exchange
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SerialResponse {
    /// PING_RESP
    Ping { firmware_version: u16 },
    /// SWITCH_BAUD_RATE_REQ or SWITCH_BAUD_RATE_RESP
    BaudRate { request: bool, baud_rate: u32 },
    /// TEST_RESULT
    TestResult {
        test_id: u8,
        length: u8,
        payload: Vec<u8>,
    },
}

/// Decode the payload of a serial packet that carries a firmware reply
///
/// Returns `Ok(None)` for ids without a reply payload, including
/// EVENT_PACKET.
pub fn decode_response(serial_packet: &[u8]) -> Result<Option<SerialResponse>, DecodeError> {
    let reader = ByteReader::new(serial_packet);
    let id = PacketId::from(reader.u8("packet id", ID_POS)?);

    let response = match id {
        PacketId::PingResp => SerialResponse::Ping {
            firmware_version: reader.u16_le("firmware version", PAYLOAD_POS)?,
        },
        PacketId::SwitchBaudRateReq | PacketId::SwitchBaudRateResp => SerialResponse::BaudRate {
            request: id == PacketId::SwitchBaudRateReq,
            baud_rate: reader.u32_le("baud rate", PAYLOAD_POS)?,
        },
        PacketId::TestResultId => SerialResponse::TestResult {
            test_id: reader.u8("test id", PAYLOAD_POS)?,
            length: reader.u8("test length", PAYLOAD_POS + 1)?,
            payload: reader.rest(PAYLOAD_POS + 2).as_slice().to_vec(),
        },
        _ => return Ok(None),
    };
    Ok(Some(response))
}

/// Convert one serial packet into the capture frame layout
///
/// Event packets reported with a 10-byte BLE header contain a padding byte
/// that is not sent on air; it is removed and the payload length adjusted.
/// The board id is then prepended.
pub fn to_capture_layout(board_id: u8, serial_packet: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(serial_packet.len() + 1);
    frame.push(board_id);
    frame.extend_from_slice(serial_packet);

    let is_padded_event = serial_packet.get(ID_POS) == Some(&PacketId::EventPacket.code())
        && serial_packet.get(BLE_HEADER_LEN_POS) == Some(&PADDED_BLE_HEADER_LEN)
        && serial_packet.len() > PADDING_POS;

    if is_padded_event {
        frame.remove(PADDING_POS + 1);
        let payload_len = &mut frame[PAYLOAD_LEN_POS + 1];
        *payload_len = payload_len.saturating_sub(1);
    }

    frame
}

#[cfg(test)]
mod tests {
    use super::{decode_response, to_capture_layout, PacketId, SerialResponse};
    use crate::error::DecodeError;

    fn serial_event_packet() -> Vec<u8> {
        let mut packet = vec![
            0x06, 0x1D, 0x01, 0x00, 0x00, 0x06, // UART header
            0x0A, 0x01, 0x25, 0x3C, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // BLE header
        ];
        packet.extend_from_slice(&[0xD6, 0xBE, 0x89, 0x8E, 0x42, 0x09]);
        packet.push(0x00); // padding
        packet.extend_from_slice(&[0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA, 0x02, 0x01, 0x06]);
        packet.extend_from_slice(&[0x00, 0x00, 0x00]);
        packet
    }

    #[test]
    fn test_padding_removed() {
        let serial = serial_event_packet();
        let frame = to_capture_layout(7, &serial);

        assert_eq!(frame.len(), serial.len());
        assert_eq!(frame[0], 7);
        assert_eq!(frame[2], 0x1C);
        assert_eq!(&frame[17..23], &[0xD6, 0xBE, 0x89, 0x8E, 0x42, 0x09]);
        assert_eq!(frame[23], 0xFF);
    }

    #[test]
    fn test_other_packets_only_get_board_id() {
        let ping = [0x06, 0x02, 0x01, 0x05, 0x00, 0x0E, 0x34, 0x12];
        let frame = to_capture_layout(3, &ping);
        assert_eq!(frame[0], 3);
        assert_eq!(&frame[1..], &ping);
    }

    #[test]
    fn test_packet_id_mapping() {
        assert_eq!(PacketId::from(0x06), PacketId::EventPacket);
        assert_eq!(PacketId::from(0xFE), PacketId::GoIdle);
        assert_eq!(PacketId::from(0x42), PacketId::Unknown(0x42));
        assert_eq!(PacketId::from(0x17).code(), 0x17);
        assert!(PacketId::EventPacket.carries_ble_packet());
    }

    #[test]
    fn test_ping_response() {
        let ping = [0x06, 0x02, 0x01, 0x05, 0x00, 0x0E, 0x34, 0x12];
        assert_eq!(
            decode_response(&ping).unwrap(),
            Some(SerialResponse::Ping {
                firmware_version: 0x1234
            })
        );
    }

    #[test]
    fn test_baud_rate_response() {
        let resp = [0x06, 0x04, 0x01, 0x00, 0x00, 0x14, 0x40, 0x42, 0x0F, 0x00];
        assert_eq!(
            decode_response(&resp).unwrap(),
            Some(SerialResponse::BaudRate {
                request: false,
                baud_rate: 1_000_000
            })
        );
    }

    #[test]
    fn test_test_result() {
        let result = [0x06, 0x05, 0x01, 0x00, 0x00, 0x10, 0x02, 0x03, 0xAA, 0xBB, 0xCC];
        assert_eq!(
            decode_response(&result).unwrap(),
            Some(SerialResponse::TestResult {
                test_id: 2,
                length: 3,
                payload: vec![0xAA, 0xBB, 0xCC]
            })
        );
    }

    #[test]
    fn test_no_response_payload() {
        assert_eq!(decode_response(&serial_event_packet()).unwrap(), None);
        assert!(matches!(
            decode_response(&[0x06, 0x00, 0x01, 0x00, 0x00, 0x0E, 0x01]),
            Err(DecodeError::Truncated {
                field: "firmware version",
                ..
            })
        ));
    }
}
