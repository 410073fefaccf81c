//! Link-layer packets
//!
//! # Format
//! ```text
//! +----------------+--------+--------+-----------------+---------+
//! | access address | header | length | payload         | CRC     |
//! | 4 bytes LE     | 1 byte | 1 byte | `length` bytes  | 3 bytes |
//! +----------------+--------+--------+-----------------+---------+
//! ```
//!
//! The access address selects the channel kind: [`ADVERTISING_ACCESS_ADDRESS`]
//! is the advertising channel, anything else is a data channel connection.
//! All payload offsets follow the declared length, even when the captured
//! buffer disagrees with it.

use tracing::trace;

use crate::advertising::{decode_advertising_pdu, AdvertisingPdu, AdvertisingPduType};
use crate::data::{decode_data_pdu, DataHeader, DataPdu};
use crate::error::{DecodeError, Finding};
use crate::reader::ByteReader;

/// Access address shared by all advertising channel packets
pub const ADVERTISING_ACCESS_ADDRESS: u32 = 0x8E89_BED6;

/// Access address, header, length and CRC bytes around the payload
pub const LINK_LAYER_OVERHEAD: usize = 9;

const HEADER_OFFSET: usize = 4;
const LENGTH_OFFSET: usize = 5;
const PAYLOAD_OFFSET: usize = 6;

const ADVERTISING_LENGTH_MASK: u8 = 0x3F;
const DATA_LENGTH_MASK: u8 = 0x1F;

/// Decoded link-layer header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkLayerHeader {
    pub access_address: u32,
    /// True when the access address is the advertising one
    pub is_advertising: bool,
    /// 4-bit PDU type (advertising only)
    pub pdu_type: Option<u8>,
    /// TxAdd (advertising only)
    pub tx_add_random: Option<bool>,
    /// RxAdd (advertising PDUs that carry a second address)
    pub rx_add_random: Option<bool>,
    /// Declared payload length, masked to 6 bits (advertising) or 5 bits (data)
    pub length: u8,
}

/// Channel-specific PDU
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Pdu {
    Advertising(AdvertisingPdu),
    Data(DataPdu),
}

/// Decoded link-layer packet
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinkLayerPacket {
    pub header: LinkLayerHeader,
    pub pdu: Pdu,
    /// CRC following the payload, `None` when the capture ends before it
    pub crc: Option<u32>,
}

/// Read the access address and the declared payload length
///
/// The length is masked according to the channel kind the access address
/// selects.
pub fn declared_length(packet: &ByteReader<'_>) -> Result<u8, DecodeError> {
    let access_address = packet.u32_le("access address", 0)?;
    let raw = packet.u8("length", LENGTH_OFFSET)?;
    Ok(if access_address == ADVERTISING_ACCESS_ADDRESS {
        raw & ADVERTISING_LENGTH_MASK
    } else {
        raw & DATA_LENGTH_MASK
    })
}

fn check_length(length: u8, actual: usize, findings: &mut Vec<Finding>) {
    let expected = usize::from(length) + LINK_LAYER_OVERHEAD;
    if actual < expected {
        findings.push(Finding::PacketTooShort {
            declared: length,
            actual,
        });
    } else if actual > expected {
        findings.push(Finding::PacketTooLong {
            declared: length,
            actual,
        });
    }
}

/// Decode one link-layer packet
pub fn decode_link_layer(packet: &ByteReader<'_>, findings: &mut Vec<Finding>) -> Result<LinkLayerPacket, DecodeError> {
    let access_address = packet.u32_le("access address", 0)?;
    let is_advertising = access_address == ADVERTISING_ACCESS_ADDRESS;
    let length = declared_length(packet)?;
    check_length(length, packet.len(), findings);

    let available = packet.len().saturating_sub(PAYLOAD_OFFSET);
    let body = packet.sub("payload", PAYLOAD_OFFSET, usize::from(length).min(available))?;

    let (header, pdu) = if is_advertising {
        let pdu_type = packet.bits("PDU type", HEADER_OFFSET, 4, 4)? as u8;
        let tx_add_random = packet.bit("TxAdd", HEADER_OFFSET, 1)?;
        let rx_add_random = match AdvertisingPduType::try_from(pdu_type) {
            Ok(kind) if kind.has_rx_address() => Some(packet.bit("RxAdd", HEADER_OFFSET, 0)?),
            _ => None,
        };
        trace!("Advertising channel packet, type 0x{:X}, length {}", pdu_type, length);

        let header = LinkLayerHeader {
            access_address,
            is_advertising,
            pdu_type: Some(pdu_type),
            tx_add_random: Some(tx_add_random),
            rx_add_random,
            length,
        };
        let pdu = Pdu::Advertising(decode_advertising_pdu(pdu_type, &body, findings)?);
        (header, pdu)
    } else {
        let data_header = DataHeader::decode(packet, HEADER_OFFSET)?;
        trace!(
            "Data channel packet, AA 0x{:08X}, LLID {:?}, length {}",
            access_address,
            data_header.llid,
            length
        );

        let header = LinkLayerHeader {
            access_address,
            is_advertising,
            pdu_type: None,
            tx_add_random: None,
            rx_add_random: None,
            length,
        };
        let pdu = Pdu::Data(decode_data_pdu(data_header, length, &body, findings)?);
        (header, pdu)
    };

    let crc = packet.u24_be("CRC", PAYLOAD_OFFSET + usize::from(length)).ok();

    Ok(LinkLayerPacket { header, pdu, crc })
}
