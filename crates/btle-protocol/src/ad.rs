//! Advertising Data (AD) structures
//!
//! The payload of ADV_IND, ADV_NONCONN_IND, SCAN_RSP and ADV_SCAN_IND is a
//! sequence of length-type-value records:
//!
//! ```text
//! +--------+------+---------------------+
//! | length | type | data (length-1)     |
//! +--------+------+---------------------+
//! ```
//!
//! Offsets used by the per-type decoders are relative to the start of the
//! record, so type-specific data begins at offset 2. A zero length byte
//! produces an [`AdData::Empty`] record and the sequence resumes at the next
//! byte.

use std::time::Duration;

use tracing::trace;

use crate::address::{DeviceAddress, Uuid128};
use crate::dispatch::{DecodeFn, DispatchTable};
use crate::error::{DecodeError, Finding};
use crate::reader::ByteReader;

/// Unit of the connection interval fields, in microseconds
const CONN_INTERVAL_UNIT_US: u64 = 1250;

/// Unit of the advertising interval field, in microseconds
const ADV_INTERVAL_UNIT_US: u64 = 625;

/// Raw connection interval maximum meaning "no specific maximum"
const CONN_INTERVAL_UNBOUNDED: u16 = 0xFFFF;

/// Offset added to the raw TX power byte on the wire
const TX_POWER_OFFSET: i16 = 127;

/// AD type codes with dedicated decoders
pub mod ad_type {
    pub const FLAGS: u8 = 0x01;
    pub const INCOMPLETE_UUID16: u8 = 0x02;
    pub const COMPLETE_UUID16: u8 = 0x03;
    pub const INCOMPLETE_UUID32: u8 = 0x04;
    pub const COMPLETE_UUID32: u8 = 0x05;
    pub const INCOMPLETE_UUID128: u8 = 0x06;
    pub const COMPLETE_UUID128: u8 = 0x07;
    pub const SHORT_LOCAL_NAME: u8 = 0x08;
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    pub const TX_POWER_LEVEL: u8 = 0x0A;
    pub const CONN_INTERVAL_RANGE: u8 = 0x12;
    pub const SOLICITATION_UUID16: u8 = 0x14;
    pub const SOLICITATION_UUID128: u8 = 0x15;
    pub const SERVICE_DATA_UUID16: u8 = 0x16;
    pub const PUBLIC_TARGET_ADDRESS: u8 = 0x17;
    pub const RANDOM_TARGET_ADDRESS: u8 = 0x18;
    pub const APPEARANCE: u8 = 0x19;
    pub const ADVERTISING_INTERVAL: u8 = 0x1A;
    pub const SERVICE_DATA_UUID32: u8 = 0x20;
    pub const SERVICE_DATA_UUID128: u8 = 0x21;
    pub const MANUFACTURER_DATA: u8 = 0xFF;
}

/// Returns the assigned name of an AD type code
pub fn ad_type_name(code: u8) -> &'static str {
    match code {
        0x01 => "Flags",
        0x02 => "Incomplete List of 16-bit Service Class UUIDs",
        0x03 => "Complete List of 16-bit Service Class UUIDs",
        0x04 => "Incomplete List of 32-bit Service Class UUIDs",
        0x05 => "Complete List of 32-bit Service Class UUIDs",
        0x06 => "Incomplete List of 128-bit Service Class UUIDs",
        0x07 => "Complete List of 128-bit Service Class UUIDs",
        0x08 => "Shortened Local Name",
        0x09 => "Complete Local Name",
        0x0A => "Tx Power Level",
        0x0D => "Class of Device",
        0x0E => "Simple Pairing Hash C",
        0x0F => "Simple Pairing Randomizer R",
        0x10 => "Device ID / Security Manager TK Value",
        0x11 => "Security Manager Out of Band Flags",
        0x12 => "Slave Connection Interval Range",
        0x14 => "List of 16-bit Service Solicitation UUIDs",
        0x15 => "List of 128-bit Service Solicitation UUIDs",
        0x16 => "Service Data for 16 bit UUID",
        0x17 => "Public Target Address",
        0x18 => "Random Target Address",
        0x19 => "Appearance",
        0x1A => "Advertising Interval",
        0x20 => "Service Data for 32 bit UUID",
        0x21 => "Service Data for 128 bit UUID",
        0xFF => "Manufacturer Specific Data",
        _ => "Unknown type",
    }
}

/// One decoded AD record
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdStructure {
    /// Length byte (type plus data)
    pub length: u8,
    /// Type code, 0 for an empty record
    pub ad_type: u8,
    /// Decoded payload
    pub data: AdData,
}

impl AdStructure {
    /// Assigned name of this record's type
    pub fn type_name(&self) -> &'static str {
        match self.data {
            AdData::Empty => "Empty",
            _ => ad_type_name(self.ad_type),
        }
    }
}

/// Type-specific AD payload
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdData {
    /// Zero-length record
    Empty,
    /// Discoverability and BR/EDR capability flags
    Flags(AdFlags),
    /// 16/32/128-bit service UUID list
    ServiceUuids {
        kind: UuidListKind,
        uuids: Vec<ServiceUuid>,
    },
    /// Shortened or complete local name
    LocalName { complete: bool, name: String },
    /// Transmit power in dBm
    TxPowerLevel(i16),
    /// Preferred peripheral connection interval range
    ConnIntervalRange { min: Duration, max: IntervalMax },
    /// Service UUID followed by opaque service data
    ServiceData { uuid: ServiceUuid, data: Vec<u8> },
    /// Intended target address
    TargetAddress {
        random: bool,
        address: DeviceAddress,
    },
    /// GAP appearance value
    Appearance(u16),
    /// Advertising interval
    AdvertisingInterval(Duration),
    /// Opaque manufacturer data, company id first
    ManufacturerData(Vec<u8>),
    /// Record type without a decoder
    Unknown { ad_type: u8, bytes: Vec<u8> },
}

impl AdData {
    /// Company identifier of a manufacturer data record
    ///
    /// Returns `None` for other records or when fewer than two bytes are
    /// present.
    pub fn company_id(&self) -> Option<u16> {
        match self {
            AdData::ManufacturerData(bytes) => match bytes.as_slice() {
                [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Flags AD type bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdFlags {
    pub le_limited_discoverable: bool,
    pub le_general_discoverable: bool,
    pub br_edr_not_supported: bool,
    pub simultaneous_le_br_edr_controller: bool,
    pub simultaneous_le_br_edr_host: bool,
}

/// Which kind of UUID list a record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UuidListKind {
    Incomplete,
    Complete,
    Solicitation,
}

/// A service UUID of any width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ServiceUuid {
    U16(u16),
    U32(u32),
    U128(Uuid128),
}

#[derive(Debug, Clone, Copy)]
enum UuidWidth {
    Bits16,
    Bits32,
    Bits128,
}

impl UuidWidth {
    fn bytes(self) -> usize {
        match self {
            UuidWidth::Bits16 => 2,
            UuidWidth::Bits32 => 4,
            UuidWidth::Bits128 => 16,
        }
    }

    fn read(self, reader: &ByteReader<'_>, offset: usize) -> Result<ServiceUuid, DecodeError> {
        match self {
            UuidWidth::Bits16 => reader.u16_le("16-bit UUID", offset).map(ServiceUuid::U16),
            UuidWidth::Bits32 => reader.u32_le("32-bit UUID", offset).map(ServiceUuid::U32),
            UuidWidth::Bits128 => Uuid128::read(reader, "128-bit UUID", offset).map(ServiceUuid::U128),
        }
    }
}

/// Upper bound of a connection interval range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntervalMax {
    Bounded(Duration),
    /// Raw value 0xFFFF: no specific maximum
    Unbounded,
}

/// Decode a TX power byte (raw minus 127)
pub fn tx_power_from_raw(raw: u8) -> i16 {
    i16::from(raw) - TX_POWER_OFFSET
}

/// Decode a raw connection interval maximum
pub fn interval_max_from_raw(raw: u16) -> IntervalMax {
    if raw == CONN_INTERVAL_UNBOUNDED {
        IntervalMax::Unbounded
    } else {
        IntervalMax::Bounded(conn_interval(raw))
    }
}

fn conn_interval(raw: u16) -> Duration {
    Duration::from_micros(u64::from(raw) * CONN_INTERVAL_UNIT_US)
}

fn decode_flags(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    Ok(AdData::Flags(AdFlags {
        simultaneous_le_br_edr_host: record.bit("flags", 2, 3)?,
        simultaneous_le_br_edr_controller: record.bit("flags", 2, 4)?,
        br_edr_not_supported: record.bit("flags", 2, 5)?,
        le_general_discoverable: record.bit("flags", 2, 6)?,
        le_limited_discoverable: record.bit("flags", 2, 7)?,
    }))
}

fn uuid_list(record: &ByteReader<'_>, kind: UuidListKind, width: UuidWidth) -> Result<AdData, DecodeError> {
    let mut uuids = Vec::new();
    let mut offset = 2;
    while offset < record.len() {
        uuids.push(width.read(record, offset)?);
        offset += width.bytes();
    }
    Ok(AdData::ServiceUuids { kind, uuids })
}

fn decode_incomplete_uuid16(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    uuid_list(record, UuidListKind::Incomplete, UuidWidth::Bits16)
}

fn decode_complete_uuid16(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    uuid_list(record, UuidListKind::Complete, UuidWidth::Bits16)
}

fn decode_incomplete_uuid32(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    uuid_list(record, UuidListKind::Incomplete, UuidWidth::Bits32)
}

fn decode_complete_uuid32(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    uuid_list(record, UuidListKind::Complete, UuidWidth::Bits32)
}

fn decode_incomplete_uuid128(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    uuid_list(record, UuidListKind::Incomplete, UuidWidth::Bits128)
}

fn decode_complete_uuid128(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    uuid_list(record, UuidListKind::Complete, UuidWidth::Bits128)
}

fn decode_solicitation_uuid16(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    uuid_list(record, UuidListKind::Solicitation, UuidWidth::Bits16)
}

fn decode_solicitation_uuid128(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    uuid_list(record, UuidListKind::Solicitation, UuidWidth::Bits128)
}

fn local_name(record: &ByteReader<'_>, complete: bool) -> Result<AdData, DecodeError> {
    let name = String::from_utf8_lossy(record.rest(2).as_slice()).into_owned();
    Ok(AdData::LocalName { complete, name })
}

fn decode_short_name(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    local_name(record, false)
}

fn decode_complete_name(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    local_name(record, true)
}

fn decode_tx_power(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    record
        .u8("tx power", 2)
        .map(|raw| AdData::TxPowerLevel(tx_power_from_raw(raw)))
}

fn decode_conn_interval_range(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    let min = record.u16_le("min interval", 2)?;
    let max = record.u16_le("max interval", 4)?;
    Ok(AdData::ConnIntervalRange {
        min: conn_interval(min),
        max: interval_max_from_raw(max),
    })
}

fn service_data(record: &ByteReader<'_>, width: UuidWidth) -> Result<AdData, DecodeError> {
    let uuid = width.read(record, 2)?;
    let data = record.rest(2 + width.bytes()).as_slice().to_vec();
    Ok(AdData::ServiceData { uuid, data })
}

fn decode_service_data16(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    service_data(record, UuidWidth::Bits16)
}

fn decode_service_data32(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    service_data(record, UuidWidth::Bits32)
}

fn decode_service_data128(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    service_data(record, UuidWidth::Bits128)
}

fn target_address(record: &ByteReader<'_>, random: bool) -> Result<AdData, DecodeError> {
    let address = DeviceAddress::read(record, "target address", 2)?;
    Ok(AdData::TargetAddress { random, address })
}

fn decode_public_target(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    target_address(record, false)
}

fn decode_random_target(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    target_address(record, true)
}

fn decode_appearance(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    record.u16_le("appearance", 2).map(AdData::Appearance)
}

fn decode_advertising_interval(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    let raw = record.u16_le("advertising interval", 2)?;
    Ok(AdData::AdvertisingInterval(Duration::from_micros(
        u64::from(raw) * ADV_INTERVAL_UNIT_US,
    )))
}

fn decode_manufacturer_data(record: &ByteReader<'_>) -> Result<AdData, DecodeError> {
    Ok(AdData::ManufacturerData(record.rest(2).as_slice().to_vec()))
}

static AD_DECODERS: DispatchTable<DecodeFn<AdData>> = DispatchTable::new(&[
    (ad_type::FLAGS, decode_flags as DecodeFn<AdData>),
    (ad_type::INCOMPLETE_UUID16, decode_incomplete_uuid16),
    (ad_type::COMPLETE_UUID16, decode_complete_uuid16),
    (ad_type::INCOMPLETE_UUID32, decode_incomplete_uuid32),
    (ad_type::COMPLETE_UUID32, decode_complete_uuid32),
    (ad_type::INCOMPLETE_UUID128, decode_incomplete_uuid128),
    (ad_type::COMPLETE_UUID128, decode_complete_uuid128),
    (ad_type::SHORT_LOCAL_NAME, decode_short_name),
    (ad_type::COMPLETE_LOCAL_NAME, decode_complete_name),
    (ad_type::TX_POWER_LEVEL, decode_tx_power),
    (ad_type::CONN_INTERVAL_RANGE, decode_conn_interval_range),
    (ad_type::SOLICITATION_UUID16, decode_solicitation_uuid16),
    (ad_type::SOLICITATION_UUID128, decode_solicitation_uuid128),
    (ad_type::SERVICE_DATA_UUID16, decode_service_data16),
    (ad_type::PUBLIC_TARGET_ADDRESS, decode_public_target),
    (ad_type::RANDOM_TARGET_ADDRESS, decode_random_target),
    (ad_type::APPEARANCE, decode_appearance),
    (ad_type::ADVERTISING_INTERVAL, decode_advertising_interval),
    (ad_type::SERVICE_DATA_UUID32, decode_service_data32),
    (ad_type::SERVICE_DATA_UUID128, decode_service_data128),
    (ad_type::MANUFACTURER_DATA, decode_manufacturer_data),
]);

/// Decode a single AD record starting at `offset`
///
/// Returns the record and the offset of the next one. Unknown types are
/// reported through `findings` and kept as [`AdData::Unknown`].
pub fn decode_ad_structure(
    reader: &ByteReader<'_>,
    offset: usize,
    findings: &mut Vec<Finding>,
) -> Result<(AdStructure, usize), DecodeError> {
    let length = reader.u8("AD length", offset)?;
    if length == 0 {
        let empty = AdStructure {
            length,
            ad_type: 0,
            data: AdData::Empty,
        };
        return Ok((empty, offset + 1));
    }

    let record = reader.sub("AD structure", offset, usize::from(length) + 1)?;
    let ad_type = record.u8("AD type", 1)?;
    trace!("AD structure type 0x{:02X}, length {}", ad_type, length);

    let data = match AD_DECODERS.get(ad_type) {
        Some(decode) => decode(&record)?,
        None => {
            findings.push(Finding::UnknownAdType(ad_type));
            AdData::Unknown {
                ad_type,
                bytes: record.rest(2).as_slice().to_vec(),
            }
        }
    };

    let next = offset + record.len();
    Ok((
        AdStructure {
            length,
            ad_type,
            data,
        },
        next,
    ))
}

/// Decode every AD record in `reader`
///
/// An empty reader yields an empty sequence. A record whose declared length
/// runs past the end of the reader fails the whole sequence.
pub fn decode_ad_sequence(
    reader: &ByteReader<'_>,
    findings: &mut Vec<Finding>,
) -> Result<Vec<AdStructure>, DecodeError> {
    let mut structures = Vec::new();
    let mut offset = 0;
    while offset < reader.len() {
        let (structure, next) = decode_ad_structure(reader, offset, findings)?;
        structures.push(structure);
        offset = next;
    }
    Ok(structures)
}
