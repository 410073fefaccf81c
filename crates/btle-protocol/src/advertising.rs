//! Advertising channel PDUs
//!
//! # Format
//! The PDU body follows the 2-byte link-layer header. Every PDU starts with
//! one or two 6-byte device addresses in on-air (little-endian) order:
//!
//! | type | PDU             | addresses        | payload              |
//! |------|-----------------|------------------|----------------------|
//! | 0x0  | ADV_IND         | AdvA             | AD structures        |
//! | 0x1  | ADV_DIRECT_IND  | AdvA, InitA      |                      |
//! | 0x2  | ADV_NONCONN_IND | AdvA             | AD structures        |
//! | 0x3  | SCAN_REQ        | ScanA, AdvA      |                      |
//! | 0x4  | SCAN_RSP        | AdvA             | AD structures        |
//! | 0x5  | CONNECT_REQ     | InitA, AdvA      | LLData (22 bytes)    |
//! | 0x6  | ADV_SCAN_IND    | AdvA             | AD structures        |

use std::fmt;
use std::time::Duration;

use tracing::trace;

use crate::ad::{decode_ad_sequence, AdStructure};
use crate::address::DeviceAddress;
use crate::dispatch::{DecodeWithFindingsFn, DispatchTable};
use crate::error::{DecodeError, Finding};
use crate::reader::ByteReader;

/// Size of one device address on the wire
const ADDRESS_LEN: usize = 6;

/// Offset of LLData inside a CONNECT_REQ body
const LL_DATA_OFFSET: usize = 2 * ADDRESS_LEN;

/// 1.25 ms, the unit of window and interval fields
const SLOT_UNIT_US: u64 = 1250;

/// 10 ms, the unit of the supervision timeout
const TIMEOUT_UNIT_US: u64 = 10_000;

/// Number of data channels addressed by a channel map
pub const DATA_CHANNEL_COUNT: u8 = 37;

/// Advertising PDU type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum AdvertisingPduType {
    AdvInd = 0x0,
    AdvDirectInd = 0x1,
    AdvNonconnInd = 0x2,
    ScanReq = 0x3,
    ScanRsp = 0x4,
    ConnectReq = 0x5,
    AdvScanInd = 0x6,
}

impl TryFrom<u8> for AdvertisingPduType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(AdvertisingPduType::AdvInd),
            0x1 => Ok(AdvertisingPduType::AdvDirectInd),
            0x2 => Ok(AdvertisingPduType::AdvNonconnInd),
            0x3 => Ok(AdvertisingPduType::ScanReq),
            0x4 => Ok(AdvertisingPduType::ScanRsp),
            0x5 => Ok(AdvertisingPduType::ConnectReq),
            0x6 => Ok(AdvertisingPduType::AdvScanInd),
            other => Err(other),
        }
    }
}

impl AdvertisingPduType {
    /// Returns the PDU name as used in the Core specification
    pub fn name(&self) -> &'static str {
        match self {
            AdvertisingPduType::AdvInd => "ADV_IND",
            AdvertisingPduType::AdvDirectInd => "ADV_DIRECT_IND",
            AdvertisingPduType::AdvNonconnInd => "ADV_NONCONN_IND",
            AdvertisingPduType::ScanReq => "SCAN_REQ",
            AdvertisingPduType::ScanRsp => "SCAN_RSP",
            AdvertisingPduType::ConnectReq => "CONNECT_REQ",
            AdvertisingPduType::AdvScanInd => "ADV_SCAN_IND",
        }
    }

    /// Returns true for PDU types whose header carries a meaningful RxAdd bit
    pub fn has_rx_address(&self) -> bool {
        matches!(
            self,
            AdvertisingPduType::AdvDirectInd | AdvertisingPduType::ScanReq | AdvertisingPduType::ConnectReq
        )
    }
}

/// Decoded advertising channel PDU
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdvertisingPdu {
    AdvInd {
        adv_address: DeviceAddress,
        data: Vec<AdStructure>,
    },
    AdvDirectInd {
        adv_address: DeviceAddress,
        init_address: DeviceAddress,
    },
    AdvNonconnInd {
        adv_address: DeviceAddress,
        data: Vec<AdStructure>,
    },
    ScanReq {
        scan_address: DeviceAddress,
        adv_address: DeviceAddress,
    },
    ScanRsp {
        adv_address: DeviceAddress,
        data: Vec<AdStructure>,
    },
    ConnectReq {
        init_address: DeviceAddress,
        adv_address: DeviceAddress,
        params: ConnectionParameters,
    },
    AdvScanInd {
        adv_address: DeviceAddress,
        data: Vec<AdStructure>,
    },
    /// Reserved PDU type, body kept as-is
    Unknown { pdu_type: u8, bytes: Vec<u8> },
}

impl AdvertisingPdu {
    /// The PDU type, `None` for reserved types
    pub fn pdu_type(&self) -> Option<AdvertisingPduType> {
        match self {
            AdvertisingPdu::AdvInd { .. } => Some(AdvertisingPduType::AdvInd),
            AdvertisingPdu::AdvDirectInd { .. } => Some(AdvertisingPduType::AdvDirectInd),
            AdvertisingPdu::AdvNonconnInd { .. } => Some(AdvertisingPduType::AdvNonconnInd),
            AdvertisingPdu::ScanReq { .. } => Some(AdvertisingPduType::ScanReq),
            AdvertisingPdu::ScanRsp { .. } => Some(AdvertisingPduType::ScanRsp),
            AdvertisingPdu::ConnectReq { .. } => Some(AdvertisingPduType::ConnectReq),
            AdvertisingPdu::AdvScanInd { .. } => Some(AdvertisingPduType::AdvScanInd),
            AdvertisingPdu::Unknown { .. } => None,
        }
    }

    /// Address of the advertiser, if this PDU carries one
    pub fn adv_address(&self) -> Option<DeviceAddress> {
        match self {
            AdvertisingPdu::AdvInd { adv_address, .. }
            | AdvertisingPdu::AdvDirectInd { adv_address, .. }
            | AdvertisingPdu::AdvNonconnInd { adv_address, .. }
            | AdvertisingPdu::ScanReq { adv_address, .. }
            | AdvertisingPdu::ScanRsp { adv_address, .. }
            | AdvertisingPdu::ConnectReq { adv_address, .. }
            | AdvertisingPdu::AdvScanInd { adv_address, .. } => Some(*adv_address),
            AdvertisingPdu::Unknown { .. } => None,
        }
    }

    /// AD structures carried by this PDU (empty for PDUs without a payload)
    pub fn ad_structures(&self) -> &[AdStructure] {
        match self {
            AdvertisingPdu::AdvInd { data, .. }
            | AdvertisingPdu::AdvNonconnInd { data, .. }
            | AdvertisingPdu::ScanRsp { data, .. }
            | AdvertisingPdu::AdvScanInd { data, .. } => data,
            _ => &[],
        }
    }
}

/// CONNECT_REQ LLData block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionParameters {
    /// Access address of the new connection
    pub access_address: u32,
    /// CRC initialisation value (24 bits)
    pub crc_init: u32,
    pub window_size: Duration,
    pub window_offset: Duration,
    pub interval: Duration,
    /// Slave latency in connection events
    pub latency: u16,
    pub timeout: Duration,
    pub channel_map: ChannelMap,
    /// Hop increment (5 bits)
    pub hop_increment: u8,
    pub sleep_clock_accuracy: SleepClockAccuracy,
}

/// Data channel map, bit `n` set means channel `n` is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelMap(pub [u8; 5]);

impl ChannelMap {
    /// Returns true if data channel `channel` (0..=36) is used
    pub fn is_enabled(&self, channel: u8) -> bool {
        if channel >= DATA_CHANNEL_COUNT {
            return false;
        }
        let byte = self.0[usize::from(channel / 8)];
        byte & (1 << (channel % 8)) != 0
    }

    /// All used data channels in ascending order
    pub fn enabled_channels(&self) -> Vec<u8> {
        (0..DATA_CHANNEL_COUNT)
            .filter(|&ch| self.is_enabled(ch))
            .collect()
    }
}

/// Master sleep clock accuracy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SleepClockAccuracy {
    Ppm251To500,
    Ppm151To250,
    Ppm101To150,
    Ppm76To100,
    Ppm51To75,
    Ppm31To50,
    Ppm21To30,
    Ppm0To20,
}

impl SleepClockAccuracy {
    /// Decode the 3-bit SCA field (upper bits are ignored)
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => SleepClockAccuracy::Ppm251To500,
            1 => SleepClockAccuracy::Ppm151To250,
            2 => SleepClockAccuracy::Ppm101To150,
            3 => SleepClockAccuracy::Ppm76To100,
            4 => SleepClockAccuracy::Ppm51To75,
            5 => SleepClockAccuracy::Ppm31To50,
            6 => SleepClockAccuracy::Ppm21To30,
            _ => SleepClockAccuracy::Ppm0To20,
        }
    }

    /// Inclusive accuracy range in ppm
    pub fn ppm_range(&self) -> (u16, u16) {
        match self {
            SleepClockAccuracy::Ppm251To500 => (251, 500),
            SleepClockAccuracy::Ppm151To250 => (151, 250),
            SleepClockAccuracy::Ppm101To150 => (101, 150),
            SleepClockAccuracy::Ppm76To100 => (76, 100),
            SleepClockAccuracy::Ppm51To75 => (51, 75),
            SleepClockAccuracy::Ppm31To50 => (31, 50),
            SleepClockAccuracy::Ppm21To30 => (21, 30),
            SleepClockAccuracy::Ppm0To20 => (0, 20),
        }
    }
}

impl fmt::Display for SleepClockAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (low, high) = self.ppm_range();
        write!(f, "{low} ppm to {high} ppm")
    }
}

/// Convert a count of 1.25 ms slots
pub(crate) fn slots(raw: u16) -> Duration {
    Duration::from_micros(u64::from(raw) * SLOT_UNIT_US)
}

/// Convert a supervision timeout in 10 ms units
pub(crate) fn supervision_timeout(raw: u16) -> Duration {
    Duration::from_micros(u64::from(raw) * TIMEOUT_UNIT_US)
}

impl ConnectionParameters {
    /// Decode the 22-byte LLData block
    pub fn decode(ll_data: &ByteReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            access_address: ll_data.u32_le("access address", 0)?,
            crc_init: ll_data.u24_le("CRC init", 4)?,
            window_size: slots(u16::from(ll_data.u8("window size", 7)?)),
            window_offset: slots(ll_data.u16_le("window offset", 8)?),
            interval: slots(ll_data.u16_le("interval", 10)?),
            latency: ll_data.u16_le("latency", 12)?,
            timeout: supervision_timeout(ll_data.u16_le("timeout", 14)?),
            channel_map: ChannelMap(ll_data.array("channel map", 16)?),
            hop_increment: ll_data.bits("hop increment", 21, 3, 5)? as u8,
            sleep_clock_accuracy: SleepClockAccuracy::from_bits(ll_data.bits("sleep clock accuracy", 21, 0, 3)? as u8),
        })
    }
}

fn ad_payload(body: &ByteReader<'_>, findings: &mut Vec<Finding>) -> Result<Vec<AdStructure>, DecodeError> {
    decode_ad_sequence(&body.rest(ADDRESS_LEN), findings)
}

fn decode_adv_ind(body: &ByteReader<'_>, findings: &mut Vec<Finding>) -> Result<AdvertisingPdu, DecodeError> {
    Ok(AdvertisingPdu::AdvInd {
        adv_address: DeviceAddress::read(body, "advertiser address", 0)?,
        data: ad_payload(body, findings)?,
    })
}

fn decode_adv_direct_ind(body: &ByteReader<'_>, _findings: &mut Vec<Finding>) -> Result<AdvertisingPdu, DecodeError> {
    Ok(AdvertisingPdu::AdvDirectInd {
        adv_address: DeviceAddress::read(body, "advertiser address", 0)?,
        init_address: DeviceAddress::read(body, "initiator address", ADDRESS_LEN)?,
    })
}

fn decode_adv_nonconn_ind(body: &ByteReader<'_>, findings: &mut Vec<Finding>) -> Result<AdvertisingPdu, DecodeError> {
    Ok(AdvertisingPdu::AdvNonconnInd {
        adv_address: DeviceAddress::read(body, "advertiser address", 0)?,
        data: ad_payload(body, findings)?,
    })
}

fn decode_scan_req(body: &ByteReader<'_>, _findings: &mut Vec<Finding>) -> Result<AdvertisingPdu, DecodeError> {
    Ok(AdvertisingPdu::ScanReq {
        scan_address: DeviceAddress::read(body, "scanner address", 0)?,
        adv_address: DeviceAddress::read(body, "advertiser address", ADDRESS_LEN)?,
    })
}

fn decode_scan_rsp(body: &ByteReader<'_>, findings: &mut Vec<Finding>) -> Result<AdvertisingPdu, DecodeError> {
    Ok(AdvertisingPdu::ScanRsp {
        adv_address: DeviceAddress::read(body, "advertiser address", 0)?,
        data: ad_payload(body, findings)?,
    })
}

fn decode_connect_req(body: &ByteReader<'_>, _findings: &mut Vec<Finding>) -> Result<AdvertisingPdu, DecodeError> {
    Ok(AdvertisingPdu::ConnectReq {
        init_address: DeviceAddress::read(body, "initiator address", 0)?,
        adv_address: DeviceAddress::read(body, "advertiser address", ADDRESS_LEN)?,
        params: ConnectionParameters::decode(&body.rest(LL_DATA_OFFSET))?,
    })
}

fn decode_adv_scan_ind(body: &ByteReader<'_>, findings: &mut Vec<Finding>) -> Result<AdvertisingPdu, DecodeError> {
    Ok(AdvertisingPdu::AdvScanInd {
        adv_address: DeviceAddress::read(body, "advertiser address", 0)?,
        data: ad_payload(body, findings)?,
    })
}

static ADVERTISING_DECODERS: DispatchTable<DecodeWithFindingsFn<AdvertisingPdu>> = DispatchTable::new(&[
    (AdvertisingPduType::AdvInd as u8, decode_adv_ind as DecodeWithFindingsFn<AdvertisingPdu>),
    (AdvertisingPduType::AdvDirectInd as u8, decode_adv_direct_ind),
    (AdvertisingPduType::AdvNonconnInd as u8, decode_adv_nonconn_ind),
    (AdvertisingPduType::ScanReq as u8, decode_scan_req),
    (AdvertisingPduType::ScanRsp as u8, decode_scan_rsp),
    (AdvertisingPduType::ConnectReq as u8, decode_connect_req),
    (AdvertisingPduType::AdvScanInd as u8, decode_adv_scan_ind),
]);

/// Decode an advertising PDU body of the given 4-bit type
///
/// `body` starts right after the link-layer header and spans the declared
/// payload length.
pub fn decode_advertising_pdu(
    pdu_type: u8,
    body: &ByteReader<'_>,
    findings: &mut Vec<Finding>,
) -> Result<AdvertisingPdu, DecodeError> {
    match ADVERTISING_DECODERS.get(pdu_type) {
        Some(decode) => {
            trace!("Advertising PDU type 0x{:X}", pdu_type);
            decode(body, findings)
        }
        None => {
            findings.push(Finding::UnknownPduType(pdu_type));
            Ok(AdvertisingPdu::Unknown {
                pdu_type,
                bytes: body.as_slice().to_vec(),
            })
        }
    }
}
