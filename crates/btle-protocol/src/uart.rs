//! Sniffer UART framing
//!
//! Captured frames come in two layouts, told apart by the first two bytes.
//!
//! # Current layout
//! ```text
//! board id | hlen | plen | protover | counter (LE16) | id
//!          | ble hlen | flags | channel | rssi | event counter (LE16)
//!          | delta time (LE32) | BLE packet...
//! ```
//! The board id is prepended by the capture tool; `hlen + plen` must equal
//! the frame length without it.
//!
//! # Legacy layout
//! Starts with the sync word `0xBEEF` and has a fixed 17-byte header with
//! the packet id at 2, counter at 3, length at 7, flags at 8, channel at 9,
//! RSSI at 10, event counter at 11 and delta time at 13.
//!
//! Both layouts place the BLE packet at byte 17.

use tracing::trace;

use crate::error::{DecodeError, Finding};
use crate::link_layer::declared_length;
use crate::reader::ByteReader;
use crate::serial::PacketId;

/// Sync word that opens every legacy frame
pub const LEGACY_SYNC_WORD: [u8; 2] = [0xBE, 0xEF];

/// Offset of the BLE packet in both layouts
pub const BLE_PACKET_OFFSET: usize = 17;

/// Airtime of one byte in microseconds
pub const US_PER_BYTE: u32 = 8;

/// Airtime of the preamble, access address, header, length and CRC
pub const BLE_METADATA_TRANSFER_TIME_US: u32 = US_PER_BYTE * 10;

const CURRENT_MIN_TOTAL_LEN: usize = 20;
const CURRENT_MAX_TOTAL_LEN: usize = 66;
const LEGACY_MIN_TOTAL_LEN: usize = 26;
const LEGACY_MAX_TOTAL_LEN: usize = 67;

/// Legacy frames count eight bytes outside the length field
const LEGACY_LENGTH_ADJUST: usize = 8;

const FLAG_CRC_OK: u8 = 0x01;
const FLAG_DIRECTION: u8 = 0x02;
const FLAG_ENCRYPTED: u8 = 0x04;
const FLAG_MIC_OK: u8 = 0x08;

/// Which UART layout a frame uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameFormat {
    /// Pre-1.0 firmware, sync word 0xBEEF
    Legacy,
    /// 1.0+ firmware with a board id prefix
    Current,
}

/// Byte offsets of the metadata fields within a full frame
struct FieldLayout {
    packet_id: usize,
    counter: usize,
    flags: usize,
    channel: usize,
    rssi: usize,
    event_counter: usize,
    delta_time: usize,
}

const LEGACY_LAYOUT: FieldLayout = FieldLayout {
    packet_id: 2,
    counter: 3,
    flags: 8,
    channel: 9,
    rssi: 10,
    event_counter: 11,
    delta_time: 13,
};

const CURRENT_LAYOUT: FieldLayout = FieldLayout {
    packet_id: 6,
    counter: 4,
    flags: 8,
    channel: 9,
    rssi: 10,
    event_counter: 11,
    delta_time: 13,
};

impl FrameFormat {
    /// Pick the layout from the leading bytes
    pub fn detect(frame: &[u8]) -> Self {
        if frame.starts_with(&LEGACY_SYNC_WORD) {
            FrameFormat::Legacy
        } else {
            FrameFormat::Current
        }
    }

    fn layout(&self) -> &'static FieldLayout {
        match self {
            FrameFormat::Legacy => &LEGACY_LAYOUT,
            FrameFormat::Current => &CURRENT_LAYOUT,
        }
    }

    /// Inclusive bounds on the declared total length
    pub fn length_bounds(&self) -> (usize, usize) {
        match self {
            FrameFormat::Legacy => (LEGACY_MIN_TOTAL_LEN, LEGACY_MAX_TOTAL_LEN),
            FrameFormat::Current => (CURRENT_MIN_TOTAL_LEN, CURRENT_MAX_TOTAL_LEN),
        }
    }

    /// Declared total length and the actual length it is checked against
    fn lengths(&self, frame: &ByteReader<'_>) -> Result<(usize, usize), DecodeError> {
        match self {
            FrameFormat::Legacy => {
                let length = frame.u8("legacy length", 7)?;
                Ok((usize::from(length) + LEGACY_LENGTH_ADJUST, frame.len()))
            }
            FrameFormat::Current => {
                let header_len = frame.u8("header length", 1)?;
                let payload_len = frame.u8("payload length", 2)?;
                let declared = usize::from(header_len) + usize::from(payload_len);
                Ok((declared, frame.len().saturating_sub(1)))
            }
        }
    }
}

/// Which side of the connection sent a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    MasterToSlave,
    SlaveToMaster,
}

/// Sniffer status flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PacketFlags {
    pub crc_ok: bool,
    pub direction: Direction,
    pub encrypted: bool,
    /// Only reported for encrypted packets
    pub mic_ok: Option<bool>,
}

impl PacketFlags {
    /// Decode the flags byte
    pub fn from_byte(flags: u8) -> Self {
        let encrypted = flags & FLAG_ENCRYPTED != 0;
        Self {
            crc_ok: flags & FLAG_CRC_OK != 0,
            direction: if flags & FLAG_DIRECTION != 0 {
                Direction::MasterToSlave
            } else {
                Direction::SlaveToMaster
            },
            encrypted,
            mic_ok: encrypted.then_some(flags & FLAG_MIC_OK != 0),
        }
    }
}

/// Per-packet metadata from the UART header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameMetadata {
    /// Capture board id, 0 for legacy frames
    pub board_id: u8,
    /// Protocol version (current layout only)
    pub protocol_version: Option<u8>,
    pub packet_counter: u16,
    /// Raw UART packet id
    pub packet_id: u8,
    /// BLE sub-header length (current layout only)
    pub ble_header_length: Option<u8>,
    pub flags: PacketFlags,
    pub channel: u8,
    /// Signal strength in dBm, never positive
    pub rssi: i16,
    pub event_counter: u16,
    /// Microseconds from the end of the previous packet to the start of this one
    pub delta_time_us: u32,
    /// Microseconds from the start of the previous packet to the start of this one
    pub delta_time_start_to_start_us: u32,
}

impl FrameMetadata {
    /// Interpret the raw UART packet id
    pub fn packet_kind(&self) -> PacketId {
        PacketId::from(self.packet_id)
    }
}

/// Cross-packet state for start-to-start timing
///
/// Holds the declared payload length of the previously framed BLE packet.
/// One instance belongs to one capture stream; reset it when a new capture
/// begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingState {
    pub previous_ble_length: u8,
}

impl TimingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous packet
    pub fn reset(&mut self) {
        self.previous_ble_length = 0;
    }

    /// Start-to-start delta for a packet whose end-to-start delta is `raw_delta_us`
    pub fn start_to_start(&self, raw_delta_us: u32) -> u32 {
        BLE_METADATA_TRANSFER_TIME_US
            .saturating_add(US_PER_BYTE * u32::from(self.previous_ble_length))
            .saturating_add(raw_delta_us)
    }

    /// Remember `ble_length` as the previous packet's length
    pub fn record(&mut self, ble_length: u8) {
        self.previous_ble_length = ble_length;
    }

    /// Compute the start-to-start delta, then record this packet's length
    pub fn delta_start_to_start(&mut self, raw_delta_us: u32, ble_length: u8) -> u32 {
        let delta = self.start_to_start(raw_delta_us);
        self.record(ble_length);
        delta
    }
}

/// Result of stripping the UART envelope from a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportFrame<'a> {
    pub format: FrameFormat,
    pub metadata: FrameMetadata,
    /// BLE packet bytes, base offset 17 within the frame
    pub ble_packet: ByteReader<'a>,
}

fn check_lengths(format: FrameFormat, declared: usize, actual: usize, findings: &mut Vec<Finding>) {
    let (minimum, maximum) = format.length_bounds();
    if declared != actual {
        findings.push(Finding::LengthMismatch { declared, actual });
    } else if declared < minimum {
        findings.push(Finding::LengthTooShort { declared, minimum });
    } else if declared > maximum {
        findings.push(Finding::LengthTooLong { declared, maximum });
    }
}

/// Strip the UART envelope and read the per-packet metadata
///
/// Length, CRC and MIC problems are pushed onto `findings`; only a frame
/// too short to hold the header fails. `timing` is advanced by one packet.
pub fn decode_transport<'a>(
    frame: &'a [u8],
    timing: &mut TimingState,
    findings: &mut Vec<Finding>,
) -> Result<TransportFrame<'a>, DecodeError> {
    if frame.is_empty() {
        return Err(DecodeError::Empty);
    }

    let format = FrameFormat::detect(frame);
    let layout = format.layout();
    let reader = ByteReader::new(frame);

    let (declared, actual) = format.lengths(&reader)?;
    check_lengths(format, declared, actual, findings);

    let (board_id, protocol_version, ble_header_length) = match format {
        FrameFormat::Legacy => (0, None, None),
        FrameFormat::Current => (
            reader.u8("board id", 0)?,
            Some(reader.u8("protocol version", 3)?),
            Some(reader.u8("BLE header length", 7)?),
        ),
    };

    let flags = PacketFlags::from_byte(reader.u8("flags", layout.flags)?);
    if !flags.crc_ok {
        findings.push(Finding::BadCrc);
    }
    if flags.mic_ok == Some(false) {
        findings.push(Finding::BadMic);
    }

    let delta_time_us = reader.u32_le("delta time", layout.delta_time)?;
    let ble_packet = reader.rest(BLE_PACKET_OFFSET);

    let delta_time_start_to_start_us = timing.start_to_start(delta_time_us);
    if let Ok(length) = declared_length(&ble_packet) {
        timing.record(length);
    }

    let metadata = FrameMetadata {
        board_id,
        protocol_version,
        packet_counter: reader.u16_le("packet counter", layout.counter)?,
        packet_id: reader.u8("packet id", layout.packet_id)?,
        ble_header_length,
        flags,
        channel: reader.u8("channel", layout.channel)?,
        rssi: -i16::from(reader.u8("RSSI", layout.rssi)?),
        event_counter: reader.u16_le("event counter", layout.event_counter)?,
        delta_time_us,
        delta_time_start_to_start_us,
    };
    trace!("{:?} frame, channel {}, rssi {}", format, metadata.channel, metadata.rssi);

    Ok(TransportFrame {
        format,
        metadata,
        ble_packet,
    })
}
