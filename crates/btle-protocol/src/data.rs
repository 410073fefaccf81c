//! Data channel PDUs
//!
//! # Header
//! ```text
//! bit offset  0 1 2 | 3  | 4  | 5    | 6 7
//!             RFU   | MD | SN | NESN | LLID
//! ```
//! followed by a length byte whose low 5 bits are the payload length.

use crate::control::{decode_control_pdu, LlControlPdu};
use crate::error::{DecodeError, Finding};
use crate::reader::ByteReader;

/// Logical link identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Llid {
    Reserved,
    /// Continuation fragment of an L2CAP message, or an empty PDU
    Continuation,
    /// Start of an L2CAP message or a complete message
    Start,
    Control,
}

impl Llid {
    /// Decode the 2-bit LLID field
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0x1 => Llid::Continuation,
            0x2 => Llid::Start,
            0x3 => Llid::Control,
            _ => Llid::Reserved,
        }
    }

    /// Returns a human-readable description of the LLID
    pub fn description(&self) -> &'static str {
        match self {
            Llid::Reserved => "Reserved",
            Llid::Continuation => "Continuation fragment of an L2CAP message",
            Llid::Start => "Start of an L2CAP message or no fragmentation",
            Llid::Control => "LL Control PDU",
        }
    }
}

/// Payload of a data channel PDU
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataPayload {
    /// Reserved LLID, nothing decoded
    Empty,
    /// L2CAP bytes for an upper-layer decoder
    UpperLayer(Vec<u8>),
    Control(LlControlPdu),
}

/// Decoded data channel PDU
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataPdu {
    pub llid: Llid,
    pub nesn: bool,
    pub sn: bool,
    /// More data
    pub md: bool,
    /// Declared payload length (5 bits)
    pub length: u8,
    pub payload: DataPayload,
}

/// Header flags of a data channel PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataHeader {
    pub llid: Llid,
    pub nesn: bool,
    pub sn: bool,
    pub md: bool,
}

impl DataHeader {
    /// Read the header flags from the byte at `offset`
    pub fn decode(reader: &ByteReader<'_>, offset: usize) -> Result<Self, DecodeError> {
        Ok(Self {
            md: reader.bit("MD", offset, 3)?,
            sn: reader.bit("SN", offset, 4)?,
            nesn: reader.bit("NESN", offset, 5)?,
            llid: Llid::from_bits(reader.bits("LLID", offset, 6, 2)? as u8),
        })
    }
}

/// Decode a data channel PDU body
///
/// `body` starts right after the 2-byte header and spans the declared
/// payload length.
pub fn decode_data_pdu(
    header: DataHeader,
    length: u8,
    body: &ByteReader<'_>,
    findings: &mut Vec<Finding>,
) -> Result<DataPdu, DecodeError> {
    let payload = match header.llid {
        Llid::Reserved => DataPayload::Empty,
        Llid::Continuation | Llid::Start => DataPayload::UpperLayer(body.as_slice().to_vec()),
        Llid::Control => DataPayload::Control(decode_control_pdu(body, findings)?),
    };

    Ok(DataPdu {
        llid: header.llid,
        nesn: header.nesn,
        sn: header.sn,
        md: header.md,
        length,
        payload,
    })
}
