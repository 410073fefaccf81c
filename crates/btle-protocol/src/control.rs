//! LL Control PDUs
//!
//! A data channel PDU with LLID 0x3 carries a one-byte opcode followed by
//! opcode-specific fields. Field offsets below are relative to the opcode
//! byte.

use std::time::Duration;

use tracing::trace;

use crate::advertising::{slots, supervision_timeout, ChannelMap};
use crate::dispatch::{DecodeFn, DispatchTable};
use crate::error::{DecodeError, Finding};
use crate::reader::ByteReader;

/// LL control opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ControlOpcode {
    ConnectionUpdateReq = 0x00,
    ChannelMapReq = 0x01,
    TerminateInd = 0x02,
    EncReq = 0x03,
    EncRsp = 0x04,
    StartEncReq = 0x05,
    StartEncRsp = 0x06,
    UnknownRsp = 0x07,
    FeatureReq = 0x08,
    FeatureRsp = 0x09,
    PauseEncReq = 0x0A,
    PauseEncRsp = 0x0B,
    VersionInd = 0x0C,
    RejectInd = 0x0D,
}

impl TryFrom<u8> for ControlOpcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ControlOpcode::ConnectionUpdateReq),
            0x01 => Ok(ControlOpcode::ChannelMapReq),
            0x02 => Ok(ControlOpcode::TerminateInd),
            0x03 => Ok(ControlOpcode::EncReq),
            0x04 => Ok(ControlOpcode::EncRsp),
            0x05 => Ok(ControlOpcode::StartEncReq),
            0x06 => Ok(ControlOpcode::StartEncRsp),
            0x07 => Ok(ControlOpcode::UnknownRsp),
            0x08 => Ok(ControlOpcode::FeatureReq),
            0x09 => Ok(ControlOpcode::FeatureRsp),
            0x0A => Ok(ControlOpcode::PauseEncReq),
            0x0B => Ok(ControlOpcode::PauseEncRsp),
            0x0C => Ok(ControlOpcode::VersionInd),
            0x0D => Ok(ControlOpcode::RejectInd),
            other => Err(other),
        }
    }
}

impl ControlOpcode {
    /// Opcode name, e.g. `LL_VERSION_IND`
    pub fn name(&self) -> &'static str {
        match self {
            ControlOpcode::ConnectionUpdateReq => "LL_CONNECTION_UPDATE_REQ",
            ControlOpcode::ChannelMapReq => "LL_CHANNEL_MAP_REQ",
            ControlOpcode::TerminateInd => "LL_TERMINATE_IND",
            ControlOpcode::EncReq => "LL_ENC_REQ",
            ControlOpcode::EncRsp => "LL_ENC_RSP",
            ControlOpcode::StartEncReq => "LL_START_ENC_REQ",
            ControlOpcode::StartEncRsp => "LL_START_ENC_RSP",
            ControlOpcode::UnknownRsp => "LL_UNKNOWN_RSP",
            ControlOpcode::FeatureReq => "LL_FEATURE_REQ",
            ControlOpcode::FeatureRsp => "LL_FEATURE_RSP",
            ControlOpcode::PauseEncReq => "LL_PAUSE_ENC_REQ",
            ControlOpcode::PauseEncRsp => "LL_PAUSE_ENC_RSP",
            ControlOpcode::VersionInd => "LL_VERSION_IND",
            ControlOpcode::RejectInd => "LL_REJECT_IND",
        }
    }
}

/// HCI error code carried by LL_TERMINATE_IND and LL_REJECT_IND
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorCode(pub u8);

impl ErrorCode {
    /// Returns the assigned description of this error code
    pub fn description(&self) -> &'static str {
        match self.0 {
            0x00 => "Success",
            0x01 => "Unknown HCI Command",
            0x02 => "Unknown Connection Identifier",
            0x03 => "Hardware Failure",
            0x04 => "Page Timeout",
            0x05 => "Authentication Failure",
            0x06 => "PIN or Key Missing",
            0x07 => "Memory Capacity Exceeded",
            0x08 => "Connection Timeout",
            0x09 => "Connection Limit Exceeded",
            0x0A => "Synchronous Connection Limit To A Device Exceeded",
            0x0B => "ACL Connection Already Exists",
            0x0C => "Command Disallowed",
            0x0D => "Connection Rejected due to Limited Resources",
            0x0E => "Connection Rejected Due To Security Reasons",
            0x0F => "Connection Rejected due to Unacceptable BD_ADDR",
            0x10 => "Connection Accept Timeout Exceeded",
            0x11 => "Unsupported Feature or Parameter Value",
            0x12 => "Invalid HCI Command Parameters",
            0x13 => "Remote User Terminated Connection",
            0x14 => "Remote Device Terminated Connection due to Low Resources",
            0x15 => "Remote Device Terminated Connection due to Power Off",
            0x16 => "Connection Terminated By Local Host",
            0x17 => "Repeated Attempts",
            0x18 => "Pairing Not Allowed",
            0x19 => "Unknown LMP PDU",
            0x1A => "Unsupported Remote Feature / Unsupported LMP Feature",
            0x1B => "SCO Offset Rejected",
            0x1C => "SCO Interval Rejected",
            0x1D => "SCO Air Mode Rejected",
            0x1E => "Invalid LMP Parameters",
            0x1F => "Unspecified Error",
            0x20 => "Unsupported LMP Parameter Value",
            0x21 => "Role Change Not Allowed",
            0x22 => "LMP Response Timeout / LL Response Timeout",
            0x23 => "LMP Error Transaction Collision",
            0x24 => "LMP PDU Not Allowed",
            0x25 => "Encryption Mode Not Acceptable",
            0x26 => "Link Key cannot be Changed",
            0x27 => "Requested QoS Not Supported",
            0x28 => "Instant Passed",
            0x29 => "Pairing With Unit Key Not Supported",
            0x2A => "Different Transaction Collision",
            0x2C => "QoS Unacceptable Parameter",
            0x2D => "QoS Rejected",
            0x2E => "Channel Classification Not Supported",
            0x2F => "Insufficient Security",
            0x30 => "Parameter Out Of Mandatory Range",
            0x32 => "Role Switch Pending",
            0x34 => "Reserved Slot Violation",
            0x35 => "Role Switch Failed",
            0x36 => "Extended Inquiry Response Too Large",
            0x37 => "Secure Simple Pairing Not Supported By Host",
            0x38 => "Host Busy - Pairing",
            0x39 => "Connection Rejected due to No Suitable Channel Found",
            0x3A => "Controller Busy",
            0x3B => "Unacceptable Connection Interval",
            0x3C => "Directed Advertising Timeout",
            0x3D => "Connection Terminated due to MIC Failure",
            0x3E => "Connection Failed to be Established",
            0x3F => "MAC Connection Failed",
            0x2B | 0x31 | 0x33 => "Reserved",
            _ => "Unknown",
        }
    }
}

/// LE feature bitmask from LL_FEATURE_REQ / LL_FEATURE_RSP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureSet(pub u64);

impl FeatureSet {
    /// Returns true if feature bit `bit` is set
    pub fn is_set(&self, bit: u8) -> bool {
        bit < 64 && self.0 & (1u64 << bit) != 0
    }

    /// LE Encryption (bit 0)
    pub fn le_encryption(&self) -> bool {
        self.is_set(0)
    }
}

/// Decoded LL control PDU
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LlControlPdu {
    ConnectionUpdateReq {
        window_size: Duration,
        window_offset: Duration,
        interval: Duration,
        latency: u16,
        timeout: Duration,
        instant: u16,
    },
    ChannelMapReq {
        channel_map: ChannelMap,
        instant: u16,
    },
    TerminateInd {
        error_code: ErrorCode,
    },
    /// Key material is kept as opaque bytes
    EncReq {
        rand: [u8; 8],
        ediv: [u8; 2],
        skdm: [u8; 8],
        ivm: [u8; 4],
    },
    EncRsp {
        skds: [u8; 8],
        ivs: [u8; 4],
    },
    StartEncReq,
    StartEncRsp,
    UnknownRsp {
        unknown_type: u8,
    },
    FeatureReq(FeatureSet),
    FeatureRsp(FeatureSet),
    PauseEncReq,
    PauseEncRsp,
    VersionInd {
        version: u8,
        company_id: u16,
        subversion: u16,
    },
    RejectInd {
        error_code: ErrorCode,
    },
    /// Opcode above 0x0D, trailing bytes kept as-is
    Unknown { opcode: u8, bytes: Vec<u8> },
}

impl LlControlPdu {
    /// The opcode, `None` for unsupported opcodes
    pub fn opcode(&self) -> Option<ControlOpcode> {
        Some(match self {
            LlControlPdu::ConnectionUpdateReq { .. } => ControlOpcode::ConnectionUpdateReq,
            LlControlPdu::ChannelMapReq { .. } => ControlOpcode::ChannelMapReq,
            LlControlPdu::TerminateInd { .. } => ControlOpcode::TerminateInd,
            LlControlPdu::EncReq { .. } => ControlOpcode::EncReq,
            LlControlPdu::EncRsp { .. } => ControlOpcode::EncRsp,
            LlControlPdu::StartEncReq => ControlOpcode::StartEncReq,
            LlControlPdu::StartEncRsp => ControlOpcode::StartEncRsp,
            LlControlPdu::UnknownRsp { .. } => ControlOpcode::UnknownRsp,
            LlControlPdu::FeatureReq(_) => ControlOpcode::FeatureReq,
            LlControlPdu::FeatureRsp(_) => ControlOpcode::FeatureRsp,
            LlControlPdu::PauseEncReq => ControlOpcode::PauseEncReq,
            LlControlPdu::PauseEncRsp => ControlOpcode::PauseEncRsp,
            LlControlPdu::VersionInd { .. } => ControlOpcode::VersionInd,
            LlControlPdu::RejectInd { .. } => ControlOpcode::RejectInd,
            LlControlPdu::Unknown { .. } => return None,
        })
    }
}

fn decode_connection_update(ctrl: &ByteReader<'_>) -> Result<LlControlPdu, DecodeError> {
    Ok(LlControlPdu::ConnectionUpdateReq {
        window_size: slots(u16::from(ctrl.u8("window size", 1)?)),
        window_offset: slots(ctrl.u16_le("window offset", 2)?),
        interval: slots(ctrl.u16_le("interval", 4)?),
        latency: ctrl.u16_le("latency", 6)?,
        timeout: supervision_timeout(ctrl.u16_le("timeout", 8)?),
        instant: ctrl.u16_le("instant", 10)?,
    })
}

fn decode_channel_map(ctrl: &ByteReader<'_>) -> Result<LlControlPdu, DecodeError> {
    Ok(LlControlPdu::ChannelMapReq {
        channel_map: ChannelMap(ctrl.array("channel map", 1)?),
        instant: ctrl.u16_le("instant", 6)?,
    })
}

fn decode_terminate(ctrl: &ByteReader<'_>) -> Result<LlControlPdu, DecodeError> {
    let error_code = ErrorCode(ctrl.u8("error code", 1)?);
    Ok(LlControlPdu::TerminateInd { error_code })
}

fn decode_enc_req(ctrl: &ByteReader<'_>) -> Result<LlControlPdu, DecodeError> {
    Ok(LlControlPdu::EncReq {
        rand: ctrl.array("rand", 1)?,
        ediv: ctrl.array("ediv", 9)?,
        skdm: ctrl.array("skdm", 11)?,
        ivm: ctrl.array("ivm", 19)?,
    })
}

fn decode_enc_rsp(ctrl: &ByteReader<'_>) -> Result<LlControlPdu, DecodeError> {
    Ok(LlControlPdu::EncRsp {
        skds: ctrl.array("skds", 1)?,
        ivs: ctrl.array("ivs", 9)?,
    })
}

fn decode_start_enc_req(_ctrl: &ByteReader<'_>) -> Result<LlControlPdu, DecodeError> {
    Ok(LlControlPdu::StartEncReq)
}

fn decode_start_enc_rsp(_ctrl: &ByteReader<'_>) -> Result<LlControlPdu, DecodeError> {
    Ok(LlControlPdu::StartEncRsp)
}

fn decode_unknown_rsp(ctrl: &ByteReader<'_>) -> Result<LlControlPdu, DecodeError> {
    let unknown_type = ctrl.u8("unknown type", 1)?;
    Ok(LlControlPdu::UnknownRsp { unknown_type })
}

fn decode_feature_req(ctrl: &ByteReader<'_>) -> Result<LlControlPdu, DecodeError> {
    ctrl.u64_le("feature set", 1)
        .map(|bits| LlControlPdu::FeatureReq(FeatureSet(bits)))
}

fn decode_feature_rsp(ctrl: &ByteReader<'_>) -> Result<LlControlPdu, DecodeError> {
    ctrl.u64_le("feature set", 1)
        .map(|bits| LlControlPdu::FeatureRsp(FeatureSet(bits)))
}

fn decode_pause_enc_req(_ctrl: &ByteReader<'_>) -> Result<LlControlPdu, DecodeError> {
    Ok(LlControlPdu::PauseEncReq)
}

fn decode_pause_enc_rsp(_ctrl: &ByteReader<'_>) -> Result<LlControlPdu, DecodeError> {
    Ok(LlControlPdu::PauseEncRsp)
}

fn decode_version(ctrl: &ByteReader<'_>) -> Result<LlControlPdu, DecodeError> {
    Ok(LlControlPdu::VersionInd {
        version: ctrl.u8("version", 1)?,
        company_id: ctrl.u16_le("company id", 2)?,
        subversion: ctrl.u16_le("subversion", 4)?,
    })
}

fn decode_reject(ctrl: &ByteReader<'_>) -> Result<LlControlPdu, DecodeError> {
    let error_code = ErrorCode(ctrl.u8("error code", 1)?);
    Ok(LlControlPdu::RejectInd { error_code })
}

static CONTROL_DECODERS: DispatchTable<DecodeFn<LlControlPdu>> = DispatchTable::new(&[
    (ControlOpcode::ConnectionUpdateReq as u8, decode_connection_update as DecodeFn<LlControlPdu>),
    (ControlOpcode::ChannelMapReq as u8, decode_channel_map),
    (ControlOpcode::TerminateInd as u8, decode_terminate),
    (ControlOpcode::EncReq as u8, decode_enc_req),
    (ControlOpcode::EncRsp as u8, decode_enc_rsp),
    (ControlOpcode::StartEncReq as u8, decode_start_enc_req),
    (ControlOpcode::StartEncRsp as u8, decode_start_enc_rsp),
    (ControlOpcode::UnknownRsp as u8, decode_unknown_rsp),
    (ControlOpcode::FeatureReq as u8, decode_feature_req),
    (ControlOpcode::FeatureRsp as u8, decode_feature_rsp),
    (ControlOpcode::PauseEncReq as u8, decode_pause_enc_req),
    (ControlOpcode::PauseEncRsp as u8, decode_pause_enc_rsp),
    (ControlOpcode::VersionInd as u8, decode_version),
    (ControlOpcode::RejectInd as u8, decode_reject),
]);

/// Decode an LL control PDU starting at its opcode byte
pub fn decode_control_pdu(ctrl: &ByteReader<'_>, findings: &mut Vec<Finding>) -> Result<LlControlPdu, DecodeError> {
    let opcode = ctrl.u8("control opcode", 0)?;
    match CONTROL_DECODERS.get(opcode) {
        Some(decode) => {
            trace!("LL control opcode 0x{:02X}", opcode);
            decode(ctrl)
        }
        None => {
            findings.push(Finding::UnsupportedOpcode(opcode));
            Ok(LlControlPdu::Unknown {
                opcode,
                bytes: ctrl.rest(1).as_slice().to_vec(),
            })
        }
    }
}
