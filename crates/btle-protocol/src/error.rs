//! Error and finding types for sniffer frame decoding
//!
//! Decoding distinguishes two tiers:
//! - [`DecodeError`]: a fixed-position field could not be read. The
//!   substructure being decoded is abandoned and the error propagates.
//! - [`Finding`]: something about the frame is wrong or unsupported, but a
//!   best-effort structure was still produced.

use std::fmt;

use thiserror::Error;

/// Structural errors that abort decoding of a frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The input buffer was empty
    #[error("empty frame")]
    Empty,

    /// A field extends past the end of the available bytes
    #[error("truncated {field} at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        /// Name of the field being read
        field: &'static str,
        /// Absolute offset of the field within the decoded buffer
        offset: usize,
        /// Bytes required to read the field
        needed: usize,
        /// Bytes actually present from `offset` onwards
        available: usize,
    },
}

/// Errors raised by the SLIP transport codec
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlipError {
    /// The byte following an escape marker is not a valid escape code
    #[error("unexpected byte 0x{0:02X} after SLIP escape")]
    InvalidEscape(u8),

    /// A frame grew past the codec's buffer limit without an end marker
    #[error("SLIP frame exceeds {0} bytes")]
    FrameTooLong(usize),
}

/// How serious a finding is for downstream consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// Unusual or unsupported content
    Warning,
    /// Corrupted or inconsistent content
    Error,
}

/// Non-fatal observations collected while decoding a frame
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Finding {
    /// UART header and payload lengths do not add up to the buffer length
    LengthMismatch { declared: usize, actual: usize },
    /// Declared UART length is below the format's minimum
    LengthTooShort { declared: usize, minimum: usize },
    /// Declared UART length is above the format's maximum
    LengthTooLong { declared: usize, maximum: usize },
    /// Sniffer reported a failed CRC check
    BadCrc,
    /// Sniffer reported a failed MIC check on an encrypted packet
    BadMic,
    /// Link-layer buffer is shorter than `declared + 9`
    PacketTooShort { declared: u8, actual: usize },
    /// Link-layer buffer is longer than `declared + 9`
    PacketTooLong { declared: u8, actual: usize },
    /// Advertising PDU type outside 0x0..=0x6
    UnknownPduType(u8),
    /// LL control opcode outside 0x00..=0x0D
    UnsupportedOpcode(u8),
    /// AD structure type without a decoder
    UnknownAdType(u8),
    /// UART packet counter skipped ahead of the previous frame's counter
    PacketsLost { expected: u16, received: u16 },
}

impl Finding {
    /// Returns the severity of this finding
    pub fn severity(&self) -> Severity {
        match self {
            Finding::LengthMismatch { .. }
            | Finding::LengthTooShort { .. }
            | Finding::LengthTooLong { .. }
            | Finding::BadCrc
            | Finding::PacketTooShort { .. }
            | Finding::PacketTooLong { .. } => Severity::Error,
            Finding::BadMic
            | Finding::UnknownPduType(_)
            | Finding::UnsupportedOpcode(_)
            | Finding::UnknownAdType(_)
            | Finding::PacketsLost { .. } => Severity::Warning,
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::LengthMismatch { declared, actual } => write!(
                f,
                "UART packet lengths do not match actual packet length ({declared} declared, {actual} actual)"
            ),
            Finding::LengthTooShort { declared, minimum } => write!(
                f,
                "UART packet length {declared} is too small (minimum {minimum})"
            ),
            Finding::LengthTooLong { declared, maximum } => write!(
                f,
                "UART packet length {declared} is too large (maximum {maximum})"
            ),
            Finding::BadCrc => write!(f, "CRC is bad"),
            Finding::BadMic => write!(f, "encrypted packet decrypted incorrectly (bad MIC)"),
            Finding::PacketTooShort { declared, actual } => write!(
                f,
                "packet too short: length field {declared} needs {} bytes, got {actual}",
                *declared as usize + 9
            ),
            Finding::PacketTooLong { declared, actual } => write!(
                f,
                "packet too long: length field {declared} needs {} bytes, got {actual}",
                *declared as usize + 9
            ),
            Finding::UnknownPduType(t) => write!(f, "unknown advertising PDU type 0x{t:X}"),
            Finding::UnsupportedOpcode(op) => write!(f, "unknown LL control opcode 0x{op:02X}"),
            Finding::UnknownAdType(t) => write!(f, "unsupported AD type 0x{t:02X}"),
            Finding::PacketsLost { expected, received } => {
                write!(f, "gap in packets: expected counter {expected}, received {received}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DecodeError, Finding, Severity};

    #[test]
    fn test_truncated_message_names_field() {
        let err = DecodeError::Truncated {
            field: "advertiser address",
            offset: 6,
            needed: 6,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "truncated advertiser address at offset 6: need 6 bytes, 2 available"
        );
    }

    #[test]
    fn test_severity() {
        assert_eq!(Finding::BadCrc.severity(), Severity::Error);
        assert_eq!(Finding::BadMic.severity(), Severity::Warning);
        assert_eq!(Finding::UnknownAdType(0x30).severity(), Severity::Warning);
        assert_eq!(
            Finding::PacketsLost {
                expected: 6,
                received: 9
            }
            .severity(),
            Severity::Warning
        );
        assert_eq!(
            Finding::LengthMismatch {
                declared: 20,
                actual: 21
            }
            .severity(),
            Severity::Error
        );
    }

    #[test]
    fn test_packet_length_finding_display() {
        let finding = Finding::PacketTooShort {
            declared: 20,
            actual: 12,
        };
        assert_eq!(
            finding.to_string(),
            "packet too short: length field 20 needs 29 bytes, got 12"
        );
    }
}
