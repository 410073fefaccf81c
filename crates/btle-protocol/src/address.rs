//! Device addresses and UUIDs
//!
//! BLE transmits 48-bit device addresses and 128-bit UUIDs least significant
//! byte first. Both types here hold the canonical (most significant byte
//! first) order that users expect to read.

use std::fmt;

use crate::error::DecodeError;
use crate::reader::ByteReader;

/// 48-bit device address in canonical byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceAddress(pub [u8; 6]);

impl DeviceAddress {
    /// Build an address from its on-air (little-endian) byte order
    pub fn from_wire(mut bytes: [u8; 6]) -> Self {
        bytes.reverse();
        Self(bytes)
    }

    /// Read a 6-byte on-air address at `offset`
    pub fn read(reader: &ByteReader<'_>, field: &'static str, offset: usize) -> Result<Self, DecodeError> {
        reader.array(field, offset).map(Self::from_wire)
    }

    /// Canonical address bytes
    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// 128-bit UUID in canonical byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Uuid128(pub [u8; 16]);

impl Uuid128 {
    /// Build a UUID from its on-air (little-endian) byte order
    pub fn from_wire(mut bytes: [u8; 16]) -> Self {
        bytes.reverse();
        Self(bytes)
    }

    /// Read a 16-byte on-air UUID at `offset`
    pub fn read(reader: &ByteReader<'_>, field: &'static str, offset: usize) -> Result<Self, DecodeError> {
        reader.array(field, offset).map(Self::from_wire)
    }

    /// Canonical UUID bytes
    pub fn bytes(&self) -> [u8; 16] {
        self.0
    }
}

impl fmt::Display for Uuid128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
