//! Checked byte and bit access over captured frames
//!
//! Every fixed-position read in the decoders goes through [`ByteReader`], so
//! a short buffer turns into a [`DecodeError::Truncated`] naming the field
//! instead of a panic. A reader remembers where its slice started inside the
//! enclosing frame, which keeps error offsets absolute across sub-readers.
//!
//! # Bit numbering
//! Sub-byte fields are addressed the way the sniffer's dissector addresses
//! them: an absolute bit position `byte_offset * 8 + bit_offset`, where bit
//! offset 0 is the most significant bit of the byte. For a header byte
//! `0b0100_0010`:
//!
//! ```text
//! bit offset   0 1 2 3 4 5 6 7
//! value        0 1 0 0 0 0 1 0
//! ```
//!
//! `bits(.., 0, 1, 1)` is the TxAdd flag (1) and `bits(.., 0, 4, 4)` is the
//! PDU type nibble (0x2).

use crate::error::DecodeError;

/// Bounds-checked view over a byte slice with an absolute base offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    base: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader over a whole buffer
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, base: 0 }
    }

    /// Create a reader whose first byte sits at `base` in the enclosing frame
    pub fn with_base(bytes: &'a [u8], base: usize) -> Self {
        Self { bytes, base }
    }

    /// Number of bytes visible to this reader
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the reader holds no bytes
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Absolute offset of this reader's first byte
    pub fn base(&self) -> usize {
        self.base
    }

    /// The underlying bytes
    pub fn as_slice(&self) -> &'a [u8] {
        self.bytes
    }

    fn truncated(&self, field: &'static str, offset: usize, needed: usize) -> DecodeError {
        DecodeError::Truncated {
            field,
            offset: self.base.saturating_add(offset),
            needed,
            available: self.bytes.len().saturating_sub(offset),
        }
    }

    /// Borrow `len` bytes starting at `offset`
    pub fn bytes(&self, field: &'static str, offset: usize, len: usize) -> Result<&'a [u8], DecodeError> {
        offset
            .checked_add(len)
            .and_then(|end| self.bytes.get(offset..end))
            .ok_or_else(|| self.truncated(field, offset, len))
    }

    /// Read a single byte
    pub fn u8(&self, field: &'static str, offset: usize) -> Result<u8, DecodeError> {
        self.bytes
            .get(offset)
            .copied()
            .ok_or_else(|| self.truncated(field, offset, 1))
    }

    /// Copy a fixed-size array out of the buffer
    pub fn array<const N: usize>(&self, field: &'static str, offset: usize) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(field, offset, N)?);
        Ok(out)
    }

    /// Read a little-endian 16-bit value
    pub fn u16_le(&self, field: &'static str, offset: usize) -> Result<u16, DecodeError> {
        self.array(field, offset).map(u16::from_le_bytes)
    }

    /// Read a little-endian 24-bit value
    pub fn u24_le(&self, field: &'static str, offset: usize) -> Result<u32, DecodeError> {
        let [a, b, c] = self.array(field, offset)?;
        Ok(u32::from_le_bytes([a, b, c, 0]))
    }

    /// Read a big-endian 24-bit value
    pub fn u24_be(&self, field: &'static str, offset: usize) -> Result<u32, DecodeError> {
        let [a, b, c] = self.array(field, offset)?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    /// Read a little-endian 32-bit value
    pub fn u32_le(&self, field: &'static str, offset: usize) -> Result<u32, DecodeError> {
        self.array(field, offset).map(u32::from_le_bytes)
    }

    /// Read a little-endian 64-bit value
    pub fn u64_le(&self, field: &'static str, offset: usize) -> Result<u64, DecodeError> {
        self.array(field, offset).map(u64::from_le_bytes)
    }

    /// Child reader over `len` bytes at `offset`
    pub fn sub(&self, field: &'static str, offset: usize, len: usize) -> Result<ByteReader<'a>, DecodeError> {
        let bytes = self.bytes(field, offset, len)?;
        Ok(Self::with_base(bytes, self.base + offset))
    }

    /// Child reader over everything from `offset` to the end (possibly empty)
    pub fn rest(&self, offset: usize) -> ByteReader<'a> {
        let start = offset.min(self.bytes.len());
        Self::with_base(&self.bytes[start..], self.base + start)
    }

    /// Read `bit_count` bits (1..=32) starting `bit_offset` bits after the
    /// most significant bit of byte `byte_offset`
    ///
    /// The field may straddle byte boundaries; bits are concatenated in
    /// buffer order.
    pub fn bits(
        &self,
        field: &'static str,
        byte_offset: usize,
        bit_offset: u8,
        bit_count: u8,
    ) -> Result<u32, DecodeError> {
        debug_assert!((1..=32).contains(&bit_count), "bit_count out of range");

        let start_bit = byte_offset * 8 + bit_offset as usize;
        let end_bit = start_bit + bit_count as usize;
        let first = start_bit / 8;
        let last = end_bit.div_ceil(8);
        let span = self.bytes(field, first, last - first)?;

        let value = span
            .iter()
            .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));
        let trailing = last * 8 - end_bit;
        let mask = (1u64 << bit_count) - 1;

        Ok(((value >> trailing) & mask) as u32)
    }

    /// Read a single flag bit
    pub fn bit(&self, field: &'static str, byte_offset: usize, bit_offset: u8) -> Result<bool, DecodeError> {
        self.bits(field, byte_offset, bit_offset, 1).map(|b| b != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::ByteReader;
    use crate::error::DecodeError;

    #[test]
    fn test_msb_first_bit_numbering() {
        let reader = ByteReader::new(&[0b0100_0010]);
        assert!(!reader.bit("rx", 0, 0).unwrap());
        assert!(reader.bit("tx", 0, 1).unwrap());
        assert_eq!(reader.bits("type", 0, 4, 4).unwrap(), 0x2);
        assert_eq!(reader.bits("rfu", 0, 2, 2).unwrap(), 0);
    }

    #[test]
    fn test_bits_straddle_bytes() {
        let reader = ByteReader::new(&[0x0F, 0xF0]);
        assert_eq!(reader.bits("mid", 0, 4, 8).unwrap(), 0xFF);
        assert_eq!(reader.bits("edge", 0, 3, 2).unwrap(), 0b01);
    }

    #[test]
    fn test_bits_with_byte_offset() {
        let reader = ByteReader::new(&[0x00, 0x00, 0b1010_0111]);
        assert_eq!(reader.bits("sca", 2, 0, 3).unwrap(), 0b101);
        assert_eq!(reader.bits("hop", 2, 3, 5).unwrap(), 0b00111);
    }

    #[test]
    fn test_integer_reads() {
        let reader = ByteReader::new(&[0xD6, 0xBE, 0x89, 0x8E, 0x01, 0x02, 0x03]);
        assert_eq!(reader.u32_le("aa", 0).unwrap(), 0x8E89_BED6);
        assert_eq!(reader.u16_le("x", 4).unwrap(), 0x0201);
        assert_eq!(reader.u24_le("crc init", 4).unwrap(), 0x03_0201);
        assert_eq!(reader.u24_be("crc", 4).unwrap(), 0x01_0203);
    }

    #[test]
    fn test_truncated_reports_absolute_offset() {
        let frame = [0u8; 10];
        let reader = ByteReader::new(&frame);
        let sub = reader.sub("body", 6, 3).unwrap();
        assert_eq!(sub.base(), 6);

        let err = sub.u16_le("field", 2).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                field: "field",
                offset: 8,
                needed: 2,
                available: 1,
            }
        );
    }

    #[test]
    fn test_rest_past_end_is_empty() {
        let reader = ByteReader::new(&[1, 2, 3]);
        let rest = reader.rest(5);
        assert!(rest.is_empty());
        assert_eq!(rest.base(), 3);
        assert_eq!(reader.rest(1).as_slice(), &[2, 3]);
    }

    #[test]
    fn test_bytes_overflowing_offset() {
        let reader = ByteReader::new(&[1, 2, 3]);
        assert!(reader.bytes("huge", usize::MAX, 2).is_err());
    }
}
