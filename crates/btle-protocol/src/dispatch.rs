//! Code-to-decoder lookup tables
//!
//! Advertising PDU types, LL control opcodes and AD structure types are all
//! dispatched the same way: a static table maps the code to a decode
//! function, and a missing entry falls through to the caller's `Unknown`
//! variant.

use crate::error::{DecodeError, Finding};
use crate::reader::ByteReader;

/// Decoder for a self-contained payload
pub type DecodeFn<T> = fn(&ByteReader<'_>) -> Result<T, DecodeError>;

/// Decoder for a payload with nested content that can raise findings
pub type DecodeWithFindingsFn<T> = fn(&ByteReader<'_>, &mut Vec<Finding>) -> Result<T, DecodeError>;

/// Static mapping from a numeric code to its decoder
pub struct DispatchTable<F: Copy + 'static> {
    entries: &'static [(u8, F)],
}

impl<F: Copy + 'static> DispatchTable<F> {
    /// Create a table from `(code, decoder)` pairs
    pub const fn new(entries: &'static [(u8, F)]) -> Self {
        Self { entries }
    }

    /// Look up the decoder for `code`
    pub fn get(&self, code: u8) -> Option<F> {
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, decode)| *decode)
    }

    /// Returns true if `code` has a decoder
    pub fn contains(&self, code: u8) -> bool {
        self.entries.iter().any(|(c, _)| *c == code)
    }

    /// All codes with a decoder, in table order
    pub fn codes(&self) -> impl Iterator<Item = u8> + '_ {
        self.entries.iter().map(|(c, _)| *c)
    }
}

#[cfg(test)]
mod tests {
    use super::{DecodeFn, DispatchTable};
    use crate::error::DecodeError;
    use crate::reader::ByteReader;

    fn first(reader: &ByteReader<'_>) -> Result<u8, DecodeError> {
        reader.u8("first", 0)
    }

    fn second(reader: &ByteReader<'_>) -> Result<u8, DecodeError> {
        reader.u8("second", 1)
    }

    static TABLE: DispatchTable<DecodeFn<u8>> =
        DispatchTable::new(&[(0x01, first as DecodeFn<u8>), (0x02, second)]);

    #[test]
    fn test_lookup() {
        let reader = ByteReader::new(&[0x10, 0x20]);
        let decode = TABLE.get(0x02).unwrap();
        assert_eq!(decode(&reader).unwrap(), 0x20);
        assert!(TABLE.get(0x03).is_none());
        assert!(TABLE.contains(0x01));
        assert_eq!(TABLE.codes().collect::<Vec<_>>(), vec![0x01, 0x02]);
    }
}
