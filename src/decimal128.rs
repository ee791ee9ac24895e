//! [BSON Decimal128](https://github.com/mongodb/specifications/blob/master/source/bson-decimal128/decimal128.rst) data type representation

use std::fmt;

/// Struct representing a BSON Decimal128 type.
///
/// This type holds the 16 bytes of an IEEE 754-2008 decimal128 value and
/// round-trips them through the codec unmodified; it does not implement
/// decimal arithmetic or string conversion.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Decimal128 {
    /// BID representation, low 64 bits first as laid out on the wire.
    bytes: [u8; 16],
}

impl Decimal128 {
    /// Constructs a new `Decimal128` from the provided raw byte representation.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self { bytes }
    }

    /// Returns the raw byte representation of this `Decimal128`.
    pub const fn bytes(&self) -> [u8; 16] {
        self.bytes
    }
}

impl fmt::Debug for Decimal128 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Decimal128(0x{})", hex::encode(self.bytes))
    }
}

impl fmt::Display for Decimal128 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.bytes))
    }
}
