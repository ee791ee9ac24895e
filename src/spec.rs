//! Constants derived from the [BSON specification](http://bsonspec.org/spec.html).

const ELEMENT_TYPE_DOUBLE: u8 = 0x01;
const ELEMENT_TYPE_STRING: u8 = 0x02;
const ELEMENT_TYPE_EMBEDDED_DOCUMENT: u8 = 0x03;
const ELEMENT_TYPE_ARRAY: u8 = 0x04;
const ELEMENT_TYPE_BINARY: u8 = 0x05;
const ELEMENT_TYPE_UNDEFINED: u8 = 0x06; // Deprecated
const ELEMENT_TYPE_OBJECT_ID: u8 = 0x07;
const ELEMENT_TYPE_BOOLEAN: u8 = 0x08;
const ELEMENT_TYPE_DATETIME: u8 = 0x09;
const ELEMENT_TYPE_NULL: u8 = 0x0A;
const ELEMENT_TYPE_REGULAR_EXPRESSION: u8 = 0x0B;
const ELEMENT_TYPE_DBPOINTER: u8 = 0x0C; // Deprecated
const ELEMENT_TYPE_JAVASCRIPT_CODE: u8 = 0x0D;
const ELEMENT_TYPE_SYMBOL: u8 = 0x0E; // Deprecated
const ELEMENT_TYPE_JAVASCRIPT_CODE_WITH_SCOPE: u8 = 0x0F;
const ELEMENT_TYPE_INT32: u8 = 0x10;
const ELEMENT_TYPE_TIMESTAMP: u8 = 0x11;
const ELEMENT_TYPE_INT64: u8 = 0x12;
const ELEMENT_TYPE_DECIMAL128: u8 = 0x13;
const ELEMENT_TYPE_MIN_KEY: u8 = 0xFF;
const ELEMENT_TYPE_MAX_KEY: u8 = 0x7F;

const BINARY_SUBTYPE_GENERIC: u8 = 0x00;
const BINARY_SUBTYPE_FUNCTION: u8 = 0x01;
const BINARY_SUBTYPE_BINARY_OLD: u8 = 0x02;
const BINARY_SUBTYPE_UUID_OLD: u8 = 0x03;
const BINARY_SUBTYPE_UUID: u8 = 0x04;
const BINARY_SUBTYPE_MD5: u8 = 0x05;
const BINARY_SUBTYPE_USER_DEFINED: u8 = 0x80;

/// All available BSON element types.
///
/// Not every element type is representable as a [`Bson`](crate::Bson) value;
/// the deprecated `DbPointer` tag is registered here so the decoder can report
/// it precisely, but it has no value-model counterpart.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum ElementType {
    /// 64-bit binary floating point
    Double = ELEMENT_TYPE_DOUBLE,
    /// UTF-8 string
    String = ELEMENT_TYPE_STRING,
    /// Embedded document
    EmbeddedDocument = ELEMENT_TYPE_EMBEDDED_DOCUMENT,
    /// Array
    Array = ELEMENT_TYPE_ARRAY,
    /// Binary data
    Binary = ELEMENT_TYPE_BINARY,
    /// Undefined value (Deprecated)
    Undefined = ELEMENT_TYPE_UNDEFINED,
    /// [ObjectId](http://dochub.mongodb.org/core/objectids)
    ObjectId = ELEMENT_TYPE_OBJECT_ID,
    /// Boolean value
    Boolean = ELEMENT_TYPE_BOOLEAN,
    /// UTC datetime
    DateTime = ELEMENT_TYPE_DATETIME,
    /// Null value
    Null = ELEMENT_TYPE_NULL,
    /// Regular expression
    RegularExpression = ELEMENT_TYPE_REGULAR_EXPRESSION,
    /// DBPointer (Deprecated)
    DbPointer = ELEMENT_TYPE_DBPOINTER,
    /// JavaScript code
    JavaScriptCode = ELEMENT_TYPE_JAVASCRIPT_CODE,
    /// Symbol (Deprecated)
    Symbol = ELEMENT_TYPE_SYMBOL,
    /// JavaScript code w/ scope
    JavaScriptCodeWithScope = ELEMENT_TYPE_JAVASCRIPT_CODE_WITH_SCOPE,
    /// 32-bit signed integer
    Int32 = ELEMENT_TYPE_INT32,
    /// Timestamp
    Timestamp = ELEMENT_TYPE_TIMESTAMP,
    /// 64-bit signed integer
    Int64 = ELEMENT_TYPE_INT64,
    /// [128-bit decimal floating point](https://github.com/mongodb/specifications/blob/master/source/bson-decimal128/decimal128.rst)
    Decimal128 = ELEMENT_TYPE_DECIMAL128,
    /// Min key
    MinKey = ELEMENT_TYPE_MIN_KEY,
    /// Max key
    MaxKey = ELEMENT_TYPE_MAX_KEY,
}

impl ElementType {
    /// Attempt to convert from the type tag byte preceding each element's key.
    #[inline]
    pub fn from(tag: u8) -> Option<ElementType> {
        use self::ElementType::*;
        Some(match tag {
            ELEMENT_TYPE_DOUBLE => Double,
            ELEMENT_TYPE_STRING => String,
            ELEMENT_TYPE_EMBEDDED_DOCUMENT => EmbeddedDocument,
            ELEMENT_TYPE_ARRAY => Array,
            ELEMENT_TYPE_BINARY => Binary,
            ELEMENT_TYPE_UNDEFINED => Undefined,
            ELEMENT_TYPE_OBJECT_ID => ObjectId,
            ELEMENT_TYPE_BOOLEAN => Boolean,
            ELEMENT_TYPE_DATETIME => DateTime,
            ELEMENT_TYPE_NULL => Null,
            ELEMENT_TYPE_REGULAR_EXPRESSION => RegularExpression,
            ELEMENT_TYPE_DBPOINTER => DbPointer,
            ELEMENT_TYPE_JAVASCRIPT_CODE => JavaScriptCode,
            ELEMENT_TYPE_SYMBOL => Symbol,
            ELEMENT_TYPE_JAVASCRIPT_CODE_WITH_SCOPE => JavaScriptCodeWithScope,
            ELEMENT_TYPE_INT32 => Int32,
            ELEMENT_TYPE_TIMESTAMP => Timestamp,
            ELEMENT_TYPE_INT64 => Int64,
            ELEMENT_TYPE_DECIMAL128 => Decimal128,
            ELEMENT_TYPE_MIN_KEY => MinKey,
            ELEMENT_TYPE_MAX_KEY => MaxKey,
            _ => return None,
        })
    }
}

impl From<ElementType> for u8 {
    #[inline]
    fn from(t: ElementType) -> u8 {
        t as u8
    }
}

/// The subtype of a [`Binary`](crate::Binary) value.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BinarySubtype {
    Generic,
    Function,
    BinaryOld,
    UuidOld,
    Uuid,
    Md5,
    Reserved(u8),
    UserDefined(u8),
}

impl From<BinarySubtype> for u8 {
    #[inline]
    fn from(t: BinarySubtype) -> u8 {
        match t {
            BinarySubtype::Generic => BINARY_SUBTYPE_GENERIC,
            BinarySubtype::Function => BINARY_SUBTYPE_FUNCTION,
            BinarySubtype::BinaryOld => BINARY_SUBTYPE_BINARY_OLD,
            BinarySubtype::UuidOld => BINARY_SUBTYPE_UUID_OLD,
            BinarySubtype::Uuid => BINARY_SUBTYPE_UUID,
            BinarySubtype::Md5 => BINARY_SUBTYPE_MD5,
            BinarySubtype::Reserved(x) => x,
            BinarySubtype::UserDefined(x) => x,
        }
    }
}

impl From<u8> for BinarySubtype {
    #[inline]
    fn from(t: u8) -> BinarySubtype {
        match t {
            BINARY_SUBTYPE_GENERIC => BinarySubtype::Generic,
            BINARY_SUBTYPE_FUNCTION => BinarySubtype::Function,
            BINARY_SUBTYPE_BINARY_OLD => BinarySubtype::BinaryOld,
            BINARY_SUBTYPE_UUID_OLD => BinarySubtype::UuidOld,
            BINARY_SUBTYPE_UUID => BinarySubtype::Uuid,
            BINARY_SUBTYPE_MD5 => BinarySubtype::Md5,
            _ if t < BINARY_SUBTYPE_USER_DEFINED => BinarySubtype::Reserved(t),
            _ => BinarySubtype::UserDefined(t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BinarySubtype, ElementType};

    #[test]
    fn element_type_round_trips_through_tag_byte() {
        for tag in 0x01..=0x13u8 {
            let et = ElementType::from(tag).expect("tag in the contiguous range");
            assert_eq!(u8::from(et), tag);
        }
        assert_eq!(ElementType::from(0x7F), Some(ElementType::MaxKey));
        assert_eq!(ElementType::from(0xFF), Some(ElementType::MinKey));
        assert_eq!(ElementType::from(0x14), None);
        assert_eq!(ElementType::from(0x00), None);
    }

    #[test]
    fn binary_subtype_byte_mapping() {
        assert_eq!(BinarySubtype::from(0x02), BinarySubtype::BinaryOld);
        assert_eq!(BinarySubtype::from(0x42), BinarySubtype::Reserved(0x42));
        assert_eq!(BinarySubtype::from(0x85), BinarySubtype::UserDefined(0x85));
        assert_eq!(u8::from(BinarySubtype::UserDefined(0x85)), 0x85);
    }
}
