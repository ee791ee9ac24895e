//! Functionality for decoding raw BSON bytes into [`Document`]s.

use std::{fmt, sync::Arc};

use crate::{
    bson::{Bson, DbRef, Regex, Timestamp},
    datetime::DateTime,
    decimal128::Decimal128,
    document::Document,
    error::{Error, ErrorKind, Result},
    oid::ObjectId,
    spec::{BinarySubtype, ElementType},
    validation::try_to_str,
    Binary, JavaScriptCodeWithScope,
};

/// The deepest document/array nesting the decoder will follow. Matches the
/// server's own nesting cap; anything deeper is hostile or broken input and
/// must fail before it can exhaust the call stack.
const MAX_NESTING_DEPTH: usize = 100;

/// How the decoder should represent BSON UTC datetime values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum DateRepresentation {
    /// Produce [`Bson::DateTime`].
    #[default]
    DateTime,
    /// Produce [`Bson::Int64`] holding raw milliseconds since the epoch.
    /// Cheaper for callers that only forward the value.
    Int64Millis,
}

/// A callback applied to embedded documents that match the DBRef shape.
pub type DbRefTransform = Arc<dyn Fn(Document) -> Bson + Send + Sync>;

/// Options for decoding BSON bytes into a [`Document`].
#[derive(Clone, Default)]
#[non_exhaustive]
pub struct DecodeOptions {
    /// How datetime elements are represented in the output.
    pub date_representation: DateRepresentation,

    /// When set, an embedded document whose keys follow the DBRef pattern
    /// (`$ref` first, `$id` second, optionally `$db` third) is replaced by
    /// the result of this callback.
    pub dbref: Option<DbRefTransform>,
}

impl fmt::Debug for DecodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeOptions")
            .field("date_representation", &self.date_representation)
            .field("dbref", &self.dbref.is_some())
            .finish()
    }
}

/// Decodes `bytes` into a [`Document`].
///
/// Every length read from the wire is bounds-checked before use, so arbitrary
/// input fails with an error rather than a panic or an out-of-bounds read.
pub fn decode_document(bytes: &[u8], options: &DecodeOptions) -> Result<Document> {
    let mut reader = Reader {
        bytes,
        pos: 0,
        depth: 0,
    };
    let doc = read_document(&mut reader, options)?;
    if reader.pos != bytes.len() {
        return Err(ErrorKind::LengthMismatch {
            declared: reader.pos as i32,
            actual: bytes.len(),
        }
        .into());
    }
    Ok(doc)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Tracks entry into a nested document or array. Every `descend` must be
    /// paired with an `ascend` on the success path.
    fn descend(&mut self) -> Result<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ErrorKind::ExceededDepthLimit {
                max: MAX_NESTING_DEPTH,
            }
            .into());
        }
        self.depth += 1;
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn read_slice(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::truncated(format!(
                "need {} bytes but only {} remain",
                n,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.read_slice(N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(slice);
        Ok(array)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Reads a NUL-terminated UTF-8 string, consuming the terminator.
    fn read_cstring(&mut self) -> Result<&'a str> {
        let rest = &self.bytes[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::truncated("cstring missing NUL terminator"))?;
        let s = try_to_str(&rest[..nul])?;
        self.pos += nul + 1;
        Ok(s)
    }

    /// Reads a length-prefixed string: int32 byte count including the
    /// trailing NUL, then that many bytes of which the last must be NUL.
    fn read_string(&mut self) -> Result<&'a str> {
        let len = self.read_i32()?;
        if len < 1 {
            return Err(Error::truncated(format!(
                "string length {} is below the 1 byte minimum",
                len
            )));
        }
        let slice = self.read_slice(len as usize)?;
        let (bytes, terminator) = slice.split_at(len as usize - 1);
        if terminator != [0] {
            return Err(Error::truncated("string missing NUL terminator"));
        }
        try_to_str(bytes)
    }
}

fn read_document(reader: &mut Reader, options: &DecodeOptions) -> Result<Document> {
    reader.descend()?;
    let start = reader.pos;
    let declared = reader.read_i32()?;
    if declared < 5 {
        return Err(Error::truncated(format!(
            "document length {} is below the 5 byte minimum",
            declared
        )));
    }
    if declared as usize - 4 > reader.remaining() {
        return Err(Error::truncated(format!(
            "document claims {} bytes but only {} are available",
            declared,
            reader.remaining() + 4
        )));
    }

    let mut doc = Document::new();
    loop {
        let tag = reader.read_u8()?;
        if tag == 0 {
            break;
        }
        let key = reader.read_cstring()?;
        let value = read_element(reader, tag, options).map_err(|e| e.with_key(key))?;
        doc.insert(key, value);
    }

    let consumed = reader.pos - start;
    if consumed != declared as usize {
        return Err(ErrorKind::LengthMismatch {
            declared,
            actual: consumed,
        }
        .into());
    }
    reader.ascend();
    Ok(doc)
}

fn read_array(reader: &mut Reader, options: &DecodeOptions) -> Result<Vec<Bson>> {
    reader.descend()?;
    let start = reader.pos;
    let declared = reader.read_i32()?;
    if declared < 5 {
        return Err(Error::truncated(format!(
            "array length {} is below the 5 byte minimum",
            declared
        )));
    }
    if declared as usize - 4 > reader.remaining() {
        return Err(Error::truncated(format!(
            "array claims {} bytes but only {} are available",
            declared,
            reader.remaining() + 4
        )));
    }

    let mut arr = Vec::new();
    loop {
        let tag = reader.read_u8()?;
        if tag == 0 {
            break;
        }
        // index keys are regenerated on encode, so their text is discarded
        reader.read_cstring()?;
        let index = arr.len();
        let value = read_element(reader, tag, options).map_err(|e| e.with_index(index))?;
        arr.push(value);
    }

    let consumed = reader.pos - start;
    if consumed != declared as usize {
        return Err(ErrorKind::LengthMismatch {
            declared,
            actual: consumed,
        }
        .into());
    }
    reader.ascend();
    Ok(arr)
}

fn read_element(reader: &mut Reader, tag: u8, options: &DecodeOptions) -> Result<Bson> {
    let element_type =
        ElementType::from(tag).ok_or_else(|| Error::from(ErrorKind::UnsupportedType { tag }))?;

    let value = match element_type {
        ElementType::Double => Bson::Double(reader.read_f64()?),
        ElementType::String => Bson::String(reader.read_string()?.to_string()),
        ElementType::EmbeddedDocument => {
            let doc = read_document(reader, options)?;
            if let Some(transform) = options.dbref.as_ref() {
                if DbRef::from_document(&doc).is_some() {
                    return Ok(transform(doc));
                }
            }
            Bson::Document(doc)
        }
        ElementType::Array => Bson::Array(read_array(reader, options)?),
        ElementType::Binary => read_binary(reader)?,
        ElementType::Undefined => Bson::Undefined,
        ElementType::ObjectId => Bson::ObjectId(ObjectId::from_bytes(reader.read_array()?)),
        ElementType::Boolean => Bson::Boolean(reader.read_u8()? != 0),
        ElementType::DateTime => {
            let millis = reader.read_i64()?;
            match options.date_representation {
                DateRepresentation::DateTime => Bson::DateTime(DateTime::from_millis(millis)),
                DateRepresentation::Int64Millis => Bson::Int64(millis),
            }
        }
        ElementType::Null => Bson::Null,
        ElementType::RegularExpression => {
            let pattern = reader.read_cstring()?.to_string();
            let opts = reader.read_cstring()?;
            Bson::RegularExpression(Regex::new(pattern, opts))
        }
        // deprecated and unresolvable without a server round trip
        ElementType::DbPointer => {
            return Err(ErrorKind::UnsupportedType { tag }.into());
        }
        ElementType::JavaScriptCode => Bson::JavaScriptCode(reader.read_string()?.to_string()),
        ElementType::Symbol => Bson::Symbol(reader.read_string()?.to_string()),
        ElementType::JavaScriptCodeWithScope => {
            let start = reader.pos;
            let declared = reader.read_i32()?;
            // int32 total + minimal string (5) + empty document (5)
            if declared < 14 {
                return Err(Error::truncated(format!(
                    "code-with-scope length {} is below the 14 byte minimum",
                    declared
                )));
            }
            let code = reader.read_string()?.to_string();
            let scope = read_document(reader, options)?;
            let consumed = reader.pos - start;
            if consumed != declared as usize {
                return Err(ErrorKind::LengthMismatch {
                    declared,
                    actual: consumed,
                }
                .into());
            }
            Bson::JavaScriptCodeWithScope(JavaScriptCodeWithScope { code, scope })
        }
        ElementType::Int32 => Bson::Int32(reader.read_i32()?),
        ElementType::Timestamp => {
            let increment = reader.read_u32()?;
            let time = reader.read_u32()?;
            Bson::Timestamp(Timestamp { time, increment })
        }
        ElementType::Int64 => Bson::Int64(reader.read_i64()?),
        ElementType::Decimal128 => Bson::Decimal128(Decimal128::from_bytes(reader.read_array()?)),
        ElementType::MinKey => Bson::MinKey,
        ElementType::MaxKey => Bson::MaxKey,
    };
    Ok(value)
}

fn read_binary(reader: &mut Reader) -> Result<Bson> {
    let len = reader.read_i32()?;
    if len < 0 {
        return Err(Error::truncated(format!("negative binary length {}", len)));
    }
    let subtype = BinarySubtype::from(reader.read_u8()?);

    let bytes = if subtype == BinarySubtype::BinaryOld {
        if len < 4 {
            return Err(Error::truncated(format!(
                "old binary length {} cannot hold its inner length prefix",
                len
            )));
        }
        let inner = reader.read_i32()?;
        if inner != len - 4 {
            return Err(ErrorKind::LengthMismatch {
                declared: inner,
                actual: (len - 4) as usize,
            }
            .into());
        }
        reader.read_slice(inner as usize)?
    } else {
        reader.read_slice(len as usize)?
    };

    Ok(Bson::Binary(Binary {
        subtype,
        bytes: bytes.to_vec(),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{DateRepresentation, DecodeOptions, decode_document};
    use crate::{
        Bson, ErrorKind, doc,
        encoder::{EncodeOptions, encode_document},
    };
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn encode(doc: &crate::Document) -> Vec<u8> {
        encode_document(doc, &EncodeOptions::default()).unwrap()
    }

    #[test]
    fn empty_document() {
        let doc = decode_document(&[5, 0, 0, 0, 0], &DecodeOptions::default()).unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn every_strict_prefix_fails_without_panicking() {
        let bytes = encode(&doc! {
            "s": "string",
            "doc": { "inner": [1, 2, 3] },
            "oid": crate::oid::ObjectId::new(),
        });
        for end in 0..bytes.len() {
            assert!(decode_document(&bytes[..end], &DecodeOptions::default()).is_err());
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = encode(&doc! { "a": 1 });
        bytes.push(0);
        let err = decode_document(&bytes, &DecodeOptions::default()).unwrap_err();
        assert_matches!(err.kind, ErrorKind::LengthMismatch { .. });
    }

    #[test]
    fn tampered_declared_length_rejected() {
        let mut bytes = encode(&doc! { "a": 1 });
        bytes[0] -= 1;
        let err = decode_document(&bytes, &DecodeOptions::default()).unwrap_err();
        assert_matches!(err.kind, ErrorKind::LengthMismatch { .. });
    }

    #[test]
    fn unknown_tag_rejected() {
        // tag 0x14 is unassigned
        let bytes = vec![8, 0, 0, 0, 0x14, b'a', 0, 0];
        let err = decode_document(&bytes, &DecodeOptions::default()).unwrap_err();
        assert_matches!(err.kind, ErrorKind::UnsupportedType { tag: 0x14 });
        assert_eq!(err.key.as_deref(), Some("a"));
    }

    #[test]
    fn dbpointer_rejected() {
        let mut bytes = vec![0x0C, b'p', 0];
        bytes.extend_from_slice(&[2, 0, 0, 0, b'c', 0]);
        bytes.extend_from_slice(&[0u8; 12]);
        let mut framed = ((bytes.len() + 5) as i32).to_le_bytes().to_vec();
        framed.extend_from_slice(&bytes);
        framed.push(0);
        let err = decode_document(&framed, &DecodeOptions::default()).unwrap_err();
        assert_matches!(err.kind, ErrorKind::UnsupportedType { tag: 0x0C });
    }

    #[test]
    fn invalid_utf8_in_string_rejected() {
        // "s" holding a 2 byte string whose payload is 0xFF
        let bytes = vec![14, 0, 0, 0, 0x02, b's', 0, 2, 0, 0, 0, 0xFF, 0, 0];
        let err = decode_document(&bytes, &DecodeOptions::default()).unwrap_err();
        assert_matches!(err.kind, ErrorKind::InvalidUtf8);
    }

    #[test]
    fn huge_string_length_fails_cleanly() {
        let bytes = vec![14, 0, 0, 0, 0x02, b's', 0, 0xFF, 0xFF, 0xFF, 0x7F, 0xFF, 0, 0];
        let err = decode_document(&bytes, &DecodeOptions::default()).unwrap_err();
        assert!(err.is_truncated());
    }

    #[test]
    fn date_representation_switch() {
        let bytes = encode(&doc! { "when": crate::DateTime::from_millis(1234) });

        let rich = decode_document(&bytes, &DecodeOptions::default()).unwrap();
        assert_eq!(
            rich.get_datetime("when"),
            Ok(&crate::DateTime::from_millis(1234))
        );

        let raw = decode_document(
            &bytes,
            &DecodeOptions {
                date_representation: DateRepresentation::Int64Millis,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(raw.get_i64("when"), Ok(1234));
    }

    #[test]
    fn dbref_transform_applied() {
        let oid = crate::oid::ObjectId::new();
        let bytes = encode(&doc! {
            "link": { "$ref": "users", "$id": oid },
            "plain": { "$id": oid, "$ref": "users" },
        });

        let options = DecodeOptions {
            dbref: Some(Arc::new(|doc| {
                Bson::String(format!("ref:{}", doc.get_str("$ref").unwrap()))
            })),
            ..Default::default()
        };
        let decoded = decode_document(&bytes, &options).unwrap();
        assert_eq!(decoded.get_str("link"), Ok("ref:users"));
        // key order matters, so this one stays a plain document
        assert!(decoded.get_document("plain").is_ok());
    }

    /// Builds the bytes of `levels` nested documents without going through
    /// the value model: each wrapper holds the next level under key "a" and
    /// the innermost document is empty.
    fn deeply_nested_bytes(levels: usize) -> Vec<u8> {
        let wrappers = levels - 1;
        let mut bytes = Vec::with_capacity(5 + 8 * wrappers);
        for i in 0..wrappers {
            let len = (5 + 8 * (wrappers - i)) as i32;
            bytes.extend_from_slice(&len.to_le_bytes());
            bytes.push(0x03);
            bytes.extend_from_slice(b"a\0");
        }
        bytes.extend_from_slice(&[5, 0, 0, 0, 0]);
        bytes.resize(bytes.len() + wrappers, 0);
        bytes
    }

    #[test]
    fn nesting_at_the_limit_decodes() {
        let bytes = deeply_nested_bytes(100);
        assert!(decode_document(&bytes, &DecodeOptions::default()).is_ok());
    }

    #[test]
    fn nesting_past_the_limit_is_a_typed_error() {
        let bytes = deeply_nested_bytes(101);
        let err = decode_document(&bytes, &DecodeOptions::default()).unwrap_err();
        assert_matches!(err.kind, ErrorKind::ExceededDepthLimit { max: 100 });

        // over a megabyte of wrappers must fail the same way instead of
        // exhausting the call stack
        let bytes = deeply_nested_bytes(200_000);
        let err = decode_document(&bytes, &DecodeOptions::default()).unwrap_err();
        assert_matches!(err.kind, ErrorKind::ExceededDepthLimit { max: 100 });
    }

    #[test]
    fn timestamp_field_order() {
        let bytes = encode(&doc! {
            "ts": Bson::Timestamp(crate::Timestamp { time: 7, increment: 3 })
        });
        // increment precedes seconds on the wire
        let payload = &bytes[4 + 1 + 3..];
        assert_eq!(&payload[0..4], &[3, 0, 0, 0]);
        assert_eq!(&payload[4..8], &[7, 0, 0, 0]);
        let decoded = decode_document(&bytes, &DecodeOptions::default()).unwrap();
        assert_eq!(
            decoded.get_timestamp("ts"),
            Ok(crate::Timestamp { time: 7, increment: 3 })
        );
    }
}
