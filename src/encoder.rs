//! Functionality for encoding [`Document`]s to raw BSON bytes.

use std::collections::HashSet;

use ahash::RandomState;

use crate::{
    bson::Bson,
    buffer::Buffer,
    document::Document,
    error::{Error, ErrorKind, Result},
    spec::BinarySubtype,
    validation::validate_key,
};

/// Options for encoding a [`Document`] to BSON bytes.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct EncodeOptions {
    /// An element to write before all others in the top-level document.
    /// Any element in the document with the same key is suppressed, so the
    /// override wins without producing a duplicate. Drivers use this to
    /// prepend `_id` to inserts and the command name to commands.
    pub first_element: Option<(String, Bson)>,

    /// Characters that may not appear anywhere in a document key. Keys
    /// containing one of these fail with `InvalidKey`.
    pub invalid_key_chars: Option<String>,

    /// When set, a key whose first character equals this character has that
    /// character rewritten to `$` on the wire.
    pub operator_char: Option<char>,

    /// Maximum encoded size in bytes. Output larger than this fails with
    /// `DocumentTooLarge`.
    pub max_length: Option<usize>,

    /// When true, string values that parse as numbers are encoded as Int32,
    /// Int64, or Double instead of String.
    pub prefer_numeric: bool,
}

/// Encodes `doc` to BSON bytes.
pub fn encode_document(doc: &Document, options: &EncodeOptions) -> Result<Vec<u8>> {
    let mut encoder = Encoder {
        buf: Buffer::new(),
        seen: HashSet::default(),
        options,
    };
    encoder.write_document(doc, options.first_element.as_ref())?;
    encoder.buf.check_max_length(options.max_length)?;
    Ok(encoder.buf.into_vec())
}

struct Encoder<'a> {
    buf: Buffer,
    /// Addresses of the documents and arrays currently being written, used
    /// to detect a container that contains itself.
    seen: HashSet<usize, RandomState>,
    options: &'a EncodeOptions,
}

impl Encoder<'_> {
    fn write_document(&mut self, doc: &Document, first: Option<&(String, Bson)>) -> Result<()> {
        let addr = doc as *const Document as usize;
        if !self.seen.insert(addr) {
            return Err(ErrorKind::CircularReference.into());
        }

        let start = self.buf.begin_doc();

        if let Some((key, value)) = first {
            let validated = validate_key(key, self.options).map_err(|e| e.with_key(key))?;
            self.write_element(&validated, value)
                .map_err(|e| e.with_key(key))?;
        }

        for (key, value) in doc {
            if let Some((first_key, _)) = first {
                if key == first_key {
                    continue;
                }
            }
            let validated = validate_key(key, self.options).map_err(|e| e.with_key(key))?;
            self.write_element(&validated, value)
                .map_err(|e| e.with_key(key))?;
        }

        self.buf.write_u8(0);
        self.buf.patch_length(start)?;
        self.seen.remove(&addr);
        Ok(())
    }

    fn write_array(&mut self, arr: &Vec<Bson>) -> Result<()> {
        let addr = arr as *const Vec<Bson> as usize;
        if !self.seen.insert(addr) {
            return Err(ErrorKind::CircularReference.into());
        }

        let start = self.buf.begin_doc();
        for (index, value) in arr.iter().enumerate() {
            self.write_element(&index.to_string(), value)
                .map_err(|e| e.with_index(index))?;
        }
        self.buf.write_u8(0);
        self.buf.patch_length(start)?;
        self.seen.remove(&addr);
        Ok(())
    }

    /// Writes one element: type tag, NUL-terminated key, payload.
    fn write_element(&mut self, key: &str, value: &Bson) -> Result<()> {
        if self.options.prefer_numeric {
            if let Bson::String(s) = value {
                if let Some(numeric) = coerce_numeric(s) {
                    return self.write_element(key, &numeric);
                }
            }
        }

        self.buf.write_u8(value.element_type().into());
        self.buf.write_cstring(key);

        match value {
            Bson::Double(v) => self.buf.write_f64(*v),
            Bson::String(s) | Bson::Symbol(s) | Bson::JavaScriptCode(s) => {
                self.buf.write_string(s)?
            }
            Bson::Document(doc) => self.write_document(doc, None)?,
            Bson::Array(arr) => self.write_array(arr)?,
            Bson::Boolean(b) => self.buf.write_u8(*b as u8),
            Bson::Null | Bson::Undefined | Bson::MinKey | Bson::MaxKey => {}
            Bson::RegularExpression(regex) => {
                if regex.pattern.as_bytes().contains(&0) {
                    return Err(Error::unsupported_value(
                        "regular expression pattern contains an embedded NUL byte",
                    ));
                }
                self.buf.write_cstring(&regex.pattern);
                self.buf
                    .write_cstring(&crate::bson::Regex::normalize_options(&regex.options));
            }
            Bson::JavaScriptCodeWithScope(code_w_scope) => {
                let start = self.buf.begin_doc();
                self.buf.write_string(&code_w_scope.code)?;
                self.write_document(&code_w_scope.scope, None)?;
                self.buf.patch_length(start)?;
            }
            Bson::Int32(v) => self.buf.write_i32(*v),
            Bson::Int64(v) => self.buf.write_i64(*v),
            Bson::Timestamp(ts) => {
                // increment first, then seconds
                self.buf.write_u32(ts.increment);
                self.buf.write_u32(ts.time);
            }
            Bson::Binary(binary) => {
                // the old subtype's repeated inner length costs 4 more bytes
                if binary.bytes.len() > i32::MAX as usize - 4 {
                    return Err(Error::unsupported_value(format!(
                        "binary payload of {} bytes cannot be length-prefixed",
                        binary.bytes.len()
                    )));
                }
                let len = binary.bytes.len() as i32;
                if binary.subtype == BinarySubtype::BinaryOld {
                    // the deprecated subtype repeats the length inside the payload
                    self.buf.write_i32(len + 4);
                    self.buf.write_u8(binary.subtype.into());
                    self.buf.write_i32(len);
                } else {
                    self.buf.write_i32(len);
                    self.buf.write_u8(binary.subtype.into());
                }
                self.buf.write_bytes(&binary.bytes);
            }
            Bson::ObjectId(oid) => self.buf.write_bytes(&oid.bytes()),
            Bson::DateTime(dt) => self.buf.write_i64(dt.timestamp_millis()),
            Bson::Decimal128(d) => self.buf.write_bytes(&d.bytes()),
        }

        Ok(())
    }
}

/// Reinterprets a string as a number for `prefer_numeric`. Integers that fit
/// in 32 bits become Int32, wider integers Int64, and anything else that
/// parses as a finite float becomes Double.
fn coerce_numeric(s: &str) -> Option<Bson> {
    if s.is_empty() {
        return None;
    }
    if let Ok(int) = s.parse::<i64>() {
        return Some(match i32::try_from(int) {
            Ok(int) => Bson::Int32(int),
            Err(_) => Bson::Int64(int),
        });
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(Bson::Double(f)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{EncodeOptions, coerce_numeric, encode_document};
    use crate::{Bson, ErrorKind, doc, spec::BinarySubtype};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document() {
        let bytes = encode_document(&doc! {}, &EncodeOptions::default()).unwrap();
        assert_eq!(bytes, vec![5, 0, 0, 0, 0]);
    }

    #[test]
    fn int32_element() {
        let bytes = encode_document(&doc! { "a": 1 }, &EncodeOptions::default()).unwrap();
        assert_eq!(
            bytes,
            vec![12, 0, 0, 0, 0x10, b'a', 0, 1, 0, 0, 0, 0]
        );
    }

    #[test]
    fn first_element_written_first_and_duplicate_suppressed() {
        let doc = doc! { "a": 1, "_id": 2 };
        let options = EncodeOptions {
            first_element: Some(("_id".to_string(), Bson::Int32(9))),
            ..Default::default()
        };
        let bytes = encode_document(&doc, &options).unwrap();
        let decoded = crate::Document::from_slice(&bytes).unwrap();
        let keys: Vec<_> = decoded.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["_id", "a"]);
        assert_eq!(decoded.get_i32("_id"), Ok(9));
    }

    #[test]
    fn numeric_coercion_boundaries() {
        assert_eq!(coerce_numeric("2147483647"), Some(Bson::Int32(i32::MAX)));
        assert_eq!(coerce_numeric("2147483648"), Some(Bson::Int64(2147483648)));
        assert_eq!(coerce_numeric("-2147483649"), Some(Bson::Int64(-2147483649)));
        assert_eq!(coerce_numeric("1.5"), Some(Bson::Double(1.5)));
        assert_eq!(coerce_numeric("inf"), None);
        assert_eq!(coerce_numeric("NaN"), None);
        assert_eq!(coerce_numeric("12abc"), None);
        assert_eq!(coerce_numeric(""), None);
    }

    #[test]
    fn prefer_numeric_rewrites_strings() {
        let doc = doc! { "n": "42", "s": "forty-two" };
        let options = EncodeOptions {
            prefer_numeric: true,
            ..Default::default()
        };
        let bytes = encode_document(&doc, &options).unwrap();
        let decoded = crate::Document::from_slice(&bytes).unwrap();
        assert_eq!(decoded.get_i32("n"), Ok(42));
        assert_eq!(decoded.get_str("s"), Ok("forty-two"));
    }

    #[test]
    fn old_binary_subtype_repeats_length() {
        let doc = doc! {
            "b": Bson::Binary(crate::Binary {
                subtype: BinarySubtype::BinaryOld,
                bytes: vec![1, 2, 3],
            })
        };
        let bytes = encode_document(&doc, &EncodeOptions::default()).unwrap();
        // tag | "b\0" | outer len 7 | subtype 2 | inner len 3 | bytes
        assert_eq!(
            &bytes[4..],
            &[0x05, b'b', 0, 7, 0, 0, 0, 0x02, 3, 0, 0, 0, 1, 2, 3, 0]
        );
    }

    #[test]
    fn regex_with_nul_pattern_rejected() {
        let doc = doc! {
            "r": Bson::RegularExpression(crate::Regex {
                pattern: "a\0b".to_string(),
                options: String::new(),
            })
        };
        let err = encode_document(&doc, &EncodeOptions::default()).unwrap_err();
        assert_matches!(err.kind, ErrorKind::UnsupportedValue { .. });
        assert_eq!(err.key.as_deref(), Some("r"));
    }

    #[test]
    fn max_length_enforced() {
        let doc = doc! { "key": "a longer string value" };
        let options = EncodeOptions {
            max_length: Some(8),
            ..Default::default()
        };
        let err = encode_document(&doc, &options).unwrap_err();
        assert_matches!(err.kind, ErrorKind::DocumentTooLarge { max: 8, .. });
    }

    #[test]
    fn deep_nesting_is_not_mistaken_for_a_cycle() {
        let mut doc = doc! { "leaf": 1 };
        for _ in 0..100 {
            doc = doc! { "inner": doc };
        }
        assert!(encode_document(&doc, &EncodeOptions::default()).is_ok());
    }

    #[test]
    fn repeated_sibling_subdocuments_are_not_a_cycle() {
        let shared = doc! { "x": 1 };
        let doc = doc! { "a": shared.clone(), "b": shared };
        assert!(encode_document(&doc, &EncodeOptions::default()).is_ok());
    }

    #[test]
    fn invalid_key_reports_the_key() {
        let doc = doc! { "outer": { "bad.key": 1 } };
        let options = EncodeOptions {
            invalid_key_chars: Some(".".to_string()),
            ..Default::default()
        };
        let err = encode_document(&doc, &options).unwrap_err();
        assert!(err.is_invalid_key());
        assert_eq!(err.key.as_deref(), Some("bad.key"));
    }

    #[test]
    fn array_index_reported_on_error() {
        let doc = doc! {
            "arr": [Bson::Int32(1), Bson::RegularExpression(crate::Regex {
                pattern: "\0".to_string(),
                options: String::new(),
            })]
        };
        let err = encode_document(&doc, &EncodeOptions::default()).unwrap_err();
        assert_eq!(err.index, Some(1));
    }
}
