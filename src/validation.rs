//! Key and UTF-8 validation shared by the encoder and decoder.

use std::borrow::Cow;

use crate::{
    encoder::EncodeOptions,
    error::{Error, ErrorKind, Result},
};

/// Validates a document key and applies the configured operator character
/// substitution.
///
/// A key is rejected if it is empty, contains an embedded NUL byte, or
/// contains any character named by `invalid_key_chars`. When `operator_char`
/// is set and the key starts with that character, the returned key has its
/// first character rewritten to `$` so callers can spell MongoDB operators
/// without clashing with their language's own sigils.
pub(crate) fn validate_key<'a>(key: &'a str, options: &EncodeOptions) -> Result<Cow<'a, str>> {
    if key.is_empty() {
        return Err(Error::invalid_key("key must not be empty"));
    }

    if key.as_bytes().contains(&0) {
        return Err(Error::invalid_key(format!(
            "key {:?} contains an embedded NUL byte",
            key
        )));
    }

    if let Some(forbidden) = options.invalid_key_chars.as_deref() {
        if let Some(c) = key.chars().find(|c| forbidden.contains(*c)) {
            return Err(Error::invalid_key(format!(
                "key {:?} contains forbidden character {:?}",
                key, c
            )));
        }
    }

    if let Some(op) = options.operator_char {
        if op != '$' {
            if let Some(rest) = key.strip_prefix(op) {
                let mut substituted = String::with_capacity(rest.len() + 1);
                substituted.push('$');
                substituted.push_str(rest);
                return Ok(Cow::Owned(substituted));
            }
        }
    }

    Ok(Cow::Borrowed(key))
}

/// Validates that decoded bytes are well-formed UTF-8.
///
/// `simdutf8` does the heavy lifting; the error is collapsed to
/// [`ErrorKind::InvalidUtf8`] because malicious input does not deserve a
/// byte-accurate diagnosis.
pub(crate) fn try_to_str(bytes: &[u8]) -> Result<&str> {
    simdutf8::basic::from_utf8(bytes).map_err(|_| Error::from(ErrorKind::InvalidUtf8))
}

#[cfg(test)]
mod tests {
    use super::{try_to_str, validate_key};
    use crate::encoder::EncodeOptions;

    #[test]
    fn plain_key_passes_through_borrowed() {
        let options = EncodeOptions::default();
        let key = validate_key("name", &options).unwrap();
        assert_eq!(key, "name");
        assert!(matches!(key, std::borrow::Cow::Borrowed(_)));
    }

    #[test]
    fn empty_key_rejected() {
        let options = EncodeOptions::default();
        assert!(validate_key("", &options).unwrap_err().is_invalid_key());
    }

    #[test]
    fn embedded_nul_rejected() {
        let options = EncodeOptions::default();
        assert!(validate_key("a\0b", &options).unwrap_err().is_invalid_key());
    }

    #[test]
    fn forbidden_characters_rejected() {
        let options = EncodeOptions {
            invalid_key_chars: Some(".".to_string()),
            ..Default::default()
        };
        assert!(validate_key("a.b", &options).unwrap_err().is_invalid_key());
        assert!(validate_key("ab", &options).is_ok());
    }

    #[test]
    fn operator_char_substitution() {
        let options = EncodeOptions {
            operator_char: Some(':'),
            ..Default::default()
        };
        assert_eq!(validate_key(":set", &options).unwrap(), "$set");
        // only the first character is rewritten
        assert_eq!(validate_key("a:b", &options).unwrap(), "a:b");
    }

    #[test]
    fn invalid_utf8_rejected() {
        assert!(try_to_str(&[0x66, 0x6f, 0x80]).is_err());
        assert_eq!(try_to_str(b"foo").unwrap(), "foo");
    }
}
