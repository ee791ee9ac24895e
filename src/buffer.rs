//! Growable little-endian output buffer used by the encoder.

use crate::error::{Error, ErrorKind, Result};

/// Doubling the capacity of a large buffer wastes memory, so past this
/// threshold growth switches to fixed increments.
const GROW_SLOWLY_THRESHOLD: usize = 1024 * 1024;

/// Fixed growth increment once the buffer has passed the threshold.
const GROW_INCREMENT: usize = 4096;

/// An append-only byte buffer for BSON output.
///
/// All multi-byte writes are little-endian. Document lengths are handled with
/// [`begin_doc`](Buffer::begin_doc), which reserves a four byte placeholder,
/// and [`patch_length`](Buffer::patch_length), which overwrites it once the
/// document body has been written.
#[derive(Debug, Default)]
pub(crate) struct Buffer {
    bytes: Vec<u8>,
}

impl Buffer {
    pub(crate) fn new() -> Buffer {
        Buffer { bytes: Vec::new() }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    /// Ensures capacity for `additional` more bytes, doubling small buffers
    /// and growing large ones by fixed increments.
    fn reserve(&mut self, additional: usize) {
        let needed = self.bytes.len() + additional;
        if needed <= self.bytes.capacity() {
            return;
        }
        let mut capacity = self.bytes.capacity().max(64);
        while capacity < needed {
            if capacity >= GROW_SLOWLY_THRESHOLD {
                capacity += GROW_INCREMENT.max(needed - capacity);
            } else {
                capacity *= 2;
            }
        }
        self.bytes.reserve_exact(capacity - self.bytes.len());
    }

    pub(crate) fn write_u8(&mut self, value: u8) {
        self.reserve(1);
        self.bytes.push(value);
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.bytes.extend_from_slice(bytes);
    }

    /// Writes a NUL-terminated string. The caller must have validated that
    /// `s` contains no interior NUL byte.
    pub(crate) fn write_cstring(&mut self, s: &str) {
        self.reserve(s.len() + 1);
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
    }

    /// Writes a length-prefixed string: int32 byte count including the
    /// trailing NUL, then the bytes, then the NUL. Fails if the count does
    /// not fit the int32 prefix.
    pub(crate) fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_i32(string_prefix(s.len())?);
        self.write_cstring(s);
        Ok(())
    }

    pub(crate) fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub(crate) fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub(crate) fn write_i64(&mut self, value: i64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub(crate) fn write_f64(&mut self, value: f64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Reserves four bytes for a document length and returns the offset of
    /// the placeholder for a later [`patch_length`](Buffer::patch_length).
    pub(crate) fn begin_doc(&mut self) -> usize {
        let start = self.bytes.len();
        self.write_i32(0);
        start
    }

    /// Overwrites the placeholder at `start` with the number of bytes written
    /// since [`begin_doc`](Buffer::begin_doc), including the placeholder
    /// itself. Fails if the span does not fit the int32 prefix.
    pub(crate) fn patch_length(&mut self, start: usize) -> Result<()> {
        let length = doc_length(self.bytes.len() - start)?;
        self.bytes[start..start + 4].copy_from_slice(&length.to_le_bytes());
        Ok(())
    }

    /// Fails with `DocumentTooLarge` if the buffer has outgrown `max`.
    pub(crate) fn check_max_length(&self, max: Option<usize>) -> Result<()> {
        if let Some(max) = max {
            if self.bytes.len() > max {
                return Err(Error::from(ErrorKind::DocumentTooLarge {
                    size: self.bytes.len(),
                    max,
                }));
            }
        }
        Ok(())
    }
}

/// Computes the int32 length prefix for a string payload, counting the
/// trailing NUL. The wire format cannot frame anything longer.
pub(crate) fn string_prefix(len: usize) -> Result<i32> {
    let with_nul = len + 1;
    if with_nul > i32::MAX as usize {
        return Err(Error::unsupported_value(format!(
            "string of {} bytes cannot be length-prefixed",
            len
        )));
    }
    Ok(with_nul as i32)
}

/// Computes the int32 length prefix for a document spanning `span` bytes.
pub(crate) fn doc_length(span: usize) -> Result<i32> {
    if span > i32::MAX as usize {
        return Err(Error::from(ErrorKind::DocumentTooLarge {
            size: span,
            max: i32::MAX as usize,
        }));
    }
    Ok(span as i32)
}

#[cfg(test)]
mod tests {
    use super::{Buffer, doc_length, string_prefix};
    use crate::ErrorKind;
    use assert_matches::assert_matches;

    #[test]
    fn little_endian_scalars() {
        let mut buf = Buffer::new();
        buf.write_i32(1);
        buf.write_i64(-2);
        buf.write_f64(1.5);
        let bytes = buf.into_vec();
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[4..12], &(-2i64).to_le_bytes());
        assert_eq!(&bytes[12..20], &1.5f64.to_le_bytes());
    }

    #[test]
    fn cstring_and_string() {
        let mut buf = Buffer::new();
        buf.write_cstring("ab");
        buf.write_string("cd").unwrap();
        assert_eq!(buf.into_vec(), vec![b'a', b'b', 0, 3, 0, 0, 0, b'c', b'd', 0]);
    }

    #[test]
    fn patch_back_counts_from_placeholder() {
        let mut buf = Buffer::new();
        buf.write_u8(0xFF);
        let start = buf.begin_doc();
        buf.write_u8(0x0A);
        buf.write_u8(0x00);
        buf.patch_length(start).unwrap();
        let bytes = buf.into_vec();
        // 4 byte prefix + 2 body bytes = 6
        assert_eq!(&bytes[1..5], &[6, 0, 0, 0]);
    }

    #[test]
    fn nested_patches_are_independent() {
        let mut buf = Buffer::new();
        let outer = buf.begin_doc();
        let inner = buf.begin_doc();
        buf.write_u8(0);
        buf.patch_length(inner).unwrap();
        buf.write_u8(0);
        buf.patch_length(outer).unwrap();
        let bytes = buf.into_vec();
        assert_eq!(&bytes[0..4], &[10, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[5, 0, 0, 0]);
    }

    #[test]
    fn length_prefixes_refuse_to_wrap() {
        assert_eq!(string_prefix(4).unwrap(), 5);
        assert_eq!(string_prefix(i32::MAX as usize - 1).unwrap(), i32::MAX);
        // i32::MAX bytes of string plus its NUL no longer fits the prefix
        assert!(string_prefix(i32::MAX as usize).is_err());
        assert!(string_prefix(1 << 31).is_err());

        assert_eq!(doc_length(5).unwrap(), 5);
        assert_eq!(doc_length(i32::MAX as usize).unwrap(), i32::MAX);
        assert_matches!(
            doc_length(i32::MAX as usize + 1).unwrap_err().kind,
            ErrorKind::DocumentTooLarge { .. }
        );
    }

    #[test]
    fn grows_past_threshold() {
        let mut buf = Buffer::new();
        let chunk = [0u8; 8192];
        for _ in 0..200 {
            buf.write_bytes(&chunk);
        }
        assert_eq!(buf.len(), 200 * 8192);
    }
}
