//! Module containing functionality related to BSON ObjectIds.

use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU32, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use hex::FromHexError;
use rand::{Rng, random};
use thiserror::Error as ThisError;

static OID_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Errors that can occur during [`ObjectId`] construction. These are
/// construction-time errors, distinct from the codec error taxonomy.
#[derive(Clone, Debug, ThisError)]
#[non_exhaustive]
pub enum Error {
    /// An invalid character was found in the provided hex string. Valid
    /// characters are: `0...9`, `a...f`, or `A...F`.
    #[error("invalid character '{c}' encountered at index {index}")]
    #[non_exhaustive]
    InvalidHexStringCharacter { c: char, index: usize },

    /// An `ObjectId` hex string with an invalid length was encountered.
    #[error("invalid hex string length {length}")]
    #[non_exhaustive]
    InvalidHexStringLength { length: usize },
}

/// Alias for `Result<T, oid::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// A wrapper around a raw 12-byte ObjectId.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId {
    id: [u8; 12],
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectId {
    /// Generates a new [`ObjectId`], represented in bytes.
    /// See the [docs](http://www.mongodb.com/docs/manual/reference/object-id/)
    /// for more information.
    pub fn new() -> Self {
        let timestamp = Self::gen_timestamp();
        let process_unique = Self::gen_process_unique();
        let counter = Self::gen_count();

        let mut buf = [0u8; 12];
        buf[0..4].copy_from_slice(&timestamp);
        buf[4..9].copy_from_slice(&process_unique);
        buf[9..12].copy_from_slice(&counter);

        Self::from_bytes(buf)
    }

    /// Constructs a new [`ObjectId`] wrapper around the raw byte representation.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self { id: bytes }
    }

    /// Creates an [`ObjectId`] from a 24-character hexadecimal string.
    pub fn parse_str(s: impl AsRef<str>) -> Result<Self> {
        let s = s.as_ref();

        let mut bytes = [0u8; 12];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| match e {
            FromHexError::InvalidHexCharacter { c, index } => {
                Error::InvalidHexStringCharacter { c, index }
            }
            FromHexError::InvalidStringLength | FromHexError::OddLength => {
                Error::InvalidHexStringLength { length: s.len() }
            }
        })?;
        Ok(Self::from_bytes(bytes))
    }

    /// Retrieves the timestamp from an [`ObjectId`] as seconds since the Unix
    /// epoch.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes(self.id[0..4].try_into().expect("timestamp is four bytes"))
    }

    /// Returns the raw byte representation of an ObjectId.
    pub const fn bytes(&self) -> [u8; 12] {
        self.id
    }

    /// Converts the objectId to hex representation.
    pub fn to_hex(self) -> String {
        hex::encode(self.id)
    }

    // The first four bytes are the current seconds since epoch, big endian.
    fn gen_timestamp() -> [u8; 4] {
        let timestamp: u32 = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        timestamp.to_be_bytes()
    }

    // Five random bytes, unique per process.
    fn gen_process_unique() -> [u8; 5] {
        static PROCESS_UNIQUE: std::sync::OnceLock<[u8; 5]> = std::sync::OnceLock::new();
        *PROCESS_UNIQUE.get_or_init(random)
    }

    // An incrementing 3-byte count, randomly seeded, big endian.
    fn gen_count() -> [u8; 3] {
        static SEEDED: std::sync::Once = std::sync::Once::new();
        SEEDED.call_once(|| {
            let start = rand::rng().random_range(0..=0xFF_FFFF);
            OID_COUNTER.store(start, Ordering::SeqCst);
        });

        let count = OID_COUNTER.fetch_add(1, Ordering::SeqCst) % (0xFF_FFFF + 1);
        let [_, b1, b2, b3] = count.to_be_bytes();
        [b1, b2, b3]
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_str(s)
    }
}

impl From<[u8; 12]> for ObjectId {
    fn from(bytes: [u8; 12]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("ObjectId").field(&self.to_hex()).finish()
    }
}
