//! Module containing functionality related to BSON binary values.

use std::fmt::{self, Display};

use crate::{base64, spec::BinarySubtype};

/// Represents a BSON binary value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binary {
    /// The subtype of the bytes.
    pub subtype: BinarySubtype,

    /// The binary bytes.
    pub bytes: Vec<u8>,
}

impl Display for Binary {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "Binary({:#x}, {})",
            u8::from(self.subtype),
            base64::encode(&self.bytes)
        )
    }
}

impl Binary {
    /// Creates a [`Binary`] from a base64 string and optional [`BinarySubtype`].
    /// If the `subtype` argument is [`None`], the [`Binary`] constructed
    /// defaults to [`BinarySubtype::Generic`].
    pub fn from_base64(
        input: impl AsRef<str>,
        subtype: impl Into<Option<BinarySubtype>>,
    ) -> Result<Self> {
        let bytes = base64::decode(input.as_ref()).map_err(|e| Error::DecodingError {
            message: e.to_string(),
        })?;
        let subtype = subtype.into().unwrap_or(BinarySubtype::Generic);
        Ok(Binary { subtype, bytes })
    }
}

impl<T: Into<Vec<u8>>> From<T> for Binary {
    fn from(bytes: T) -> Self {
        Binary {
            subtype: BinarySubtype::Generic,
            bytes: bytes.into(),
        }
    }
}

/// Possible errors that can arise during [`Binary`] construction.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Error {
    /// While trying to decode from base64, an error was returned.
    #[non_exhaustive]
    DecodingError { message: String },
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::DecodingError { message: m } => fmt.write_str(m),
        }
    }
}

/// Alias for `Result<T, binary::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
