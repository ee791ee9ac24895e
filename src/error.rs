//! Errors that can occur while encoding or decoding BSON.

use thiserror::Error;

/// The result type for all codec operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur while encoding or decoding BSON.
#[derive(Debug, Error)]
#[non_exhaustive]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,

    /// The document key associated with the error, if any.
    pub key: Option<String>,

    /// The array index associated with the error, if any.
    pub index: Option<usize>,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(key) = self.key.as_deref() {
            write!(f, "Error at key \"{key}\": ")?;
        } else if let Some(index) = self.index {
            write!(f, "Error at array index {index}: ")?;
        }

        write!(f, "{}", self.kind)
    }
}

/// The types of errors that can occur while encoding or decoding BSON.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A document key was empty, contained an embedded NUL byte, or contained
    /// a character forbidden by the caller.
    #[error("Invalid key: {message}")]
    #[non_exhaustive]
    InvalidKey { message: String },

    /// A string value was not well-formed UTF-8.
    #[error("Invalid UTF-8")]
    InvalidUtf8,

    /// A document or array contained itself, directly or transitively.
    #[error("Circular reference detected while encoding")]
    CircularReference,

    /// The encoded document would exceed the configured maximum size.
    #[error("Document size {size} exceeds maximum of {max} bytes")]
    #[non_exhaustive]
    DocumentTooLarge { size: usize, max: usize },

    /// A value could not be represented in BSON.
    #[error("Unsupported value: {message}")]
    #[non_exhaustive]
    UnsupportedValue { message: String },

    /// The input ended before a declared length was satisfied.
    #[error("Truncated BSON: {message}")]
    #[non_exhaustive]
    Truncated { message: String },

    /// A document's declared length did not match its actual encoded span.
    #[error("Declared document length {declared} does not match its {actual} byte span")]
    #[non_exhaustive]
    LengthMismatch { declared: i32, actual: usize },

    /// An unrecognized element type tag was encountered while decoding.
    #[error("Unsupported element type tag {tag:#04x}")]
    #[non_exhaustive]
    UnsupportedType { tag: u8 },

    /// Decode input nested documents or arrays beyond the supported depth.
    #[error("Document nesting exceeds the {max} level limit")]
    #[non_exhaustive]
    ExceededDepthLimit { max: usize },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            key: None,
            index: None,
        }
    }
}

impl Error {
    pub(crate) fn with_key(mut self, key: impl Into<String>) -> Self {
        if self.key.is_none() && self.index.is_none() {
            self.key = Some(key.into());
        }
        self
    }

    pub(crate) fn with_index(mut self, index: usize) -> Self {
        if self.key.is_none() && self.index.is_none() {
            self.index = Some(index);
        }
        self
    }

    pub(crate) fn invalid_key(message: impl ToString) -> Self {
        ErrorKind::InvalidKey {
            message: message.to_string(),
        }
        .into()
    }

    pub(crate) fn unsupported_value(message: impl ToString) -> Self {
        ErrorKind::UnsupportedValue {
            message: message.to_string(),
        }
        .into()
    }

    pub(crate) fn truncated(message: impl ToString) -> Self {
        ErrorKind::Truncated {
            message: message.to_string(),
        }
        .into()
    }

    #[cfg(test)]
    pub(crate) fn is_truncated(&self) -> bool {
        matches!(self.kind, ErrorKind::Truncated { .. })
    }

    #[cfg(test)]
    pub(crate) fn is_invalid_key(&self) -> bool {
        matches!(self.kind, ErrorKind::InvalidKey { .. })
    }
}
