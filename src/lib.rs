//! BSON is a binary format in which zero or more key/value pairs are stored
//! as a single entity, called a document. This crate implements the codec for
//! version 1.1 of the [BSON standard](http://bsonspec.org/spec.html): an
//! ordered [`Document`] model, an encoder, and a decoder that is safe to feed
//! untrusted bytes.
//!
//! ## Basic usage
//!
//! ```rust
//! use bson_codec::{doc, DecodeOptions, EncodeOptions, encode_document, decode_document};
//!
//! let doc = doc! {
//!     "title": "Jabberwocky",
//!     "year": 1871,
//! };
//!
//! let bytes = encode_document(&doc, &EncodeOptions::default())?;
//! let decoded = decode_document(&bytes, &DecodeOptions::default())?;
//! assert_eq!(doc, decoded);
//! # Ok::<(), bson_codec::Error>(())
//! ```

pub use self::{
    binary::Binary,
    bson::{Array, Bson, DbRef, JavaScriptCodeWithScope, Regex, Timestamp},
    datetime::DateTime,
    decimal128::Decimal128,
    decoder::{DateRepresentation, DbRefTransform, DecodeOptions, decode_document},
    document::{Document, ValueAccessError, ValueAccessResult},
    encoder::{EncodeOptions, encode_document},
    error::{Error, ErrorKind, Result},
    oid::ObjectId,
};

#[macro_use]
pub mod macros;
mod base64;
pub mod binary;
mod bson;
mod buffer;
pub mod datetime;
pub mod decimal128;
mod decoder;
pub mod document;
mod encoder;
mod error;
pub mod oid;
pub mod spec;
mod validation;
