//! BSON definition

use std::fmt::{self, Display};

pub use crate::document::Document;
use crate::{
    Binary,
    Decimal128,
    datetime::DateTime,
    oid::{self, ObjectId},
    spec::ElementType,
};

/// Possible BSON value types.
#[derive(Clone, Default, Debug, PartialEq)]
pub enum Bson {
    /// 64-bit binary floating point
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Array
    Array(Array),
    /// Embedded document
    Document(Document),
    /// Boolean value
    Boolean(bool),
    /// Null value
    #[default]
    Null,
    /// Regular expression
    RegularExpression(Regex),
    /// JavaScript code
    JavaScriptCode(String),
    /// JavaScript code w/ scope
    JavaScriptCodeWithScope(JavaScriptCodeWithScope),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// Timestamp
    Timestamp(Timestamp),
    /// Binary data
    Binary(Binary),
    /// [ObjectId](http://dochub.mongodb.org/core/objectids)
    ObjectId(oid::ObjectId),
    /// UTC datetime
    DateTime(DateTime),
    /// Symbol (Deprecated)
    Symbol(String),
    /// [128-bit decimal floating point](https://github.com/mongodb/specifications/blob/master/source/bson-decimal128/decimal128.rst)
    Decimal128(Decimal128),
    /// Undefined value (Deprecated)
    Undefined,
    /// Max key
    MaxKey,
    /// Min key
    MinKey,
}

/// Alias for `Vec<Bson>`.
pub type Array = Vec<Bson>;

impl Display for Bson {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Bson::Double(f) => write!(fmt, "{}", f),
            Bson::String(ref s) => write!(fmt, "\"{}\"", s),
            Bson::Array(ref vec) => {
                fmt.write_str("[")?;

                let mut first = true;
                for bson in vec {
                    if !first {
                        fmt.write_str(", ")?;
                    }

                    write!(fmt, "{}", bson)?;
                    first = false;
                }

                fmt.write_str("]")
            }
            Bson::Document(ref doc) => write!(fmt, "{}", doc),
            Bson::Boolean(b) => write!(fmt, "{}", b),
            Bson::Null => write!(fmt, "null"),
            Bson::RegularExpression(ref regex) => write!(fmt, "{}", regex),
            Bson::JavaScriptCode(ref code)
            | Bson::JavaScriptCodeWithScope(JavaScriptCodeWithScope { ref code, .. }) => {
                fmt.write_str(code)
            }
            Bson::Int32(i) => write!(fmt, "{}", i),
            Bson::Int64(i) => write!(fmt, "{}", i),
            Bson::Timestamp(ts) => write!(fmt, "{}", ts),
            Bson::Binary(ref binary) => write!(fmt, "{}", binary),
            Bson::ObjectId(ref id) => write!(fmt, "ObjectId(\"{}\")", id),
            Bson::DateTime(date_time) => write!(fmt, "DateTime(\"{}\")", date_time),
            Bson::Symbol(ref sym) => write!(fmt, "Symbol(\"{}\")", sym),
            Bson::Decimal128(ref d) => write!(fmt, "{}", d),
            Bson::Undefined => write!(fmt, "undefined"),
            Bson::MinKey => write!(fmt, "MinKey"),
            Bson::MaxKey => write!(fmt, "MaxKey"),
        }
    }
}

impl From<f32> for Bson {
    fn from(a: f32) -> Bson {
        Bson::Double(a.into())
    }
}

impl From<f64> for Bson {
    fn from(a: f64) -> Bson {
        Bson::Double(a)
    }
}

impl From<&str> for Bson {
    fn from(s: &str) -> Bson {
        Bson::String(s.to_owned())
    }
}

impl From<String> for Bson {
    fn from(a: String) -> Bson {
        Bson::String(a)
    }
}

impl From<Document> for Bson {
    fn from(a: Document) -> Bson {
        Bson::Document(a)
    }
}

impl From<bool> for Bson {
    fn from(a: bool) -> Bson {
        Bson::Boolean(a)
    }
}

impl From<Regex> for Bson {
    fn from(regex: Regex) -> Bson {
        Bson::RegularExpression(regex)
    }
}

impl From<JavaScriptCodeWithScope> for Bson {
    fn from(code_with_scope: JavaScriptCodeWithScope) -> Bson {
        Bson::JavaScriptCodeWithScope(code_with_scope)
    }
}

impl From<Binary> for Bson {
    fn from(binary: Binary) -> Bson {
        Bson::Binary(binary)
    }
}

impl From<Timestamp> for Bson {
    fn from(ts: Timestamp) -> Bson {
        Bson::Timestamp(ts)
    }
}

impl From<i32> for Bson {
    fn from(a: i32) -> Bson {
        Bson::Int32(a)
    }
}

impl From<i64> for Bson {
    fn from(a: i64) -> Bson {
        Bson::Int64(a)
    }
}

impl From<u8> for Bson {
    fn from(a: u8) -> Bson {
        Bson::Int32(a.into())
    }
}

impl From<u16> for Bson {
    fn from(a: u16) -> Bson {
        Bson::Int32(a.into())
    }
}

impl From<u32> for Bson {
    fn from(a: u32) -> Bson {
        Bson::Int64(a.into())
    }
}

impl From<[u8; 12]> for Bson {
    fn from(a: [u8; 12]) -> Bson {
        Bson::ObjectId(ObjectId::from_bytes(a))
    }
}

impl From<ObjectId> for Bson {
    fn from(a: ObjectId) -> Bson {
        Bson::ObjectId(a)
    }
}

impl From<DateTime> for Bson {
    fn from(a: DateTime) -> Bson {
        Bson::DateTime(a)
    }
}

impl From<Decimal128> for Bson {
    fn from(a: Decimal128) -> Bson {
        Bson::Decimal128(a)
    }
}

impl<T> From<&T> for Bson
where
    T: Clone + Into<Bson>,
{
    fn from(t: &T) -> Bson {
        t.clone().into()
    }
}

impl<T> From<Vec<T>> for Bson
where
    T: Into<Bson>,
{
    fn from(v: Vec<T>) -> Bson {
        Bson::Array(v.into_iter().map(|val| val.into()).collect())
    }
}

impl<T> From<&[T]> for Bson
where
    T: Clone + Into<Bson>,
{
    fn from(s: &[T]) -> Bson {
        Bson::Array(s.iter().cloned().map(|val| val.into()).collect())
    }
}

impl<T: Into<Bson>> From<Option<T>> for Bson {
    fn from(a: Option<T>) -> Bson {
        match a {
            None => Bson::Null,
            Some(t) => t.into(),
        }
    }
}

impl<T: Into<Bson>> FromIterator<T> for Bson {
    /// # Examples
    ///
    /// ```
    /// use bson_codec::Bson;
    ///
    /// let x: Bson = Bson::from_iter(vec!["lorem", "ipsum", "dolor"]);
    /// // or
    /// let x: Bson = vec!["lorem", "ipsum", "dolor"].into_iter().collect();
    /// ```
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Bson::Array(iter.into_iter().map(Into::into).collect())
    }
}

impl Bson {
    /// Get the [`ElementType`] of this value.
    pub fn element_type(&self) -> ElementType {
        match *self {
            Bson::Double(..) => ElementType::Double,
            Bson::String(..) => ElementType::String,
            Bson::Array(..) => ElementType::Array,
            Bson::Document(..) => ElementType::EmbeddedDocument,
            Bson::Boolean(..) => ElementType::Boolean,
            Bson::Null => ElementType::Null,
            Bson::RegularExpression(..) => ElementType::RegularExpression,
            Bson::JavaScriptCode(..) => ElementType::JavaScriptCode,
            Bson::JavaScriptCodeWithScope(..) => ElementType::JavaScriptCodeWithScope,
            Bson::Int32(..) => ElementType::Int32,
            Bson::Int64(..) => ElementType::Int64,
            Bson::Timestamp(..) => ElementType::Timestamp,
            Bson::Binary(..) => ElementType::Binary,
            Bson::ObjectId(..) => ElementType::ObjectId,
            Bson::DateTime(..) => ElementType::DateTime,
            Bson::Symbol(..) => ElementType::Symbol,
            Bson::Decimal128(..) => ElementType::Decimal128,
            Bson::Undefined => ElementType::Undefined,
            Bson::MaxKey => ElementType::MaxKey,
            Bson::MinKey => ElementType::MinKey,
        }
    }

    /// If `self` is a `Double`, returns its value. Returns `None` otherwise.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Bson::Double(v) => Some(v),
            _ => None,
        }
    }

    /// If `self` is a `String`, returns its value. Returns `None` otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match *self {
            Bson::String(ref s) => Some(s),
            _ => None,
        }
    }

    /// If `self` is an `Array`, returns its value. Returns `None` otherwise.
    pub fn as_array(&self) -> Option<&Array> {
        match *self {
            Bson::Array(ref v) => Some(v),
            _ => None,
        }
    }

    /// If `self` is a `Document`, returns its value. Returns `None` otherwise.
    pub fn as_document(&self) -> Option<&Document> {
        match *self {
            Bson::Document(ref v) => Some(v),
            _ => None,
        }
    }

    /// If `self` is a `Boolean`, returns its value. Returns `None` otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Bson::Boolean(v) => Some(v),
            _ => None,
        }
    }

    /// If `self` is an `Int32`, returns its value. Returns `None` otherwise.
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Bson::Int32(v) => Some(v),
            _ => None,
        }
    }

    /// If `self` is an `Int64`, returns its value. Returns `None` otherwise.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Bson::Int64(v) => Some(v),
            _ => None,
        }
    }

    /// If `self` is an `ObjectId`, returns its value. Returns `None` otherwise.
    pub fn as_object_id(&self) -> Option<ObjectId> {
        match *self {
            Bson::ObjectId(v) => Some(v),
            _ => None,
        }
    }

    /// If `self` is a `DateTime`, returns its value. Returns `None` otherwise.
    pub fn as_datetime(&self) -> Option<&DateTime> {
        match *self {
            Bson::DateTime(ref v) => Some(v),
            _ => None,
        }
    }

    /// If `self` is a `Null`, returns `()`. Returns `None` otherwise.
    pub fn as_null(&self) -> Option<()> {
        match *self {
            Bson::Null => Some(()),
            _ => None,
        }
    }

    /// If `self` is a `Timestamp`, returns its value. Returns `None` otherwise.
    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match *self {
            Bson::Timestamp(timestamp) => Some(timestamp),
            _ => None,
        }
    }
}

/// Represents a BSON timestamp value.
///
/// This type is used internally by the server for sharding and replication;
/// despite the name it is *not* a wall-clock timestamp. Ordering is
/// lexicographic on `(time, increment)`.
#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Hash, Default)]
pub struct Timestamp {
    /// The number of seconds since the Unix epoch.
    pub time: u32,

    /// An incrementing value to order timestamps with the same number of
    /// seconds in the `time` field.
    pub increment: u32,
}

impl Display for Timestamp {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "Timestamp({}, {})", self.time, self.increment)
    }
}

/// Represents a BSON regular expression value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Regex {
    /// The regex pattern to match.
    pub pattern: String,

    /// The options for the regex. Only the characters `i`, `l`, `m`, `s` and
    /// `x` are meaningful to the server; they are stored in ascending
    /// alphabetical order.
    pub options: String,
}

impl Regex {
    /// The option characters the server recognizes.
    const VALID_OPTIONS: &'static str = "ilmsx";

    /// Creates a new [`Regex`], normalizing `options`: supported option
    /// characters are deduplicated and sorted, any others are discarded.
    pub fn new(pattern: impl Into<String>, options: impl AsRef<str>) -> Self {
        Self {
            pattern: pattern.into(),
            options: Self::normalize_options(options.as_ref()),
        }
    }

    pub(crate) fn normalize_options(options: &str) -> String {
        let mut chars: Vec<_> = options
            .chars()
            .filter(|c| Self::VALID_OPTIONS.contains(*c))
            .collect();
        chars.sort_unstable();
        chars.dedup();
        chars.into_iter().collect()
    }
}

impl Display for Regex {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "/{}/{}", self.pattern, self.options)
    }
}

/// Represents a BSON code with scope value.
#[derive(Debug, Clone, PartialEq)]
pub struct JavaScriptCodeWithScope {
    /// The JavaScript code.
    pub code: String,

    /// The scope document containing variable bindings.
    pub scope: Document,
}

impl Display for JavaScriptCodeWithScope {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(&self.code)
    }
}

/// A DBRef is a [by-convention document shape](https://www.mongodb.com/docs/manual/reference/database-references/)
/// referring to a document in another collection: the keys `$ref` and `$id`
/// first, in that order, optionally followed by `$db`. It is not a distinct
/// wire type; the encoder treats it as an ordinary document, and the decoder
/// can hand detected DBRefs to a caller-supplied transform (see
/// [`DecodeOptions`](crate::DecodeOptions)).
#[derive(Debug, Clone, PartialEq)]
pub struct DbRef {
    /// The collection the referenced document lives in.
    pub collection: String,

    /// The value of the `_id` of the referenced document.
    pub id: Box<Bson>,

    /// The database the referenced document lives in, if different.
    pub database: Option<String>,
}

impl DbRef {
    /// Extracts a `DbRef` from a document matching the DBRef key pattern.
    /// Returns `None` if the document does not match.
    pub fn from_document(doc: &Document) -> Option<DbRef> {
        let mut iter = doc.iter();

        let (ref_key, collection) = iter.next()?;
        if ref_key != "$ref" {
            return None;
        }
        let collection = collection.as_str()?.to_owned();

        let (id_key, id) = iter.next()?;
        if id_key != "$id" {
            return None;
        }
        let id = Box::new(id.clone());

        let database = match iter.next() {
            Some((db_key, Bson::String(db))) if db_key == "$db" => Some(db.clone()),
            _ => None,
        };

        Some(DbRef {
            collection,
            id,
            database,
        })
    }
}
