//! In-memory value model.

use crate::acl::Acl;
use crate::encoder::Document;
use crate::geo::GeoPoint;
use crate::operation::FieldOperation;
use crate::reference::{EntityRef, FileRef, Relation};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A value that can be stored in an entity field.
///
/// This is a closed set: every variant except [`Value::Opaque`] has a wire
/// encoding, and the encoder matches on it exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number. Must be finite to be encodable.
    Float(f64),
    /// Text string.
    String(String),
    /// Point in time, encoded with millisecond precision.
    Date(DateTime<Utc>),
    /// Raw binary data.
    Bytes(Vec<u8>),
    /// A document that is already in wire form.
    Document(Document),
    /// String-keyed map. Entry order is preserved on the wire.
    Map(Vec<(String, Value)>),
    /// Geographic coordinates.
    GeoPoint(GeoPoint),
    /// Access control list.
    Acl(Acl),
    /// Ordered collection.
    Array(Vec<Value>),
    /// Unordered collection; encoded in iteration order.
    Set(Vec<Value>),
    /// Reference to a remote entity.
    Pointer(EntityRef),
    /// Reference to a stored file.
    File(FileRef),
    /// One-to-many relation.
    Relation(Relation),
    /// Pending field-level delta.
    Operation(Box<FieldOperation>),
    /// Host value with no wire representation.
    Opaque(OpaqueValue),
}

impl Value {
    /// Creates a map value, keeping the given entry order.
    pub fn map<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Bytes(_) => "bytes",
            Value::Document(_) => "document",
            Value::Map(_) => "map",
            Value::GeoPoint(_) => "geo point",
            Value::Acl(_) => "ACL",
            Value::Array(_) => "array",
            Value::Set(_) => "set",
            Value::Pointer(_) => "pointer",
            Value::File(_) => "file",
            Value::Relation(_) => "relation",
            Value::Operation(_) => "field operation",
            Value::Opaque(o) => o.type_name(),
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for integers and floats.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float, widening integers.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get this value as a string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as bytes, if it is binary.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get the elements of an array or set.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) | Value::Set(a) => Some(a),
            _ => None,
        }
    }

    /// Get the entries of a map.
    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Get the referenced entity, if this is a pointer.
    pub fn as_pointer(&self) -> Option<&EntityRef> {
        match self {
            Value::Pointer(p) => Some(p),
            _ => None,
        }
    }

    /// Look up a key in this map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<GeoPoint> for Value {
    fn from(p: GeoPoint) -> Self {
        Value::GeoPoint(p)
    }
}

impl From<Acl> for Value {
    fn from(acl: Acl) -> Self {
        Value::Acl(acl)
    }
}

impl From<EntityRef> for Value {
    fn from(r: EntityRef) -> Self {
        Value::Pointer(r)
    }
}

impl From<FileRef> for Value {
    fn from(f: FileRef) -> Self {
        Value::File(f)
    }
}

impl From<Relation> for Value {
    fn from(r: Relation) -> Self {
        Value::Relation(r)
    }
}

impl From<FieldOperation> for Value {
    fn from(op: FieldOperation) -> Self {
        Value::Operation(Box::new(op))
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

/// A host value carried through the model without a wire form.
///
/// Encoding one fails with
/// [`CodecError::UnsupportedValueType`](crate::CodecError::UnsupportedValueType)
/// naming the wrapped Rust type.
#[derive(Clone)]
pub struct OpaqueValue {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl OpaqueValue {
    /// Wraps an arbitrary value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            inner: Arc::new(value),
        }
    }

    /// Rust type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrows the wrapped value if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OpaqueValue").field(&self.type_name).finish()
    }
}

impl PartialEq for OpaqueValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
