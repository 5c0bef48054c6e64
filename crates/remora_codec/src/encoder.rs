//! Value to wire-document encoding.

use crate::date::format_date;
use crate::error::{CodecError, CodecResult};
use crate::reference::EntityRef;
use crate::value::Value;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Number};

/// The wire format: a JSON tree with key order preserved.
pub type Document = serde_json::Value;

/// Converts [`Value`]s into wire documents.
///
/// Implementors only decide how references to other entities are written;
/// everything else is handled by the provided [`Encoder::encode`]. Encoders
/// hold no mutable state and may be shared across threads.
pub trait Encoder: Send + Sync {
    /// Encodes a reference to another entity.
    ///
    /// This is the only place an entity appears inside another document,
    /// and it must produce a pointer token rather than the entity body.
    fn encode_related_object(&self, object: &EntityRef) -> CodecResult<Document>;

    /// Encodes a date as `{"__type": "Date", "iso": ...}`.
    fn encode_date(&self, date: &DateTime<Utc>) -> Document {
        json!({
            "__type": "Date",
            "iso": format_date(date),
        })
    }

    /// Encodes a value.
    ///
    /// # Errors
    ///
    /// Fails with [`CodecError::UnsupportedValueType`] for opaque host values,
    /// [`CodecError::NonFiniteNumber`] for NaN or infinite floats, and with
    /// whatever the reference hook returns for entity references.
    fn encode(&self, value: &Value) -> CodecResult<Document> {
        match value {
            Value::Pointer(object) => self.encode_related_object(object),
            Value::Date(date) => Ok(self.encode_date(date)),
            Value::Bytes(bytes) => Ok(json!({
                "__type": "Bytes",
                "base64": STANDARD.encode(bytes),
            })),
            Value::File(file) => Ok(file.to_document()),
            Value::Null => Ok(Document::Null),
            Value::Bool(b) => Ok(Document::Bool(*b)),
            Value::Integer(n) => Ok(Document::from(*n)),
            Value::Float(f) => Number::from_f64(*f)
                .map(Document::Number)
                .ok_or(CodecError::NonFiniteNumber),
            Value::String(s) => Ok(Document::String(s.clone())),
            Value::Document(doc) => Ok(doc.clone()),
            Value::Map(pairs) => {
                let mut map = Map::with_capacity(pairs.len());
                for (key, item) in pairs {
                    map.insert(key.clone(), self.encode(item)?);
                }
                Ok(Document::Object(map))
            }
            Value::GeoPoint(point) => Ok(point.to_document()),
            Value::Acl(acl) => acl.to_document(self),
            Value::Array(items) | Value::Set(items) => items
                .iter()
                .map(|item| self.encode(item))
                .collect::<CodecResult<Vec<_>>>()
                .map(Document::Array),
            Value::Relation(relation) => relation.to_document(self),
            Value::Operation(op) => op.encode(self),
            Value::Opaque(opaque) => Err(CodecError::unsupported_value_type(opaque.type_name())),
        }
    }
}

/// Writes references as pointers with the server object id.
///
/// Used when saving: a reference to an unsaved entity cannot be expressed
/// and fails with [`CodecError::UnsavedReference`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PointerEncoder;

impl Encoder for PointerEncoder {
    fn encode_related_object(&self, object: &EntityRef) -> CodecResult<Document> {
        match object.object_id() {
            Some(id) => Ok(object.pointer_document(id)),
            None => Err(CodecError::unsaved_reference(object.class_name())),
        }
    }
}

/// Writes references as pointers, falling back to the local id for
/// entities that have not been saved yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointerOrLocalIdEncoder;

impl Encoder for PointerOrLocalIdEncoder {
    fn encode_related_object(&self, object: &EntityRef) -> CodecResult<Document> {
        match (object.object_id(), object.local_id()) {
            (Some(id), _) => Ok(object.pointer_document(id)),
            (None, Some(local)) => Ok(object.local_pointer_document(local)),
            (None, None) => Err(CodecError::unsaved_reference(object.class_name())),
        }
    }
}

/// Rejects every entity reference.
///
/// For documents that must be self-contained, such as configuration
/// payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObjectsEncoder;

impl Encoder for NoObjectsEncoder {
    fn encode_related_object(&self, object: &EntityRef) -> CodecResult<Document> {
        Err(CodecError::ReferencesNotAllowed {
            class_name: object.class_name().to_string(),
        })
    }
}
