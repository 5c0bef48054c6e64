//! Wire-document to value decoding.

use crate::date::parse_date;
use crate::encoder::Document;
use crate::error::{CodecError, CodecResult};
use crate::geo::GeoPoint;
use crate::operation::{FieldOperation, Number};
use crate::reference::{EntityRef, FileRef, Relation};
use crate::value::Value;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Map;

/// Maximum nesting depth accepted from the wire.
const MAX_DEPTH: usize = 512;

/// Decode a wire document into a value.
///
/// Tagged objects (`__type`, `__op`) become their typed variants; any other
/// object becomes a [`Value::Map`] in wire order.
///
/// # Errors
///
/// Returns an error for unknown tags, malformed tagged objects, or
/// documents nested deeper than the decoder accepts.
pub fn decode(doc: &Document) -> CodecResult<Value> {
    Decoder::new().decode(doc)
}

/// A document decoder with a nesting limit.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    max_depth: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Create a decoder with the default nesting limit.
    pub fn new() -> Self {
        Self {
            max_depth: MAX_DEPTH,
        }
    }

    /// Create a decoder with a custom nesting limit.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Decode a document.
    pub fn decode(&self, doc: &Document) -> CodecResult<Value> {
        self.decode_at(doc, 0)
    }

    fn decode_at(&self, doc: &Document, depth: usize) -> CodecResult<Value> {
        if depth > self.max_depth {
            return Err(CodecError::DepthExceeded {
                max_depth: self.max_depth,
            });
        }
        match doc {
            Document::Null => Ok(Value::Null),
            Document::Bool(b) => Ok(Value::Bool(*b)),
            Document::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Integer(i)),
                None => n
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| CodecError::decoding_failed(format!("unrepresentable number {n}"))),
            },
            Document::String(s) => Ok(Value::String(s.clone())),
            Document::Array(items) => items
                .iter()
                .map(|item| self.decode_at(item, depth + 1))
                .collect::<CodecResult<Vec<_>>>()
                .map(Value::Array),
            Document::Object(map) => {
                if let Some(op) = map.get("__op") {
                    let name = op
                        .as_str()
                        .ok_or_else(|| CodecError::decoding_failed("__op must be a string"))?;
                    return self.decode_operation(name, map, depth).map(Value::from);
                }
                if let Some(tag) = map.get("__type") {
                    let name = tag
                        .as_str()
                        .ok_or_else(|| CodecError::decoding_failed("__type must be a string"))?;
                    return self.decode_typed(name, map, depth);
                }
                let mut pairs = Vec::with_capacity(map.len());
                for (key, item) in map {
                    pairs.push((key.clone(), self.decode_at(item, depth + 1)?));
                }
                Ok(Value::Map(pairs))
            }
        }
    }

    fn decode_typed(&self, tag: &str, map: &Map<String, Document>, depth: usize) -> CodecResult<Value> {
        match tag {
            "Date" => parse_date(required_str(map, tag, "iso")?).map(Value::Date),
            "Bytes" => STANDARD
                .decode(required_str(map, tag, "base64")?)
                .map(Value::Bytes)
                .map_err(|e| CodecError::decoding_failed(format!("invalid base64: {e}"))),
            "Pointer" => decode_pointer(map).map(Value::Pointer),
            "File" => Ok(Value::File(FileRef::new(
                required_str(map, tag, "name")?,
                optional_str(map, "url").map(str::to_string),
            ))),
            "GeoPoint" => GeoPoint::new(
                required_f64(map, tag, "latitude")?,
                required_f64(map, tag, "longitude")?,
            )
            .map(Value::GeoPoint),
            "Relation" => {
                let mut relation = Relation::new(required_str(map, tag, "className")?);
                for entity in self.decode_pointer_list(map, depth)? {
                    relation.add_known(entity);
                }
                Ok(Value::Relation(relation))
            }
            other => Err(CodecError::unknown_type_tag(other)),
        }
    }

    fn decode_operation(
        &self,
        name: &str,
        map: &Map<String, Document>,
        depth: usize,
    ) -> CodecResult<FieldOperation> {
        match name {
            "Delete" => Ok(FieldOperation::Delete),
            "Increment" => match self.decode_at(required(map, name, "amount")?, depth + 1)? {
                Value::Integer(n) => Ok(FieldOperation::Increment(Number::Integer(n))),
                Value::Float(f) => Ok(FieldOperation::Increment(Number::Float(f))),
                other => Err(CodecError::decoding_failed(format!(
                    "Increment amount must be a number, got {}",
                    other.type_name()
                ))),
            },
            "Add" => self.decode_objects(map, name, depth).map(FieldOperation::Add),
            "AddUnique" => self.decode_objects(map, name, depth).map(FieldOperation::AddUnique),
            "Remove" => self.decode_objects(map, name, depth).map(FieldOperation::Remove),
            "AddRelation" | "RemoveRelation" => {
                let entities = self.decode_pointer_list(map, depth)?;
                let target_class = entities
                    .first()
                    .map(|e| e.class_name().to_string())
                    .ok_or_else(|| CodecError::decoding_failed(format!("{name} without objects")))?;
                if name == "AddRelation" {
                    FieldOperation::relation(target_class, entities, Vec::new())
                } else {
                    FieldOperation::relation(target_class, Vec::new(), entities)
                }
            }
            "Batch" => {
                let ops = required(map, name, "ops")?
                    .as_array()
                    .ok_or_else(|| CodecError::decoding_failed("Batch ops must be an array"))?;
                let mut merged: Option<FieldOperation> = None;
                for op in ops {
                    let next = match self.decode_at(op, depth + 1)? {
                        Value::Operation(op) => *op,
                        other => {
                            return Err(CodecError::decoding_failed(format!(
                                "Batch entry must be an operation, got {}",
                                other.type_name()
                            )))
                        }
                    };
                    merged = Some(next.merge_with_previous(merged.as_ref())?);
                }
                merged.ok_or_else(|| CodecError::decoding_failed("empty Batch"))
            }
            other => Err(CodecError::unknown_type_tag(other)),
        }
    }

    fn decode_objects(
        &self,
        map: &Map<String, Document>,
        op: &str,
        depth: usize,
    ) -> CodecResult<Vec<Value>> {
        let objects = required(map, op, "objects")?
            .as_array()
            .ok_or_else(|| CodecError::decoding_failed(format!("{op} objects must be an array")))?;
        objects
            .iter()
            .map(|item| self.decode_at(item, depth + 1))
            .collect()
    }

    fn decode_pointer_list(
        &self,
        map: &Map<String, Document>,
        depth: usize,
    ) -> CodecResult<Vec<EntityRef>> {
        let Some(objects) = map.get("objects") else {
            return Ok(Vec::new());
        };
        let objects = objects
            .as_array()
            .ok_or_else(|| CodecError::decoding_failed("relation objects must be an array"))?;
        objects
            .iter()
            .map(|item| match self.decode_at(item, depth + 1)? {
                Value::Pointer(entity) => Ok(entity),
                other => Err(CodecError::decoding_failed(format!(
                    "relation member must be a pointer, got {}",
                    other.type_name()
                ))),
            })
            .collect()
    }
}

fn decode_pointer(map: &Map<String, Document>) -> CodecResult<EntityRef> {
    let class_name = required_str(map, "Pointer", "className")?;
    let object_id = optional_str(map, "objectId").map(str::to_string);
    let local_id = optional_str(map, "localId").map(str::to_string);
    if object_id.is_none() && local_id.is_none() {
        return Err(CodecError::decoding_failed(
            "Pointer needs an objectId or a localId",
        ));
    }
    Ok(EntityRef::new(class_name, object_id, local_id))
}

fn required<'a>(map: &'a Map<String, Document>, tag: &str, key: &str) -> CodecResult<&'a Document> {
    map.get(key)
        .ok_or_else(|| CodecError::decoding_failed(format!("{tag} is missing {key}")))
}

fn required_str<'a>(map: &'a Map<String, Document>, tag: &str, key: &str) -> CodecResult<&'a str> {
    required(map, tag, key)?
        .as_str()
        .ok_or_else(|| CodecError::decoding_failed(format!("{tag} {key} must be a string")))
}

fn required_f64(map: &Map<String, Document>, tag: &str, key: &str) -> CodecResult<f64> {
    required(map, tag, key)?
        .as_f64()
        .ok_or_else(|| CodecError::decoding_failed(format!("{tag} {key} must be a number")))
}

fn optional_str<'a>(map: &'a Map<String, Document>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Document::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{Encoder, PointerOrLocalIdEncoder};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn decode_scalars() {
        assert_eq!(decode(&json!(null)).unwrap(), Value::Null);
        assert_eq!(decode(&json!(false)).unwrap(), Value::Bool(false));
        assert_eq!(decode(&json!(12)).unwrap(), Value::Integer(12));
        assert_eq!(decode(&json!(1.25)).unwrap(), Value::Float(1.25));
        assert_eq!(decode(&json!("s")).unwrap(), Value::from("s"));
    }

    #[test]
    fn decode_plain_object_keeps_order() {
        let value = decode(&json!({"b": 1, "a": [true]})).unwrap();
        assert_eq!(
            value,
            Value::map([
                ("b", Value::Integer(1)),
                ("a", Value::Array(vec![Value::Bool(true)])),
            ])
        );
    }

    #[test]
    fn decode_typed_values() {
        assert_eq!(
            decode(&json!({"__type": "Date", "iso": "2021-03-04T05:06:07.089Z"})).unwrap(),
            Value::Date(
                Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap()
                    + chrono::Duration::milliseconds(89)
            )
        );
        assert_eq!(
            decode(&json!({"__type": "Bytes", "base64": "aGk="})).unwrap(),
            Value::Bytes(b"hi".to_vec())
        );
        assert_eq!(
            decode(&json!({"__type": "Pointer", "className": "Post", "localId": "l"})).unwrap(),
            Value::Pointer(EntityRef::local("Post", "l"))
        );
        assert_eq!(
            decode(&json!({"__type": "File", "name": "f.txt"})).unwrap(),
            Value::File(FileRef::new("f.txt", None))
        );
        assert_eq!(
            decode(&json!({"__type": "GeoPoint", "latitude": 1, "longitude": 2.5})).unwrap(),
            Value::GeoPoint(GeoPoint::new(1.0, 2.5).unwrap())
        );
    }

    #[test]
    fn decode_operations() {
        assert_eq!(
            decode(&json!({"__op": "Increment", "amount": 3})).unwrap(),
            Value::from(FieldOperation::increment(3))
        );
        assert_eq!(
            decode(&json!({"__op": "AddUnique", "objects": [1]})).unwrap(),
            Value::from(FieldOperation::AddUnique(vec![Value::Integer(1)]))
        );

        let batch = json!({"__op": "Batch", "ops": [
            {"__op": "AddRelation", "objects": [{"__type": "Pointer", "className": "Tag", "objectId": "a"}]},
            {"__op": "RemoveRelation", "objects": [{"__type": "Pointer", "className": "Tag", "objectId": "b"}]},
        ]});
        assert_eq!(
            decode(&batch).unwrap(),
            Value::from(FieldOperation::Relation {
                target_class: "Tag".into(),
                added: vec![EntityRef::saved("Tag", "a")],
                removed: vec![EntityRef::saved("Tag", "b")],
            })
        );
    }

    #[test]
    fn decode_rejects_malformed_documents() {
        assert_eq!(
            decode(&json!({"__type": "Mystery"})),
            Err(CodecError::unknown_type_tag("Mystery"))
        );
        assert_eq!(
            decode(&json!({"__op": "Explode"})),
            Err(CodecError::unknown_type_tag("Explode"))
        );
        assert!(decode(&json!({"__type": "Date"})).is_err());
        assert!(decode(&json!({"__type": "Bytes", "base64": "!!"})).is_err());
        assert!(decode(&json!({"__type": "Pointer", "className": "Post"})).is_err());
        assert!(decode(&json!({"__type": "GeoPoint", "latitude": 91, "longitude": 0})).is_err());
        assert!(decode(&json!({"__op": "Batch", "ops": []})).is_err());
    }

    #[test]
    fn decode_enforces_depth_limit() {
        let mut doc = json!(1);
        for _ in 0..10 {
            doc = json!([doc]);
        }
        assert_eq!(
            Decoder::with_max_depth(5).decode(&doc),
            Err(CodecError::DepthExceeded { max_depth: 5 })
        );
        assert!(Decoder::with_max_depth(10).decode(&doc).is_ok());
    }

    #[test]
    fn reencoding_decoded_documents_is_stable() {
        let doc = json!({
            "title": "hello",
            "when": {"__type": "Date", "iso": "2020-01-01T00:00:00.000Z"},
            "owner": {"__type": "Pointer", "className": "_User", "localId": "l1"},
            "tags": {"__type": "Relation", "className": "Tag", "objects": []},
            "score": {"__op": "Increment", "amount": 2.5},
            "blob": {"__type": "Bytes", "base64": "AAEC"},
        });
        let value = decode(&doc).unwrap();
        assert_eq!(PointerOrLocalIdEncoder.encode(&value).unwrap(), doc);
    }
}
