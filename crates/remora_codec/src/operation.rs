//! Field-level delta operations.
//!
//! An entity does not send its whole body on save; it sends one operation
//! per changed key. Operations recorded on the same key before a save are
//! merged into one, and applying an operation to the last known value gives
//! the locally estimated value.

use crate::encoder::{Document, Encoder};
use crate::error::{CodecError, CodecResult};
use crate::reference::{EntityRef, Relation};
use crate::value::Value;
use serde_json::json;

/// A numeric amount for [`FieldOperation::Increment`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Integer amount.
    Integer(i64),
    /// Floating point amount.
    Float(f64),
}

impl Number {
    /// Extracts a number from a value.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(n) => Some(Number::Integer(*n)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    /// Converts back to a value.
    pub fn to_value(self) -> Value {
        match self {
            Number::Integer(n) => Value::Integer(n),
            Number::Float(f) => Value::Float(f),
        }
    }

    /// Adds two numbers; integer overflow widens to float.
    #[allow(clippy::cast_precision_loss)]
    pub fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a
                .checked_add(b)
                .map_or(Number::Float(a as f64 + b as f64), Number::Integer),
            (Number::Integer(a), Number::Float(b)) => Number::Float(a as f64 + b),
            (Number::Float(a), Number::Integer(b)) => Number::Float(a + b as f64),
            (Number::Float(a), Number::Float(b)) => Number::Float(a + b),
        }
    }

    fn to_document(self) -> CodecResult<Document> {
        match self {
            Number::Integer(n) => Ok(Document::from(n)),
            Number::Float(f) => serde_json::Number::from_f64(f)
                .map(Document::Number)
                .ok_or(CodecError::NonFiniteNumber),
        }
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number::Integer(n)
    }
}

impl From<i32> for Number {
    fn from(n: i32) -> Self {
        Number::Integer(i64::from(n))
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number::Float(f)
    }
}

/// A pending change to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOperation {
    /// Replace the value.
    Set(Value),
    /// Remove the field.
    Delete,
    /// Add to a numeric field.
    Increment(Number),
    /// Append to an array field.
    Add(Vec<Value>),
    /// Append to an array field, skipping values already present.
    AddUnique(Vec<Value>),
    /// Remove every occurrence of the values from an array field.
    Remove(Vec<Value>),
    /// Add and remove members of a relation.
    Relation {
        /// Class of the related entities.
        target_class: String,
        /// Entities to add.
        added: Vec<EntityRef>,
        /// Entities to remove.
        removed: Vec<EntityRef>,
    },
}

impl FieldOperation {
    /// Creates an increment operation.
    pub fn increment(amount: impl Into<Number>) -> Self {
        FieldOperation::Increment(amount.into())
    }

    /// Creates a relation operation.
    ///
    /// # Errors
    ///
    /// Every entity must belong to `target_class`, no entity may be both
    /// added and removed, and at least one entity must be given.
    pub fn relation(
        target_class: impl Into<String>,
        added: Vec<EntityRef>,
        removed: Vec<EntityRef>,
    ) -> CodecResult<Self> {
        let target_class = target_class.into();
        if added.is_empty() && removed.is_empty() {
            return Err(CodecError::invalid_operation(
                "relation operation needs at least one entity",
            ));
        }
        if let Some(stray) = added
            .iter()
            .chain(removed.iter())
            .find(|e| e.class_name() != target_class)
        {
            return Err(CodecError::invalid_operation(format!(
                "relation to {target_class} cannot contain a {}",
                stray.class_name()
            )));
        }
        if added.iter().any(|a| removed.iter().any(|r| r.same_entity(a))) {
            return Err(CodecError::invalid_operation(
                "an entity cannot be added to and removed from a relation at once",
            ));
        }
        Ok(FieldOperation::Relation {
            target_class,
            added,
            removed,
        })
    }

    /// Wire form of the operation.
    pub fn encode<E: Encoder + ?Sized>(&self, encoder: &E) -> CodecResult<Document> {
        match self {
            FieldOperation::Set(value) => encoder.encode(value),
            FieldOperation::Delete => Ok(json!({"__op": "Delete"})),
            FieldOperation::Increment(amount) => Ok(json!({
                "__op": "Increment",
                "amount": amount.to_document()?,
            })),
            FieldOperation::Add(objects) => encode_list_op("Add", objects, encoder),
            FieldOperation::AddUnique(objects) => encode_list_op("AddUnique", objects, encoder),
            FieldOperation::Remove(objects) => encode_list_op("Remove", objects, encoder),
            FieldOperation::Relation { added, removed, .. } => {
                let adds = encode_relation_op("AddRelation", added, encoder)?;
                let removes = encode_relation_op("RemoveRelation", removed, encoder)?;
                match (adds, removes) {
                    (Some(add), Some(remove)) => Ok(json!({"__op": "Batch", "ops": [add, remove]})),
                    (Some(op), None) | (None, Some(op)) => Ok(op),
                    (None, None) => Err(CodecError::invalid_operation(
                        "relation operation has no entities",
                    )),
                }
            }
        }
    }

    /// Combines this operation with one recorded earlier on the same key.
    ///
    /// # Errors
    ///
    /// Fails when the two operations cannot be expressed as one, such as an
    /// increment following an add.
    pub fn merge_with_previous(self, previous: Option<&FieldOperation>) -> CodecResult<Self> {
        let Some(previous) = previous else {
            return Ok(self);
        };
        match self {
            FieldOperation::Set(_) | FieldOperation::Delete => Ok(self),
            FieldOperation::Increment(amount) => match previous {
                FieldOperation::Delete => Ok(FieldOperation::Set(amount.to_value())),
                FieldOperation::Set(value) => match Number::from_value(value) {
                    Some(base) => Ok(FieldOperation::Set(base.add(amount).to_value())),
                    None => Err(CodecError::invalid_operation("you cannot increment a non-number")),
                },
                FieldOperation::Increment(earlier) => Ok(FieldOperation::Increment(earlier.add(amount))),
                _ => Err(CodecError::invalid_operation("operation is invalid after previous operation")),
            },
            FieldOperation::Add(objects) => match previous {
                FieldOperation::Delete => Ok(FieldOperation::Set(Value::Array(objects))),
                FieldOperation::Set(value) => match value.as_array() {
                    Some(existing) => {
                        let mut merged = existing.to_vec();
                        merged.extend(objects);
                        Ok(FieldOperation::Set(Value::Array(merged)))
                    }
                    None => Err(CodecError::invalid_operation("you can only add an item to a list")),
                },
                FieldOperation::Add(earlier) => {
                    let mut merged = earlier.clone();
                    merged.extend(objects);
                    Ok(FieldOperation::Add(merged))
                }
                _ => Err(CodecError::invalid_operation("operation is invalid after previous operation")),
            },
            FieldOperation::AddUnique(objects) => match previous {
                FieldOperation::Delete => Ok(FieldOperation::Set(Value::Array(unique_union(&[], objects)))),
                FieldOperation::Set(value) => match value.as_array() {
                    Some(existing) => Ok(FieldOperation::Set(Value::Array(unique_union(existing, objects)))),
                    None => Err(CodecError::invalid_operation("you can only add an item to a list")),
                },
                FieldOperation::AddUnique(earlier) => {
                    Ok(FieldOperation::AddUnique(unique_union(earlier, objects)))
                }
                _ => Err(CodecError::invalid_operation("operation is invalid after previous operation")),
            },
            FieldOperation::Remove(objects) => match previous {
                FieldOperation::Delete => Ok(FieldOperation::Delete),
                FieldOperation::Set(value) => match value.as_array() {
                    Some(existing) => Ok(FieldOperation::Set(Value::Array(remove_all(existing, &objects)))),
                    None => Err(CodecError::invalid_operation("you can only remove an item from a list")),
                },
                FieldOperation::Remove(earlier) => Ok(FieldOperation::Remove(unique_union(earlier, objects))),
                _ => Err(CodecError::invalid_operation("operation is invalid after previous operation")),
            },
            FieldOperation::Relation {
                target_class,
                added,
                removed,
            } => match previous {
                FieldOperation::Relation {
                    target_class: earlier_class,
                    added: earlier_added,
                    removed: earlier_removed,
                } => {
                    if *earlier_class != target_class {
                        return Err(CodecError::invalid_operation(format!(
                            "related object must be a {earlier_class}, but a {target_class} was passed in"
                        )));
                    }
                    let mut merged_added: Vec<EntityRef> = earlier_added
                        .iter()
                        .filter(|e| !removed.iter().any(|r| r.same_entity(e)))
                        .cloned()
                        .collect();
                    let mut merged_removed: Vec<EntityRef> = earlier_removed
                        .iter()
                        .filter(|e| !added.iter().any(|a| a.same_entity(e)))
                        .cloned()
                        .collect();
                    push_unique_refs(&mut merged_added, added);
                    push_unique_refs(&mut merged_removed, removed);
                    Ok(FieldOperation::Relation {
                        target_class,
                        added: merged_added,
                        removed: merged_removed,
                    })
                }
                FieldOperation::Set(_) | FieldOperation::Delete => Err(CodecError::invalid_operation(
                    "you cannot modify a relation after deleting it",
                )),
                _ => Err(CodecError::invalid_operation("operation is invalid after previous operation")),
            },
        }
    }

    /// Applies the operation to the current value of a field.
    ///
    /// Returns `None` when the field ends up removed.
    ///
    /// # Errors
    ///
    /// Fails when the current value has the wrong type for the operation.
    pub fn apply(&self, current: Option<&Value>) -> CodecResult<Option<Value>> {
        match self {
            FieldOperation::Set(value) => Ok(Some(value.clone())),
            FieldOperation::Delete => Ok(None),
            FieldOperation::Increment(amount) => match current {
                None | Some(Value::Null) => Ok(Some(amount.to_value())),
                Some(value) => match Number::from_value(value) {
                    Some(base) => Ok(Some(base.add(*amount).to_value())),
                    None => Err(CodecError::invalid_operation("you cannot increment a non-number")),
                },
            },
            FieldOperation::Add(objects) => {
                let mut list = current_list(current, "add an item to")?;
                list.extend(objects.iter().cloned());
                Ok(Some(Value::Array(list)))
            }
            FieldOperation::AddUnique(objects) => {
                let list = current_list(current, "add an item to")?;
                Ok(Some(Value::Array(unique_union(&list, objects.clone()))))
            }
            FieldOperation::Remove(objects) => {
                let list = current_list(current, "remove an item from")?;
                Ok(Some(Value::Array(remove_all(&list, objects))))
            }
            FieldOperation::Relation {
                target_class,
                added,
                removed,
            } => {
                let mut relation = match current {
                    None | Some(Value::Null) => Relation::new(target_class.clone()),
                    Some(Value::Relation(existing)) if existing.target_class() == target_class => {
                        existing.clone()
                    }
                    Some(other) => {
                        return Err(CodecError::invalid_operation(format!(
                            "cannot apply a relation operation to a {}",
                            other.type_name()
                        )))
                    }
                };
                for entity in added {
                    relation.add_known(entity.clone());
                }
                for entity in removed {
                    relation.remove_known(entity);
                }
                Ok(Some(Value::Relation(relation)))
            }
        }
    }
}

fn encode_list_op<E: Encoder + ?Sized>(
    name: &str,
    objects: &[Value],
    encoder: &E,
) -> CodecResult<Document> {
    let encoded = objects
        .iter()
        .map(|o| encoder.encode(o))
        .collect::<CodecResult<Vec<_>>>()?;
    Ok(json!({"__op": name, "objects": encoded}))
}

fn encode_relation_op<E: Encoder + ?Sized>(
    name: &str,
    entities: &[EntityRef],
    encoder: &E,
) -> CodecResult<Option<Document>> {
    if entities.is_empty() {
        return Ok(None);
    }
    let encoded = entities
        .iter()
        .map(|e| encoder.encode_related_object(e))
        .collect::<CodecResult<Vec<_>>>()?;
    Ok(Some(json!({"__op": name, "objects": encoded})))
}

fn current_list(current: Option<&Value>, verb: &str) -> CodecResult<Vec<Value>> {
    match current {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => value
            .as_array()
            .map(<[Value]>::to_vec)
            .ok_or_else(|| CodecError::invalid_operation(format!("you can only {verb} a list"))),
    }
}

fn unique_union(existing: &[Value], additions: Vec<Value>) -> Vec<Value> {
    let mut merged = existing.to_vec();
    for value in additions {
        if !merged.contains(&value) {
            merged.push(value);
        }
    }
    merged
}

fn remove_all(existing: &[Value], removals: &[Value]) -> Vec<Value> {
    existing
        .iter()
        .filter(|v| !removals.contains(v))
        .cloned()
        .collect()
}

fn push_unique_refs(target: &mut Vec<EntityRef>, additions: Vec<EntityRef>) {
    for entity in additions {
        if !target.iter().any(|t| t.same_entity(&entity)) {
            target.push(entity);
        }
    }
}
