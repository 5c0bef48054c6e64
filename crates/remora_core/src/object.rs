//! Remote-backed objects with field-level change tracking.
//!
//! Mutations are recorded locally as [`FieldOperation`]s and sent as a
//! single delta document on save. [`RemoteObject::get`] returns the value
//! the field will have once the pending operations are applied.

use crate::context::Context;
use crate::error::{CoreError, CoreResult};
use crate::queue::{Operation, OperationQueue};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use remora_codec::{
    format_date, CodecError, Document, Encoder, EntityRef, FieldOperation, Number,
    PointerEncoder, PointerOrLocalIdEncoder, Value,
};
use serde_json::Map;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Snapshot of an object as last seen on the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectState {
    class_name: String,
    object_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    fields: Vec<(String, Value)>,
    is_complete: bool,
}

impl ObjectState {
    /// Starts building a state for `class_name`.
    pub fn builder(class_name: impl Into<String>) -> ObjectStateBuilder {
        ObjectStateBuilder {
            state: ObjectState {
                class_name: class_name.into(),
                object_id: None,
                created_at: None,
                updated_at: None,
                fields: Vec::new(),
                is_complete: false,
            },
        }
    }

    /// Builder pre-filled with this state.
    pub fn to_builder(&self) -> ObjectStateBuilder {
        ObjectStateBuilder {
            state: self.clone(),
        }
    }

    /// Class name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Server-assigned id.
    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }

    /// Creation time on the server.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Last update time on the server.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Server value of a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Server fields in order.
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// False for pointer-only stubs whose fields were never fetched.
    pub fn is_complete(&self) -> bool {
        self.is_complete
    }
}

/// Builder for [`ObjectState`].
#[derive(Debug, Clone)]
pub struct ObjectStateBuilder {
    state: ObjectState,
}

impl ObjectStateBuilder {
    /// Sets the object id.
    pub fn object_id(mut self, id: impl Into<String>) -> Self {
        self.state.object_id = Some(id.into());
        self
    }

    /// Sets the creation time.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.state.created_at = Some(at);
        self
    }

    /// Sets the update time.
    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.state.updated_at = Some(at);
        self
    }

    /// Sets a field, keeping its position if it already exists.
    pub fn put(mut self, key: impl Into<String>, value: Value) -> Self {
        set_field(&mut self.state.fields, key.into(), Some(value));
        self
    }

    /// Removes a field.
    pub fn remove(mut self, key: &str) -> Self {
        self.state.fields.retain(|(k, _)| k != key);
        self
    }

    /// Marks whether all fields are known.
    pub fn is_complete(mut self, complete: bool) -> Self {
        self.state.is_complete = complete;
        self
    }

    /// Applies a field operation to the fields being built.
    ///
    /// # Errors
    ///
    /// Fails if the operation does not fit the field's current value.
    pub fn apply(mut self, key: &str, op: &FieldOperation) -> CoreResult<Self> {
        let next = op.apply(self.state.get(key))?;
        set_field(&mut self.state.fields, key.to_string(), next);
        Ok(self)
    }

    /// Builds the state.
    pub fn build(self) -> ObjectState {
        self.state
    }
}

fn set_field(fields: &mut Vec<(String, Value)>, key: String, value: Option<Value>) {
    let position = fields.iter().position(|(k, _)| *k == key);
    match (position, value) {
        (Some(i), Some(value)) => fields[i].1 = value,
        (Some(i), None) => {
            fields.remove(i);
        }
        (None, Some(value)) => fields.push((key, value)),
        (None, None) => {}
    }
}

type OperationSet = Vec<(String, FieldOperation)>;

fn find_op<'a>(ops: &'a OperationSet, key: &str) -> Option<&'a FieldOperation> {
    ops.iter().find(|(k, _)| k == key).map(|(_, op)| op)
}

struct ObjectData {
    state: ObjectState,
    in_flight: OperationSet,
    pending: OperationSet,
    deleted: bool,
}

impl ObjectData {
    fn estimated(&self, key: &str) -> CoreResult<Option<Value>> {
        let mut value = self.state.get(key).cloned();
        for ops in [&self.in_flight, &self.pending] {
            if let Some(op) = find_op(ops, key) {
                value = op.apply(value.as_ref())?;
            }
        }
        Ok(value)
    }

    fn estimated_fields(&self) -> CoreResult<Vec<(String, Value)>> {
        let mut fields = self.state.fields.clone();
        for ops in [&self.in_flight, &self.pending] {
            for (key, op) in ops {
                let current = fields.iter().find(|(k, _)| k == key).map(|(_, v)| v);
                let next = op.apply(current)?;
                set_field(&mut fields, key.clone(), next);
            }
        }
        Ok(fields)
    }

    fn record(&mut self, key: &str, op: FieldOperation) -> CoreResult<()> {
        if key.is_empty() {
            return Err(CoreError::precondition("field keys must not be empty"));
        }
        // Reject operations that cannot apply to the value the field will have.
        op.apply(self.estimated(key)?.as_ref())?;

        let index = self.pending.iter().position(|(k, _)| k == key);
        let previous = index.map(|i| &self.pending[i].1);
        let merged = op.merge_with_previous(previous)?;
        match index {
            Some(i) => self.pending[i].1 = merged,
            None => self.pending.push((key.to_string(), merged)),
        }
        Ok(())
    }

    /// Puts in-flight operations back in front of the ones recorded since.
    ///
    /// When the two cannot be merged into one operation, the field is set
    /// to the value they produce together.
    fn restore_in_flight(&mut self) {
        let mut restored = std::mem::take(&mut self.in_flight);
        for (key, op) in std::mem::take(&mut self.pending) {
            let Some(i) = restored.iter().position(|(k, _)| *k == key) else {
                restored.push((key, op));
                continue;
            };
            let earlier = &restored[i].1;
            let next = match op.clone().merge_with_previous(Some(earlier)) {
                Ok(merged) => merged,
                Err(_) => match collapse(self.state.get(&key), earlier, &op) {
                    Ok(collapsed) => collapsed,
                    Err(err) => {
                        warn!(%key, error = %err, "in-flight change no longer applies, keeping the newer one");
                        op
                    }
                },
            };
            restored[i].1 = next;
        }
        self.pending = restored;
    }

    fn is_dirty(&self) -> bool {
        self.state.object_id.is_none() || !self.pending.is_empty()
    }
}

struct ObjectInner {
    ctx: Context,
    queue: OperationQueue,
    local_id: String,
    data: RwLock<ObjectData>,
}

/// An object stored by the backend.
///
/// Clones are handles to the same object.
#[derive(Clone)]
pub struct RemoteObject {
    inner: Arc<ObjectInner>,
}

impl RemoteObject {
    /// Creates a new, unsaved object.
    pub fn new(ctx: &Context, class_name: impl Into<String>) -> Self {
        Self::from_state(ctx, ObjectState::builder(class_name).is_complete(true).build())
    }

    /// Creates a pointer-only stub for a saved object.
    pub fn without_data(
        ctx: &Context,
        class_name: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Self {
        Self::from_state(ctx, ObjectState::builder(class_name).object_id(object_id).build())
    }

    /// Wraps a known server state.
    pub fn from_state(ctx: &Context, state: ObjectState) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                ctx: ctx.clone(),
                queue: ctx.new_queue(),
                local_id: Uuid::new_v4().simple().to_string(),
                data: RwLock::new(ObjectData {
                    state,
                    in_flight: Vec::new(),
                    pending: Vec::new(),
                    deleted: false,
                }),
            }),
        }
    }

    fn record(&self, key: &str, op: FieldOperation) -> CoreResult<()> {
        self.inner.data.write().record(key, op)
    }

    /// Sets a field.
    ///
    /// # Errors
    ///
    /// Fails for empty keys, raw field operations, and values with no wire
    /// encoding.
    pub fn put(&self, key: &str, value: impl Into<Value>) -> CoreResult<()> {
        let value = value.into();
        if matches!(value, Value::Operation(_)) {
            return Err(CoreError::precondition(
                "field operations cannot be stored as values",
            ));
        }
        match PointerOrLocalIdEncoder.encode(&value) {
            Ok(_) | Err(CodecError::UnsavedReference { .. }) => {}
            Err(err) => return Err(err.into()),
        }
        self.record(key, FieldOperation::Set(value))
    }

    /// Removes a field.
    pub fn remove(&self, key: &str) -> CoreResult<()> {
        self.record(key, FieldOperation::Delete)
    }

    /// Adds `amount` to a numeric field.
    pub fn increment(&self, key: &str, amount: impl Into<Number>) -> CoreResult<()> {
        self.record(key, FieldOperation::increment(amount))
    }

    /// Appends values to an array field.
    pub fn add(&self, key: &str, values: Vec<Value>) -> CoreResult<()> {
        self.record(key, FieldOperation::Add(values))
    }

    /// Appends values not already present in an array field.
    pub fn add_unique(&self, key: &str, values: Vec<Value>) -> CoreResult<()> {
        self.record(key, FieldOperation::AddUnique(values))
    }

    /// Removes every occurrence of the values from an array field.
    pub fn remove_all(&self, key: &str, values: Vec<Value>) -> CoreResult<()> {
        self.record(key, FieldOperation::Remove(values))
    }

    /// Adds objects to a relation field.
    pub fn add_relation(&self, key: &str, objects: &[RemoteObject]) -> CoreResult<()> {
        let refs = objects.iter().map(RemoteObject::to_pointer).collect::<Vec<_>>();
        let class = relation_class(&refs)?;
        self.record(key, FieldOperation::relation(class, refs, Vec::new())?)
    }

    /// Removes objects from a relation field.
    pub fn remove_relation(&self, key: &str, objects: &[RemoteObject]) -> CoreResult<()> {
        let refs = objects.iter().map(RemoteObject::to_pointer).collect::<Vec<_>>();
        let class = relation_class(&refs)?;
        self.record(key, FieldOperation::relation(class, Vec::new(), refs)?)
    }

    /// Estimated value of a field: the server value with pending operations
    /// applied.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.data.read().estimated(key).ok().flatten()
    }

    /// Returns true if the object has never been saved or has unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.inner.data.read().is_dirty()
    }

    /// Returns true if `key` has unsaved changes.
    pub fn is_dirty_key(&self, key: &str) -> bool {
        let data = self.inner.data.read();
        find_op(&data.pending, key).is_some() || find_op(&data.in_flight, key).is_some()
    }

    /// Returns true once a delete succeeded.
    pub fn is_deleted(&self) -> bool {
        self.inner.data.read().deleted
    }

    /// Class name.
    pub fn class_name(&self) -> String {
        self.inner.data.read().state.class_name.clone()
    }

    /// Server-assigned id, once saved.
    pub fn object_id(&self) -> Option<String> {
        self.inner.data.read().state.object_id.clone()
    }

    /// Client-side id, stable for the lifetime of this object.
    pub fn local_id(&self) -> &str {
        &self.inner.local_id
    }

    /// Current server state snapshot.
    pub fn state(&self) -> ObjectState {
        self.inner.data.read().state.clone()
    }

    /// The object's operation queue.
    pub fn queue(&self) -> &OperationQueue {
        &self.inner.queue
    }

    /// Reference to this object.
    pub fn to_pointer(&self) -> EntityRef {
        let data = self.inner.data.read();
        EntityRef::new(
            data.state.class_name.clone(),
            data.state.object_id.clone(),
            Some(self.inner.local_id.clone()),
        )
    }

    /// Reference to this object as a field value.
    pub fn to_value(&self) -> Value {
        Value::Pointer(self.to_pointer())
    }

    /// Encodes the full body of this object.
    ///
    /// Objects referenced from fields are written as pointers by `encoder`,
    /// never as bodies, so cycles between objects stay finite.
    pub fn encode_body(&self, encoder: &dyn Encoder) -> CoreResult<Document> {
        let data = self.inner.data.read();
        let fields = data.estimated_fields()?;
        let mut map = Map::new();
        map.insert("className".into(), data.state.class_name.clone().into());
        if let Some(id) = &data.state.object_id {
            map.insert("objectId".into(), id.clone().into());
        }
        if let Some(at) = &data.state.created_at {
            map.insert("createdAt".into(), format_date(at).into());
        }
        if let Some(at) = &data.state.updated_at {
            map.insert("updatedAt".into(), format_date(at).into());
        }
        for (key, value) in &fields {
            map.insert(key.clone(), encoder.encode(value)?);
        }
        Ok(Document::Object(map))
    }

    /// Saves pending changes.
    ///
    /// Resolves without touching the controller when nothing changed. If the
    /// save fails or is cancelled the changes stay pending.
    pub fn save_in_background(&self, cancellation: Option<&CancellationToken>) -> Operation<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .enqueue_linked(cancellation, move |tail, token| async move {
                tail.wait(&token).await?;

                let (state, operations) = {
                    let mut data = inner.data.write();
                    if !data.is_dirty() {
                        debug!("object is not dirty, skipping save");
                        return Ok(());
                    }
                    data.in_flight = std::mem::take(&mut data.pending);
                    let encoded = encode_operations(&data.in_flight);
                    match encoded {
                        Ok(doc) => (data.state.clone(), doc),
                        Err(err) => {
                            data.restore_in_flight();
                            return Err(err);
                        }
                    }
                };

                debug!(class = %state.class_name(), "saving object");
                let result = inner
                    .ctx
                    .object_controller()
                    .save(&state, operations, token)
                    .await;

                let mut data = inner.data.write();
                match result {
                    Ok(saved) => {
                        let merged = merge_saved(&data.state, &data.in_flight, saved);
                        data.state = merged;
                        data.in_flight.clear();
                        Ok(())
                    }
                    Err(err) => {
                        data.restore_in_flight();
                        Err(err)
                    }
                }
            })
    }

    /// Saves pending changes without a caller token.
    pub fn save(&self) -> Operation<()> {
        self.save_in_background(None)
    }

    /// Replaces the state with the server's.
    pub fn fetch_in_background(&self, cancellation: Option<&CancellationToken>) -> Operation<()> {
        self.enqueue_fetch(cancellation, false)
    }

    /// Fetches only if the fields have never been loaded.
    pub fn fetch_if_needed_in_background(
        &self,
        cancellation: Option<&CancellationToken>,
    ) -> Operation<()> {
        self.enqueue_fetch(cancellation, true)
    }

    fn enqueue_fetch(
        &self,
        cancellation: Option<&CancellationToken>,
        only_if_needed: bool,
    ) -> Operation<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .enqueue_linked(cancellation, move |tail, token| async move {
                tail.wait(&token).await?;
                let state = inner.data.read().state.clone();
                if only_if_needed && state.is_complete() {
                    return Ok(());
                }
                if state.object_id().is_none() {
                    return Err(CoreError::precondition(
                        "cannot fetch an object that has not been saved",
                    ));
                }

                debug!(class = %state.class_name(), "fetching object");
                let fetched = inner.ctx.object_controller().fetch(&state, token).await?;
                inner.data.write().state = fetched;
                Ok(())
            })
    }

    /// Deletes the object on the server.
    ///
    /// An object that was never saved resolves immediately.
    pub fn delete_in_background(&self, cancellation: Option<&CancellationToken>) -> Operation<()> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .queue
            .enqueue_linked(cancellation, move |tail, token| async move {
                tail.wait(&token).await?;
                let state = inner.data.read().state.clone();
                if state.object_id().is_none() {
                    return Ok(());
                }

                debug!(class = %state.class_name(), "deleting object");
                inner.ctx.object_controller().delete(&state, token).await?;
                inner.data.write().deleted = true;
                Ok(())
            })
    }

    /// Cancels every operation that has not finished yet.
    pub fn cancel(&self) {
        let cancelled = self.inner.queue.cancel_all();
        debug!(cancelled, "cancelled object operations");
    }
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.data.read();
        f.debug_struct("RemoteObject")
            .field("class_name", &data.state.class_name)
            .field("object_id", &data.state.object_id)
            .field("local_id", &self.inner.local_id)
            .field("pending", &data.pending.len())
            .finish()
    }
}

fn collapse(
    base: Option<&Value>,
    earlier: &FieldOperation,
    later: &FieldOperation,
) -> CoreResult<FieldOperation> {
    let value = later.apply(earlier.apply(base)?.as_ref())?;
    Ok(value.map_or(FieldOperation::Delete, FieldOperation::Set))
}

fn relation_class(refs: &[EntityRef]) -> CoreResult<String> {
    refs.first()
        .map(|r| r.class_name().to_string())
        .ok_or_else(|| CoreError::precondition("a relation change needs at least one object"))
}

fn encode_operations(ops: &OperationSet) -> CoreResult<Document> {
    let mut map = Map::with_capacity(ops.len());
    for (key, op) in ops {
        map.insert(key.clone(), op.encode(&PointerEncoder)?);
    }
    Ok(Document::Object(map))
}

/// Local state after applying the saved operations, overlaid with what the
/// server returned.
///
/// If the saved operations no longer apply locally, the server state is
/// overlaid on the previous state as is, so the server identity is kept.
fn merge_saved(previous: &ObjectState, saved_ops: &OperationSet, saved: ObjectState) -> ObjectState {
    let applied = saved_ops
        .iter()
        .try_fold(previous.to_builder(), |builder, (key, op)| builder.apply(key, op));
    let mut builder = match applied {
        Ok(builder) => builder,
        Err(err) => {
            warn!(error = %err, "saved operations do not apply locally, using the server state");
            previous.to_builder()
        }
    };
    if let Some(id) = saved.object_id {
        builder = builder.object_id(id);
    }
    if let Some(at) = saved.created_at {
        builder = builder.created_at(at);
    }
    if let Some(at) = saved.updated_at {
        builder = builder.updated_at(at);
    }
    for (key, value) in saved.fields {
        builder = builder.put(key, value);
    }
    let complete = previous.is_complete || saved.is_complete;
    builder.is_complete(complete).build()
}
