//! Lightweight references to remote entities.
//!
//! A reference carries identity only (class plus object id or local id),
//! never an entity body. Encoding a reference can therefore never recurse
//! into another entity, which is what keeps cyclic object graphs finite on
//! the wire.

use crate::encoder::{Document, Encoder};
use crate::error::CodecResult;
use serde_json::{json, Map};

/// Identity of a remote-backed entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    class_name: String,
    object_id: Option<String>,
    local_id: Option<String>,
}

impl EntityRef {
    /// Reference to a saved entity.
    pub fn saved(class_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: Some(object_id.into()),
            local_id: None,
        }
    }

    /// Reference to an entity that only exists locally so far.
    pub fn local(class_name: impl Into<String>, local_id: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            object_id: None,
            local_id: Some(local_id.into()),
        }
    }

    /// Builds a reference from optional parts.
    pub fn new(
        class_name: impl Into<String>,
        object_id: Option<String>,
        local_id: Option<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            object_id,
            local_id,
        }
    }

    /// Class name of the referenced entity.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Server-assigned id, if the entity has been saved.
    pub fn object_id(&self) -> Option<&str> {
        self.object_id.as_deref()
    }

    /// Client-side id, if one was assigned.
    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    /// Whether the entity has a server-assigned id.
    pub fn is_saved(&self) -> bool {
        self.object_id.is_some()
    }

    /// Returns true if both references point at the same entity.
    ///
    /// Saved references compare by object id, unsaved ones by local id.
    pub fn same_entity(&self, other: &EntityRef) -> bool {
        if self.class_name != other.class_name {
            return false;
        }
        match (&self.object_id, &other.object_id) {
            (Some(a), Some(b)) => a == b,
            _ => self.local_id.is_some() && self.local_id == other.local_id,
        }
    }

    /// Pointer token carrying the object id.
    pub fn pointer_document(&self, object_id: &str) -> Document {
        json!({
            "__type": "Pointer",
            "className": self.class_name,
            "objectId": object_id,
        })
    }

    /// Pointer token carrying the local id.
    pub fn local_pointer_document(&self, local_id: &str) -> Document {
        json!({
            "__type": "Pointer",
            "className": self.class_name,
            "localId": local_id,
        })
    }
}

/// Reference to a stored file: its name and, once uploaded, its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    /// File name.
    pub name: String,
    /// Remote URL, absent until the file is saved.
    pub url: Option<String>,
}

impl FileRef {
    /// Creates a file reference.
    pub fn new(name: impl Into<String>, url: Option<String>) -> Self {
        Self {
            name: name.into(),
            url,
        }
    }

    /// Wire form of the file reference.
    pub fn to_document(&self) -> Document {
        let mut map = Map::new();
        map.insert("__type".into(), "File".into());
        map.insert("name".into(), self.name.clone().into());
        if let Some(url) = &self.url {
            map.insert("url".into(), url.clone().into());
        }
        Document::Object(map)
    }
}

/// A one-to-many relation to entities of a single target class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    target_class: String,
    known: Vec<EntityRef>,
}

impl Relation {
    /// Creates an empty relation to `target_class`.
    pub fn new(target_class: impl Into<String>) -> Self {
        Self {
            target_class: target_class.into(),
            known: Vec::new(),
        }
    }

    /// Class of the related entities.
    pub fn target_class(&self) -> &str {
        &self.target_class
    }

    /// Entities known locally to be part of the relation.
    pub fn known(&self) -> &[EntityRef] {
        &self.known
    }

    /// Adds an entity unless it is already known.
    pub fn add_known(&mut self, entity: EntityRef) {
        if !self.known.iter().any(|k| k.same_entity(&entity)) {
            self.known.push(entity);
        }
    }

    /// Forgets an entity.
    pub fn remove_known(&mut self, entity: &EntityRef) {
        self.known.retain(|k| !k.same_entity(entity));
    }

    /// Wire form of the relation; known members go through the encoder's
    /// reference hook.
    pub fn to_document<E: Encoder + ?Sized>(&self, encoder: &E) -> CodecResult<Document> {
        let objects = self
            .known
            .iter()
            .map(|entity| encoder.encode_related_object(entity))
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(json!({
            "__type": "Relation",
            "className": self.target_class,
            "objects": objects,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_entity_by_object_id() {
        let a = EntityRef::saved("Post", "abc");
        let b = EntityRef::new("Post", Some("abc".into()), Some("local-1".into()));
        assert!(a.same_entity(&b));
        assert!(!a.same_entity(&EntityRef::saved("Comment", "abc")));
    }

    #[test]
    fn same_entity_by_local_id() {
        let a = EntityRef::local("Post", "l1");
        assert!(a.same_entity(&EntityRef::local("Post", "l1")));
        assert!(!a.same_entity(&EntityRef::local("Post", "l2")));
        assert!(!EntityRef::new("Post", None, None).same_entity(&EntityRef::new("Post", None, None)));
    }

    #[test]
    fn file_ref_document_omits_missing_url() {
        let doc = FileRef::new("a.txt", None).to_document();
        assert_eq!(doc, json!({"__type": "File", "name": "a.txt"}));

        let doc = FileRef::new("a.txt", Some("http://x/a.txt".into())).to_document();
        assert_eq!(doc["url"], "http://x/a.txt");
    }

    #[test]
    fn relation_known_members_are_unique() {
        let mut relation = Relation::new("Tag");
        relation.add_known(EntityRef::saved("Tag", "1"));
        relation.add_known(EntityRef::saved("Tag", "1"));
        relation.add_known(EntityRef::saved("Tag", "2"));
        assert_eq!(relation.known().len(), 2);

        relation.remove_known(&EntityRef::saved("Tag", "1"));
        assert_eq!(relation.known(), &[EntityRef::saved("Tag", "2")]);
    }
}
