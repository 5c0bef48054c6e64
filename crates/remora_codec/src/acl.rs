//! Access control lists.
//!
//! Permissions are keyed by user id, by `role:<name>`, or by `*` for public
//! access. A user that has not been saved yet has no id to key on; its
//! permissions are parked under `*unresolved` and the user itself travels
//! as `unresolvedUser`, encoded through the caller's encoder.

use crate::decoder::decode;
use crate::encoder::{Document, Encoder};
use crate::error::{CodecError, CodecResult};
use crate::reference::EntityRef;
use crate::value::Value;
use serde_json::Map;
use std::collections::BTreeMap;

const PUBLIC_KEY: &str = "*";
const UNRESOLVED_KEY: &str = "*unresolved";
const UNRESOLVED_USER_KEY: &str = "unresolvedUser";
const ROLE_PREFIX: &str = "role:";

/// Read/write flags for one principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Permissions {
    /// May read.
    pub read: bool,
    /// May write.
    pub write: bool,
}

impl Permissions {
    fn is_empty(self) -> bool {
        !self.read && !self.write
    }

    fn to_document(self) -> Document {
        let mut map = Map::new();
        if self.read {
            map.insert("read".into(), true.into());
        }
        if self.write {
            map.insert("write".into(), true.into());
        }
        Document::Object(map)
    }

    fn from_document(key: &str, doc: &Document) -> CodecResult<Self> {
        let map = doc
            .as_object()
            .ok_or_else(|| CodecError::invalid_acl(format!("permissions for {key:?} must be an object")))?;
        let flag = |name: &str| -> CodecResult<bool> {
            match map.get(name) {
                None => Ok(false),
                Some(Document::Bool(b)) => Ok(*b),
                Some(other) => Err(CodecError::invalid_acl(format!(
                    "{name} flag for {key:?} must be a boolean, got {other}"
                ))),
            }
        };
        Ok(Self {
            read: flag("read")?,
            write: flag("write")?,
        })
    }
}

/// An access control list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Acl {
    permissions: BTreeMap<String, Permissions>,
    unresolved_user: Option<EntityRef>,
}

impl Acl {
    /// Creates an ACL granting nothing to anyone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an ACL granting read and write access to a single saved user.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        let mut acl = Self::new();
        let id = user_id.into();
        acl.set_read_access(&id, true);
        acl.set_write_access(&id, true);
        acl
    }

    fn get(&self, key: &str) -> Permissions {
        self.permissions.get(key).copied().unwrap_or_default()
    }

    fn update(&mut self, key: &str, f: impl FnOnce(&mut Permissions)) {
        let mut permissions = self.get(key);
        f(&mut permissions);
        if permissions.is_empty() {
            self.permissions.remove(key);
        } else {
            self.permissions.insert(key.to_string(), permissions);
        }
    }

    /// Whether anyone may read.
    pub fn public_read_access(&self) -> bool {
        self.get(PUBLIC_KEY).read
    }

    /// Grants or revokes public read access.
    pub fn set_public_read_access(&mut self, allowed: bool) {
        self.update(PUBLIC_KEY, |p| p.read = allowed);
    }

    /// Whether anyone may write.
    pub fn public_write_access(&self) -> bool {
        self.get(PUBLIC_KEY).write
    }

    /// Grants or revokes public write access.
    pub fn set_public_write_access(&mut self, allowed: bool) {
        self.update(PUBLIC_KEY, |p| p.write = allowed);
    }

    /// Whether the user with this id may read.
    pub fn read_access(&self, user_id: &str) -> bool {
        self.get(user_id).read
    }

    /// Grants or revokes read access for a user id.
    pub fn set_read_access(&mut self, user_id: &str, allowed: bool) {
        self.update(user_id, |p| p.read = allowed);
    }

    /// Whether the user with this id may write.
    pub fn write_access(&self, user_id: &str) -> bool {
        self.get(user_id).write
    }

    /// Grants or revokes write access for a user id.
    pub fn set_write_access(&mut self, user_id: &str, allowed: bool) {
        self.update(user_id, |p| p.write = allowed);
    }

    /// Grants or revokes read access for a user reference, saved or not.
    ///
    /// # Errors
    ///
    /// Only one unsaved user can be tracked per ACL.
    pub fn set_user_read_access(&mut self, user: &EntityRef, allowed: bool) -> CodecResult<()> {
        let key = self.key_for_user(user)?;
        self.update(&key, |p| p.read = allowed);
        Ok(())
    }

    /// Grants or revokes write access for a user reference, saved or not.
    ///
    /// # Errors
    ///
    /// Only one unsaved user can be tracked per ACL.
    pub fn set_user_write_access(&mut self, user: &EntityRef, allowed: bool) -> CodecResult<()> {
        let key = self.key_for_user(user)?;
        self.update(&key, |p| p.write = allowed);
        Ok(())
    }

    fn key_for_user(&mut self, user: &EntityRef) -> CodecResult<String> {
        if let Some(id) = user.object_id() {
            return Ok(id.to_string());
        }
        if user.local_id().is_none() {
            return Err(CodecError::invalid_acl(
                "user reference has neither an object id nor a local id",
            ));
        }
        match &self.unresolved_user {
            Some(existing) if !existing.same_entity(user) => Err(CodecError::invalid_acl(
                "an ACL can only reference one unsaved user",
            )),
            _ => {
                self.unresolved_user = Some(user.clone());
                Ok(UNRESOLVED_KEY.to_string())
            }
        }
    }

    /// Whether members of the role may read.
    pub fn role_read_access(&self, role: &str) -> bool {
        self.get(&format!("{ROLE_PREFIX}{role}")).read
    }

    /// Grants or revokes read access for a role.
    pub fn set_role_read_access(&mut self, role: &str, allowed: bool) {
        self.update(&format!("{ROLE_PREFIX}{role}"), |p| p.read = allowed);
    }

    /// Whether members of the role may write.
    pub fn role_write_access(&self, role: &str) -> bool {
        self.get(&format!("{ROLE_PREFIX}{role}")).write
    }

    /// Grants or revokes write access for a role.
    pub fn set_role_write_access(&mut self, role: &str, allowed: bool) {
        self.update(&format!("{ROLE_PREFIX}{role}"), |p| p.write = allowed);
    }

    /// The unsaved user this ACL refers to, if any.
    pub fn unresolved_user(&self) -> Option<&EntityRef> {
        self.unresolved_user.as_ref()
    }

    /// Re-keys the unsaved user's permissions under its new object id.
    pub fn resolve_user(&mut self, object_id: &str) {
        if self.unresolved_user.take().is_some() {
            if let Some(permissions) = self.permissions.remove(UNRESOLVED_KEY) {
                self.permissions.insert(object_id.to_string(), permissions);
            }
        }
    }

    /// Wire form of the ACL.
    ///
    /// The unsaved user, if any, goes through `encoder` like any other
    /// reference.
    pub fn to_document<E: Encoder + ?Sized>(&self, encoder: &E) -> CodecResult<Document> {
        let mut map = Map::new();
        for (key, permissions) in &self.permissions {
            map.insert(key.clone(), permissions.to_document());
        }
        if let Some(user) = &self.unresolved_user {
            map.insert(
                UNRESOLVED_USER_KEY.into(),
                encoder.encode(&Value::Pointer(user.clone()))?,
            );
        }
        Ok(Document::Object(map))
    }

    /// Parses the wire form of an ACL.
    ///
    /// # Errors
    ///
    /// Fails if the document is not an object of permission objects.
    pub fn from_document(doc: &Document) -> CodecResult<Self> {
        let map = doc
            .as_object()
            .ok_or_else(|| CodecError::invalid_acl("ACL must be an object"))?;
        let mut acl = Acl::new();
        for (key, entry) in map {
            if key == UNRESOLVED_USER_KEY {
                match decode(entry)? {
                    Value::Pointer(user) => acl.unresolved_user = Some(user),
                    other => {
                        return Err(CodecError::invalid_acl(format!(
                            "unresolvedUser must be a pointer, got {}",
                            other.type_name()
                        )))
                    }
                }
                continue;
            }
            let permissions = Permissions::from_document(key, entry)?;
            if !permissions.is_empty() {
                acl.permissions.insert(key.clone(), permissions);
            }
        }
        Ok(acl)
    }
}
