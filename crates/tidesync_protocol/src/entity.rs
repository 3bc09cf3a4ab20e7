//! Entity identity, version tokens and the dirty flag.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque entity identifier.
///
/// Assigned once (by the caller or by [`EntityId::generate`]) and never
/// changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an identifier from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Issues a fresh random identifier (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if no identifier has been assigned yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Version token issued by the remote store.
///
/// Tokens are compared for equality only. There is intentionally no
/// `Ord` implementation: two tokens say nothing about which is newer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    /// Wraps a server-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Record types stored in a synchronized collection.
pub trait EntityData: Clone + fmt::Debug + Send + Sync + 'static {
    /// Collection name, used to derive the per-type checkpoint label.
    const COLLECTION: &'static str;
}

/// A record together with its sync metadata.
///
/// `Entity` is a value: the dirty flag travels with each copy instead of
/// being shared between holders. Stores hand out fresh clean copies on
/// every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity<T> {
    /// Identity key.
    pub id: EntityId,
    /// Last version token known for this copy (`None` until first accepted).
    pub version: Option<VersionToken>,
    /// True when this copy carries local changes not yet confirmed remotely.
    pub dirty: bool,
    /// The record body.
    pub data: T,
}

impl<T> Entity<T> {
    /// Creates a new, locally modified entity without a version.
    pub fn new(id: impl Into<EntityId>, data: T) -> Self {
        Self {
            id: id.into(),
            version: None,
            dirty: true,
            data,
        }
    }

    /// Creates an entity as confirmed by the remote store.
    pub fn confirmed(id: impl Into<EntityId>, version: VersionToken, data: T) -> Self {
        Self {
            id: id.into(),
            version: Some(version),
            dirty: false,
            data,
        }
    }

    /// Replaces the version token.
    pub fn with_version(mut self, version: VersionToken) -> Self {
        self.version = Some(version);
        self
    }

    /// Returns this copy with the dirty flag cleared.
    pub fn into_clean(mut self) -> Self {
        self.dirty = false;
        self
    }

    /// Returns this copy with the dirty flag set.
    pub fn into_dirty(mut self) -> Self {
        self.dirty = true;
        self
    }

    /// Returns true if this copy has the given version token.
    pub fn has_version(&self, version: &VersionToken) -> bool {
        self.version.as_ref() == Some(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = EntityId::generate();
        let b = EntityId::generate();
        assert_ne!(a, b);
        assert!(!a.is_empty());
        assert!(EntityId::new("").is_empty());
    }

    #[test]
    fn entity_dirty_transitions() {
        let entity = Entity::new("a", 7u32);
        assert!(entity.dirty);
        assert!(entity.version.is_none());

        let clean = entity.into_clean();
        assert!(!clean.dirty);
        assert!(clean.into_dirty().dirty);
    }

    #[test]
    fn confirmed_entity_is_clean() {
        let entity = Entity::confirmed("a", VersionToken::new("v1"), "body");
        assert!(!entity.dirty);
        assert!(entity.has_version(&VersionToken::new("v1")));
        assert!(!entity.has_version(&VersionToken::new("v2")));
    }

    #[test]
    fn serde_is_transparent_for_ids() {
        let entity = Entity::confirmed("item-1", VersionToken::new("AAAB"), 5u8);
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["id"], "item-1");
        assert_eq!(json["version"], "AAAB");
        assert_eq!(json["dirty"], false);

        let back: Entity<u8> = serde_json::from_value(json).unwrap();
        assert_eq!(back, entity);
    }
}
