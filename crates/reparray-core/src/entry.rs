//! A single stored record and its identity types.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of an entry.
///
/// Assigned at creation and never reused. The nil UUID is the invalid GUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryGuid(Uuid);

impl EntryGuid {
    /// Generate a fresh random GUID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The invalid GUID.
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_nil()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntryGuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Uppercase simple form, as the identifier default.
        write!(f, "{}", self.0.simple().to_string().to_uppercase())
    }
}

impl std::str::FromStr for EntryGuid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Name of the concrete type needed to reconstruct a payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeTag(String);

impl TypeTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque serialized payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// One stored record.
///
/// `position` is a cache of the entry's slot in the backing sequence and is
/// only trusted after checking it against the index maps. `insertion_order`
/// is fixed at creation and is what [`IndexedArray::sort_by_index`] restores.
///
/// [`IndexedArray::sort_by_index`]: crate::IndexedArray::sort_by_index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub(crate) payload: Payload,
    pub(crate) type_tag: TypeTag,
    pub(crate) guid: EntryGuid,
    pub(crate) identifier: String,
    pub(crate) position: usize,
    pub(crate) insertion_order: u64,
    pub(crate) replication_key: u32,
}

impl Entry {
    /// Build a detached entry. An empty identifier defaults to the GUID string.
    pub fn new(payload: Payload, type_tag: TypeTag, guid: EntryGuid, identifier: &str) -> Self {
        let identifier = if identifier.is_empty() {
            guid.to_string()
        } else {
            identifier.to_string()
        };
        Self {
            payload,
            type_tag,
            guid,
            identifier,
            position: 0,
            insertion_order: 0,
            replication_key: 0,
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    pub fn guid(&self) -> EntryGuid {
        self.guid
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn insertion_order(&self) -> u64 {
        self.insertion_order
    }

    pub fn replication_key(&self) -> u32 {
        self.replication_key
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.replication_key = self.replication_key.wrapping_add(1);
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' [{}], type '{}', position {}",
            self.identifier, self.guid, self.type_tag, self.position
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_defaults_to_guid_string() {
        let guid = EntryGuid::new();
        let entry = Entry::new(Payload::from("x"), TypeTag::new("T"), guid, "");
        assert_eq!(entry.identifier(), guid.to_string());
    }

    #[test]
    fn explicit_identifier_is_kept() {
        let entry = Entry::new(
            Payload::from("x"),
            TypeTag::new("T"),
            EntryGuid::new(),
            "BraveQuietFox",
        );
        assert_eq!(entry.identifier(), "BraveQuietFox");
    }

    #[test]
    fn nil_guid_is_invalid() {
        assert!(!EntryGuid::nil().is_valid());
        assert!(EntryGuid::new().is_valid());
        assert_ne!(EntryGuid::new(), EntryGuid::new());
    }

    #[test]
    fn guid_display_parses_back() {
        let guid = EntryGuid::new();
        let parsed: EntryGuid = guid.to_string().parse().unwrap();
        assert_eq!(parsed, guid);
    }

    #[test]
    fn display_mentions_identity() {
        let guid = EntryGuid::new();
        let entry = Entry::new(Payload::from("x"), TypeTag::new("Weapon"), guid, "Blade");
        let text = entry.to_string();
        assert!(text.contains("Blade"));
        assert!(text.contains("Weapon"));
        assert!(text.contains(&guid.to_string()));
    }

    #[test]
    fn mark_dirty_bumps_replication_key() {
        let mut entry = Entry::new(Payload::from("x"), TypeTag::new("T"), EntryGuid::new(), "a");
        let before = entry.replication_key();
        entry.mark_dirty();
        assert_eq!(entry.replication_key(), before + 1);
    }
}
