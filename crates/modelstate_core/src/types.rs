//! Core type definitions for the model state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of an entity or of one entity version.
///
/// UIDs are written to documents as int64 with the bit pattern preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Uid(pub u64);

impl Uid {
    /// The null UID, used as "no parent".
    pub const NULL: Self = Self(0);

    /// Creates a new UID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the int64 wire representation.
    #[must_use]
    pub const fn to_wire(self) -> i64 {
        self.0 as i64
    }

    /// Reads a UID from its int64 wire representation.
    #[must_use]
    pub const fn from_wire(raw: i64) -> Self {
        Self(raw as u64)
    }

    /// Returns whether this is the null UID.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Uid {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Category of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Part of the visible model tree.
    Topology,
    /// Payload attached to topology entities.
    Data,
}

impl EntityKind {
    /// Prefix of the document array columns for this kind.
    #[must_use]
    pub const fn column_prefix(self) -> &'static str {
        match self {
            Self::Topology => "topo",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topology => write!(f, "topology"),
            Self::Data => write!(f, "data"),
        }
    }
}

/// Placement and version of one entity.
///
/// Records are values: every update replaces the record, so a delta set
/// holds a snapshot independent of later changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Version of the entity document.
    pub version: Uid,
    /// Parent entity, or [`Uid::NULL`].
    pub parent: Uid,
    /// Entity category.
    pub kind: EntityKind,
}

impl EntityRecord {
    /// Creates a record.
    #[must_use]
    pub const fn new(version: Uid, parent: Uid, kind: EntityKind) -> Self {
        Self {
            version,
            parent,
            kind,
        }
    }

    /// Returns a copy with another version.
    #[must_use]
    pub const fn with_version(self, version: Uid) -> Self {
        Self { version, ..self }
    }

    /// Returns a copy with another parent.
    #[must_use]
    pub const fn with_parent(self, parent: Uid) -> Self {
        Self { parent, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_wire_round_trip_keeps_high_bit() {
        let uid = Uid::new(u64::MAX - 3);
        assert!(uid.to_wire() < 0);
        assert_eq!(Uid::from_wire(uid.to_wire()), uid);
    }

    #[test]
    fn uid_display() {
        assert_eq!(Uid::new(42).to_string(), "42");
        assert!(Uid::NULL.is_null());
    }

    #[test]
    fn record_replacement_leaves_original() {
        let original = EntityRecord::new(Uid::new(1), Uid::new(2), EntityKind::Data);
        let changed = original.with_version(Uid::new(5)).with_parent(Uid::new(9));
        assert_eq!(original.version, Uid::new(1));
        assert_eq!(changed.version, Uid::new(5));
        assert_eq!(changed.parent, Uid::new(9));
        assert_eq!(changed.kind, EntityKind::Data);
    }

    #[test]
    fn column_prefixes() {
        assert_eq!(EntityKind::Topology.column_prefix(), "topo");
        assert_eq!(EntityKind::Data.column_prefix(), "data");
    }
}
