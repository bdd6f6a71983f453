//! Snapshot codec: model state to version documents and back.
//!
//! A committed version is stored either as a full snapshot (`absolute`) or
//! as a delta against the previous version (`relative`).
//!
//! ## Layout
//!
//! Entities are written as three parallel int64 arrays per kind:
//!
//! - `topoAddEdit_Id` / `topoAddEdit_Parent` / `topoAddEdit_Version`
//! - `dataAddEdit_Id` / `dataAddEdit_Parent` / `dataAddEdit_Version`
//!
//! A delta also carries `topoDel_Id` / `dataDel_Id`. Columns are written
//! only when non-empty, and entities always appear in ascending id order.
//!
//! A snapshot larger than the per-document cap is split into a main
//! document with `Extension = true` plus `ModelStateExtension` documents
//! sharing its `Version`.

mod decode;
mod encode;

pub use decode::{apply_state_data, read_version_summary, StateHeader, VersionSummary};
pub use encode::{encode_absolute, encode_relative, EncodedState};

use serde::Serialize;
use std::fmt;

/// How a version document stores its entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StateKind {
    /// Full snapshot.
    Absolute,
    /// Delta against the previous version.
    Relative,
}

impl StateKind {
    /// The `Type` wire value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Absolute => crate::schema::state::TYPE_ABSOLUTE,
            Self::Relative => crate::schema::state::TYPE_RELATIVE,
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header values of a version being written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionMeta {
    /// Version name.
    pub version: String,
    /// Version saved on top of.
    pub parent: String,
    /// Save comment.
    pub description: String,
    /// User label.
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{column, schema_type, state};
    use crate::tracker::EntityMap;
    use crate::types::{EntityKind, EntityRecord, Uid};
    use modelstate_storage::{Document, InsertionOrder};

    fn meta(version: &str) -> VersionMeta {
        VersionMeta {
            version: version.to_string(),
            parent: String::new(),
            description: "saved".to_string(),
            label: String::new(),
        }
    }

    fn entities(count: u64) -> EntityMap {
        (1..=count)
            .map(|i| {
                let kind = if i % 2 == 0 { EntityKind::Data } else { EntityKind::Topology };
                (Uid::new(i), EntityRecord::new(Uid::new(1000 + i), Uid::new(i / 2), kind))
            })
            .collect()
    }

    fn as_doc(fields: modelstate_storage::Fields) -> Document {
        Document::new(InsertionOrder::new(1), fields)
    }

    #[test]
    fn absolute_round_trip() {
        let source = entities(7);
        let encoded = encode_absolute(&meta("1"), &source, 100);
        assert!(encoded.extensions.is_empty());

        let main = as_doc(encoded.main);
        let header = StateHeader::from_document(&main).unwrap();
        assert_eq!(header.kind, StateKind::Absolute);
        assert!(!header.extension);

        let mut decoded = EntityMap::new();
        apply_state_data(&mut decoded, &main).unwrap();
        assert_eq!(decoded, source);
    }

    #[test]
    fn extension_split_round_trip() {
        let source = entities(10);
        let encoded = encode_absolute(&meta("4"), &source, 3);
        assert_eq!(encoded.document_count(), 4);
        assert_eq!(
            encoded.main.get(state::EXTENSION).and_then(|v| v.as_bool()),
            Some(true)
        );
        for ext in &encoded.extensions {
            assert_eq!(
                ext.get(crate::schema::SCHEMA_TYPE).and_then(|v| v.as_str()),
                Some(schema_type::MODEL_STATE_EXTENSION)
            );
            assert_eq!(ext.get(state::VERSION).and_then(|v| v.as_str()), Some("4"));
        }

        let mut decoded = EntityMap::new();
        apply_state_data(&mut decoded, &as_doc(encoded.main)).unwrap();
        for ext in encoded.extensions {
            apply_state_data(&mut decoded, &as_doc(ext)).unwrap();
        }
        assert_eq!(decoded, source);
    }

    #[test]
    fn relative_applies_deletes_before_adds() {
        let mut base = entities(4);
        let mut added = EntityMap::new();
        added.insert(
            Uid::new(2),
            EntityRecord::new(Uid::new(77), Uid::new(1), EntityKind::Data),
        );
        let mut removed = EntityMap::new();
        removed.insert(
            Uid::new(2),
            EntityRecord::new(Uid::new(1002), Uid::new(1), EntityKind::Data),
        );
        removed.insert(
            Uid::new(3),
            EntityRecord::new(Uid::new(1003), Uid::new(1), EntityKind::Topology),
        );

        let fields = encode_relative(&meta("2"), "1", &added, &removed);
        let doc = as_doc(fields);
        let header = StateHeader::from_document(&doc).unwrap();
        assert_eq!(header.kind, StateKind::Relative);
        assert_eq!(header.base_state.as_deref(), Some("1"));

        apply_state_data(&mut base, &doc).unwrap();
        assert_eq!(base.get(&Uid::new(2)).unwrap().version, Uid::new(77));
        assert!(!base.contains_key(&Uid::new(3)));
        assert_eq!(base.len(), 3);
    }

    #[test]
    fn empty_state_writes_no_columns() {
        let encoded = encode_absolute(&meta("1"), &EntityMap::new(), 10);
        assert!(encoded.main.get(&column(EntityKind::Topology, state::ADD_EDIT_ID)).is_none());
        assert!(encoded.main.get(&column(EntityKind::Data, state::ADD_EDIT_ID)).is_none());
    }
}
