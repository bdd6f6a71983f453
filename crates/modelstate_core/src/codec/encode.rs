//! Version document encoding.

use super::{StateKind, VersionMeta};
use crate::schema::{column, schema_type, state, SCHEMA_TYPE};
use crate::tracker::EntityMap;
use crate::types::{EntityKind, EntityRecord, Uid};
use modelstate_storage::Fields;
use serde_json::Value;

/// Documents produced for one version.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedState {
    /// The `ModelState` document.
    pub main: Fields,
    /// `ModelStateExtension` documents, in write order.
    pub extensions: Vec<Fields>,
}

impl EncodedState {
    /// Total number of documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        1 + self.extensions.len()
    }
}

/// Encodes a full snapshot.
///
/// At most `entities_per_document` entities go into each document; the
/// remainder spills into extension documents.
#[must_use]
pub fn encode_absolute(
    meta: &VersionMeta,
    entities: &EntityMap,
    entities_per_document: usize,
) -> EncodedState {
    let per_document = entities_per_document.max(1);
    let all: Vec<(&Uid, &EntityRecord)> = entities.iter().collect();
    let mut chunks = all.chunks(per_document);

    let first = chunks.next().unwrap_or(&[]);
    let extended = entities.len() > per_document;

    let mut main = header(meta, StateKind::Absolute, extended);
    write_add_edit_columns(&mut main, first.iter().copied());

    let extensions = chunks
        .map(|chunk| {
            let mut doc = Fields::new();
            doc.insert(SCHEMA_TYPE.into(), schema_type::MODEL_STATE_EXTENSION.into());
            doc.insert(
                state::EXTENSION_SCHEMA_VERSION.into(),
                state::CURRENT_SCHEMA_VERSION.into(),
            );
            doc.insert(state::VERSION.into(), meta.version.clone().into());
            write_add_edit_columns(&mut doc, chunk.iter().copied());
            doc
        })
        .collect();

    EncodedState { main, extensions }
}

/// Encodes a delta against `base_state`.
#[must_use]
pub fn encode_relative(
    meta: &VersionMeta,
    base_state: &str,
    added_or_modified: &EntityMap,
    removed: &EntityMap,
) -> Fields {
    let mut doc = header(meta, StateKind::Relative, false);
    doc.insert(state::BASE_STATE.into(), base_state.into());
    write_add_edit_columns(&mut doc, added_or_modified.iter());

    for kind in [EntityKind::Topology, EntityKind::Data] {
        let ids: Vec<Value> = removed
            .iter()
            .filter(|(_, record)| record.kind == kind)
            .map(|(id, _)| id.to_wire().into())
            .collect();
        if !ids.is_empty() {
            doc.insert(column(kind, state::DEL_ID), Value::Array(ids));
        }
    }
    doc
}

fn header(meta: &VersionMeta, kind: StateKind, extension: bool) -> Fields {
    let mut doc = Fields::new();
    doc.insert(SCHEMA_TYPE.into(), schema_type::MODEL_STATE.into());
    doc.insert(state::SCHEMA_VERSION.into(), state::CURRENT_SCHEMA_VERSION.into());
    doc.insert(state::VERSION.into(), meta.version.clone().into());
    doc.insert(state::PARENT_VERSION.into(), meta.parent.clone().into());
    doc.insert(state::TYPE.into(), kind.as_str().into());
    doc.insert(state::EXTENSION.into(), extension.into());
    doc.insert(state::DESCRIPTION.into(), meta.description.clone().into());
    doc.insert(state::LABEL.into(), meta.label.clone().into());
    doc
}

#[derive(Default)]
struct Columns {
    ids: Vec<Value>,
    parents: Vec<Value>,
    versions: Vec<Value>,
}

fn write_add_edit_columns<'a>(
    doc: &mut Fields,
    entities: impl Iterator<Item = (&'a Uid, &'a EntityRecord)>,
) {
    let mut topo = Columns::default();
    let mut data = Columns::default();
    for (id, record) in entities {
        let target = match record.kind {
            EntityKind::Topology => &mut topo,
            EntityKind::Data => &mut data,
        };
        target.ids.push(id.to_wire().into());
        target.parents.push(record.parent.to_wire().into());
        target.versions.push(record.version.to_wire().into());
    }

    for (kind, columns) in [(EntityKind::Topology, topo), (EntityKind::Data, data)] {
        if columns.ids.is_empty() {
            continue;
        }
        doc.insert(column(kind, state::ADD_EDIT_ID), Value::Array(columns.ids));
        doc.insert(column(kind, state::ADD_EDIT_PARENT), Value::Array(columns.parents));
        doc.insert(column(kind, state::ADD_EDIT_VERSION), Value::Array(columns.versions));
    }
}
