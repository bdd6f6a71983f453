//! Version document decoding.

use super::StateKind;
use crate::error::{CoreError, CoreResult};
use crate::schema::{column, schema_type, state, SCHEMA_TYPE};
use crate::tracker::EntityMap;
use crate::types::{EntityKind, EntityRecord, Uid};
use modelstate_storage::Document;
use serde_json::Value;

/// Checked header of a `ModelState` document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateHeader {
    /// Version name.
    pub version: String,
    /// Snapshot or delta.
    pub kind: StateKind,
    /// Whether extension documents follow.
    pub extension: bool,
    /// Base of a delta.
    pub base_state: Option<String>,
}

impl StateHeader {
    /// Validates `SchemaType`, `SchemaVersion_ModelState` and `Type`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SchemaMismatch`] for an unexpected tag or a
    /// missing required field.
    pub fn from_document(doc: &Document) -> CoreResult<Self> {
        expect_schema_type(doc, schema_type::MODEL_STATE)?;
        expect_schema_version(doc, state::SCHEMA_VERSION)?;

        let version = required_str(doc, state::VERSION)?.to_string();
        let kind = match required_str(doc, state::TYPE)? {
            state::TYPE_ABSOLUTE => StateKind::Absolute,
            state::TYPE_RELATIVE => StateKind::Relative,
            other => {
                return Err(CoreError::schema_mismatch(format!(
                    "version {version}: unknown Type {other:?}"
                )))
            }
        };
        let extension = doc.get_bool(state::EXTENSION).unwrap_or(false);
        let base_state = match kind {
            StateKind::Absolute => None,
            StateKind::Relative => Some(required_str(doc, state::BASE_STATE)?.to_string()),
        };

        Ok(Self {
            version,
            kind,
            extension,
            base_state,
        })
    }

    /// Validates an extension document belonging to this header.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SchemaMismatch`] if the document is not an
    /// extension of this version.
    pub fn check_extension(&self, doc: &Document) -> CoreResult<()> {
        expect_schema_type(doc, schema_type::MODEL_STATE_EXTENSION)?;
        expect_schema_version(doc, state::EXTENSION_SCHEMA_VERSION)?;
        let version = required_str(doc, state::VERSION)?;
        if version != self.version {
            return Err(CoreError::schema_mismatch(format!(
                "extension of version {version} read for version {}",
                self.version
            )));
        }
        Ok(())
    }
}

/// Graph-relevant fields of a version document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSummary {
    /// Version name.
    pub version: String,
    /// Parent version, empty for the first version.
    pub parent: String,
    /// User label.
    pub label: String,
    /// Save comment.
    pub description: String,
}

/// Reads the summary used to rebuild the version graph.
///
/// Only `Version` is required; documents written before labels existed
/// simply have none.
///
/// # Errors
///
/// Returns [`CoreError::SchemaMismatch`] if `Version` is missing.
pub fn read_version_summary(doc: &Document) -> CoreResult<VersionSummary> {
    let optional = |field: &str| doc.get_str(field).unwrap_or_default().to_string();
    Ok(VersionSummary {
        version: required_str(doc, state::VERSION)?.to_string(),
        parent: optional(state::PARENT_VERSION),
        label: optional(state::LABEL),
        description: optional(state::DESCRIPTION),
    })
}

/// Applies the entity columns of one document to `entities`.
///
/// Deletes are applied before adds and edits, so an id both removed and
/// re-added in one delta ends up present.
///
/// # Errors
///
/// Returns [`CoreError::SchemaMismatch`] if a column is not an int64 array
/// or parallel columns differ in length.
pub fn apply_state_data(entities: &mut EntityMap, doc: &Document) -> CoreResult<()> {
    for kind in [EntityKind::Topology, EntityKind::Data] {
        if let Some(ids) = int_column(doc, &column(kind, state::DEL_ID))? {
            for id in ids {
                entities.remove(&id);
            }
        }
    }

    for kind in [EntityKind::Topology, EntityKind::Data] {
        let ids = int_column(doc, &column(kind, state::ADD_EDIT_ID))?;
        let parents = int_column(doc, &column(kind, state::ADD_EDIT_PARENT))?;
        let versions = int_column(doc, &column(kind, state::ADD_EDIT_VERSION))?;

        let (ids, parents, versions) = match (ids, parents, versions) {
            (None, None, None) => continue,
            (Some(ids), Some(parents), Some(versions))
                if ids.len() == parents.len() && ids.len() == versions.len() =>
            {
                (ids, parents, versions)
            }
            _ => {
                return Err(CoreError::schema_mismatch(format!(
                    "{kind} columns of version {} are incomplete or of unequal length",
                    doc.get_str(state::VERSION).unwrap_or_default()
                )))
            }
        };

        for ((id, parent), version) in ids.into_iter().zip(parents).zip(versions) {
            entities.insert(id, EntityRecord::new(version, parent, kind));
        }
    }
    Ok(())
}

fn int_column(doc: &Document, field: &str) -> CoreResult<Option<Vec<Uid>>> {
    let Some(value) = doc.get(field) else {
        return Ok(None);
    };
    let Value::Array(items) = value else {
        return Err(CoreError::schema_mismatch(format!("{field} is not an array")));
    };
    items
        .iter()
        .map(|item| {
            item.as_i64()
                .map(Uid::from_wire)
                .or_else(|| item.as_u64().map(Uid::new))
                .ok_or_else(|| CoreError::schema_mismatch(format!("{field} holds a non-integer")))
        })
        .collect::<CoreResult<Vec<_>>>()
        .map(Some)
}

fn required_str<'a>(doc: &'a Document, field: &str) -> CoreResult<&'a str> {
    doc.get_str(field)
        .ok_or_else(|| CoreError::schema_mismatch(format!("missing string field {field}")))
}

fn expect_schema_type(doc: &Document, expected: &str) -> CoreResult<()> {
    match doc.get_str(SCHEMA_TYPE) {
        Some(actual) if actual == expected => Ok(()),
        actual => Err(CoreError::schema_mismatch(format!(
            "expected SchemaType {expected}, found {actual:?}"
        ))),
    }
}

fn expect_schema_version(doc: &Document, field: &str) -> CoreResult<()> {
    match doc.get_i64(field) {
        Some(v) if v == i64::from(state::CURRENT_SCHEMA_VERSION) => Ok(()),
        actual => Err(CoreError::schema_mismatch(format!(
            "unsupported {field} {actual:?}"
        ))),
    }
}
