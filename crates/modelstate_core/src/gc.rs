//! Post-crash cleanup of entity documents no committed version references.
//!
//! Entity documents are written before the version document that commits
//! them. A crash in between leaves documents newer than the last version
//! document; those are deleted here. The newest version document's order
//! is rounded down to its coarse part since concurrent writers may assign
//! fine parts out of order.
//!
//! An interrupted absolute save may also leave extension documents whose
//! main document was never written. They are deleted with the entity
//! documents around them.

use crate::error::CoreResult;
use crate::schema::{entity, schema_type, state, SCHEMA_TYPE};
use crate::types::Uid;
use modelstate_storage::{Document, DocumentStore, Filter, FindOptions, InsertionOrder};
use serde::Serialize;

/// Types written last by a save; their presence commits a version.
const MAIN_DOCUMENTS: [&str; 2] = [schema_type::MODEL_STATE, schema_type::MODEL_STATE_INACTIVE];

/// Outcome of one garbage collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    /// Lower bound of the scanned window; `None` if the project has no
    /// version document.
    pub cutoff: Option<InsertionOrder>,
    /// Documents inspected before the walk stopped.
    pub scanned: usize,
    /// Documents deleted.
    pub deleted: u64,
    /// Candidates kept because the root descriptor references them.
    pub protected: usize,
}

/// Deletes dangling entity documents.
///
/// `protected` lists `(entity id, entity version)` pairs that must survive,
/// i.e. the attachments referenced by the root descriptor.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn collect_garbage(store: &mut dyn DocumentStore, protected: &[(Uid, Uid)]) -> CoreResult<GcReport> {
    let newest = match store.find_one(
        &Filter::one_of(SCHEMA_TYPE, MAIN_DOCUMENTS),
        &FindOptions::new().newest_first().projection([SCHEMA_TYPE]),
    )? {
        Some(main) => Some(main),
        None => store.find_one(
            &Filter::one_of(SCHEMA_TYPE, schema_type::VERSION_DOCUMENTS),
            &FindOptions::new().newest_first().projection([SCHEMA_TYPE]),
        )?,
    };
    let Some(newest) = newest else {
        tracing::warn!("no version document found, skipping garbage collection");
        return Ok(GcReport::default());
    };

    let cutoff = newest.order().coarse_floor();
    let mut report = GcReport {
        cutoff: Some(cutoff),
        ..GcReport::default()
    };

    let window = store.find_all(
        &Filter::order_at_least(cutoff),
        &FindOptions::new()
            .newest_first()
            .projection([SCHEMA_TYPE, entity::ENTITY_ID, entity::VERSION]),
    )?;

    let mut doomed = Vec::new();
    for doc in window {
        report.scanned += 1;
        let kind = doc.get_str(SCHEMA_TYPE).unwrap_or_default();
        if MAIN_DOCUMENTS.contains(&kind) {
            break;
        }
        if schema_type::VERSION_DOCUMENTS.contains(&kind) {
            if has_main_document(store, &doc)? {
                break;
            }
            tracing::warn!(
                order = %doc.order(),
                version = doc.get_str(state::VERSION).unwrap_or_default(),
                "extension document without main document"
            );
            doomed.push(doc.order());
            continue;
        }
        if kind == schema_type::MODEL {
            continue;
        }
        if is_protected(&doc, protected) {
            report.protected += 1;
            continue;
        }
        doomed.push(doc.order());
    }

    if !doomed.is_empty() {
        report.deleted = store.delete_many(&Filter::orders(doomed))?;
    }

    tracing::info!(
        cutoff = %cutoff,
        scanned = report.scanned,
        deleted = report.deleted,
        protected = report.protected,
        "garbage collection finished"
    );
    Ok(report)
}

/// Whether the version of an extension document was committed.
fn has_main_document(store: &dyn DocumentStore, extension: &Document) -> CoreResult<bool> {
    let Some(version) = extension.get_str(state::VERSION) else {
        return Ok(false);
    };
    let mains = store.count(&Filter::one_of(SCHEMA_TYPE, MAIN_DOCUMENTS).and(Filter::eq(state::VERSION, version)))?;
    Ok(mains > 0)
}

fn is_protected(doc: &Document, protected: &[(Uid, Uid)]) -> bool {
    let (Some(id), Some(version)) = (doc.get_i64(entity::ENTITY_ID), doc.get_i64(entity::VERSION)) else {
        return false;
    };
    protected.contains(&(Uid::from_wire(id), Uid::from_wire(version)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelstate_storage::{Fields, InMemoryDocumentStore};
    use serde_json::json;

    fn insert(store: &mut InMemoryDocumentStore, value: serde_json::Value) -> InsertionOrder {
        let serde_json::Value::Object(fields) = value else {
            panic!("expected object");
        };
        store.insert(fields).unwrap()
    }

    fn entity_doc(id: i64) -> serde_json::Value {
        json!({"SchemaType": "Geometry", "EntityID": id, "Version": id + 100})
    }

    #[test]
    fn no_version_document_deletes_nothing() {
        let mut store = InMemoryDocumentStore::new();
        insert(&mut store, entity_doc(1));
        let report = collect_garbage(&mut store, &[]).unwrap();
        assert_eq!(report, GcReport::default());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn deletes_documents_after_last_version() {
        let mut store = InMemoryDocumentStore::new();
        insert(&mut store, json!({"SchemaType": "Model", "Version": 1}));
        let kept = insert(&mut store, entity_doc(1));
        insert(&mut store, json!({"SchemaType": "ModelState", "Version": "1"}));
        insert(&mut store, entity_doc(2));
        insert(&mut store, entity_doc(3));

        let report = collect_garbage(&mut store, &[]).unwrap();
        assert_eq!(report.deleted, 2);
        assert_eq!(report.scanned, 3);
        assert_eq!(store.len(), 3);
        assert!(store.documents().iter().any(|d| d.order() == kept));
    }

    #[test]
    fn protected_reference_survives() {
        let mut store = InMemoryDocumentStore::new();
        insert(&mut store, json!({"SchemaType": "ModelState", "Version": "1"}));
        insert(&mut store, json!({"SchemaType": "PreviewImage", "EntityID": 9, "Version": 10}));
        insert(&mut store, entity_doc(2));

        let report = collect_garbage(&mut store, &[(Uid::new(9), Uid::new(10))]).unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.protected, 1);
        let left = store.count(&Filter::eq(SCHEMA_TYPE, "PreviewImage")).unwrap();
        assert_eq!(left, 1);
    }

    #[test]
    fn root_descriptor_is_never_deleted() {
        let mut store = InMemoryDocumentStore::new();
        insert(&mut store, json!({"SchemaType": "ModelStateInactive", "Version": "1"}));
        insert(&mut store, json!({"SchemaType": "Model", "Version": 1}));

        let report = collect_garbage(&mut store, &[]).unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn orphan_extension_does_not_stop_the_walk() {
        let mut store = InMemoryDocumentStore::new();
        insert(&mut store, json!({"SchemaType": "ModelStateExtension", "Version": "1"}));
        insert(&mut store, json!({"SchemaType": "ModelState", "Version": "1"}));
        insert(&mut store, json!({"SchemaType": "Model", "Version": 1}));
        insert(&mut store, entity_doc(2));
        insert(&mut store, json!({"SchemaType": "ModelStateExtension", "Version": "2"}));
        insert(&mut store, entity_doc(3));

        let report = collect_garbage(&mut store, &[]).unwrap();
        assert_eq!(report.deleted, 3);
        assert_eq!(report.scanned, 5);
        let extensions = store.count(&Filter::eq(SCHEMA_TYPE, "ModelStateExtension")).unwrap();
        assert_eq!(extensions, 1);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn cutoff_is_coarse_floor_of_newest_version_document() {
        let mut store = InMemoryDocumentStore::with_documents([Document::new(
            InsertionOrder::new(0x3_0005),
            Fields::from_iter([("SchemaType".to_string(), json!("ModelStateExtension"))]),
        )]);
        let report = collect_garbage(&mut store, &[]).unwrap();
        assert_eq!(report.cutoff, Some(InsertionOrder::new(0x3_0000)));
    }
}
