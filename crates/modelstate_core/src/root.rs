//! The per-project root descriptor (`SchemaType = "Model"`).

use crate::error::{CoreError, CoreResult};
use crate::schema::{model, schema_type, SCHEMA_TYPE};
use crate::types::Uid;
use crate::uid::UidGenerator;
use modelstate_storage::{Document, DocumentStore, Fields, Filter, FindOptions, Update};
use serde::Serialize;

/// An `(entity id, entity version)` reference with a format tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentRef {
    /// Entity id.
    pub uid: Uid,
    /// Entity version.
    pub version: Uid,
    /// Format or syntax tag.
    pub tag: String,
}

/// Decoded root descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootDescriptor {
    /// `SchemaVersion_Model`.
    pub schema_version: i64,
    /// Entity version of the descriptor document, its update key.
    pub entity_version: i64,
    /// `ModelType`, absent before the schema upgrade.
    pub model_type: Option<String>,
    /// Stored active branch.
    pub active_branch: String,
    /// Stored active version; empty means "last version of the branch".
    pub active_version: String,
    /// Referenced preview image.
    pub preview_image: Option<AttachmentRef>,
    /// Referenced project description.
    pub description: Option<AttachmentRef>,
}

impl RootDescriptor {
    /// Reads the newest root descriptor of the project.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn load(store: &dyn DocumentStore) -> CoreResult<Option<Self>> {
        let found = store.find_one(
            &Filter::eq(SCHEMA_TYPE, schema_type::MODEL),
            &FindOptions::new().newest_first(),
        )?;
        Ok(found.as_ref().map(Self::from_document))
    }

    /// Decodes a root descriptor document. Missing fields take defaults.
    #[must_use]
    pub fn from_document(doc: &Document) -> Self {
        let text = |field: &str| doc.get_str(field).unwrap_or_default().to_string();
        Self {
            schema_version: doc.get_i64(model::SCHEMA_VERSION).unwrap_or(1),
            entity_version: doc.get_i64(model::VERSION).unwrap_or(0),
            model_type: doc.get_str(model::MODEL_TYPE).map(str::to_string),
            active_branch: text(model::ACTIVE_BRANCH),
            active_version: text(model::ACTIVE_VERSION),
            preview_image: attachment(
                doc,
                model::PREVIEW_IMAGE_UID,
                model::PREVIEW_IMAGE_VERSION,
                model::PREVIEW_IMAGE_TYPE,
            ),
            description: attachment(
                doc,
                model::DESCRIPTION_UID,
                model::DESCRIPTION_VERSION,
                model::DESCRIPTION_SYNTAX,
            ),
        }
    }

    /// Inserts a fresh descriptor at the current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if no UID can be allocated or the write fails.
    pub fn create(store: &mut dyn DocumentStore, uids: &mut dyn UidGenerator) -> CoreResult<Self> {
        let entity_id = uids.next_uid()?;
        let entity_version = uids.next_uid()?;

        let mut fields = Fields::new();
        fields.insert(SCHEMA_TYPE.into(), schema_type::MODEL.into());
        fields.insert(model::SCHEMA_VERSION.into(), model::CURRENT_SCHEMA_VERSION.into());
        fields.insert(model::ENTITY_ID.into(), entity_id.to_wire().into());
        fields.insert(model::VERSION.into(), entity_version.to_wire().into());
        fields.insert(model::MODEL_TYPE.into(), model::DEFAULT_MODEL_TYPE.into());
        fields.insert(model::ACTIVE_BRANCH.into(), "".into());
        fields.insert(model::ACTIVE_VERSION.into(), "".into());
        store.insert(fields)?;

        tracing::info!(entity = %entity_id, "created root descriptor");

        Ok(Self {
            schema_version: model::CURRENT_SCHEMA_VERSION,
            entity_version: entity_version.to_wire(),
            model_type: Some(model::DEFAULT_MODEL_TYPE.to_string()),
            active_branch: String::new(),
            active_version: String::new(),
            preview_image: None,
            description: None,
        })
    }

    /// Writes fields into the stored descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the descriptor document vanished,
    /// or a storage error.
    pub fn update(&self, store: &mut dyn DocumentStore, update: &Update) -> CoreResult<()> {
        let filter = Filter::eq(SCHEMA_TYPE, schema_type::MODEL).and(Filter::eq(model::VERSION, self.entity_version));
        if store.update_one(&filter, update)? == 0 {
            return Err(CoreError::not_found("root descriptor"));
        }
        Ok(())
    }

    /// Writes the active branch and version.
    ///
    /// # Errors
    ///
    /// See [`RootDescriptor::update`].
    pub fn write_pointer(&mut self, store: &mut dyn DocumentStore, branch: &str, version: &str) -> CoreResult<()> {
        self.update(
            store,
            &Update::set(model::ACTIVE_BRANCH, branch).and_set(model::ACTIVE_VERSION, version),
        )?;
        self.active_branch = branch.to_string();
        self.active_version = version.to_string();
        Ok(())
    }
}

fn attachment(doc: &Document, uid_field: &str, version_field: &str, tag_field: &str) -> Option<AttachmentRef> {
    let uid = Uid::from_wire(doc.get_i64(uid_field)?);
    if uid.is_null() {
        return None;
    }
    Some(AttachmentRef {
        uid,
        version: Uid::from_wire(doc.get_i64(version_field).unwrap_or(0)),
        tag: doc.get_str(tag_field).unwrap_or_default().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uid::SequentialUidGenerator;
    use modelstate_storage::InMemoryDocumentStore;

    #[test]
    fn missing_descriptor_loads_as_none() {
        let store = InMemoryDocumentStore::new();
        assert!(RootDescriptor::load(&store).unwrap().is_none());
    }

    #[test]
    fn create_then_load() {
        let mut store = InMemoryDocumentStore::new();
        let mut uids = SequentialUidGenerator::new();
        let created = RootDescriptor::create(&mut store, &mut uids).unwrap();
        let loaded = RootDescriptor::load(&store).unwrap().unwrap();
        assert_eq!(created, loaded);
        assert_eq!(loaded.schema_version, 2);
        assert_eq!(loaded.model_type.as_deref(), Some("Parametric3D"));
    }

    #[test]
    fn pointer_write_round_trip() {
        let mut store = InMemoryDocumentStore::new();
        let mut uids = SequentialUidGenerator::new();
        let mut root = RootDescriptor::create(&mut store, &mut uids).unwrap();
        root.write_pointer(&mut store, "2.1", "2.1.3").unwrap();

        let loaded = RootDescriptor::load(&store).unwrap().unwrap();
        assert_eq!(loaded.active_branch, "2.1");
        assert_eq!(loaded.active_version, "2.1.3");
    }

    #[test]
    fn attachment_references_decode() {
        let mut store = InMemoryDocumentStore::new();
        let mut uids = SequentialUidGenerator::new();
        let root = RootDescriptor::create(&mut store, &mut uids).unwrap();
        root.update(
            &mut store,
            &Update::set(model::PREVIEW_IMAGE_UID, 10)
                .and_set(model::PREVIEW_IMAGE_VERSION, 11)
                .and_set(model::PREVIEW_IMAGE_TYPE, "png")
                .and_set(model::DESCRIPTION_UID, 0),
        )
        .unwrap();

        let loaded = RootDescriptor::load(&store).unwrap().unwrap();
        let image = loaded.preview_image.unwrap();
        assert_eq!(image.uid, Uid::new(10));
        assert_eq!(image.version, Uid::new(11));
        assert_eq!(image.tag, "png");
        assert!(loaded.description.is_none());
    }

    #[test]
    fn update_of_vanished_descriptor_fails() {
        let mut store = InMemoryDocumentStore::new();
        let mut uids = SequentialUidGenerator::new();
        let root = RootDescriptor::create(&mut store, &mut uids).unwrap();
        store.clear();
        assert!(matches!(
            root.update(&mut store, &Update::set("x", 1)),
            Err(CoreError::NotFound { .. })
        ));
    }
}
