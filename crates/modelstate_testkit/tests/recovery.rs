//! Crash recovery, garbage collection and schema upgrades.

use modelstate_core::{
    CoreError, ImageFormat, ModelStateManager, PreviewImage, SequentialUidGenerator, Uid,
};
use modelstate_storage::{Document, DocumentStore, Filter, FindOptions, InMemoryDocumentStore};
use modelstate_testkit::prelude::*;
use std::io::Write;

fn png() -> PreviewImage {
    PreviewImage {
        data: vec![0x89, b'P', b'N', b'G'],
        format: ImageFormat::Png,
    }
}

#[test]
fn failed_save_leaves_history_untouched() {
    init_test_tracing();
    let (store, switch) = FailingStore::new(InMemoryDocumentStore::new());
    let mut manager = ModelStateManager::with_generator(store, SequentialUidGenerator::new(), test_config());

    let body = manager.create_uid().unwrap();
    manager.add_new_entity(body, Uid::NULL, Uid::new(10), modelstate_core::EntityKind::Topology);
    manager.save_model_state(false, false, "").unwrap();

    manager.modify_entity_version(body, Uid::new(11));
    switch.fail_after(0);
    let err = manager.save_model_state(false, false, "").unwrap_err();
    assert!(matches!(err, CoreError::Storage(_)));
    assert!(switch.has_tripped());
    assert_eq!(manager.version_graph().len(), 1);
    assert_eq!(manager.active_version(), "1");
    assert!(manager.is_modified());

    switch.disarm();
    let outcome = manager.save_model_state(false, false, "").unwrap();
    assert_eq!(outcome.version(), Some("2"));
    assert_eq!(manager.current_version(body), Some(Uid::new(11)));
}

#[test]
fn garbage_from_an_interrupted_session_is_removed_on_open() {
    let mut project = TestProject::file();
    let ids = project.add_chain(2);
    project.write_all_entity_documents();
    project.save_model_state(false, false, "").unwrap();

    // Entity documents of a save that never happened.
    let orphans = project.add_children(ids[1], 3);
    for id in &orphans {
        let version = project.current_version(*id).unwrap();
        project.write_entity_document(*id, version);
    }
    assert_eq!(project.entity_document_count(), 5);

    assert!(project.reopen(test_config().collect_garbage_on_open(true)));
    assert_eq!(project.entity_document_count(), 2);
    assert_eq!(project.tracker().len(), 2);
    assert!(project.read_entity_document(ids[0]).is_ok());
}

#[test]
fn collection_keeps_committed_documents_and_attachments() {
    let mut project = TestProject::memory();
    let ids = project.add_chain(1);
    project.write_all_entity_documents();
    project.save_model_state(false, false, "").unwrap();

    project.set_preview_image(&png()).unwrap();
    let dangling = project.create_uid().unwrap();
    project.write_entity_document(dangling, Uid::new(5));

    let report = project.collect_garbage().unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.protected, 1);
    assert_eq!(project.entity_document_count(), 1);
    assert!(project.read_entity_document(ids[0]).is_ok());
    assert_eq!(project.preview_image().unwrap(), Some(png()));
}

#[test]
fn collection_without_versions_deletes_nothing() {
    let mut project = TestProject::memory();
    let ids = project.add_chain(1);
    project.write_all_entity_documents();

    let report = project.collect_garbage().unwrap();
    assert_eq!(report.deleted, 0);
    assert!(report.cutoff.is_none());
    assert!(project.read_entity_document(ids[0]).is_ok());
}

#[test]
fn torn_log_tail_is_dropped_on_reopen() {
    let mut project = TestProject::file();
    project.add_chain(3);
    project.save_model_state(false, false, "").unwrap();
    let expected = project.tracker().entities().clone();

    let path = project.path().unwrap().to_path_buf();
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"{\"Insert\":{\"order\":").unwrap();
    drop(file);

    assert!(project.reopen(test_config()));
    assert_eq!(project.tracker().entities(), &expected);
}

#[test]
fn schema_one_project_is_upgraded_on_open() {
    let mut project = TestProject::memory();
    let ids = project.add_chain(1);
    project.save_model_state(false, false, "").unwrap();
    project.add_children(ids[0], 2);
    project.save_model_state(false, false, "").unwrap();
    let expected = project.tracker().entities().clone();

    // Strip what schema 2 added: parent links and the root pointer fields.
    let legacy: Vec<Document> = project
        .store()
        .find_all(&Filter::all(), &FindOptions::new())
        .unwrap()
        .map(|doc| {
            let order = doc.order();
            let mut fields = doc.into_fields();
            match fields.get("SchemaType").and_then(|v| v.as_str()) {
                Some("ModelState") => {
                    fields.remove("ParentVersion");
                }
                Some("Model") => {
                    for field in ["ActiveBranch", "ActiveVersion", "ModelType"] {
                        fields.remove(field);
                    }
                    fields.insert("SchemaVersion_Model".to_string(), 1.into());
                }
                _ => {}
            }
            Document::new(order, fields)
        })
        .collect();

    let mut manager = ModelStateManager::with_generator(
        InMemoryDocumentStore::with_documents(legacy),
        SequentialUidGenerator::starting_at(1 << 48),
        test_config(),
    );
    assert!(manager.open_project(None).unwrap());

    assert_eq!(manager.active_version(), "2");
    assert_eq!(manager.tracker().entities(), &expected);
    let root = manager.root_descriptor().unwrap();
    assert_eq!(root.schema_version, 2);
    assert_eq!(root.model_type.as_deref(), Some("Parametric3D"));
    assert!(manager.undo().unwrap());
    assert_eq!(manager.active_version(), "1");
}

#[test]
fn newer_schema_is_rejected() {
    let mut project = TestProject::memory();
    project.add_chain(1);
    project.save_model_state(false, false, "").unwrap();
    project
        .store_mut()
        .update_many(
            &Filter::eq("SchemaType", "Model"),
            &modelstate_storage::Update::set("SchemaVersion_Model", 99),
        )
        .unwrap();

    let err = project.open_project(None).unwrap_err();
    assert!(matches!(err, CoreError::SchemaMismatch { .. }));
}

#[test]
fn extension_left_by_an_interrupted_snapshot_is_collected() {
    let (store, switch) = FailingStore::new(InMemoryDocumentStore::new());
    let mut manager = ModelStateManager::with_generator(
        store,
        SequentialUidGenerator::new(),
        test_config().max_array_entries(6),
    );

    manager.add_new_entity(Uid::new(1), Uid::NULL, Uid::new(101), modelstate_core::EntityKind::Topology);
    manager.store_mut().insert(entity_document(Uid::new(1), Uid::new(101))).unwrap();
    manager.save_model_state(false, false, "").unwrap();

    for n in 2..=5 {
        manager.add_new_entity(Uid::new(n), Uid::new(1), Uid::new(100 + n), modelstate_core::EntityKind::Data);
        manager.store_mut().insert(entity_document(Uid::new(n), Uid::new(100 + n))).unwrap();
    }

    // Two entities per document: the first extension lands, the second fails.
    switch.fail_after(1);
    assert!(manager.save_model_state(false, true, "").is_err());
    switch.disarm();
    let extensions = Filter::eq("SchemaType", "ModelStateExtension");
    assert_eq!(manager.store().count(&extensions).unwrap(), 1);

    let report = manager.collect_garbage().unwrap();
    assert_eq!(report.deleted, 5);
    assert_eq!(manager.store().count(&extensions).unwrap(), 0);
    assert_eq!(manager.store().count(&Filter::eq("SchemaType", TEST_ENTITY_TYPE)).unwrap(), 1);

    let outcome = manager.save_model_state(false, false, "").unwrap();
    assert_eq!(outcome.version(), Some("2"));
    manager.load_model_state("1").unwrap();
    assert_eq!(manager.tracker().len(), 1);
    manager.load_model_state("2").unwrap();
    assert_eq!(manager.tracker().len(), 5);
}
