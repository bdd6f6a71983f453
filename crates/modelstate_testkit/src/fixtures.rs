//! Test projects and helpers.

use modelstate_core::{Config, EntityKind, ModelStateManager, SequentialUidGenerator, Uid};
use modelstate_storage::{DocumentStore, Fields, FileDocumentStore, InMemoryDocumentStore, InsertionOrder};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// `SchemaType` of the entity documents test projects write.
pub const TEST_ENTITY_TYPE: &str = "TestEntity";

/// Configuration used by test projects.
///
/// Garbage collection on open is off so tests can inspect leftovers; tests
/// of the collector turn it back on.
#[must_use]
pub fn test_config() -> Config {
    Config::default().collect_garbage_on_open(false)
}

/// A model-state manager over a test store.
pub struct TestProject {
    /// The manager.
    pub manager: ModelStateManager,
    path: Option<PathBuf>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestProject {
    /// Creates a project over an in-memory store.
    pub fn memory() -> Self {
        Self::memory_with_config(test_config())
    }

    /// Creates a project over an in-memory store with `config`.
    pub fn memory_with_config(config: Config) -> Self {
        Self {
            manager: manager(InMemoryDocumentStore::new(), config),
            path: None,
            _temp_dir: None,
        }
    }

    /// Creates a project over a file store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("project").join("documents.jsonl");
        let store = FileDocumentStore::open_with_create_dirs(&path).expect("Failed to open file store");
        Self {
            manager: manager(store, test_config()),
            path: Some(path),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store path if file-based.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Drops the manager and opens the project again from disk, as a new
    /// session would. Returns what `open_project` returned.
    ///
    /// # Panics
    ///
    /// Panics for in-memory projects.
    pub fn reopen(&mut self, config: Config) -> bool {
        let path = self.path.clone().expect("reopen needs a file-backed project");
        let placeholder = manager(InMemoryDocumentStore::new(), config.clone());
        drop(std::mem::replace(&mut self.manager, placeholder));

        let store = FileDocumentStore::open(&path).expect("Failed to reopen file store");
        let uids = SequentialUidGenerator::starting_at(next_session_start());
        self.manager = ModelStateManager::with_generator(store, uids, config);
        self.manager.open_project(None).expect("Failed to open project")
    }

    /// Adds `count` topology entities, each the child of the previous one.
    /// Returns their ids, root first.
    pub fn add_chain(&mut self, count: usize) -> Vec<Uid> {
        let mut ids = Vec::with_capacity(count);
        let mut parent = Uid::NULL;
        for _ in 0..count {
            let id = self.manager.create_uid().expect("uid");
            let version = self.manager.create_uid().expect("uid");
            self.manager.add_new_entity(id, parent, version, EntityKind::Topology);
            ids.push(id);
            parent = id;
        }
        ids
    }

    /// Adds `count` data entities under `parent`.
    pub fn add_children(&mut self, parent: Uid, count: usize) -> Vec<Uid> {
        (0..count)
            .map(|_| {
                let id = self.manager.create_uid().expect("uid");
                let version = self.manager.create_uid().expect("uid");
                self.manager.add_new_entity(id, parent, version, EntityKind::Data);
                id
            })
            .collect()
    }

    /// Writes an entity document for `(id, version)`, as an entity factory
    /// would before the version referencing it is saved.
    pub fn write_entity_document(&mut self, id: Uid, version: Uid) -> InsertionOrder {
        let fields = entity_document(id, version);
        self.manager.store_mut().insert(fields).expect("insert entity document")
    }

    /// Writes entity documents for every tracked entity.
    pub fn write_all_entity_documents(&mut self) {
        let entities: Vec<(Uid, Uid)> = self
            .manager
            .tracker()
            .entities()
            .iter()
            .map(|(id, record)| (*id, record.version))
            .collect();
        for (id, version) in entities {
            self.write_entity_document(id, version);
        }
    }

    /// Number of test entity documents in the store.
    pub fn entity_document_count(&self) -> u64 {
        self.manager
            .store()
            .count(&modelstate_storage::Filter::eq("SchemaType", TEST_ENTITY_TYPE))
            .expect("count")
    }
}

impl std::ops::Deref for TestProject {
    type Target = ModelStateManager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

impl std::ops::DerefMut for TestProject {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.manager
    }
}

/// Builds the fields of a test entity document.
pub fn entity_document(id: Uid, version: Uid) -> Fields {
    let value = json!({
        "SchemaType": TEST_ENTITY_TYPE,
        "EntityID": id.to_wire(),
        "Version": version.to_wire(),
        "Payload": format!("entity {id}"),
    });
    match value {
        serde_json::Value::Object(fields) => fields,
        _ => unreachable!("json! object literal"),
    }
}

/// Runs `f` against a fresh in-memory project.
pub fn with_memory_project<F, R>(f: F) -> R
where
    F: FnOnce(&mut TestProject) -> R,
{
    let mut project = TestProject::memory();
    f(&mut project)
}

fn manager(store: impl DocumentStore + 'static, config: Config) -> ModelStateManager {
    ModelStateManager::with_generator(store, SequentialUidGenerator::starting_at(1), config)
}

/// Each reopened session allocates from its own range so ids never repeat.
fn next_session_start() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static SESSIONS: AtomicU64 = AtomicU64::new(1);
    SESSIONS.fetch_add(1, Ordering::SeqCst) << 32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_links_parents() {
        let mut project = TestProject::memory();
        let ids = project.add_chain(3);
        assert_eq!(project.current_parent(ids[0]), Some(Uid::NULL));
        assert_eq!(project.current_parent(ids[2]), Some(ids[1]));
    }

    #[test]
    fn entity_documents_are_counted() {
        with_memory_project(|project| {
            project.add_chain(2);
            project.write_all_entity_documents();
            assert_eq!(project.entity_document_count(), 2);
        });
    }

    #[test]
    fn file_project_reopens() {
        let mut project = TestProject::file();
        project.add_chain(2);
        project.save_model_state(false, false, "").unwrap();
        assert!(project.reopen(test_config()));
        assert_eq!(project.tracker().len(), 2);
        assert!(project.path().is_some());
    }
}
