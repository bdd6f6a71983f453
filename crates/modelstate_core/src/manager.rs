//! Version lifecycle: open, save, load, undo, redo and branching.

use crate::attachments::{self, PreviewImage, ProjectDescription};
use crate::codec::{
    apply_state_data, encode_absolute, encode_relative, read_version_summary, StateHeader, StateKind, VersionMeta,
};
use crate::config::Config;
use crate::dump::StateDump;
use crate::error::{CoreError, CoreResult};
use crate::gc::{self, GcReport};
use crate::migration::{SchemaUpgrader, UpgradeReport};
use crate::root::{AttachmentRef, RootDescriptor};
use crate::schema::{entity, schema_type, state, SCHEMA_TYPE};
use crate::tracker::{EntityMap, ModelStateTracker};
use crate::types::{EntityKind, Uid};
use crate::uid::{SessionUidGenerator, UidGenerator};
use crate::version::{name, Version, VersionGraph};
use modelstate_storage::{Document, DocumentStore, Filter, FindOptions, Update};
use serde_json::Value;

/// What a call to [`ModelStateManager::save_model_state`] wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing was modified; no version was created.
    Unchanged,
    /// A full snapshot.
    Absolute {
        /// The new version.
        version: String,
        /// Documents written, extensions included.
        documents: usize,
    },
    /// A delta against the current base state.
    Incremental {
        /// The new version.
        version: String,
    },
}

impl SaveOutcome {
    /// The version created, if any.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Unchanged => None,
            Self::Absolute { version, .. } | Self::Incremental { version } => Some(version),
        }
    }
}

/// The model state of one project and its version history.
///
/// The manager owns the project's document store. Entity mutations only
/// touch memory; [`save_model_state`](Self::save_model_state) commits them
/// as a new version.
///
/// # Example
///
/// ```rust
/// use modelstate_core::{Config, EntityKind, ModelStateManager, SequentialUidGenerator, Uid};
/// use modelstate_storage::InMemoryDocumentStore;
///
/// let mut manager = ModelStateManager::with_generator(
///     InMemoryDocumentStore::new(),
///     SequentialUidGenerator::starting_at(100),
///     Config::default(),
/// );
/// manager.add_new_entity(Uid::new(1), Uid::NULL, Uid::new(2), EntityKind::Topology);
/// let outcome = manager.save_model_state(false, false, "initial").unwrap();
/// assert_eq!(outcome.version(), Some("1"));
/// ```
pub struct ModelStateManager {
    store: Box<dyn DocumentStore>,
    uids: Box<dyn UidGenerator>,
    config: Config,
    tracker: ModelStateTracker,
    graph: VersionGraph,
    base_state: Option<String>,
    root: Option<RootDescriptor>,
}

impl ModelStateManager {
    /// Creates a manager with a [`SessionUidGenerator`] built from `config`.
    pub fn new(store: impl DocumentStore + 'static, config: Config) -> Self {
        let uids = SessionUidGenerator::new(config.session_id, config.service_id);
        Self::with_generator(store, uids, config)
    }

    /// Creates a manager with an explicit UID generator.
    pub fn with_generator(
        store: impl DocumentStore + 'static,
        uids: impl UidGenerator + 'static,
        config: Config,
    ) -> Self {
        Self {
            store: Box::new(store),
            uids: Box::new(uids),
            config,
            tracker: ModelStateTracker::new(),
            graph: VersionGraph::new(),
            base_state: None,
            root: None,
        }
    }

    /// The project store.
    #[must_use]
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// The project store, for writing entity documents.
    pub fn store_mut(&mut self) -> &mut dyn DocumentStore {
        self.store.as_mut()
    }

    /// Releases the project store.
    #[must_use]
    pub fn into_store(self) -> Box<dyn DocumentStore> {
        self.store
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The tracked working set.
    #[must_use]
    pub fn tracker(&self) -> &ModelStateTracker {
        &self.tracker
    }

    /// The version graph.
    #[must_use]
    pub fn version_graph(&self) -> &VersionGraph {
        &self.graph
    }

    /// The root descriptor as last read or written.
    #[must_use]
    pub fn root_descriptor(&self) -> Option<&RootDescriptor> {
        self.root.as_ref()
    }

    /// The active version, empty before the first save.
    #[must_use]
    pub fn active_version(&self) -> &str {
        self.graph.active_version()
    }

    /// The active branch.
    #[must_use]
    pub fn active_branch(&self) -> &str {
        self.graph.active_branch()
    }

    /// The absolute version the next delta would be based on.
    #[must_use]
    pub fn base_state(&self) -> Option<&str> {
        self.base_state.as_deref()
    }

    // ----- entities -----

    /// Allocates a fresh identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the generator is exhausted.
    pub fn create_uid(&mut self) -> CoreResult<Uid> {
        self.uids.next_uid()
    }

    /// See [`ModelStateTracker::add_new_entity`].
    pub fn add_new_entity(&mut self, id: Uid, parent: Uid, version: Uid, kind: EntityKind) {
        self.tracker.add_new_entity(id, parent, version, kind);
    }

    /// See [`ModelStateTracker::store_entity`].
    pub fn store_entity(&mut self, id: Uid, parent: Uid, version: Uid, kind: EntityKind) {
        self.tracker.store_entity(id, parent, version, kind);
    }

    /// See [`ModelStateTracker::modify_entity`].
    pub fn modify_entity(&mut self, id: Uid, parent: Uid, version: Uid, kind: EntityKind) {
        self.tracker.modify_entity(id, parent, version, kind);
    }

    /// See [`ModelStateTracker::modify_entity_version`].
    pub fn modify_entity_version(&mut self, id: Uid, version: Uid) {
        self.tracker.modify_entity_version(id, version);
    }

    /// See [`ModelStateTracker::modify_entity_parent`].
    pub fn modify_entity_parent(&mut self, id: Uid, parent: Uid) {
        self.tracker.modify_entity_parent(id, parent);
    }

    /// See [`ModelStateTracker::remove_entity`].
    pub fn remove_entity(&mut self, id: Uid, cascade: bool) {
        self.tracker.remove_entity(id, cascade);
    }

    /// Current version of an entity.
    #[must_use]
    pub fn current_version(&self, id: Uid) -> Option<Uid> {
        self.tracker.current_version(id)
    }

    /// Current parent of an entity.
    #[must_use]
    pub fn current_parent(&self, id: Uid) -> Option<Uid> {
        self.tracker.current_parent(id)
    }

    /// Ids of all topology entities.
    #[must_use]
    pub fn topology_entities(&self) -> Vec<Uid> {
        self.tracker.topology_entities()
    }

    /// Whether unsaved changes exist.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.tracker.is_modified()
    }

    /// Fetches the persisted document of an entity's current version.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the entity is not tracked or its
    /// document is missing.
    pub fn read_entity_document(&self, id: Uid) -> CoreResult<Document> {
        let version = self
            .tracker
            .current_version(id)
            .ok_or_else(|| CoreError::not_found(format!("entity {id}")))?;
        let filter =
            Filter::eq(entity::ENTITY_ID, id.to_wire()).and(Filter::eq(entity::VERSION, version.to_wire()));
        self.store
            .find_one(&filter, &FindOptions::new())?
            .ok_or_else(|| CoreError::not_found(format!("document of entity {id} version {version}")))
    }

    // ----- project lifecycle -----

    /// Opens the project held by the store.
    ///
    /// Upgrades the schema, rebuilds the version graph and loads
    /// `custom_version`, or else the stored active version, or else the
    /// last version of the stored active branch. Returns `false` for a
    /// project without committed state.
    ///
    /// # Errors
    ///
    /// Returns an error if the upgrade fails, a version document is
    /// malformed or the chosen version cannot be loaded.
    pub fn open_project(&mut self, custom_version: Option<&str>) -> CoreResult<bool> {
        self.reset();

        let upgrade = SchemaUpgrader::default().upgrade(self.store.as_mut())?;
        log_upgrade(&upgrade);

        self.load_version_graph()?;
        self.root = RootDescriptor::load(self.store.as_ref())?;

        let Some(root) = self.root.as_ref() else {
            tracing::info!("project has no root descriptor, treating as new");
            return Ok(false);
        };
        self.graph.set_active_branch(root.active_branch.clone());

        let version = match custom_version {
            Some(version) => Some(version.to_string()),
            None if !root.active_version.is_empty() => Some(root.active_version.clone()),
            None => self.last_version_of_active_branch(),
        };
        let Some(version) = version else {
            tracing::info!("project has no committed version");
            return Ok(false);
        };

        self.load_model_state(&version)?;

        if self.config.collect_garbage_on_open {
            self.collect_garbage()?;
        }
        tracing::info!(version = %version, branch = %self.graph.active_branch(), "project opened");
        Ok(true)
    }

    /// Forgets the graph, the working set and the base state.
    pub fn reset(&mut self) {
        self.graph.clear();
        self.tracker.clear();
        self.base_state = None;
        self.root = None;
    }

    fn last_version_of_active_branch(&self) -> Option<String> {
        let branch = self.graph.active_branch();
        if let Some(last) = self.graph.last_version_in_branch(branch) {
            return Some(last.name().to_string());
        }
        tracing::warn!(branch = %branch, "stored active branch is empty, using root branch");
        self.graph
            .last_version_in_branch(name::ROOT_BRANCH)
            .map(|v| v.name().to_string())
    }

    fn load_version_graph(&mut self) -> CoreResult<()> {
        self.graph.clear();
        let docs = self.store.find_all(
            &Filter::one_of(
                SCHEMA_TYPE,
                [schema_type::MODEL_STATE, schema_type::MODEL_STATE_INACTIVE],
            ),
            &FindOptions::new().projection([
                SCHEMA_TYPE,
                state::VERSION,
                state::PARENT_VERSION,
                state::DESCRIPTION,
                state::LABEL,
            ]),
        )?;
        for doc in docs {
            let summary = read_version_summary(&doc)?;
            self.graph
                .insert_version(&summary.version, &summary.parent, &summary.label, &summary.description)?;
        }
        tracing::debug!(versions = self.graph.len(), "version graph loaded");
        Ok(())
    }

    // ----- save -----

    /// Commits the working set as a new version.
    ///
    /// Without `force`, an unmodified working set creates nothing. Saving
    /// on top of a version that already has a successor forks a new
    /// branch. The save is a full snapshot if `force_absolute` is set, if
    /// no base state exists, or if a delta would not be
    /// [`Config::relative_size_factor`] times smaller.
    ///
    /// # Errors
    ///
    /// Returns an error if a document cannot be written. The graph and the
    /// active pointer are then unchanged.
    pub fn save_model_state(&mut self, force: bool, force_absolute: bool, comment: &str) -> CoreResult<SaveOutcome> {
        if !self.tracker.is_modified() && !force {
            tracing::debug!("model state unchanged, nothing to save");
            return Ok(SaveOutcome::Unchanged);
        }

        let previous_branch = self.graph.active_branch().to_string();
        let parent = self.graph.active_version().to_string();

        match self.write_new_version(&parent, force_absolute, comment) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::error!(parent = %parent, error = %err, "saving model state failed");
                if !self.graph.contains(self.graph.active_version()) {
                    self.graph.set_active_branch(previous_branch);
                    self.graph.set_active_version(parent);
                }
                Err(err)
            }
        }
    }

    fn write_new_version(&mut self, parent: &str, force_absolute: bool, comment: &str) -> CoreResult<SaveOutcome> {
        if !parent.is_empty() && self.graph.find_next_version(parent).is_some() {
            self.fork_branch(parent);
        }
        self.graph.increment_active_version()?;
        let version = self.graph.active_version().to_string();

        let meta = VersionMeta {
            version: version.clone(),
            parent: parent.to_string(),
            description: comment.to_string(),
            label: String::new(),
        };

        let relative = self.tracker.relative_entry_count();
        let absolute = self.tracker.absolute_entry_count();
        let base = match self.base_state.clone() {
            Some(base)
                if !force_absolute
                    && relative <= self.config.max_array_entries
                    && relative.saturating_mul(self.config.relative_size_factor) <= absolute =>
            {
                Some(base)
            }
            _ => None,
        };

        let outcome = match base {
            None => {
                let encoded = encode_absolute(&meta, self.tracker.entities(), self.config.entities_per_document());
                let documents = encoded.document_count();
                for extension in encoded.extensions {
                    self.store.insert(extension)?;
                }
                self.store.insert(encoded.main)?;
                SaveOutcome::Absolute {
                    version: version.clone(),
                    documents,
                }
            }
            Some(base) => {
                let doc = encode_relative(
                    &meta,
                    &base,
                    self.tracker.added_or_modified(),
                    self.tracker.removed(),
                );
                self.store.insert(doc)?;
                SaveOutcome::Incremental {
                    version: version.clone(),
                }
            }
        };

        self.graph.insert_version(&version, parent, "", comment)?;
        self.tracker.commit();
        let kind = match outcome {
            SaveOutcome::Absolute { .. } => {
                self.base_state = Some(version.clone());
                StateKind::Absolute
            }
            _ => StateKind::Relative,
        };
        self.write_pointer()?;

        tracing::info!(version = %version, parent = %parent, kind = %kind, "model state saved");
        Ok(outcome)
    }

    fn fork_branch(&mut self, node: &str) {
        let mut counter = 1u64;
        let branch = loop {
            let candidate = format!("{node}.{counter}");
            if !self.graph.branch_in_use(&candidate) {
                break candidate;
            }
            counter += 1;
        };
        tracing::info!(node = %node, branch = %branch, "forking branch");
        self.graph.set_active_version(format!("{branch}.0"));
        self.graph.set_active_branch(branch);
    }

    // ----- load -----

    /// Makes `version` the working set.
    ///
    /// Activates the version's branch unless the version is already part
    /// of the active one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidVersionName`] for a malformed name,
    /// [`CoreError::NotFound`] for an unknown version or
    /// [`CoreError::SchemaMismatch`] for malformed documents. The working
    /// set is unchanged on error.
    pub fn load_model_state(&mut self, version: &str) -> CoreResult<()> {
        name::validate(version)?;
        if !self.graph.contains(version) {
            tracing::error!(version = %version, "cannot load unknown version");
            return Err(CoreError::not_found(format!("version {version:?}")));
        }

        let (entities, base) = match self.decode_version(version) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::error!(version = %version, error = %err, "loading model state failed");
                return Err(err);
            }
        };

        if !self.graph.is_version_in_active_branch(version) {
            self.graph.set_active_branch(name::branch_of(version));
        }
        let count = entities.len();
        self.tracker.replace_entities(entities);
        self.graph.set_active_version(version);
        self.base_state = Some(base);
        self.write_pointer()?;

        tracing::info!(version = %version, entities = count, "model state loaded");
        Ok(())
    }

    /// Decodes a version into its entity map and its absolute base.
    fn decode_version(&self, version: &str) -> CoreResult<(EntityMap, String)> {
        let doc = self.fetch_state_document(version)?;
        let header = StateHeader::from_document(&doc)?;
        let Some(base) = header.base_state.clone() else {
            let entities = self.decode_absolute(&header, &doc)?;
            return Ok((entities, version.to_string()));
        };

        let base_doc = self.fetch_state_document(&base)?;
        let base_header = StateHeader::from_document(&base_doc)?;
        if base_header.kind != StateKind::Absolute {
            return Err(CoreError::schema_mismatch(format!(
                "base state {base} of version {version} is not absolute"
            )));
        }
        let mut entities = self.decode_absolute(&base_header, &base_doc)?;

        let lineage = name::branch_of(version);
        let mut current = base.clone();
        let mut steps = 0;
        while current != version {
            steps += 1;
            if steps > self.graph.len() {
                return Err(CoreError::schema_mismatch(format!(
                    "version {version} is not reachable from its base {base}"
                )));
            }
            let next = self
                .graph
                .find_next_version_on(&current, lineage)
                .map(|v| v.name().to_string())
                .ok_or_else(|| {
                    CoreError::schema_mismatch(format!("chain from {base} to {version} broken after {current}"))
                })?;
            let delta = self.fetch_state_document(&next)?;
            let delta_header = StateHeader::from_document(&delta)?;
            if delta_header.kind != StateKind::Relative {
                return Err(CoreError::schema_mismatch(format!(
                    "absolute version {next} between base {base} and {version}"
                )));
            }
            apply_state_data(&mut entities, &delta)?;
            current = next;
        }
        Ok((entities, base))
    }

    fn decode_absolute(&self, header: &StateHeader, doc: &Document) -> CoreResult<EntityMap> {
        let mut entities = EntityMap::new();
        apply_state_data(&mut entities, doc)?;
        if header.extension {
            let extensions = self.store.find_all(
                &Filter::eq(SCHEMA_TYPE, schema_type::MODEL_STATE_EXTENSION)
                    .and(Filter::eq(state::VERSION, header.version.as_str())),
                &FindOptions::new(),
            )?;
            for extension in extensions {
                header.check_extension(&extension)?;
                apply_state_data(&mut entities, &extension)?;
            }
        }
        Ok(entities)
    }

    fn fetch_state_document(&self, version: &str) -> CoreResult<Document> {
        self.store
            .find_one(
                &Filter::eq(SCHEMA_TYPE, schema_type::MODEL_STATE).and(Filter::eq(state::VERSION, version)),
                &FindOptions::new(),
            )?
            .ok_or_else(|| CoreError::not_found(format!("model state document of version {version:?}")))
    }

    // ----- undo / redo -----

    /// Loads the previous version. Returns `false` if there is none.
    ///
    /// # Errors
    ///
    /// See [`load_model_state`](Self::load_model_state).
    pub fn undo(&mut self) -> CoreResult<bool> {
        let Some(previous) = self.previous_version().map(|v| v.name().to_string()) else {
            return Ok(false);
        };
        self.load_model_state(&previous)?;
        Ok(true)
    }

    /// Loads the next version. Returns `false` if there is none.
    ///
    /// # Errors
    ///
    /// See [`load_model_state`](Self::load_model_state).
    pub fn redo(&mut self) -> CoreResult<bool> {
        let Some(next) = self.next_version().map(|v| v.name().to_string()) else {
            return Ok(false);
        };
        self.load_model_state(&next)?;
        Ok(true)
    }

    /// Whether [`undo`](Self::undo) would load a version.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.previous_version().is_some()
    }

    /// Whether [`redo`](Self::redo) would load a version.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.next_version().is_some()
    }

    fn previous_version(&self) -> Option<&Version> {
        let active = self.graph.active_version();
        if active.is_empty() {
            return None;
        }
        self.graph.find_previous_version(active)
    }

    fn next_version(&self) -> Option<&Version> {
        let active = self.graph.active_version();
        if active.is_empty() {
            return None;
        }
        self.graph.find_next_version(active)
    }

    /// Save comment of the active version.
    #[must_use]
    pub fn current_model_state_description(&self) -> Option<&str> {
        self.version_description(self.graph.active_version())
    }

    /// Save comment of the version [`redo`](Self::redo) would load.
    #[must_use]
    pub fn redo_model_state_description(&self) -> Option<&str> {
        self.next_version().map(Version::description)
    }

    /// Save comment of a version.
    #[must_use]
    pub fn version_description(&self, version: &str) -> Option<&str> {
        self.graph.find_version(version).map(Version::description)
    }

    /// User label of a version.
    #[must_use]
    pub fn version_label(&self, version: &str) -> Option<&str> {
        self.graph.find_version(version).map(Version::label)
    }

    /// Labels a committed version and persists the label.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown version, or a storage
    /// error; the graph is unchanged on error.
    pub fn set_version_label(&mut self, version: &str, label: &str) -> CoreResult<()> {
        let description = self.known_version(version)?.description().to_string();
        self.write_version_entity(version, label, &description)?;
        self.graph.set_label(version, label);
        tracing::info!(version = %version, label = %label, "version label changed");
        Ok(())
    }

    /// Replaces the save comment of a committed version and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown version, or a storage
    /// error; the graph is unchanged on error.
    pub fn set_version_description(&mut self, version: &str, description: &str) -> CoreResult<()> {
        let label = self.known_version(version)?.label().to_string();
        self.write_version_entity(version, &label, description)?;
        self.graph.set_description(version, description);
        tracing::info!(version = %version, "version description changed");
        Ok(())
    }

    /// Writes the label and save comment the graph holds for `version` back
    /// to its version document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown version or a missing
    /// document, or a storage error.
    pub fn update_version_entity(&mut self, version: &str) -> CoreResult<()> {
        let known = self.known_version(version)?;
        let (label, description) = (known.label().to_string(), known.description().to_string());
        self.write_version_entity(version, &label, &description)
    }

    fn known_version(&self, version: &str) -> CoreResult<&Version> {
        self.graph
            .find_version(version)
            .ok_or_else(|| CoreError::not_found(format!("version {version:?}")))
    }

    fn write_version_entity(&mut self, version: &str, label: &str, description: &str) -> CoreResult<()> {
        let updated = self.store.update_one(
            &Filter::eq(SCHEMA_TYPE, schema_type::MODEL_STATE).and(Filter::eq(state::VERSION, version)),
            &Update::set(state::LABEL, label).and_set(state::DESCRIPTION, description),
        )?;
        if updated == 0 {
            return Err(CoreError::not_found(format!("model state document of version {version:?}")));
        }
        Ok(())
    }

    /// Deletes every version after the active one, including branches
    /// forked from them, and returns their names.
    ///
    /// # Errors
    ///
    /// Returns an error if documents cannot be deleted or the pointer
    /// cannot be written.
    pub fn remove_redo_model_states(&mut self) -> CoreResult<Vec<String>> {
        let active = self.graph.active_version().to_string();
        if active.is_empty() {
            return Ok(Vec::new());
        }
        let doomed: Vec<String> = self
            .graph
            .find_all_next_versions(&active)
            .into_iter()
            .map(|v| v.name().to_string())
            .collect();

        for version in &doomed {
            let deleted = self.store.delete_many(
                &Filter::one_of(
                    SCHEMA_TYPE,
                    [schema_type::MODEL_STATE, schema_type::MODEL_STATE_EXTENSION],
                )
                .and(Filter::eq(state::VERSION, version.as_str())),
            )?;
            self.graph.remove_version(version);
            tracing::debug!(version = %version, documents = deleted, "removed redo version");
        }

        self.graph.set_active_branch(name::branch_of(&active));
        self.write_pointer()?;

        tracing::info!(removed = doomed.len(), active = %active, "redo history removed");
        Ok(doomed)
    }

    // ----- root descriptor -----

    fn write_pointer(&mut self) -> CoreResult<()> {
        let branch = self.graph.active_branch().to_string();
        let version = self.graph.active_version().to_string();
        if self
            .root
            .as_ref()
            .is_some_and(|root| root.active_branch == branch && root.active_version == version)
        {
            return Ok(());
        }
        self.ensure_root()?;
        let Self { store, root, .. } = self;
        let root = root
            .as_mut()
            .ok_or_else(|| CoreError::not_found("root descriptor"))?;
        root.write_pointer(store.as_mut(), &branch, &version)
    }

    fn ensure_root(&mut self) -> CoreResult<()> {
        if self.root.is_none() {
            self.root = match RootDescriptor::load(self.store.as_ref())? {
                Some(root) => Some(root),
                None => Some(RootDescriptor::create(self.store.as_mut(), self.uids.as_mut())?),
            };
        }
        Ok(())
    }

    // ----- garbage collection -----

    /// Deletes entity documents written after the last committed version,
    /// keeping the attachments the root descriptor references.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn collect_garbage(&mut self) -> CoreResult<GcReport> {
        let protected = self
            .root
            .as_ref()
            .map(attachments::protected_references)
            .unwrap_or_default();
        gc::collect_garbage(self.store.as_mut(), &protected)
    }

    // ----- attachments -----

    /// Attaches a preview image, replacing the current one.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be written.
    pub fn set_preview_image(&mut self, image: &PreviewImage) -> CoreResult<AttachmentRef> {
        self.ensure_root()?;
        let Self { store, uids, root, .. } = self;
        let root = root
            .as_mut()
            .ok_or_else(|| CoreError::not_found("root descriptor"))?;
        attachments::attach_preview_image(store.as_mut(), uids.as_mut(), root, image)
    }

    /// Detaches the preview image. Returns whether one was attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn remove_preview_image(&mut self) -> CoreResult<bool> {
        let Self { store, root, .. } = self;
        match root.as_mut() {
            Some(root) => attachments::remove_preview_image(store.as_mut(), root),
            None => Ok(false),
        }
    }

    /// Reads the preview image.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn preview_image(&self) -> CoreResult<Option<PreviewImage>> {
        match &self.root {
            Some(root) => attachments::read_preview_image(self.store.as_ref(), root),
            None => Ok(None),
        }
    }

    /// Attaches a project description, replacing the current one.
    ///
    /// # Errors
    ///
    /// Returns an error if the description cannot be written.
    pub fn set_description(&mut self, description: &ProjectDescription) -> CoreResult<AttachmentRef> {
        self.ensure_root()?;
        let Self { store, uids, root, .. } = self;
        let root = root
            .as_mut()
            .ok_or_else(|| CoreError::not_found("root descriptor"))?;
        attachments::attach_description(store.as_mut(), uids.as_mut(), root, description)
    }

    /// Detaches the project description. Returns whether one was attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn remove_description(&mut self) -> CoreResult<bool> {
        let Self { store, root, .. } = self;
        match root.as_mut() {
            Some(root) => attachments::remove_description(store.as_mut(), root),
            None => Ok(false),
        }
    }

    /// Reads the project description.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn description(&self) -> CoreResult<Option<ProjectDescription>> {
        match &self.root {
            Some(root) => attachments::read_description(self.store.as_ref(), root),
            None => Ok(None),
        }
    }

    // ----- debugging -----

    /// Dumps the in-memory state as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn dump(&self) -> CoreResult<Value> {
        StateDump::new(&self.tracker, &self.graph, self.base_state.as_deref(), self.root.as_ref()).to_value()
    }
}

fn log_upgrade(report: &UpgradeReport) {
    for step in &report.applied {
        tracing::info!(
            step = %step.info.name,
            from = step.info.from_version,
            to = step.info.to_version,
            operations = step.operations.len(),
            "schema step applied"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uid::SequentialUidGenerator;
    use modelstate_storage::InMemoryDocumentStore;

    fn manager() -> ModelStateManager {
        ModelStateManager::with_generator(
            InMemoryDocumentStore::new(),
            SequentialUidGenerator::starting_at(1000),
            Config::default(),
        )
    }

    fn uid(n: u64) -> Uid {
        Uid::new(n)
    }

    #[test]
    fn unmodified_save_is_a_noop() {
        let mut m = manager();
        assert_eq!(m.save_model_state(false, false, "").unwrap(), SaveOutcome::Unchanged);
        assert!(m.version_graph().is_empty());
    }

    #[test]
    fn first_save_is_absolute_version_one() {
        let mut m = manager();
        m.add_new_entity(uid(1), Uid::NULL, uid(2), EntityKind::Topology);
        let outcome = m.save_model_state(false, false, "first").unwrap();

        assert_eq!(
            outcome,
            SaveOutcome::Absolute {
                version: "1".to_string(),
                documents: 1
            }
        );
        assert_eq!(m.active_version(), "1");
        assert_eq!(m.base_state(), Some("1"));
        assert!(!m.is_modified());
        assert_eq!(m.current_model_state_description(), Some("first"));
        assert_eq!(m.root_descriptor().unwrap().active_version, "1");
    }

    #[test]
    fn small_change_is_incremental() {
        let mut m = manager();
        for i in 1..=20 {
            m.add_new_entity(uid(i), Uid::NULL, uid(100 + i), EntityKind::Data);
        }
        m.save_model_state(false, false, "").unwrap();
        m.modify_entity_version(uid(3), uid(500));

        let outcome = m.save_model_state(false, false, "").unwrap();
        assert_eq!(
            outcome,
            SaveOutcome::Incremental {
                version: "2".to_string()
            }
        );
        assert_eq!(m.base_state(), Some("1"));
    }

    #[test]
    fn forced_absolute_moves_base_state() {
        let mut m = manager();
        for i in 1..=20 {
            m.add_new_entity(uid(i), Uid::NULL, uid(100 + i), EntityKind::Data);
        }
        m.save_model_state(false, false, "").unwrap();
        m.modify_entity_version(uid(3), uid(500));
        let outcome = m.save_model_state(false, true, "").unwrap();

        assert!(matches!(outcome, SaveOutcome::Absolute { .. }));
        assert_eq!(m.base_state(), Some("2"));
    }

    #[test]
    fn undo_and_redo_restore_states() {
        let mut m = manager();
        m.add_new_entity(uid(1), Uid::NULL, uid(2), EntityKind::Topology);
        m.save_model_state(false, false, "one").unwrap();
        let first = m.tracker().entities().clone();
        m.add_new_entity(uid(3), uid(1), uid(4), EntityKind::Data);
        m.save_model_state(false, false, "two").unwrap();
        let second = m.tracker().entities().clone();

        assert!(m.can_undo());
        assert!(m.undo().unwrap());
        assert_eq!(m.tracker().entities(), &first);
        assert_eq!(m.redo_model_state_description(), Some("two"));

        assert!(m.redo().unwrap());
        assert_eq!(m.tracker().entities(), &second);
        assert!(!m.can_redo());
        assert!(!m.redo().unwrap());
    }

    #[test]
    fn undo_at_first_version_is_false() {
        let mut m = manager();
        assert!(!m.undo().unwrap());
        m.add_new_entity(uid(1), Uid::NULL, uid(2), EntityKind::Topology);
        m.save_model_state(false, false, "").unwrap();
        assert!(!m.can_undo());
        assert!(!m.undo().unwrap());
    }

    #[test]
    fn save_after_undo_forks() {
        let mut m = manager();
        m.add_new_entity(uid(1), Uid::NULL, uid(2), EntityKind::Topology);
        m.save_model_state(false, false, "").unwrap();
        m.add_new_entity(uid(3), Uid::NULL, uid(4), EntityKind::Topology);
        m.save_model_state(false, false, "").unwrap();
        m.undo().unwrap();

        m.add_new_entity(uid(5), Uid::NULL, uid(6), EntityKind::Topology);
        let outcome = m.save_model_state(false, false, "fork").unwrap();
        assert_eq!(outcome.version(), Some("1.1.1"));
        assert_eq!(m.active_branch(), "1.1");
        assert_eq!(
            m.version_graph().find_version("1.1.1").map(Version::parent),
            Some("1")
        );
    }

    #[test]
    fn loading_unknown_version_fails() {
        let mut m = manager();
        let err = m.load_model_state("7").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn remove_redo_prunes_history() {
        let mut m = manager();
        for i in 1..=3 {
            m.add_new_entity(uid(i), Uid::NULL, uid(10 + i), EntityKind::Topology);
            m.save_model_state(false, false, "").unwrap();
        }
        m.undo().unwrap();
        m.undo().unwrap();

        let removed = m.remove_redo_model_states().unwrap();
        assert_eq!(removed, vec!["2".to_string(), "3".to_string()]);
        assert!(!m.can_redo());
        let left = m
            .store()
            .count(&Filter::eq(SCHEMA_TYPE, schema_type::MODEL_STATE))
            .unwrap();
        assert_eq!(left, 1);
    }

    #[test]
    fn reopen_restores_active_version() {
        let mut m = manager();
        m.add_new_entity(uid(1), Uid::NULL, uid(2), EntityKind::Topology);
        m.save_model_state(false, false, "").unwrap();
        m.add_new_entity(uid(3), Uid::NULL, uid(4), EntityKind::Topology);
        m.save_model_state(false, false, "").unwrap();
        m.undo().unwrap();
        let expected = m.tracker().entities().clone();

        assert!(m.open_project(None).unwrap());
        assert_eq!(m.active_version(), "1");
        assert_eq!(m.tracker().entities(), &expected);
        assert!(m.can_redo());
    }

    #[test]
    fn open_empty_project_returns_false() {
        let mut m = manager();
        assert!(!m.open_project(None).unwrap());
    }

    #[test]
    fn dump_reports_active_version() {
        let mut m = manager();
        m.add_new_entity(uid(1), Uid::NULL, uid(2), EntityKind::Topology);
        m.save_model_state(false, false, "").unwrap();
        let dump = m.dump().unwrap();
        assert_eq!(dump["active_version"], "1");
        assert_eq!(dump["root"]["active_version"], "1");
    }

    #[test]
    fn malformed_version_name_is_rejected_before_lookup() {
        let mut m = manager();
        m.add_new_entity(uid(1), Uid::NULL, uid(2), EntityKind::Topology);
        m.save_model_state(false, false, "").unwrap();

        for name in ["", "1.", "a"] {
            let err = m.load_model_state(name).unwrap_err();
            assert!(matches!(err, CoreError::InvalidVersionName { .. }), "{name:?}: {err}");
        }
        assert!(matches!(
            m.load_model_state("7").unwrap_err(),
            CoreError::NotFound { .. }
        ));
        assert_eq!(m.active_version(), "1");
    }

    #[test]
    fn label_and_description_are_written_to_the_version_document() {
        let mut m = manager();
        m.add_new_entity(uid(1), Uid::NULL, uid(2), EntityKind::Topology);
        m.save_model_state(false, false, "draft").unwrap();

        m.set_version_label("1", "milestone").unwrap();
        m.set_version_description("1", "reviewed").unwrap();
        assert_eq!(m.version_label("1"), Some("milestone"));
        assert_eq!(m.version_description("1"), Some("reviewed"));

        let doc = m
            .store()
            .find_one(
                &Filter::eq(SCHEMA_TYPE, schema_type::MODEL_STATE),
                &FindOptions::new(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(doc.get_str(state::LABEL), Some("milestone"));
        assert_eq!(doc.get_str(state::DESCRIPTION), Some("reviewed"));
        m.update_version_entity("1").unwrap();

        let err = m.set_version_label("2", "nope").unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
        assert_eq!(m.version_label("2"), None);
    }
}
