//! The in-memory working set of a project.

use crate::types::{EntityKind, EntityRecord, Uid};
use std::collections::{BTreeMap, BTreeSet};

/// Map of entity id to record, ordered by id.
pub type EntityMap = BTreeMap<Uid, EntityRecord>;

/// Map of parent id to the ids of its children.
pub type ChildrenIndex = BTreeMap<Uid, BTreeSet<Uid>>;

/// Live entities plus the delta since the last commit.
///
/// # Invariants
///
/// - `children` is always the parent-pointer inversion of `entities`, with
///   no empty buckets
/// - An id is never in both `added_or_modified` and `removed`
/// - Every mutation sets the modified flag
#[derive(Debug, Clone, Default)]
pub struct ModelStateTracker {
    entities: EntityMap,
    added_or_modified: EntityMap,
    removed: EntityMap,
    children: ChildrenIndex,
    modified: bool,
}

impl ModelStateTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity, or modifies it if the id is already known.
    pub fn store_entity(&mut self, id: Uid, parent: Uid, version: Uid, kind: EntityKind) {
        if self.entities.contains_key(&id) {
            self.modify_entity(id, parent, version, kind);
        } else {
            self.add_new_entity(id, parent, version, kind);
        }
    }

    /// Adds a new entity.
    ///
    /// An existing entity with the same id is overwritten.
    pub fn add_new_entity(&mut self, id: Uid, parent: Uid, version: Uid, kind: EntityKind) {
        if let Some(existing) = self.entities.get(&id).copied() {
            tracing::warn!(entity = %id, "entity added twice, overwriting");
            self.detach(id, existing.parent);
        }
        self.put(id, EntityRecord::new(version, parent, kind));
    }

    /// Replaces version, parent and kind of an existing entity.
    ///
    /// Unknown ids are logged and ignored.
    pub fn modify_entity(&mut self, id: Uid, parent: Uid, version: Uid, kind: EntityKind) {
        let Some(existing) = self.entities.get(&id).copied() else {
            tracing::error!(entity = %id, "modify of unknown entity ignored");
            return;
        };
        self.detach(id, existing.parent);
        self.put(id, EntityRecord::new(version, parent, kind));
    }

    /// Replaces the version of an existing entity.
    ///
    /// Unknown ids are logged and ignored.
    pub fn modify_entity_version(&mut self, id: Uid, version: Uid) {
        let Some(existing) = self.entities.get(&id).copied() else {
            tracing::error!(entity = %id, "version change of unknown entity ignored");
            return;
        };
        self.put(id, existing.with_version(version));
    }

    /// Moves an existing entity under another parent.
    ///
    /// Unknown ids are logged and ignored.
    pub fn modify_entity_parent(&mut self, id: Uid, parent: Uid) {
        let Some(existing) = self.entities.get(&id).copied() else {
            tracing::error!(entity = %id, "parent change of unknown entity ignored");
            return;
        };
        self.detach(id, existing.parent);
        self.put(id, existing.with_parent(parent));
    }

    /// Removes an entity and, with `cascade`, all of its descendants.
    ///
    /// Removing an unknown id does nothing; concurrent callers may delete
    /// the same subtree.
    pub fn remove_entity(&mut self, id: Uid, cascade: bool) {
        if !self.entities.contains_key(&id) {
            tracing::debug!(entity = %id, "remove of unknown entity ignored");
            return;
        }

        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Some(record) = self.entities.remove(&current) else {
                continue;
            };
            self.added_or_modified.remove(&current);
            self.removed.insert(current, record);
            self.detach(current, record.parent);
            self.modified = true;

            if cascade || current != id {
                if let Some(children) = self.children.remove(&current) {
                    pending.extend(children);
                }
            }
        }
    }

    /// Returns the current version of an entity.
    #[must_use]
    pub fn current_version(&self, id: Uid) -> Option<Uid> {
        self.entities.get(&id).map(|record| record.version)
    }

    /// Returns the current parent of an entity.
    #[must_use]
    pub fn current_parent(&self, id: Uid) -> Option<Uid> {
        self.entities.get(&id).map(|record| record.parent)
    }

    /// Returns the record of an entity.
    #[must_use]
    pub fn entity(&self, id: Uid) -> Option<&EntityRecord> {
        self.entities.get(&id)
    }

    /// Returns whether the entity is live.
    #[must_use]
    pub fn contains(&self, id: Uid) -> bool {
        self.entities.contains_key(&id)
    }

    /// Lists all topology entities in ascending id order.
    #[must_use]
    pub fn topology_entities(&self) -> Vec<Uid> {
        self.entities
            .iter()
            .filter(|(_, record)| record.kind == EntityKind::Topology)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Returns the direct children of an entity.
    pub fn children_of(&self, id: Uid) -> impl Iterator<Item = Uid> + '_ {
        self.children.get(&id).into_iter().flatten().copied()
    }

    /// Returns all live entities.
    #[must_use]
    pub fn entities(&self) -> &EntityMap {
        &self.entities
    }

    /// Returns entities added or modified since the last commit.
    #[must_use]
    pub fn added_or_modified(&self) -> &EntityMap {
        &self.added_or_modified
    }

    /// Returns entities removed since the last commit.
    #[must_use]
    pub fn removed(&self) -> &EntityMap {
        &self.removed
    }

    /// Returns the parent-to-children index.
    #[must_use]
    pub fn children_index(&self) -> &ChildrenIndex {
        &self.children
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns whether no entity is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns whether anything changed since the last commit or load.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Array entries a delta save would write.
    #[must_use]
    pub fn relative_entry_count(&self) -> usize {
        3 * self.added_or_modified.len() + self.removed.len()
    }

    /// Array entries a full snapshot would write.
    #[must_use]
    pub fn absolute_entry_count(&self) -> usize {
        3 * self.entities.len()
    }

    /// Replaces the working set wholesale, e.g. after a load.
    pub(crate) fn replace_entities(&mut self, entities: EntityMap) {
        self.entities = entities;
        self.added_or_modified.clear();
        self.removed.clear();
        self.modified = false;
        self.rebuild_children_index();
    }

    /// Clears the delta after a successful save.
    pub(crate) fn commit(&mut self) {
        self.added_or_modified.clear();
        self.removed.clear();
        self.modified = false;
    }

    /// Forgets everything.
    pub(crate) fn clear(&mut self) {
        self.replace_entities(EntityMap::new());
    }

    /// Recomputes the children index from the parent pointers.
    pub fn rebuild_children_index(&mut self) {
        self.children = build_children_index(&self.entities);
    }

    fn put(&mut self, id: Uid, record: EntityRecord) {
        self.entities.insert(id, record);
        self.added_or_modified.insert(id, record);
        self.removed.remove(&id);
        self.children.entry(record.parent).or_default().insert(id);
        self.modified = true;
    }

    fn detach(&mut self, id: Uid, parent: Uid) {
        if let Some(bucket) = self.children.get_mut(&parent) {
            bucket.remove(&id);
            if bucket.is_empty() {
                self.children.remove(&parent);
            }
        }
    }
}

/// Inverts the parent pointers of `entities`.
#[must_use]
pub fn build_children_index(entities: &EntityMap) -> ChildrenIndex {
    let mut index = ChildrenIndex::new();
    for (id, record) in entities {
        index.entry(record.parent).or_default().insert(*id);
    }
    index
}
