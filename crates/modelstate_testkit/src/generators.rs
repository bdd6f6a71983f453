//! Property-based test generators using proptest.
//!
//! Operations draw entity ids from a small pool so that sequences revisit
//! the same entities. Parents always have a smaller id than their
//! children, which keeps every generated tree acyclic.

use modelstate_core::{CoreResult, EntityKind, ModelStateManager, Uid};
use proptest::prelude::*;

/// Number of distinct entity ids operations draw from.
pub const ID_POOL: u64 = 16;

/// First id of the pool, far away from generator-allocated ids.
pub const ID_BASE: u64 = 1 << 40;

/// One step of a model-editing session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerOp {
    /// Add or replace an entity.
    Add {
        /// Pool index of the entity.
        id: u64,
        /// Pool index of the parent, `None` for a root entity.
        parent: Option<u64>,
        /// Entity category.
        kind: EntityKind,
        /// Version of the entity document.
        version: u64,
    },
    /// Give an entity a new version.
    ModifyVersion {
        /// Pool index of the entity.
        id: u64,
        /// New version.
        version: u64,
    },
    /// Move an entity.
    ModifyParent {
        /// Pool index of the entity.
        id: u64,
        /// Pool index of the new parent, `None` for a root entity.
        parent: Option<u64>,
    },
    /// Remove an entity.
    Remove {
        /// Pool index of the entity.
        id: u64,
        /// Remove the subtree too.
        cascade: bool,
    },
    /// Save the model state.
    Save,
    /// Load the previous version.
    Undo,
    /// Load the next version.
    Redo,
}

/// Maps a pool index to an entity id.
#[must_use]
pub fn pool_uid(index: u64) -> Uid {
    Uid::new(ID_BASE + index)
}

/// Strategy for entity kinds.
pub fn kind_strategy() -> impl Strategy<Value = EntityKind> {
    prop_oneof![Just(EntityKind::Topology), Just(EntityKind::Data)]
}

fn parent_strategy(id: u64) -> BoxedStrategy<Option<u64>> {
    if id == 0 {
        Just(None).boxed()
    } else {
        prop_oneof![1 => Just(None), 3 => (0..id).prop_map(Some)].boxed()
    }
}

/// Strategy for a single operation.
pub fn op_strategy() -> impl Strategy<Value = TrackerOp> {
    prop_oneof![
        4 => (0..ID_POOL, kind_strategy(), 1..10_000u64).prop_flat_map(|(id, kind, version)| {
            parent_strategy(id).prop_map(move |parent| TrackerOp::Add { id, parent, kind, version })
        }),
        2 => (0..ID_POOL, 1..10_000u64).prop_map(|(id, version)| TrackerOp::ModifyVersion { id, version }),
        1 => (0..ID_POOL).prop_flat_map(|id| {
            parent_strategy(id).prop_map(move |parent| TrackerOp::ModifyParent { id, parent })
        }),
        1 => (0..ID_POOL, any::<bool>()).prop_map(|(id, cascade)| TrackerOp::Remove { id, cascade }),
        2 => Just(TrackerOp::Save),
        1 => Just(TrackerOp::Undo),
        1 => Just(TrackerOp::Redo),
    ]
}

/// Strategy for a sequence of up to `max_len` operations.
pub fn ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<TrackerOp>> {
    prop::collection::vec(op_strategy(), 1..=max_len)
}

/// Applies one operation to `manager`.
///
/// Operations on entities the tracker does not hold are skipped, as are
/// parents that are not live; such a parent becomes the null id.
///
/// # Errors
///
/// Returns an error if a save, undo or redo fails.
pub fn apply_op(manager: &mut ModelStateManager, op: &TrackerOp) -> CoreResult<()> {
    let live_parent = |manager: &ModelStateManager, parent: Option<u64>| {
        parent
            .map(pool_uid)
            .filter(|uid| manager.tracker().contains(*uid))
            .unwrap_or(Uid::NULL)
    };

    match *op {
        TrackerOp::Add {
            id,
            parent,
            kind,
            version,
        } => {
            let parent = live_parent(manager, parent);
            manager.store_entity(pool_uid(id), parent, Uid::new(version), kind);
        }
        TrackerOp::ModifyVersion { id, version } => {
            if manager.tracker().contains(pool_uid(id)) {
                manager.modify_entity_version(pool_uid(id), Uid::new(version));
            }
        }
        TrackerOp::ModifyParent { id, parent } => {
            if manager.tracker().contains(pool_uid(id)) {
                let parent = live_parent(manager, parent);
                manager.modify_entity_parent(pool_uid(id), parent);
            }
        }
        TrackerOp::Remove { id, cascade } => manager.remove_entity(pool_uid(id), cascade),
        TrackerOp::Save => {
            manager.save_model_state(false, false, "")?;
        }
        TrackerOp::Undo => {
            if !manager.is_modified() {
                manager.undo()?;
            }
        }
        TrackerOp::Redo => {
            if !manager.is_modified() {
                manager.redo()?;
            }
        }
    }
    Ok(())
}
