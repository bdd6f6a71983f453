//! Debug dump of a project's in-memory state.

use crate::error::CoreResult;
use crate::root::RootDescriptor;
use crate::tracker::ModelStateTracker;
use crate::types::{EntityKind, Uid};
use crate::version::VersionGraph;
use serde::Serialize;
use serde_json::Value;

/// One entity row of a dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityDump {
    /// Entity id.
    pub id: Uid,
    /// Entity version.
    pub version: Uid,
    /// Parent id.
    pub parent: Uid,
    /// Entity kind.
    pub kind: EntityKind,
}

/// Snapshot of everything the manager holds in memory.
#[derive(Debug, Clone, Serialize)]
pub struct StateDump<'a> {
    /// Active branch.
    pub active_branch: &'a str,
    /// Active version.
    pub active_version: &'a str,
    /// Absolute version the next delta is based on.
    pub base_state: Option<&'a str>,
    /// Whether unsaved changes exist.
    pub modified: bool,
    /// Live entities, ascending by id.
    pub entities: Vec<EntityDump>,
    /// Ids changed since the last save.
    pub added_or_modified: Vec<Uid>,
    /// Ids removed since the last save.
    pub removed: Vec<Uid>,
    /// The version graph.
    pub versions: &'a VersionGraph,
    /// The root descriptor as last read or written.
    pub root: Option<&'a RootDescriptor>,
}

impl<'a> StateDump<'a> {
    /// Collects a dump.
    #[must_use]
    pub fn new(
        tracker: &ModelStateTracker,
        graph: &'a VersionGraph,
        base_state: Option<&'a str>,
        root: Option<&'a RootDescriptor>,
    ) -> Self {
        Self {
            active_branch: graph.active_branch(),
            active_version: graph.active_version(),
            base_state,
            modified: tracker.is_modified(),
            entities: tracker
                .entities()
                .iter()
                .map(|(id, record)| EntityDump {
                    id: *id,
                    version: record.version,
                    parent: record.parent,
                    kind: record.kind,
                })
                .collect(),
            added_or_modified: tracker.added_or_modified().keys().copied().collect(),
            removed: tracker.removed().keys().copied().collect(),
            versions: graph,
            root,
        }
    }

    /// Converts the dump to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_value(&self) -> CoreResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_lists_entities_and_versions() {
        let mut tracker = ModelStateTracker::new();
        tracker.add_new_entity(Uid::new(1), Uid::NULL, Uid::new(10), EntityKind::Topology);
        tracker.add_new_entity(Uid::new(2), Uid::new(1), Uid::new(11), EntityKind::Data);

        let mut graph = VersionGraph::new();
        graph.insert_version("1", "", "", "first").unwrap();
        graph.set_active_version("1");

        let value = StateDump::new(&tracker, &graph, Some("1"), None).to_value().unwrap();
        assert_eq!(value["active_version"], "1");
        assert_eq!(value["base_state"], "1");
        assert_eq!(value["modified"], true);
        assert_eq!(value["entities"].as_array().unwrap().len(), 2);
        assert_eq!(value["entities"][1]["parent"], 1);
        assert_eq!(value["entities"][1]["kind"], "Data");
        assert_eq!(value["versions"]["branches"][0][0]["description"], "first");
        assert!(value["root"].is_null());
    }
}
