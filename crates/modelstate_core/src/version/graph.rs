//! The version/branch graph of a project.

use super::name;
use crate::error::CoreResult;
use serde::Serialize;

/// One committed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Version {
    name: String,
    parent: String,
    label: String,
    description: String,
}

impl Version {
    /// Creates a version record.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        parent: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            label: label.into(),
            description: description.into(),
        }
    }

    /// Version name, e.g. `"1.1.2"`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version this one was saved on top of; empty for the first version.
    #[must_use]
    pub fn parent(&self) -> &str {
        &self.parent
    }

    /// Short user label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Save comment.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Branch containing this version.
    #[must_use]
    pub fn branch(&self) -> &str {
        name::branch_of(&self.name)
    }

    /// Version the branch of this version forks from.
    #[must_use]
    pub fn branch_node(&self) -> &str {
        name::branch_node_of(&self.name)
    }

    /// Trailing integer of the name.
    #[must_use]
    pub fn number(&self) -> u64 {
        name::number(&self.name).unwrap_or(0)
    }
}

/// All versions of a project grouped into branches, plus the active
/// branch and version.
///
/// # Invariants
///
/// - Every stored branch is non-empty and sorted by trailing number
/// - The root branch, when present, is listed first
/// - Version names are unique
#[derive(Debug, Clone, Default, Serialize)]
pub struct VersionGraph {
    branches: Vec<Vec<Version>>,
    active_branch: String,
    active_version: String,
}

impl VersionGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes all versions and resets the active pointers.
    pub fn clear(&mut self) {
        self.branches.clear();
        self.active_branch.clear();
        self.active_version.clear();
    }

    /// Returns whether the graph holds no version.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Number of versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.branches.iter().map(Vec::len).sum()
    }

    /// Iterates all versions, branch by branch.
    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.branches.iter().flatten()
    }

    /// Iterates the branches.
    pub fn branches(&self) -> impl Iterator<Item = &[Version]> {
        self.branches.iter().map(Vec::as_slice)
    }

    /// Name of the active branch.
    #[must_use]
    pub fn active_branch(&self) -> &str {
        &self.active_branch
    }

    /// Name of the active version; empty before the first save.
    #[must_use]
    pub fn active_version(&self) -> &str {
        &self.active_version
    }

    /// Sets the active branch.
    pub fn set_active_branch(&mut self, branch: impl Into<String>) {
        self.active_branch = branch.into();
    }

    /// Sets the active version.
    pub fn set_active_version(&mut self, version: impl Into<String>) {
        self.active_version = version.into();
    }

    /// Replaces the active version by its successor in the branch.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidVersionName`] if the active version
    /// has no integer trailing segment.
    pub fn increment_active_version(&mut self) -> CoreResult<()> {
        self.active_version = name::increment(&self.active_version)?;
        Ok(())
    }

    /// Inserts a version into its branch, creating the branch if needed.
    ///
    /// Inserting an existing name logs a warning and keeps the stored
    /// version.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidVersionName`] for malformed names.
    pub fn insert_version(
        &mut self,
        name: &str,
        parent: &str,
        label: &str,
        description: &str,
    ) -> CoreResult<&Version> {
        name::validate(name)?;
        let version = Version::new(name, parent, label, description);
        let number = version.number();
        let branch_name = name::branch_of(name);

        let Some(branch_ix) = self.branch_index(branch_name) else {
            let ix = self.new_branch_position(branch_name);
            self.branches.insert(ix, vec![version]);
            return Ok(&self.branches[ix][0]);
        };

        let branch = &mut self.branches[branch_ix];
        let at = branch.partition_point(|v| v.number() < number);
        if branch.get(at).is_some_and(|v| v.number() == number) {
            tracing::warn!(version = %name, branch = %branch_name, "version already exists");
        } else {
            branch.insert(at, version);
        }
        Ok(&self.branches[branch_ix][at])
    }

    /// Finds a version by name.
    #[must_use]
    pub fn find_version(&self, name: &str) -> Option<&Version> {
        let branch = &self.branches[self.branch_index(name::branch_of(name))?];
        branch.iter().rev().find(|v| v.name == name)
    }

    /// Returns whether the version exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.find_version(name).is_some()
    }

    /// Returns the version preceding `name`.
    ///
    /// Inside a branch this is the previous entry. For the first version of
    /// a branch it is the newest version numbered at or below the fork
    /// version in the fork version's branch, walking further up when that
    /// branch has been emptied.
    #[must_use]
    pub fn find_previous_version(&self, name: &str) -> Option<&Version> {
        let Some((branch_ix, ix)) = self.locate(name) else {
            tracing::error!(version = %name, "version not found");
            return None;
        };
        if ix > 0 {
            return Some(&self.branches[branch_ix][ix - 1]);
        }

        let mut node = name::branch_node_of(name);
        while !node.is_empty() {
            let node_number = name::number(node).unwrap_or(0);
            if let Some(branch_ix) = self.branch_index(name::branch_of(node)) {
                let branch = &self.branches[branch_ix];
                let at = branch.partition_point(|v| v.number() <= node_number);
                if at > 0 {
                    return Some(&branch[at - 1]);
                }
            }
            node = name::branch_node_of(node);
        }
        None
    }

    /// Returns the version following `name` on the active branch's lineage.
    #[must_use]
    pub fn find_next_version(&self, name: &str) -> Option<&Version> {
        self.find_next_version_on(name, &self.active_branch)
    }

    /// Returns the version following `name` on the lineage of `branch`.
    ///
    /// A branch forked at `name` that `branch` lies in (or descends from)
    /// wins over the next version of `name`'s own branch.
    #[must_use]
    pub fn find_next_version_on(&self, name: &str, branch: &str) -> Option<&Version> {
        if name.is_empty() {
            return None;
        }
        for versions in &self.branches {
            let first = &versions[0];
            if first.branch_node() == name && name::has_segment_prefix(branch, first.branch()) {
                return Some(first);
            }
        }
        let Some((branch_ix, ix)) = self.locate(name) else {
            tracing::error!(version = %name, "version not found");
            return None;
        };
        self.branches[branch_ix].get(ix + 1)
    }

    /// Returns every version that descends from `name`: later versions of
    /// its branch and, recursively, all versions of branches forked from it
    /// or from those later versions.
    #[must_use]
    pub fn find_all_next_versions(&self, name: &str) -> Vec<&Version> {
        let mut result = Vec::new();
        let Some((branch_ix, ix)) = self.locate(name) else {
            tracing::error!(version = %name, "version not found");
            return result;
        };
        self.collect_from(branch_ix, ix + 1, &mut result);
        for (other_ix, versions) in self.branches.iter().enumerate() {
            if versions[0].branch_node() == name {
                self.collect_from(other_ix, 0, &mut result);
            }
        }
        result
    }

    /// Returns whether `name` is the last version of some branch.
    #[must_use]
    pub fn version_is_end_of_branch(&self, name: &str) -> bool {
        self.branches
            .iter()
            .any(|versions| versions.last().is_some_and(|v| v.name == name))
    }

    /// Returns whether a branch with this name holds versions.
    #[must_use]
    pub fn branch_exists(&self, branch: &str) -> bool {
        self.branch_index(branch).is_some()
    }

    /// Returns whether any version lives in `branch` or below it.
    #[must_use]
    pub fn branch_in_use(&self, branch: &str) -> bool {
        let prefix = format!("{branch}.");
        self.versions().any(|v| v.name.starts_with(&prefix))
    }

    /// Returns the last version of a branch.
    #[must_use]
    pub fn last_version_in_branch(&self, branch: &str) -> Option<&Version> {
        self.branches[self.branch_index(branch)?].last()
    }

    /// Returns the branches forked at `name`.
    #[must_use]
    pub fn branches_from_node(&self, name: &str) -> Vec<&[Version]> {
        self.branches
            .iter()
            .filter(|versions| versions[0].branch_node() == name)
            .map(Vec::as_slice)
            .collect()
    }

    /// Returns whether `version` is part of `branch` (including the
    /// ancestors the branch was forked from).
    #[must_use]
    pub fn is_version_in_branch(&self, version: &str, branch: &str) -> bool {
        if branch.is_empty() {
            return name::depth(version) == 0;
        }
        if name::depth(version) > name::depth(branch) + 1 {
            return false;
        }
        if name::has_segment_prefix(version, branch) && version.len() > branch.len() {
            return true;
        }

        let mut ancestor = name::fork_point_of(branch).to_string();
        while !ancestor.is_empty() {
            if ancestor == version {
                return true;
            }
            ancestor = match self.find_previous_version(&ancestor) {
                Some(previous) => previous.name.clone(),
                None => break,
            };
        }
        false
    }

    /// Returns whether `version` is part of the active branch.
    #[must_use]
    pub fn is_version_in_active_branch(&self, version: &str) -> bool {
        self.is_version_in_branch(version, &self.active_branch)
    }

    /// Replaces the label of a version. Returns whether the version exists.
    pub fn set_label(&mut self, name: &str, label: impl Into<String>) -> bool {
        let Some(version) = self.version_mut(name) else {
            return false;
        };
        version.label = label.into();
        true
    }

    /// Replaces the save comment of a version. Returns whether the version
    /// exists.
    pub fn set_description(&mut self, name: &str, description: impl Into<String>) -> bool {
        let Some(version) = self.version_mut(name) else {
            return false;
        };
        version.description = description.into();
        true
    }

    fn version_mut(&mut self, name: &str) -> Option<&mut Version> {
        let (branch_ix, ix) = self.locate(name)?;
        Some(&mut self.branches[branch_ix][ix])
    }

    /// Removes a version. Branches left empty are dropped.
    ///
    /// Returns whether the version existed.
    pub fn remove_version(&mut self, name: &str) -> bool {
        let Some((branch_ix, ix)) = self.locate(name) else {
            return false;
        };
        self.branches[branch_ix].remove(ix);
        if self.branches[branch_ix].is_empty() {
            self.branches.remove(branch_ix);
        }
        if self.active_version == name {
            self.active_version.clear();
        }
        true
    }

    fn branch_index(&self, branch: &str) -> Option<usize> {
        self.branches
            .iter()
            .position(|versions| versions[0].branch() == branch)
    }

    fn locate(&self, name: &str) -> Option<(usize, usize)> {
        let branch_ix = self.branch_index(name::branch_of(name))?;
        let ix = self.branches[branch_ix].iter().position(|v| v.name == name)?;
        Some((branch_ix, ix))
    }

    fn collect_from<'a>(&'a self, branch_ix: usize, start: usize, out: &mut Vec<&'a Version>) {
        for version in self.branches[branch_ix].iter().skip(start) {
            out.push(version);
            for (other_ix, versions) in self.branches.iter().enumerate() {
                if versions[0].branch_node() == version.name {
                    self.collect_from(other_ix, 0, out);
                }
            }
        }
    }

    /// Root branch first, then branches by their numeric segments.
    fn new_branch_position(&self, branch: &str) -> usize {
        if branch.is_empty() {
            return 0;
        }
        let key = name::segments(branch).unwrap_or_default();
        self.branches
            .iter()
            .position(|versions| {
                let other = versions[0].branch();
                !other.is_empty() && name::segments(other).unwrap_or_default() > key
            })
            .unwrap_or(self.branches.len())
    }
}
