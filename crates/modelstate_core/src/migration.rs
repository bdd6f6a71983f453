//! Schema upgrades of persisted projects.
//!
//! The root descriptor's `SchemaVersion_Model` tells which layout a project
//! was written with. Opening a project runs every registered step from that
//! version up to [`model::CURRENT_SCHEMA_VERSION`].
//!
//! Upgrades are:
//! - **Forward-only**: there is no downgrade path
//! - **Guarded**: a step's root descriptor changes and the schema version
//!   bump are written in one update, so a step interrupted before that
//!   write runs again on the next open
//!
//! ## Usage
//!
//! ```rust
//! use modelstate_core::migration::SchemaUpgrader;
//! use modelstate_storage::InMemoryDocumentStore;
//!
//! let mut store = InMemoryDocumentStore::new();
//! let report = SchemaUpgrader::default().upgrade(&mut store).unwrap();
//! assert!(report.applied.is_empty());
//! ```

use crate::error::{CoreError, CoreResult};
use crate::root::RootDescriptor;
use crate::schema::{model, schema_type, state, SCHEMA_TYPE};
use modelstate_storage::{DocumentStore, Fields, Filter, FindOptions, Update};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Value of `SchemaVersion_Model`.
pub type SchemaVersion = i64;

/// Information about a registered step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationInfo {
    /// Schema version the step reads.
    pub from_version: SchemaVersion,
    /// Schema version the step writes.
    pub to_version: SchemaVersion,
    /// Human-readable name.
    pub name: String,
}

/// A change performed during an upgrade, kept for the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UpgradeOperation {
    /// Documents moved from one `SchemaType` to another.
    Relabel {
        /// Previous type.
        from: String,
        /// New type.
        to: String,
        /// Documents changed.
        count: u64,
    },
    /// `ParentVersion` written on a version document.
    SetParent {
        /// Version name.
        version: String,
        /// Parent version name.
        parent: String,
    },
    /// A root descriptor field staged for the final write.
    SetRootField {
        /// Field name.
        field: String,
    },
}

/// State handed to a step.
pub struct UpgradeContext<'a> {
    /// The project store.
    pub store: &'a mut dyn DocumentStore,
    /// Root descriptor as read before the upgrade.
    pub root: &'a RootDescriptor,
    /// Operations performed so far.
    pub operations: Vec<UpgradeOperation>,
    root_fields: Fields,
}

impl<'a> UpgradeContext<'a> {
    /// Creates a context.
    pub fn new(store: &'a mut dyn DocumentStore, root: &'a RootDescriptor) -> Self {
        Self {
            store,
            root,
            operations: Vec::new(),
            root_fields: Fields::new(),
        }
    }

    /// Stages a root descriptor field; it is written together with the
    /// schema version bump.
    pub fn set_root_field(&mut self, field: &str, value: impl Into<Value>) {
        self.root_fields.insert(field.to_string(), value.into());
        self.operations.push(UpgradeOperation::SetRootField {
            field: field.to_string(),
        });
    }

    /// Rewrites `SchemaType` of every document of type `from`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the update fails.
    pub fn relabel(&mut self, from: &str, to: &str) -> CoreResult<u64> {
        let count = self
            .store
            .update_many(&Filter::eq(SCHEMA_TYPE, from), &Update::set(SCHEMA_TYPE, to))?;
        self.operations.push(UpgradeOperation::Relabel {
            from: from.to_string(),
            to: to.to_string(),
            count,
        });
        Ok(count)
    }
}

/// One upgrade step.
pub trait SchemaMigration: Send + Sync {
    /// Schema version the step reads.
    fn from_version(&self) -> SchemaVersion;

    /// Schema version the step writes.
    fn to_version(&self) -> SchemaVersion {
        self.from_version() + 1
    }

    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// Performs the step.
    ///
    /// # Errors
    ///
    /// Returns an error if the step cannot complete; the schema version is
    /// then left unchanged.
    fn apply(&self, ctx: &mut UpgradeContext<'_>) -> CoreResult<()>;
}

/// Result of one applied step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedStep {
    /// The step.
    pub info: MigrationInfo,
    /// What it did.
    pub operations: Vec<UpgradeOperation>,
}

/// Result of an upgrade run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpgradeReport {
    /// Schema version found; `None` for a project without root descriptor.
    pub initial_version: Option<SchemaVersion>,
    /// Schema version after the run.
    pub final_version: Option<SchemaVersion>,
    /// Steps applied, in order.
    pub applied: Vec<AppliedStep>,
}

impl UpgradeReport {
    /// Whether any step ran.
    #[must_use]
    pub fn upgraded(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Registry of upgrade steps.
pub struct SchemaUpgrader {
    steps: BTreeMap<SchemaVersion, Box<dyn SchemaMigration>>,
}

impl SchemaUpgrader {
    /// Creates an upgrader without steps.
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: BTreeMap::new(),
        }
    }

    /// Registers a step.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MigrationFailed`] if a step for the same source
    /// version exists or the step does not advance the version by one.
    pub fn register(&mut self, step: Box<dyn SchemaMigration>) -> CoreResult<()> {
        let from = step.from_version();
        if step.to_version() != from + 1 {
            return Err(CoreError::migration_failed(format!(
                "step {} must upgrade {from} to {}, not {}",
                step.name(),
                from + 1,
                step.to_version()
            )));
        }
        if self.steps.contains_key(&from) {
            return Err(CoreError::migration_failed(format!(
                "a step from schema version {from} is already registered"
            )));
        }
        self.steps.insert(from, step);
        Ok(())
    }

    /// Returns the registered steps in order.
    #[must_use]
    pub fn list(&self) -> Vec<MigrationInfo> {
        self.steps.values().map(|s| info(&**s)).collect()
    }

    /// Checks that the steps form one unbroken chain.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MigrationFailed`] on a gap.
    pub fn validate(&self) -> CoreResult<()> {
        let mut expected: Option<SchemaVersion> = None;
        for step in self.steps.values() {
            if let Some(expected) = expected {
                if step.from_version() != expected {
                    return Err(CoreError::migration_failed(format!(
                        "schema step gap: expected {expected}, got {}",
                        step.from_version()
                    )));
                }
            }
            expected = Some(step.to_version());
        }
        Ok(())
    }

    /// Schema version the steps lead to.
    #[must_use]
    pub fn target_version(&self) -> SchemaVersion {
        self.steps
            .values()
            .next_back()
            .map_or(model::CURRENT_SCHEMA_VERSION, |s| s.to_version())
    }

    /// Upgrades the project in `store` to the target version.
    ///
    /// A project without root descriptor is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SchemaMismatch`] for a schema newer than the
    /// target, [`CoreError::MigrationFailed`] for a missing step, or the
    /// error of a failing step.
    pub fn upgrade(&self, store: &mut dyn DocumentStore) -> CoreResult<UpgradeReport> {
        let Some(mut root) = RootDescriptor::load(store)? else {
            return Ok(UpgradeReport::default());
        };
        self.validate()?;

        let target = self.target_version();
        let mut report = UpgradeReport {
            initial_version: Some(root.schema_version),
            final_version: Some(root.schema_version),
            applied: Vec::new(),
        };
        if root.schema_version > target {
            return Err(CoreError::schema_mismatch(format!(
                "project schema version {} is newer than supported version {target}",
                root.schema_version
            )));
        }

        while root.schema_version < target {
            let from = root.schema_version;
            let step = self
                .steps
                .get(&from)
                .ok_or_else(|| CoreError::migration_failed(format!("no step upgrades schema version {from}")))?;

            tracing::info!(step = step.name(), from, to = step.to_version(), "upgrading project schema");

            let mut ctx = UpgradeContext::new(store, &root);
            if let Err(err) = step.apply(&mut ctx) {
                tracing::error!(step = step.name(), error = %err, "schema step failed");
                return Err(err);
            }
            let UpgradeContext {
                operations,
                root_fields,
                ..
            } = ctx;

            let update = Update { set: root_fields }.and_set(model::SCHEMA_VERSION, step.to_version());
            root.update(store, &update)?;
            root.schema_version = step.to_version();

            report.final_version = Some(root.schema_version);
            report.applied.push(AppliedStep {
                info: info(&**step),
                operations,
            });
        }
        Ok(report)
    }
}

impl Default for SchemaUpgrader {
    /// The upgrader with every built-in step.
    fn default() -> Self {
        Self {
            steps: BTreeMap::from([(1, Box::new(ParentVersions) as Box<dyn SchemaMigration>)]),
        }
    }
}

fn info(step: &dyn SchemaMigration) -> MigrationInfo {
    MigrationInfo {
        from_version: step.from_version(),
        to_version: step.to_version(),
        name: step.name().to_string(),
    }
}

/// Schema 1 to 2.
///
/// Schema 1 had a linear history: each version's parent is the version
/// stored before it, and versions that were undone carried the
/// `*Inactive` types. Schema 2 records parents explicitly and keeps the
/// current version in the root descriptor.
pub struct ParentVersions;

impl SchemaMigration for ParentVersions {
    fn from_version(&self) -> SchemaVersion {
        1
    }

    fn name(&self) -> &str {
        "parent_versions"
    }

    fn apply(&self, ctx: &mut UpgradeContext<'_>) -> CoreResult<()> {
        let main_types = [schema_type::MODEL_STATE, schema_type::MODEL_STATE_INACTIVE];
        let history = ctx.store.find_all(
            &Filter::one_of(SCHEMA_TYPE, main_types),
            &FindOptions::new().projection([SCHEMA_TYPE, state::VERSION]),
        )?;

        let mut lineage = Vec::new();
        let mut has_inactive = false;
        let mut parent = String::new();
        for doc in history {
            let Some(version) = doc.get_str(state::VERSION) else {
                tracing::warn!(order = %doc.order(), "version document without Version, skipping");
                continue;
            };
            has_inactive |= doc.get_str(SCHEMA_TYPE) == Some(schema_type::MODEL_STATE_INACTIVE);
            lineage.push((version.to_string(), parent.clone()));
            parent = version.to_string();
        }

        let mut active_version = String::new();
        if has_inactive {
            let current = ctx.store.find_one(
                &Filter::eq(SCHEMA_TYPE, schema_type::MODEL_STATE),
                &FindOptions::new().newest_first().projection([state::VERSION]),
            )?;
            if let Some(version) = current.as_ref().and_then(|d| d.get_str(state::VERSION)) {
                active_version = version.to_string();
            }
            ctx.relabel(schema_type::MODEL_STATE_INACTIVE, schema_type::MODEL_STATE)?;
            ctx.relabel(
                schema_type::MODEL_STATE_EXTENSION_INACTIVE,
                schema_type::MODEL_STATE_EXTENSION,
            )?;
        }

        for (version, parent) in lineage {
            let filter = Filter::one_of(SCHEMA_TYPE, main_types).and(Filter::eq(state::VERSION, version.as_str()));
            ctx.store
                .update_one(&filter, &Update::set(state::PARENT_VERSION, parent.as_str()))?;
            ctx.operations.push(UpgradeOperation::SetParent { version, parent });
        }

        ctx.set_root_field(model::MODEL_TYPE, model::DEFAULT_MODEL_TYPE);
        ctx.set_root_field(model::ACTIVE_BRANCH, "");
        ctx.set_root_field(model::ACTIVE_VERSION, active_version);
        Ok(())
    }
}
