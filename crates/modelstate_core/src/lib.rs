//! # Model-State Core
//!
//! Versioned persistence of an engineering model's entity graph.
//!
//! This crate provides:
//! - A tracker for the live entities and the delta since the last save
//! - A version graph with branches, undo and redo
//! - The snapshot codec (full snapshots, deltas, extension documents)
//! - The lifecycle controller ([`ModelStateManager`])
//! - Garbage collection of entity documents left behind by a crash
//! - Schema upgrades of older projects
//!
//! ## Example
//!
//! ```rust
//! use modelstate_core::{Config, EntityKind, ModelStateManager, SequentialUidGenerator, Uid};
//! use modelstate_storage::InMemoryDocumentStore;
//!
//! let mut manager = ModelStateManager::with_generator(
//!     InMemoryDocumentStore::new(),
//!     SequentialUidGenerator::new(),
//!     Config::default(),
//! );
//!
//! let body = manager.create_uid().unwrap();
//! let body_version = manager.create_uid().unwrap();
//! manager.add_new_entity(body, Uid::NULL, body_version, EntityKind::Topology);
//! manager.save_model_state(false, false, "add body").unwrap();
//!
//! manager.remove_entity(body, true);
//! manager.save_model_state(false, false, "remove body").unwrap();
//!
//! assert!(manager.undo().unwrap());
//! assert_eq!(manager.current_version(body), Some(body_version));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attachments;
pub mod codec;
mod config;
mod dump;
mod error;
mod gc;
mod manager;
pub mod migration;
mod root;
pub mod schema;
mod tracker;
mod types;
mod uid;
pub mod version;

pub use attachments::{read_project_preview_image, DescriptionSyntax, ImageFormat, PreviewImage, ProjectDescription};
pub use config::Config;
pub use dump::{EntityDump, StateDump};
pub use error::{CoreError, CoreResult};
pub use gc::{collect_garbage, GcReport};
pub use manager::{ModelStateManager, SaveOutcome};
pub use migration::{SchemaMigration, SchemaUpgrader, UpgradeReport};
pub use root::{AttachmentRef, RootDescriptor};
pub use tracker::{build_children_index, ChildrenIndex, EntityMap, ModelStateTracker};
pub use types::{EntityKind, EntityRecord, Uid};
pub use uid::{SequentialUidGenerator, SessionUidGenerator, UidGenerator};
pub use version::{Version, VersionGraph};
