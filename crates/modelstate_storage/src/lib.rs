//! # Model-State Storage
//!
//! The document store contract consumed by the model-state core.
//!
//! A project lives in one document collection. Stores are **schema-less
//! document containers**: they filter, sort and project documents but never
//! interpret the fields the core writes.
//!
//! ## Design Principles
//!
//! - Every stored document carries a store-assigned [`InsertionOrder`]
//! - Queries are abstract ([`Filter`], [`FindOptions`], [`Update`]); there is
//!   no query language
//! - Stores must be `Send + Sync`
//! - The core owns all document layouts
//!
//! ## Available Stores
//!
//! - [`InMemoryDocumentStore`] - For testing and ephemeral projects
//! - [`FileDocumentStore`] - Append-only operation log replayed on open
//!
//! ## Example
//!
//! ```rust
//! use modelstate_storage::{DocumentStore, Fields, Filter, FindOptions, InMemoryDocumentStore};
//! use serde_json::json;
//!
//! let mut store = InMemoryDocumentStore::new();
//! let mut fields = Fields::new();
//! fields.insert("SchemaType".to_string(), json!("ModelState"));
//! let order = store.insert(fields).unwrap();
//!
//! let doc = store
//!     .find_one(&Filter::eq("SchemaType", "ModelState"), &FindOptions::new())
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(doc.order(), order);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod file;
mod memory;
mod query;
mod store;

pub use document::{Document, Fields, InsertionOrder};
pub use error::{StorageError, StorageResult};
pub use file::FileDocumentStore;
pub use memory::InMemoryDocumentStore;
pub use query::{Filter, FindOptions, SortOrder, Update};
pub use store::{Cursor, DocumentStore};
