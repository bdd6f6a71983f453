//! Document store trait definition.

use crate::document::{Document, Fields, InsertionOrder};
use crate::error::StorageResult;
use crate::query::{Filter, FindOptions, Update};

/// Documents returned by [`DocumentStore::find_all`], already filtered,
/// sorted, projected and limited.
pub type Cursor = std::vec::IntoIter<Document>;

/// A document collection holding one project.
///
/// Document stores are **schema-less**. They evaluate abstract filters and
/// sort by insertion order; the model-state core owns every field layout.
///
/// # Invariants
///
/// - `insert` assigns an [`InsertionOrder`] greater than the coarse component
///   of every order assigned before it
/// - Insertion orders never change after assignment
/// - Results of `find_all` come back in the requested [`crate::SortOrder`]
/// - Stores must be `Send + Sync`
///
/// # Implementors
///
/// - [`super::InMemoryDocumentStore`] - For testing
/// - [`super::FileDocumentStore`] - For persistent projects
pub trait DocumentStore: Send + Sync {
    /// Returns the first document matching `filter` in the requested order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find_one(&self, filter: &Filter, options: &FindOptions) -> StorageResult<Option<Document>> {
        let options = options.clone().limit(1);
        Ok(self.find_all(filter, &options)?.next())
    }

    /// Returns every document matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn find_all(&self, filter: &Filter, options: &FindOptions) -> StorageResult<Cursor>;

    /// Inserts a document and returns its assigned insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or is rejected.
    fn insert(&mut self, fields: Fields) -> StorageResult<InsertionOrder>;

    /// Applies `update` to the oldest document matching `filter`.
    ///
    /// Returns the number of documents changed (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or is rejected.
    fn update_one(&mut self, filter: &Filter, update: &Update) -> StorageResult<u64>;

    /// Applies `update` to every document matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or is rejected.
    fn update_many(&mut self, filter: &Filter, update: &Update) -> StorageResult<u64>;

    /// Deletes every document matching `filter` and returns how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or is rejected.
    fn delete_many(&mut self, filter: &Filter) -> StorageResult<u64>;

    /// Counts the documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn count(&self, filter: &Filter) -> StorageResult<u64> {
        let options = FindOptions::new().projection(Vec::<String>::new());
        Ok(self.find_all(filter, &options)?.len() as u64)
    }
}
