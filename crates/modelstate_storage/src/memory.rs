//! In-memory document store for testing.

use crate::document::{Document, Fields, InsertionOrder};
use crate::error::StorageResult;
use crate::query::{Filter, FindOptions, SortOrder, Update};
use crate::store::{Cursor, DocumentStore};
use parking_lot::RwLock;
use std::collections::BTreeSet;

/// Documents plus the next insertion order to hand out.
///
/// Shared by the in-memory and the file store; the file store replays its
/// log into one of these on open.
#[derive(Debug)]
pub(crate) struct MemoryState {
    documents: Vec<Document>,
    next_order: InsertionOrder,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            next_order: InsertionOrder::new(1),
        }
    }
}

impl MemoryState {
    pub(crate) fn select(&self, filter: &Filter, options: &FindOptions) -> Vec<Document> {
        let limit = options.limit.unwrap_or(usize::MAX);
        let matching = self.documents.iter().filter(|doc| filter.matches(doc));
        let selected: Vec<&Document> = match options.sort {
            SortOrder::Ascending => matching.take(limit).collect(),
            SortOrder::Descending => {
                let mut all: Vec<&Document> = matching.collect();
                all.reverse();
                all.truncate(limit);
                all
            }
        };
        selected
            .into_iter()
            .map(|doc| match &options.projection {
                Some(fields) => doc.clone().project(fields),
                None => doc.clone(),
            })
            .collect()
    }

    /// Assigns the next insertion order.
    pub(crate) fn allocate(&mut self) -> InsertionOrder {
        let order = self.next_order;
        self.next_order = order.next();
        order
    }

    /// Stores a document under an already assigned order.
    pub(crate) fn put(&mut self, order: InsertionOrder, fields: Fields) {
        if order >= self.next_order {
            self.next_order = order.next();
        }
        let at = self.documents.partition_point(|doc| doc.order() < order);
        self.documents.insert(at, Document::new(order, fields));
    }

    /// Orders of the documents `update_one`/`update_many` would touch.
    pub(crate) fn matching_orders(&self, filter: &Filter, limit: Option<usize>) -> Vec<InsertionOrder> {
        self.documents
            .iter()
            .filter(|doc| filter.matches(doc))
            .take(limit.unwrap_or(usize::MAX))
            .map(Document::order)
            .collect()
    }

    pub(crate) fn set_fields(&mut self, orders: &[InsertionOrder], fields: &Fields) {
        let update = Update { set: fields.clone() };
        let orders: BTreeSet<InsertionOrder> = orders.iter().copied().collect();
        for doc in &mut self.documents {
            if orders.contains(&doc.order()) {
                update.apply(doc);
            }
        }
    }

    pub(crate) fn remove(&mut self, orders: &[InsertionOrder]) {
        let orders: BTreeSet<InsertionOrder> = orders.iter().copied().collect();
        self.documents.retain(|doc| !orders.contains(&doc.order()));
    }

    pub(crate) fn len(&self) -> usize {
        self.documents.len()
    }

    pub(crate) fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub(crate) fn clear(&mut self) {
        self.documents.clear();
    }
}

/// An in-memory document store.
///
/// This store keeps all documents in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral projects that don't need persistence
///
/// Insertion orders are consecutive integers starting at 1, so all
/// documents of a small project share one coarse window.
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use modelstate_storage::{DocumentStore, Fields, Filter, InMemoryDocumentStore};
///
/// let mut store = InMemoryDocumentStore::new();
/// store.insert(Fields::new()).unwrap();
/// assert_eq!(store.count(&Filter::all()).unwrap(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    state: RwLock<MemoryState>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given documents.
    ///
    /// Useful for testing upgrade and recovery scenarios with hand-made
    /// insertion orders.
    #[must_use]
    pub fn with_documents(documents: impl IntoIterator<Item = Document>) -> Self {
        let mut state = MemoryState::default();
        for doc in documents {
            let order = doc.order();
            state.put(order, doc.into_fields());
        }
        Self {
            state: RwLock::new(state),
        }
    }

    /// Returns a copy of all documents in insertion order.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.state.read().documents().to_vec()
    }

    /// Returns the number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    /// Returns whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all documents. Insertion orders keep growing.
    pub fn clear(&mut self) {
        self.state.write().clear();
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn find_all(&self, filter: &Filter, options: &FindOptions) -> StorageResult<Cursor> {
        Ok(self.state.read().select(filter, options).into_iter())
    }

    fn insert(&mut self, fields: Fields) -> StorageResult<InsertionOrder> {
        let mut state = self.state.write();
        let order = state.allocate();
        state.put(order, fields);
        Ok(order)
    }

    fn update_one(&mut self, filter: &Filter, update: &Update) -> StorageResult<u64> {
        let mut state = self.state.write();
        let orders = state.matching_orders(filter, Some(1));
        state.set_fields(&orders, &update.set);
        Ok(orders.len() as u64)
    }

    fn update_many(&mut self, filter: &Filter, update: &Update) -> StorageResult<u64> {
        let mut state = self.state.write();
        let orders = state.matching_orders(filter, None);
        state.set_fields(&orders, &update.set);
        Ok(orders.len() as u64)
    }

    fn delete_many(&mut self, filter: &Filter) -> StorageResult<u64> {
        let mut state = self.state.write();
        let orders = state.matching_orders(filter, None);
        state.remove(&orders);
        Ok(orders.len() as u64)
    }
}
