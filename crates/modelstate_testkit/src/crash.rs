//! Crash simulation.
//!
//! A save writes its documents one by one. [`FailingStore`] rejects writes
//! once a budget is used up, which leaves the store exactly as a process
//! crash at that point would: some documents written, the rest missing.

use modelstate_storage::{
    Cursor, DocumentStore, Fields, Filter, FindOptions, InsertionOrder, StorageError, StorageResult, Update,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared control of a [`FailingStore`] that stays usable after the store
/// moved into a manager.
#[derive(Debug, Clone, Default)]
pub struct FailureSwitch {
    remaining_writes: Arc<AtomicUsize>,
    armed: Arc<AtomicBool>,
    tripped: Arc<AtomicBool>,
}

impl FailureSwitch {
    /// Lets `writes` more writes through, then fails every write.
    pub fn fail_after(&self, writes: usize) {
        self.remaining_writes.store(writes, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Lets every write through again.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
        self.tripped.store(false, Ordering::SeqCst);
    }

    /// Returns whether a write has been rejected since the last disarm.
    pub fn has_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    fn check(&self) -> StorageResult<()> {
        if !self.armed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let allowed = self
            .remaining_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if allowed {
            return Ok(());
        }
        self.tripped.store(true, Ordering::SeqCst);
        Err(StorageError::WriteRejected("simulated crash".to_string()))
    }
}

/// A document store wrapper that can simulate crashes.
pub struct FailingStore<S> {
    inner: S,
    switch: FailureSwitch,
}

impl<S: DocumentStore> FailingStore<S> {
    /// Wraps `inner`; returns the store and its switch.
    pub fn new(inner: S) -> (Self, FailureSwitch) {
        let switch = FailureSwitch::default();
        (
            Self {
                inner,
                switch: switch.clone(),
            },
            switch,
        )
    }

    /// Returns the wrapped store.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: DocumentStore> DocumentStore for FailingStore<S> {
    fn find_all(&self, filter: &Filter, options: &FindOptions) -> StorageResult<Cursor> {
        self.inner.find_all(filter, options)
    }

    fn insert(&mut self, fields: Fields) -> StorageResult<InsertionOrder> {
        self.switch.check()?;
        self.inner.insert(fields)
    }

    fn update_one(&mut self, filter: &Filter, update: &Update) -> StorageResult<u64> {
        self.switch.check()?;
        self.inner.update_one(filter, update)
    }

    fn update_many(&mut self, filter: &Filter, update: &Update) -> StorageResult<u64> {
        self.switch.check()?;
        self.inner.update_many(filter, update)
    }

    fn delete_many(&mut self, filter: &Filter) -> StorageResult<u64> {
        self.switch.check()?;
        self.inner.delete_many(filter)
    }
}
