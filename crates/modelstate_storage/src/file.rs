//! File-based document store for persistent projects.

use crate::document::{Document, Fields, InsertionOrder};
use crate::error::{StorageError, StorageResult};
use crate::memory::MemoryState;
use crate::query::{Filter, FindOptions, Update};
use crate::store::{Cursor, DocumentStore};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One line of the operation log.
///
/// The log records effects, not requests: updates and deletes list the
/// orders they touched, so replay never re-evaluates a filter.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogRecord {
    Insert {
        order: InsertionOrder,
        fields: Fields,
    },
    Set {
        orders: Vec<InsertionOrder>,
        fields: Fields,
    },
    Delete {
        orders: Vec<InsertionOrder>,
    },
}

/// A file-based document store.
///
/// Every write is appended to a JSON-lines operation log and applied to an
/// in-memory image of the collection. Opening an existing file replays the
/// log. Data survives process restarts.
///
/// # Durability
///
/// Each record is written with a single `write_all` followed by `flush`.
/// Call [`FileDocumentStore::sync`] to force the file to disk. A torn final
/// line (a crash mid-append) is dropped on open; a malformed line anywhere
/// else is reported as [`StorageError::Corrupted`].
///
/// # Example
///
/// ```no_run
/// use modelstate_storage::{DocumentStore, Fields, FileDocumentStore};
/// use std::path::Path;
///
/// let mut store = FileDocumentStore::open(Path::new("project.jsonl")).unwrap();
/// store.insert(Fields::new()).unwrap();
/// store.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileDocumentStore {
    path: PathBuf,
    log: Mutex<File>,
    state: RwLock<MemoryState>,
}

impl FileDocumentStore {
    /// Opens or creates a store at the given path and replays its log.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a complete log line
    /// cannot be parsed.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let (state, valid_len) = if path.exists() {
            replay(path)?
        } else {
            (MemoryState::default(), 0)
        };

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        if log.metadata()?.len() > valid_len {
            log.set_len(valid_len)?;
        }

        tracing::debug!(path = %path.display(), documents = state.len(), "opened document store");

        Ok(Self {
            path: path.to_path_buf(),
            log: Mutex::new(log),
            state: RwLock::new(state),
        })
    }

    /// Opens or creates a store, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the store cannot
    /// be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
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

    /// Returns a copy of all documents in insertion order.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.state.read().documents().to_vec()
    }

    /// Syncs the log file to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> StorageResult<()> {
        self.log.lock().sync_all()?;
        Ok(())
    }

    fn append(&self, record: &LogRecord) -> StorageResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut log = self.log.lock();
        log.write_all(&line)?;
        log.flush()?;
        Ok(())
    }

    fn update(&mut self, filter: &Filter, update: &Update, limit: Option<usize>) -> StorageResult<u64> {
        let mut state = self.state.write();
        let orders = state.matching_orders(filter, limit);
        if orders.is_empty() || update.set.is_empty() {
            return Ok(orders.len() as u64);
        }
        self.append(&LogRecord::Set {
            orders: orders.clone(),
            fields: update.set.clone(),
        })?;
        state.set_fields(&orders, &update.set);
        Ok(orders.len() as u64)
    }
}

/// Replays the log and returns the image plus the length of its valid prefix.
///
/// Lines are read as raw bytes: a record cut inside a multi-byte character
/// is a torn tail like any other.
fn replay(path: &Path) -> StorageResult<(MemoryState, u64)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut state = MemoryState::default();
    let mut valid_len = 0u64;
    let mut consumed = 0u64;
    let mut line_no = 0usize;
    let mut torn: Option<(usize, serde_json::Error)> = None;
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line)?;
        if read == 0 {
            break;
        }
        line_no += 1;
        consumed += read as u64;
        if line.iter().all(u8::is_ascii_whitespace) {
            valid_len = consumed;
            continue;
        }
        if let Some((bad_line, err)) = torn.take() {
            return Err(StorageError::Corrupted(format!(
                "{}: line {bad_line}: {err}",
                path.display()
            )));
        }
        match serde_json::from_slice::<LogRecord>(line.trim_ascii_end()) {
            Ok(record) => {
                match record {
                    LogRecord::Insert { order, fields } => state.put(order, fields),
                    LogRecord::Set { orders, fields } => state.set_fields(&orders, &fields),
                    LogRecord::Delete { orders } => state.remove(&orders),
                }
                valid_len = consumed;
            }
            Err(err) => torn = Some((line_no, err)),
        }
    }

    if let Some((bad_line, err)) = torn {
        tracing::warn!(
            path = %path.display(),
            line = bad_line,
            error = %err,
            "dropping torn record at end of log"
        );
    }

    Ok((state, valid_len))
}

impl DocumentStore for FileDocumentStore {
    fn find_all(&self, filter: &Filter, options: &FindOptions) -> StorageResult<Cursor> {
        Ok(self.state.read().select(filter, options).into_iter())
    }

    fn insert(&mut self, fields: Fields) -> StorageResult<InsertionOrder> {
        let mut state = self.state.write();
        let order = state.allocate();
        self.append(&LogRecord::Insert {
            order,
            fields: fields.clone(),
        })?;
        state.put(order, fields);
        Ok(order)
    }

    fn update_one(&mut self, filter: &Filter, update: &Update) -> StorageResult<u64> {
        self.update(filter, update, Some(1))
    }

    fn update_many(&mut self, filter: &Filter, update: &Update) -> StorageResult<u64> {
        self.update(filter, update, None)
    }

    fn delete_many(&mut self, filter: &Filter) -> StorageResult<u64> {
        let mut state = self.state.write();
        let orders = state.matching_orders(filter, None);
        if orders.is_empty() {
            return Ok(0);
        }
        self.append(&LogRecord::Delete {
            orders: orders.clone(),
        })?;
        state.remove(&orders);
        Ok(orders.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn fields(value: Value) -> Fields {
        let Value::Object(map) = value else {
            panic!("expected object");
        };
        map
    }

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.jsonl");

        let store = FileDocumentStore::open(&path).unwrap();
        assert!(store.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn file_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.jsonl");

        let first_order;
        {
            let mut store = FileDocumentStore::open(&path).unwrap();
            first_order = store
                .insert(fields(json!({"SchemaType": "ModelState", "Version": "1"})))
                .unwrap();
            store
                .insert(fields(json!({"SchemaType": "ModelState", "Version": "2"})))
                .unwrap();
            store
                .update_one(&Filter::eq("Version", "1"), &Update::set("Label", "first"))
                .unwrap();
            store.delete_many(&Filter::eq("Version", "2")).unwrap();
            store.sync().unwrap();
        }

        let mut store = FileDocumentStore::open(&path).unwrap();
        let docs = store.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].order(), first_order);
        assert_eq!(docs[0].get_str("Label"), Some("first"));

        let next = store.insert(Fields::new()).unwrap();
        assert!(next > first_order.next());
    }

    #[test]
    fn file_torn_tail_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.jsonl");
        {
            let mut store = FileDocumentStore::open(&path).unwrap();
            store.insert(fields(json!({"n": 1}))).unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"{\"op\":\"insert\",\"ord").unwrap();
        }

        let mut store = FileDocumentStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);

        store.insert(fields(json!({"n": 2}))).unwrap();
        drop(store);
        let store = FileDocumentStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn file_torn_tail_inside_multibyte_character_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.jsonl");
        {
            let mut store = FileDocumentStore::open(&path).unwrap();
            store
                .insert(fields(json!({"SchemaType": "ModelState", "Description": "café"})))
                .unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"{\"op\":\"insert\",\"order\":7,\"fields\":{\"Description\":\"caf\xC3")
                .unwrap();
        }

        let mut store = FileDocumentStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.documents()[0].get_str("Description"), Some("café"));

        store.insert(fields(json!({"Description": "naïve"}))).unwrap();
        drop(store);
        let store = FileDocumentStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn file_invalid_utf8_in_the_middle_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.jsonl");
        {
            let mut file = File::create(&path).unwrap();
            file.write_all(b"{\"op\":\"delete\",\"orders\":[\xFF]}\n").unwrap();
            file.write_all(b"{\"op\":\"delete\",\"orders\":[]}\n").unwrap();
        }

        let result = FileDocumentStore::open(&path);
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn file_corruption_in_the_middle_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.jsonl");
        {
            let mut store = FileDocumentStore::open(&path).unwrap();
            store.insert(fields(json!({"n": 1}))).unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"garbage\n").unwrap();
        }
        {
            let mut store = FileDocumentStore::open(&path).unwrap();
            store.insert(fields(json!({"n": 2}))).unwrap();
        }

        let result = FileDocumentStore::open(&path);
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn file_open_with_create_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("project.jsonl");

        let store = FileDocumentStore::open_with_create_dirs(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn file_update_many_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("project.jsonl");
        {
            let mut store = FileDocumentStore::open(&path).unwrap();
            for v in ["1", "2", "3"] {
                store
                    .insert(fields(json!({"SchemaType": "ModelStateInactive", "Version": v})))
                    .unwrap();
            }
            let changed = store
                .update_many(
                    &Filter::eq("SchemaType", "ModelStateInactive"),
                    &Update::set("SchemaType", "ModelState"),
                )
                .unwrap();
            assert_eq!(changed, 3);
        }

        let store = FileDocumentStore::open(&path).unwrap();
        assert_eq!(store.count(&Filter::eq("SchemaType", "ModelState")).unwrap(), 3);
    }
}
