//! SpaceDb - one redb database file per space
//!
//! Layout inside the database:
//! - `col/<name>`: document table, id → JSON bytes
//! - `idx/<name>/<field>`: index table, `<value>\0<id>` → id
//!
//! Documents are JSON objects with a mandatory string `id` field. The index
//! table is maintained on every upsert/delete of an indexed collection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;
use thiserror::Error;

/// Errors from the embedded database layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("document has no string `id` field")]
    MissingId,

    #[error("stored document is not valid JSON: {0}")]
    CorruptDocument(#[from] serde_json::Error),
}

impl StoreError {
    /// True for the dedicated absent-document kind, so callers can convert
    /// a miss into "absent" without treating it as an error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// An open per-space embedded database.
pub struct SpaceDb {
    db: Arc<Database>,
    path: PathBuf,
}

impl SpaceDb {
    /// Create or open the database at `path`, creating parent directories
    /// (mode 0700 on Unix) as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                let mut builder = std::fs::DirBuilder::new();
                builder.recursive(true);
                #[cfg(unix)]
                {
                    use std::os::unix::fs::DirBuilderExt;
                    builder.mode(0o700);
                }
                builder.create(parent)?;
            }
        }

        let db = Database::create(&path)?;
        Ok(Self { db: Arc::new(db), path })
    }

    /// Filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get or create a collection.
    pub fn collection(&self, name: &str) -> Collection {
        Collection {
            db: self.db.clone(),
            name: name.to_string(),
            indexed_field: None,
        }
    }

    /// Get or create a collection with a secondary index on `field`.
    ///
    /// The indexed field must hold a string value in every document that
    /// should be findable through the index.
    pub fn collection_indexed(&self, name: &str, field: &str) -> Collection {
        Collection {
            db: self.db.clone(),
            name: name.to_string(),
            indexed_field: Some(field.to_string()),
        }
    }

    /// Flush and release. redb commits durably per transaction, so this only
    /// exists to give callers an explicit, idempotent close point.
    pub fn close(&self) -> Result<(), StoreError> {
        tracing::debug!(path = %self.path.display(), "closing space database");
        Ok(())
    }
}

/// A named collection of JSON documents inside a [`SpaceDb`].
#[derive(Clone)]
pub struct Collection {
    db: Arc<Database>,
    name: String,
    indexed_field: Option<String>,
}

impl Collection {
    fn docs_table(&self) -> String {
        format!("col/{}", self.name)
    }

    fn index_table(&self) -> Option<String> {
        self.indexed_field
            .as_ref()
            .map(|f| format!("idx/{}/{}", self.name, f))
    }

    fn index_key(value: &str, id: &str) -> String {
        format!("{}\0{}", value, id)
    }

    fn indexed_value(&self, doc: &Value) -> Option<String> {
        let field = self.indexed_field.as_ref()?;
        doc.get(field).and_then(Value::as_str).map(str::to_string)
    }

    /// Insert or replace a document. The document must carry a string `id`.
    pub fn upsert(&self, doc: &Value) -> Result<(), StoreError> {
        let id = doc
            .get("id")
            .and_then(Value::as_str)
            .ok_or(StoreError::MissingId)?
            .to_string();
        let bytes = serde_json::to_vec(doc)?;

        let docs_name = self.docs_table();
        let docs_def = TableDefinition::<&str, &[u8]>::new(&docs_name);
        let idx_name = self.index_table();

        let txn = self.db.begin_write()?;
        {
            let mut docs = txn.open_table(docs_def)?;

            // Drop the stale index entry if the indexed value changes.
            if let Some(idx_name) = &idx_name {
                let idx_def = TableDefinition::<&str, &str>::new(idx_name);
                let mut idx = txn.open_table(idx_def)?;

                let old_value = match docs.get(id.as_str())? {
                    Some(existing) => {
                        let old: Value = serde_json::from_slice(existing.value())?;
                        self.indexed_value(&old)
                    }
                    None => None,
                };
                if let Some(old_value) = old_value {
                    idx.remove(Self::index_key(&old_value, &id).as_str())?;
                }
                if let Some(new_value) = self.indexed_value(doc) {
                    idx.insert(Self::index_key(&new_value, &id).as_str(), id.as_str())?;
                }
            }

            docs.insert(id.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Fetch a document by id. Returns the dedicated `NotFound` kind when the
    /// document is absent.
    pub fn find_by_id(&self, id: &str) -> Result<Value, StoreError> {
        let docs_name = self.docs_table();
        let docs_def = TableDefinition::<&str, &[u8]>::new(&docs_name);

        let txn = self.db.begin_read()?;
        let docs = match txn.open_table(docs_def) {
            Ok(t) => t,
            // The table is only created on first write.
            Err(redb::TableError::TableDoesNotExist(_)) => {
                return Err(StoreError::NotFound {
                    collection: self.name.clone(),
                    id: id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        match docs.get(id)? {
            Some(bytes) => Ok(serde_json::from_slice(bytes.value())?),
            None => Err(StoreError::NotFound {
                collection: self.name.clone(),
                id: id.to_string(),
            }),
        }
    }

    /// Remove a document by id. Returns whether it existed.
    pub fn delete_by_id(&self, id: &str) -> Result<bool, StoreError> {
        let docs_name = self.docs_table();
        let docs_def = TableDefinition::<&str, &[u8]>::new(&docs_name);
        let idx_name = self.index_table();

        let txn = self.db.begin_write()?;
        let existed;
        {
            let mut docs = txn.open_table(docs_def)?;

            let old_value = match docs.get(id)? {
                Some(existing) => {
                    let old: Value = serde_json::from_slice(existing.value())?;
                    self.indexed_value(&old)
                }
                None => None,
            };

            existed = docs.remove(id)?.is_some();

            if let (Some(idx_name), Some(old_value)) = (&idx_name, old_value) {
                let idx_def = TableDefinition::<&str, &str>::new(idx_name);
                let mut idx = txn.open_table(idx_def)?;
                idx.remove(Self::index_key(&old_value, id).as_str())?;
            }
        }
        txn.commit()?;
        Ok(existed)
    }

    /// Snapshot of every document in the collection, in id order.
    pub fn iterate(&self) -> Result<Vec<Value>, StoreError> {
        let docs_name = self.docs_table();
        let docs_def = TableDefinition::<&str, &[u8]>::new(&docs_name);

        let txn = self.db.begin_read()?;
        let docs = match txn.open_table(docs_def) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        for entry in docs.iter()? {
            let (_, bytes) = entry?;
            out.push(serde_json::from_slice(bytes.value())?);
        }
        Ok(out)
    }

    /// All documents whose indexed field equals `value`, in id order.
    ///
    /// Only meaningful for collections created with `collection_indexed`;
    /// returns empty otherwise.
    pub fn find_by_index(&self, value: &str) -> Result<Vec<Value>, StoreError> {
        let idx_name = match self.index_table() {
            Some(n) => n,
            None => return Ok(Vec::new()),
        };
        let idx_def = TableDefinition::<&str, &str>::new(&idx_name);
        let docs_name = self.docs_table();
        let docs_def = TableDefinition::<&str, &[u8]>::new(&docs_name);

        let txn = self.db.begin_read()?;
        let idx = match txn.open_table(idx_def) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let docs = match txn.open_table(docs_def) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        // Keys are `<value>\0<id>`; ids are ASCII hex, so `\x01` upper-bounds
        // the prefix range.
        let start = format!("{}\0", value);
        let end = format!("{}\x01", value);

        let mut out = Vec::new();
        for entry in idx.range(start.as_str()..end.as_str())? {
            let (_, id) = entry?;
            if let Some(bytes) = docs.get(id.value())? {
                out.push(serde_json::from_slice(bytes.value())?);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open_db() -> (tempfile::TempDir, SpaceDb) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let db = SpaceDb::open(tmp.path().join("spaces").join("test.db")).unwrap();
        (tmp, db)
    }

    #[test]
    fn test_upsert_and_find() {
        let (_tmp, db) = open_db();
        let col = db.collection("documents");

        col.upsert(&json!({"id": "a", "title": "first"})).unwrap();
        let doc = col.find_by_id("a").unwrap();
        assert_eq!(doc["title"], "first");

        col.upsert(&json!({"id": "a", "title": "second"})).unwrap();
        let doc = col.find_by_id("a").unwrap();
        assert_eq!(doc["title"], "second");
    }

    #[test]
    fn test_find_missing_is_not_found() {
        let (_tmp, db) = open_db();
        let col = db.collection("documents");
        let err = col.find_by_id("missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_upsert_without_id_rejected() {
        let (_tmp, db) = open_db();
        let col = db.collection("documents");
        let err = col.upsert(&json!({"title": "no id"})).unwrap_err();
        assert!(matches!(err, StoreError::MissingId));
    }

    #[test]
    fn test_delete_reports_existence() {
        let (_tmp, db) = open_db();
        let col = db.collection("documents");
        col.upsert(&json!({"id": "a"})).unwrap();

        assert!(col.delete_by_id("a").unwrap());
        assert!(!col.delete_by_id("a").unwrap());
    }

    #[test]
    fn test_iterate_snapshot() {
        let (_tmp, db) = open_db();
        let col = db.collection("documents");
        for i in 0..3 {
            col.upsert(&json!({"id": format!("doc{}", i)})).unwrap();
        }
        let all = col.iterate().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0]["id"], "doc0");
    }

    #[test]
    fn test_index_lookup() {
        let (_tmp, db) = open_db();
        let col = db.collection_indexed("changes", "document_id");

        col.upsert(&json!({"id": "c1", "document_id": "doc-a"})).unwrap();
        col.upsert(&json!({"id": "c2", "document_id": "doc-a"})).unwrap();
        col.upsert(&json!({"id": "c3", "document_id": "doc-b"})).unwrap();

        let hits = col.find_by_index("doc-a").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|d| d["document_id"] == "doc-a"));
    }

    #[test]
    fn test_index_follows_updates_and_deletes() {
        let (_tmp, db) = open_db();
        let col = db.collection_indexed("changes", "document_id");

        col.upsert(&json!({"id": "c1", "document_id": "doc-a"})).unwrap();
        col.upsert(&json!({"id": "c1", "document_id": "doc-b"})).unwrap();
        assert!(col.find_by_index("doc-a").unwrap().is_empty());
        assert_eq!(col.find_by_index("doc-b").unwrap().len(), 1);

        col.delete_by_id("c1").unwrap();
        assert!(col.find_by_index("doc-b").unwrap().is_empty());
    }

    #[test]
    fn test_reopen_preserves_data() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("test.db");
        {
            let db = SpaceDb::open(&path).unwrap();
            db.collection("documents")
                .upsert(&json!({"id": "a", "v": 1}))
                .unwrap();
        }
        let db = SpaceDb::open(&path).unwrap();
        let doc = db.collection("documents").find_by_id("a").unwrap();
        assert_eq!(doc["v"], 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (_tmp, db) = open_db();
        db.close().unwrap();
        db.close().unwrap();
    }
}
