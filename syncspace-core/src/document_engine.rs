//! DocumentEngine - per-document change DAGs and the metadata index
//!
//! Persistence is split: the signed changes and head sets live in the
//! per-space embedded database, while application-facing attributes (title,
//! tags, timestamps) live in a JSON sidecar at `documents/<space-id>.json`.
//! The sidecar is authoritative for those attributes but never for the
//! existence of changes; stale sidecar entries are discarded on the next
//! sidecar write.
//!
//! Collections inside a space database:
//! - `changes` (indexed by `document_id`): `{id, document_id, seq, signed}`
//! - `documents`: `{id, heads, version}`

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::json;
use syncspace_events::{EventBus, EventType};
use syncspace_identity::AccountKeys;
use syncspace_model::{clock, ChangeId, DocumentId, SpaceId};
use syncspace_proto::storage::SignedChange;
use syncspace_store::{SpaceDb, StoreError};
use thiserror::Error;

use crate::change::{build_signed_change, decode_change};
use crate::space_manager::{SpaceError, SpaceManager};

const CHANGES_COLLECTION: &str = "changes";
const DOCUMENTS_COLLECTION: &str = "documents";
const CHANGES_INDEX_FIELD: &str = "document_id";

/// Reserved metadata key: comma-separated tags for the sidecar tag list.
const TAGS_METADATA_KEY: &str = "tags";
/// Reserved metadata key: overrides the stored title on update.
const TITLE_METADATA_KEY: &str = "title";

/// Errors from the document engine.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Space(#[from] SpaceError),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("change error: {0}")]
    Change(#[from] crate::change::ChangeError),

    #[error("corrupt document record: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application-level document metadata, cached in memory and persisted per
/// space in the sidecar file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub document_id: DocumentId,
    pub space_id: SpaceId,
    pub title: String,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The per-document record kept in the `documents` collection.
#[derive(Debug, Serialize, Deserialize)]
struct DocumentRecord {
    id: DocumentId,
    heads: Vec<ChangeId>,
    version: u64,
}

/// Result of a document read: payload plus metadata and version.
#[derive(Debug, Clone)]
pub struct DocumentContent {
    pub data: Vec<u8>,
    pub meta: DocumentMetadata,
    pub version: u64,
}

/// Mediates all document CRUD against the space databases.
pub struct DocumentEngine {
    data_dir: PathBuf,
    keys: AccountKeys,
    spaces: Arc<SpaceManager>,
    events: Arc<EventBus>,
    index: RwLock<HashMap<SpaceId, HashMap<DocumentId, DocumentMetadata>>>,
}

impl DocumentEngine {
    /// Construct the engine and load every known space's sidecar. A missing
    /// sidecar leaves that space's index empty; its DAGs stay intact in the
    /// database.
    pub fn new(
        spaces: Arc<SpaceManager>,
        keys: AccountKeys,
        events: Arc<EventBus>,
    ) -> Result<Self, DocumentError> {
        let data_dir = spaces.data_dir().to_path_buf();
        let mut index = HashMap::new();

        for space in spaces.list() {
            let path = sidecar_path(&data_dir, &space.space_id);
            let entries: HashMap<String, DocumentMetadata> =
                match crate::sidecar::load_json(&path) {
                    Ok(Some(entries)) => entries,
                    Ok(None) => HashMap::new(),
                    Err(e) => {
                        tracing::warn!(
                            space_id = %space.space_id,
                            error = %e,
                            "failed to load document sidecar, starting empty"
                        );
                        HashMap::new()
                    }
                };

            let by_id = entries
                .into_values()
                .map(|meta| (meta.document_id, meta))
                .collect();
            index.insert(space.space_id, by_id);
        }

        Ok(Self {
            data_dir,
            keys,
            spaces,
            events,
            index: RwLock::new(index),
        })
    }

    /// Create a document: persist the signed root change, initialize the
    /// head set, and insert the metadata entry. Returns the document id and
    /// the initial version (1).
    pub fn create(
        &self,
        space_id: &SpaceId,
        title: &str,
        data: &[u8],
        metadata: HashMap<String, String>,
    ) -> Result<(DocumentId, u64), DocumentError> {
        let db = self.spaces.space_db(space_id)?;

        let now = clock::unix_seconds();
        let (root_id, signed) = build_signed_change(&self.keys, space_id, &[], data, false, now);
        let document_id = root_id;

        put_change(&db, &document_id, &root_id, 1, &signed)?;
        put_document_record(
            &db,
            &DocumentRecord { id: document_id, heads: vec![root_id], version: 1 },
        )?;

        let tags = parse_tags(&metadata);
        let meta = DocumentMetadata {
            document_id,
            space_id: *space_id,
            title: title.to_string(),
            tags,
            metadata,
            created_at: now,
            updated_at: now,
        };

        let snapshot = {
            let mut index = self.index.write().expect("document index lock poisoned");
            let entries = index.entry(*space_id).or_default();
            entries.insert(document_id, meta);
            entries.clone()
        };
        self.persist_sidecar(space_id, &db, snapshot);

        let mut payload = HashMap::new();
        payload.insert("document_id".to_string(), document_id.to_hex());
        self.events.emit(EventType::DocumentCreated, &space_id.to_hex(), payload);

        tracing::debug!(space_id = %space_id, document_id = %document_id, "document created");
        Ok((document_id, 1))
    }

    /// Read a document: the payload of the latest head plus the metadata
    /// entry. The latest head is the lexicographically smallest change id in
    /// the head set, which is deterministic across restarts.
    pub fn get(
        &self,
        space_id: &SpaceId,
        document_id: &DocumentId,
    ) -> Result<DocumentContent, DocumentError> {
        let db = self.spaces.space_db(space_id)?;

        let meta = {
            let index = self.index.read().expect("document index lock poisoned");
            index
                .get(space_id)
                .and_then(|entries| entries.get(document_id))
                .cloned()
                .ok_or_else(|| DocumentError::NotFound(document_id.to_hex()))?
        };

        let record = get_document_record(&db, document_id)?
            .ok_or_else(|| DocumentError::NotFound(document_id.to_hex()))?;

        let latest = record
            .heads
            .iter()
            .min()
            .copied()
            .ok_or_else(|| DocumentError::Corrupt(format!("document {} has no heads", document_id)))?;

        let signed = get_change(&db, &latest)?;

        // The payload is the application bytes inside the change; if the
        // envelope does not decode, hand back the raw bytes so older data
        // stays readable.
        let data = match decode_change(&signed) {
            Ok(change) => change.payload,
            Err(_) => signed.change_bytes,
        };

        Ok(DocumentContent { data, meta, version: record.version })
    }

    /// Append a change carrying new content. All current heads become the
    /// parents of the new change, so the head set collapses to one entry.
    /// Returns the new version.
    pub fn update(
        &self,
        space_id: &SpaceId,
        document_id: &DocumentId,
        data: &[u8],
        metadata: Option<HashMap<String, String>>,
    ) -> Result<u64, DocumentError> {
        let db = self.spaces.space_db(space_id)?;

        // Serialize concurrent updates to the same document: heads are read
        // and advanced under the index writer lock.
        let (snapshot, version) = {
            let mut index = self.index.write().expect("document index lock poisoned");
            let entries = index
                .get_mut(space_id)
                .ok_or_else(|| DocumentError::NotFound(document_id.to_hex()))?;
            let meta = entries
                .get_mut(document_id)
                .ok_or_else(|| DocumentError::NotFound(document_id.to_hex()))?;

            let record = get_document_record(&db, document_id)?
                .ok_or_else(|| DocumentError::NotFound(document_id.to_hex()))?;

            let now = clock::unix_seconds();
            let (change_id, signed) =
                build_signed_change(&self.keys, space_id, &record.heads, data, false, now);

            let version = record.version + 1;
            put_change(&db, document_id, &change_id, version, &signed)?;
            put_document_record(
                &db,
                &DocumentRecord { id: *document_id, heads: vec![change_id], version },
            )?;

            meta.updated_at = now;
            if let Some(new_metadata) = metadata {
                if let Some(title) = new_metadata.get(TITLE_METADATA_KEY) {
                    meta.title = title.clone();
                }
                meta.tags = parse_tags(&new_metadata);
                // Full replacement; the application controls what is kept.
                meta.metadata = new_metadata;
            }

            (entries.clone(), version)
        };
        self.persist_sidecar(space_id, &db, snapshot);

        let mut payload = HashMap::new();
        payload.insert("document_id".to_string(), document_id.to_hex());
        self.events.emit(EventType::DocumentUpdated, &space_id.to_hex(), payload);

        tracing::debug!(space_id = %space_id, document_id = %document_id, version, "document updated");
        Ok(version)
    }

    /// Remove a document's changes and its metadata entry. Deleting a
    /// missing document is an error at this level; the handler layer decides
    /// how to surface it.
    pub fn delete(
        &self,
        space_id: &SpaceId,
        document_id: &DocumentId,
    ) -> Result<(), DocumentError> {
        let db = self.spaces.space_db(space_id)?;

        let snapshot = {
            let mut index = self.index.write().expect("document index lock poisoned");
            let entries = index
                .get_mut(space_id)
                .ok_or_else(|| DocumentError::NotFound(document_id.to_hex()))?;
            if !entries.contains_key(document_id) {
                return Err(DocumentError::NotFound(document_id.to_hex()));
            }

            let collection = db.collection_indexed(CHANGES_COLLECTION, CHANGES_INDEX_FIELD);
            for change in collection.find_by_index(&document_id.to_hex())? {
                if let Some(id) = change.get("id").and_then(serde_json::Value::as_str) {
                    collection.delete_by_id(id)?;
                }
            }
            db.collection(DOCUMENTS_COLLECTION).delete_by_id(&document_id.to_hex())?;

            entries.remove(document_id);
            entries.clone()
        };
        self.persist_sidecar(space_id, &db, snapshot);

        let mut payload = HashMap::new();
        payload.insert("document_id".to_string(), document_id.to_hex());
        self.events.emit(EventType::DocumentDeleted, &space_id.to_hex(), payload);

        tracing::debug!(space_id = %space_id, document_id = %document_id, "document deleted");
        Ok(())
    }

    /// Whether a document currently exists in the metadata index.
    pub fn exists(&self, space_id: &SpaceId, document_id: &DocumentId) -> bool {
        self.index
            .read()
            .expect("document index lock poisoned")
            .get(space_id)
            .map(|entries| entries.contains_key(document_id))
            .unwrap_or(false)
    }

    /// Snapshot of all document metadata in a space.
    pub fn list(&self, space_id: &SpaceId) -> Result<Vec<DocumentMetadata>, DocumentError> {
        // The space must exist even when it holds no documents.
        self.spaces.get(space_id)?;

        let index = self.index.read().expect("document index lock poisoned");
        Ok(index
            .get(space_id)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Documents whose tag list contains every element of `tags`. An empty
    /// query lists everything.
    pub fn query(
        &self,
        space_id: &SpaceId,
        tags: &[String],
    ) -> Result<Vec<DocumentMetadata>, DocumentError> {
        let all = self.list(space_id)?;
        if tags.is_empty() {
            return Ok(all);
        }
        Ok(all
            .into_iter()
            .filter(|meta| tags.iter().all(|t| meta.tags.contains(t)))
            .collect())
    }

    /// Current version of every document in a space, read from the document
    /// records in one pass. Used by the handler layer to decorate listings.
    pub fn versions(&self, space_id: &SpaceId) -> Result<HashMap<DocumentId, u64>, DocumentError> {
        let db = self.spaces.space_db(space_id)?;
        let mut out = HashMap::new();
        for value in db.collection(DOCUMENTS_COLLECTION).iterate()? {
            let record: DocumentRecord = serde_json::from_value(value)
                .map_err(|e| DocumentError::Corrupt(e.to_string()))?;
            out.insert(record.id, record.version);
        }
        Ok(out)
    }

    /// Count of changes stored for a document. Used by tests and the future
    /// sync layer.
    pub fn change_count(
        &self,
        space_id: &SpaceId,
        document_id: &DocumentId,
    ) -> Result<usize, DocumentError> {
        let db = self.spaces.space_db(space_id)?;
        Ok(db
            .collection_indexed(CHANGES_COLLECTION, CHANGES_INDEX_FIELD)
            .find_by_index(&document_id.to_hex())?
            .len())
    }

    /// Drop the in-memory metadata index.
    pub fn close(&self) {
        self.index.write().expect("document index lock poisoned").clear();
    }

    /// Write the sidecar for a space, discarding entries whose document
    /// record no longer exists in the database (repair by truth from the
    /// DAG). Sidecar failures are logged, never propagated: the database
    /// mutation already committed and the sidecar can be rebuilt.
    fn persist_sidecar(
        &self,
        space_id: &SpaceId,
        db: &SpaceDb,
        mut entries: HashMap<DocumentId, DocumentMetadata>,
    ) {
        entries.retain(|document_id, _| {
            matches!(get_document_record(db, document_id), Ok(Some(_)))
        });

        let by_hex: HashMap<String, &DocumentMetadata> =
            entries.iter().map(|(id, meta)| (id.to_hex(), meta)).collect();

        let path = sidecar_path(&self.data_dir, space_id);
        if let Some(parent) = path.parent() {
            let mut builder = std::fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(0o700);
            }
            if let Err(e) = builder.create(parent) {
                if e.kind() != std::io::ErrorKind::AlreadyExists {
                    tracing::warn!(space_id = %space_id, error = %e, "failed to create documents dir");
                    return;
                }
            }
        }

        if let Err(e) = crate::sidecar::store_json(&path, &by_hex, 0o644) {
            tracing::warn!(space_id = %space_id, error = %e, "failed to persist document sidecar");
        }
    }
}

fn sidecar_path(data_dir: &std::path::Path, space_id: &SpaceId) -> PathBuf {
    data_dir.join("documents").join(format!("{}.json", space_id.to_hex()))
}

fn put_change(
    db: &SpaceDb,
    document_id: &DocumentId,
    change_id: &ChangeId,
    seq: u64,
    signed: &SignedChange,
) -> Result<(), DocumentError> {
    db.collection_indexed(CHANGES_COLLECTION, CHANGES_INDEX_FIELD)
        .upsert(&json!({
            "id": change_id.to_hex(),
            "document_id": document_id.to_hex(),
            "seq": seq,
            "signed": hex::encode(signed.encode_to_vec()),
        }))?;
    Ok(())
}

fn get_change(db: &SpaceDb, change_id: &ChangeId) -> Result<SignedChange, DocumentError> {
    let doc = db
        .collection_indexed(CHANGES_COLLECTION, CHANGES_INDEX_FIELD)
        .find_by_id(&change_id.to_hex())?;
    let signed_hex = doc
        .get("signed")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| DocumentError::Corrupt(format!("change {} missing signed bytes", change_id)))?;
    let bytes = hex::decode(signed_hex)
        .map_err(|_| DocumentError::Corrupt(format!("change {} has invalid hex", change_id)))?;
    SignedChange::decode(&bytes[..])
        .map_err(|e| DocumentError::Corrupt(format!("change {}: {}", change_id, e)))
}

fn put_document_record(db: &SpaceDb, record: &DocumentRecord) -> Result<(), DocumentError> {
    let value = serde_json::to_value(record)
        .map_err(|e| DocumentError::Corrupt(e.to_string()))?;
    db.collection(DOCUMENTS_COLLECTION).upsert(&value)?;
    Ok(())
}

fn get_document_record(
    db: &SpaceDb,
    document_id: &DocumentId,
) -> Result<Option<DocumentRecord>, DocumentError> {
    match db.collection(DOCUMENTS_COLLECTION).find_by_id(&document_id.to_hex()) {
        Ok(value) => {
            let record = serde_json::from_value(value)
                .map_err(|e| DocumentError::Corrupt(e.to_string()))?;
            Ok(Some(record))
        }
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_tags(metadata: &HashMap<String, String>) -> Vec<String> {
    metadata
        .get(TAGS_METADATA_KEY)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
