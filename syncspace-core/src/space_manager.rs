//! SpaceManager - space lifecycle and per-space storage
//!
//! Layout under the data directory:
//! - `spaces_metadata.json` — authoritative application-level space attributes
//! - `spaces/<space-id>.db` — per-space embedded database
//!
//! The space id is the content hash of the signed space-create payload, so
//! two creations with the same name still produce distinct spaces (fresh
//! master key material goes into every payload).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use prost::Message;
use serde::{Deserialize, Serialize};
use syncspace_events::{EventBus, EventType};
use syncspace_identity::AccountKeys;
use syncspace_model::{clock, crypto, SpaceId};
use syncspace_proto::storage::{SignedSpaceCreatePayload, SpaceCreatePayload};
use syncspace_store::{SpaceDb, StoreError};
use thiserror::Error;

/// Space type identifier stamped into every create payload.
const SPACE_TYPE: &str = "syncspace";

/// Current create-payload encoding version.
const SPACE_PAYLOAD_VERSION: u32 = 1;

/// Domain separation for sealing the space read key.
const READ_KEY_WRAP_CONTEXT: &str = "syncspace space read key v1";

/// Reserved collection holding the signed create payload inside a space DB.
const SPACE_COLLECTION: &str = "space";
const SPACE_HEADER_ID: &str = "header";

/// Errors from space management.
#[derive(Debug, Error)]
pub enum SpaceError {
    #[error("space not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] syncspace_model::CryptoError),
}

/// Application-level space metadata, persisted in `spaces_metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceMetadata {
    pub space_id: SpaceId,
    pub name: String,
    pub metadata: HashMap<String, String>,
    pub created_at: i64,
    pub updated_at: i64,
}

struct Inner {
    spaces: Vec<SpaceMetadata>,
    dbs: HashMap<SpaceId, Arc<SpaceDb>>,
}

/// Creates, opens, lists, and deletes spaces.
pub struct SpaceManager {
    data_dir: PathBuf,
    keys: AccountKeys,
    events: Arc<EventBus>,
    inner: RwLock<Inner>,
}

impl SpaceManager {
    /// Construct the manager, creating `spaces/` and loading the metadata
    /// sidecar if present.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        keys: AccountKeys,
        events: Arc<EventBus>,
    ) -> Result<Self, SpaceError> {
        let data_dir = data_dir.into();

        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(data_dir.join("spaces"))?;

        let spaces: Vec<SpaceMetadata> =
            crate::sidecar::load_json(&data_dir.join("spaces_metadata.json"))?.unwrap_or_default();

        tracing::debug!(count = spaces.len(), "loaded space metadata");

        Ok(Self {
            data_dir,
            keys,
            events,
            inner: RwLock::new(Inner { spaces, dbs: HashMap::new() }),
        })
    }

    /// Data directory this manager was opened with.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn db_path(&self, space_id: &SpaceId) -> PathBuf {
        self.data_dir.join("spaces").join(format!("{}.db", space_id.to_hex()))
    }

    fn documents_sidecar_path(&self, space_id: &SpaceId) -> PathBuf {
        self.data_dir.join("documents").join(format!("{}.json", space_id.to_hex()))
    }

    fn save_metadata(&self, spaces: &[SpaceMetadata]) -> Result<(), SpaceError> {
        crate::sidecar::store_json(&self.data_dir.join("spaces_metadata.json"), &spaces, 0o600)?;
        Ok(())
    }

    /// Create a space and open its database.
    ///
    /// `reference_name` is the caller-side handle used only for logging;
    /// `name` is the display name persisted in the sidecar.
    pub fn create(
        &self,
        reference_name: &str,
        name: &str,
        metadata: HashMap<String, String>,
    ) -> Result<SpaceId, SpaceError> {
        // Fresh key material per space. The master and metadata keys will
        // carry space-level authority once sync ships; today they make the
        // create payload globally unique.
        let master_key = crypto::generate_signing_key();
        let metadata_key = crypto::generate_signing_key();
        let read_key = crypto::generate_secret();
        let wrap = self.keys.derive_wrap_key(READ_KEY_WRAP_CONTEXT);
        let sealed_read_key = crypto::seal(&wrap, &read_key)?;

        let payload = SpaceCreatePayload {
            version: SPACE_PAYLOAD_VERSION,
            space_type: SPACE_TYPE.to_string(),
            timestamp: clock::unix_seconds(),
            owner: self.keys.account_id().as_bytes().to_vec(),
            master_pub: crypto::public_key(&master_key).as_bytes().to_vec(),
            metadata_pub: crypto::public_key(&metadata_key).as_bytes().to_vec(),
            sealed_read_key,
        };
        let payload_bytes = payload.encode_to_vec();
        let signature = self.keys.sign(&payload_bytes);
        let signed = SignedSpaceCreatePayload {
            payload_bytes,
            signature: signature.as_bytes().to_vec(),
        };
        let signed_bytes = signed.encode_to_vec();
        let space_id = crypto::content_hash(&signed_bytes);

        tracing::info!(space_id = %space_id, reference_name, name, "creating space");

        let db = Arc::new(SpaceDb::open(self.db_path(&space_id))?);

        // Everything after DB allocation rolls back on failure.
        let result = (|| -> Result<(), SpaceError> {
            db.collection(SPACE_COLLECTION).upsert(&serde_json::json!({
                "id": SPACE_HEADER_ID,
                "payload": hex::encode(&signed_bytes),
            }))?;

            let now = clock::unix_seconds();
            let meta = SpaceMetadata {
                space_id,
                name: name.to_string(),
                metadata,
                created_at: now,
                updated_at: now,
            };

            let mut inner = self.inner.write().expect("space manager lock poisoned");
            inner.spaces.push(meta);
            if let Err(e) = self.save_metadata(&inner.spaces) {
                inner.spaces.pop();
                return Err(e);
            }
            inner.dbs.insert(space_id, db.clone());
            Ok(())
        })();

        if let Err(e) = result {
            tracing::warn!(space_id = %space_id, error = %e, "space creation failed, rolling back");
            let _ = db.close();
            let _ = std::fs::remove_file(self.db_path(&space_id));
            return Err(e);
        }

        let mut payload = HashMap::new();
        payload.insert("space_id".to_string(), space_id.to_hex());
        payload.insert("name".to_string(), name.to_string());
        self.events.emit(EventType::SpaceCreated, &space_id.to_hex(), payload);

        Ok(space_id)
    }

    /// Snapshot of all space metadata.
    pub fn list(&self) -> Vec<SpaceMetadata> {
        self.inner
            .read()
            .expect("space manager lock poisoned")
            .spaces
            .clone()
    }

    /// Metadata of one space.
    pub fn get(&self, space_id: &SpaceId) -> Result<SpaceMetadata, SpaceError> {
        self.inner
            .read()
            .expect("space manager lock poisoned")
            .spaces
            .iter()
            .find(|s| s.space_id == *space_id)
            .cloned()
            .ok_or_else(|| SpaceError::NotFound(space_id.to_hex()))
    }

    /// The open database handle for a space, opening it on first use.
    /// Databases are opened at most once per process.
    pub fn space_db(&self, space_id: &SpaceId) -> Result<Arc<SpaceDb>, SpaceError> {
        {
            let inner = self.inner.read().expect("space manager lock poisoned");
            if !inner.spaces.iter().any(|s| s.space_id == *space_id) {
                return Err(SpaceError::NotFound(space_id.to_hex()));
            }
            if let Some(db) = inner.dbs.get(space_id) {
                return Ok(db.clone());
            }
        }

        let mut inner = self.inner.write().expect("space manager lock poisoned");
        // Another caller may have opened it between the locks.
        if let Some(db) = inner.dbs.get(space_id) {
            return Ok(db.clone());
        }
        let db = Arc::new(SpaceDb::open(self.db_path(space_id))?);
        inner.dbs.insert(*space_id, db.clone());
        Ok(db)
    }

    /// Delete a space: close its database, remove the database file and the
    /// document sidecar, and drop the metadata entry.
    pub fn delete(&self, space_id: &SpaceId) -> Result<(), SpaceError> {
        {
            let mut inner = self.inner.write().expect("space manager lock poisoned");

            let position = inner
                .spaces
                .iter()
                .position(|s| s.space_id == *space_id)
                .ok_or_else(|| SpaceError::NotFound(space_id.to_hex()))?;

            if let Some(db) = inner.dbs.remove(space_id) {
                // A partially initialized space may fail to close; deletion
                // proceeds regardless.
                if let Err(e) = db.close() {
                    tracing::warn!(space_id = %space_id, error = %e, "error closing space before delete");
                }
            }

            remove_with_prefix(&self.data_dir.join("spaces"), &format!("{}.db", space_id.to_hex()))?;
            let _ = std::fs::remove_file(self.documents_sidecar_path(space_id));

            let removed = inner.spaces.remove(position);
            if let Err(e) = self.save_metadata(&inner.spaces) {
                inner.spaces.insert(position, removed);
                return Err(e);
            }
        }

        let mut payload = HashMap::new();
        payload.insert("space_id".to_string(), space_id.to_hex());
        self.events.emit(EventType::SpaceDeleted, &space_id.to_hex(), payload);

        tracing::info!(space_id = %space_id, "space deleted");
        Ok(())
    }

    /// Close all open space databases, tolerating per-space failures.
    pub fn close(&self) {
        let mut inner = self.inner.write().expect("space manager lock poisoned");
        for (space_id, db) in inner.dbs.drain() {
            if let Err(e) = db.close() {
                tracing::warn!(space_id = %space_id, error = %e, "error closing space");
            }
        }
    }
}

/// Remove `<base>/<name>` plus any ancillary files sharing the name prefix
/// (e.g. journals the storage engine may leave next to the database).
fn remove_with_prefix(base: &Path, name: &str) -> std::io::Result<()> {
    for entry in std::fs::read_dir(base)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with(name) {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}
