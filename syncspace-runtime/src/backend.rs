//! Backend - the process-wide lifecycle controller
//!
//! One state machine: `Uninitialized → Initialized → Uninitialized`. Init
//! builds the components in dependency order (identity, events, spaces,
//! documents) and stores them as one owned aggregate; Shutdown closes them
//! in reverse order and clears the key material. No component leaks outside
//! this controller except through [`WorldView`] snapshots.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use syncspace_core::{DocumentEngine, SpaceManager};
use syncspace_events::EventBus;
use syncspace_identity::AccountManager;
use syncspace_model::PubKey;

use crate::error::CommandError;

struct World {
    data_dir: PathBuf,
    #[allow(dead_code)]
    network_id: String,
    #[allow(dead_code)]
    device_id_hint: String,
    #[allow(dead_code)]
    config: HashMap<String, String>,
    account: AccountManager,
    events: Arc<EventBus>,
    spaces: Arc<SpaceManager>,
    documents: Arc<DocumentEngine>,
}

/// Cheap snapshot of the initialized world handed to handlers. Holding a
/// view does not pin the lifecycle lock.
#[derive(Clone)]
pub struct WorldView {
    pub data_dir: PathBuf,
    pub account_id: PubKey,
    pub device_id: PubKey,
    pub events: Arc<EventBus>,
    pub spaces: Arc<SpaceManager>,
    pub documents: Arc<DocumentEngine>,
}

/// The process-wide lifecycle controller.
pub struct Backend {
    state: RwLock<Option<World>>,
}

impl Backend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { state: RwLock::new(None) })
    }

    /// Initialize the backend against a data directory.
    ///
    /// Idempotent for the same directory; initializing against a different
    /// directory while initialized is `AlreadyInitialized`. Any failure
    /// leaves the controller uninitialized with partial components closed.
    pub fn init(
        &self,
        data_dir: impl Into<PathBuf>,
        network_id: String,
        device_id_hint: String,
        config: HashMap<String, String>,
    ) -> Result<(), CommandError> {
        let data_dir = data_dir.into();
        if data_dir.as_os_str().is_empty() {
            return Err(CommandError::BadRequest("data_dir is required".to_string()));
        }

        let mut state = self.state.write().expect("backend lock poisoned");
        if let Some(world) = state.as_ref() {
            if world.data_dir == data_dir {
                tracing::debug!(data_dir = %data_dir.display(), "already initialized");
                return Ok(());
            }
            return Err(CommandError::AlreadyInitialized);
        }

        let mut account = AccountManager::new(&data_dir);
        if account.keys_exist() {
            account.load()?;
        } else {
            account.generate();
            account.store()?;
        }
        let keys = account
            .keys()
            .ok_or_else(|| CommandError::Internal("keys not loaded after init".to_string()))?
            .clone();

        let events = Arc::new(EventBus::new());

        let spaces = match SpaceManager::new(&data_dir, keys.clone(), events.clone()) {
            Ok(spaces) => Arc::new(spaces),
            Err(e) => {
                events.close();
                account.clear();
                return Err(e.into());
            }
        };

        let documents = match DocumentEngine::new(spaces.clone(), keys, events.clone()) {
            Ok(documents) => Arc::new(documents),
            Err(e) => {
                spaces.close();
                events.close();
                account.clear();
                return Err(e.into());
            }
        };

        tracing::info!(
            data_dir = %data_dir.display(),
            account_id = %account.keys().map(|k| k.account_id().to_hex()).unwrap_or_default(),
            device_id_hint,
            "backend initialized"
        );

        *state = Some(World {
            data_dir,
            network_id,
            device_id_hint,
            config,
            account,
            events,
            spaces,
            documents,
        });
        Ok(())
    }

    /// Shut down: close documents, spaces, and events in order, tolerating
    /// individual failures, then clear the in-memory keys.
    pub fn shutdown(&self) -> Result<(), CommandError> {
        let mut state = self.state.write().expect("backend lock poisoned");
        let mut world = state.take().ok_or(CommandError::NotInitialized)?;

        world.documents.close();
        world.spaces.close();
        world.events.close();
        world.account.clear();

        tracing::info!("backend shut down");
        Ok(())
    }

    /// Whether the backend is currently initialized.
    pub fn is_initialized(&self) -> bool {
        self.state.read().expect("backend lock poisoned").is_some()
    }

    /// Snapshot of the initialized world, or `NotInitialized`.
    pub fn view(&self) -> Result<WorldView, CommandError> {
        let state = self.state.read().expect("backend lock poisoned");
        let world = state.as_ref().ok_or(CommandError::NotInitialized)?;
        let keys = world
            .account
            .keys()
            .ok_or_else(|| CommandError::Internal("initialized without keys".to_string()))?;
        Ok(WorldView {
            data_dir: world.data_dir.clone(),
            account_id: keys.account_id(),
            device_id: keys.device_id(),
            events: world.events.clone(),
            spaces: world.spaces.clone(),
            documents: world.documents.clone(),
        })
    }
}
