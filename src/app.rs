//! App core for utags-store.
//!
//! Central struct owning storage and every manager and service, replacing
//! the module-level singletons of the original script with an explicit
//! lifecycle: build with [`App::open`], drop to close. Hosts pass the `App`
//! (or its parts) by reference instead of reaching for globals.

use std::sync::Arc;

use crate::database::Storage;
use crate::managers::bookmark_store::BookmarkStore;
use crate::managers::score_ledger::ScoreLedger;
use crate::managers::update_serializer::UpdateSerializer;
use crate::services::availability::AvailabilityProbe;
use crate::services::settings_engine::SettingsEngine;
use crate::services::sync_adapter::SyncAdapter;
use crate::types::errors::StoreError;

/// Version stamped onto the store-level metadata on every mutating save.
pub const EXTENSION_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Central application struct holding storage, managers, and services.
pub struct App {
    pub storage: Arc<Storage>,
    pub store: Arc<BookmarkStore>,
    pub ledger: Arc<ScoreLedger>,
    pub serializer: Arc<UpdateSerializer>,
    pub settings_engine: SettingsEngine,
    pub sync_adapter: SyncAdapter,
}

impl App {
    /// Opens the app against a database file. Runs store migrations before
    /// anything else touches the data.
    ///
    /// # Errors
    /// [`StoreError::NewerSchema`] when the persisted store was written by
    /// a newer build — the host should restart rather than proceed.
    pub fn open(
        db_path: &str,
        own_origin: &str,
        allowed_hosts: Vec<String>,
        probe: Box<dyn AvailabilityProbe>,
    ) -> Result<Self, StoreError> {
        let storage = Arc::new(Storage::open(db_path)?);
        Self::build(storage, own_origin, allowed_hosts, probe)
    }

    /// Opens the app on an in-memory database, for tests.
    pub fn open_in_memory(
        own_origin: &str,
        allowed_hosts: Vec<String>,
        probe: Box<dyn AvailabilityProbe>,
    ) -> Result<Self, StoreError> {
        let storage = Arc::new(Storage::open_in_memory()?);
        Self::build(storage, own_origin, allowed_hosts, probe)
    }

    fn build(
        storage: Arc<Storage>,
        own_origin: &str,
        allowed_hosts: Vec<String>,
        probe: Box<dyn AvailabilityProbe>,
    ) -> Result<Self, StoreError> {
        let ledger = Arc::new(ScoreLedger::new(Arc::clone(&storage)));
        let serializer = Arc::new(UpdateSerializer::new(Arc::clone(&ledger)));
        let store = Arc::new(BookmarkStore::open(
            Arc::clone(&storage),
            Arc::clone(&serializer),
            EXTENSION_VERSION,
        )?);
        let settings_engine = SettingsEngine::new(Arc::clone(&storage));
        let sync_adapter = SyncAdapter::new(
            Arc::clone(&store),
            Arc::clone(&storage),
            probe,
            own_origin,
            allowed_hosts,
        )?;

        Ok(Self {
            storage,
            store,
            ledger,
            serializer,
            settings_engine,
            sync_adapter,
        })
    }
}
