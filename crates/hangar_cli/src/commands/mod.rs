//! CLI command implementations.

pub mod migrate;
pub mod queue;
pub mod sync;

use hangar_storage::{FileStore, LocalStore};
use hangar_sync_engine::{
    ManualConnectivity, MigrationConfig, StoreRemote, SyncConfig, SyncResult, SyncService,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A client store wired to its mirror remote.
pub struct Client {
    /// The local store holding the tables and the queue.
    pub store: Arc<dyn LocalStore>,
    /// The sync facade.
    pub service: SyncService,
}

impl Client {
    /// Opens both stores and the service over them.
    pub fn open(path: &Path, remote: &Path, online: bool, config: SyncConfig) -> SyncResult<Self> {
        debug!(path = %path.display(), remote = %remote.display(), online, "opening client");
        let store: Arc<dyn LocalStore> = Arc::new(FileStore::open(path)?);
        let mirror: Arc<dyn LocalStore> = Arc::new(FileStore::open(remote)?);

        let service = SyncService::open(
            store.clone(),
            Arc::new(StoreRemote::new(mirror)),
            Arc::new(ManualConnectivity::new(online)),
            config,
            MigrationConfig::default(),
        )?;
        Ok(Self { store, service })
    }
}

/// Returns `<path>-remote`, next to the client store.
pub fn default_remote_dir(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "hangar".into());
    name.push("-remote");
    path.with_file_name(name)
}
