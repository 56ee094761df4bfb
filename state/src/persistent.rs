//! Persistent state store using sled database

use async_trait::async_trait;
use ballot_core::{
    BallotError, BallotResult, StateChange, StateMutator, StateProvider, StateVersion,
};
use parking_lot::RwLock;
use sled::transaction::{TransactionError, TransactionResult, Transactional};
use sled::{Db, Tree};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::store::{StateEntry, StateStore};

const STATE_TREE: &str = "state";
const META_TREE: &str = "meta";
const VERSION_KEY: &[u8] = b"version";

fn storage_err(e: sled::Error) -> BallotError {
    BallotError::StorageError(e.to_string())
}

/// Persistent state store backed by sled database
pub struct SledStateStore {
    db: Db,
    state: Tree,
    meta: Tree,
    version: RwLock<StateVersion>,
}

impl SledStateStore {
    pub fn open<P: AsRef<Path>>(path: P) -> BallotResult<Self> {
        let db = sled::open(path).map_err(storage_err)?;
        let state = db.open_tree(STATE_TREE).map_err(storage_err)?;
        let meta = db.open_tree(META_TREE).map_err(storage_err)?;

        // Load version from disk or start at 0
        let version = match meta.get(VERSION_KEY).map_err(storage_err)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    BallotError::StateCorruption("version record must be 8 bytes".into())
                })?;
                StateVersion::new(u64::from_le_bytes(arr))
            }
            None => StateVersion::new(0),
        };

        debug!("Opened sled store at version {}", version);

        Ok(Self {
            db,
            state,
            meta,
            version: RwLock::new(version),
        })
    }

}

#[async_trait]
impl StateProvider for SledStateStore {
    async fn version(&self) -> StateVersion {
        *self.version.read()
    }

    async fn get(&self, key: &[u8]) -> BallotResult<Option<Vec<u8>>> {
        self.state
            .get(key)
            .map(|opt| opt.map(|v| v.to_vec()))
            .map_err(storage_err)
    }
}

#[async_trait]
impl StateMutator for SledStateStore {
    async fn apply_batch(&self, changes: Vec<StateChange>) -> BallotResult<StateVersion> {
        let mut batch = sled::Batch::default();
        for change in changes {
            match change {
                StateChange::Set { key, value } => batch.insert(key, value),
                StateChange::Delete { key } => batch.remove(key),
            }
        }

        let new_version = {
            let mut version = self.version.write();
            let new_version = version.next();
            let version_bytes = new_version.0.to_le_bytes();

            // State and version land together or not at all
            let result: TransactionResult<()> =
                (&self.state, &self.meta).transaction(|(state, meta)| {
                    state.apply_batch(&batch)?;
                    meta.insert(VERSION_KEY, &version_bytes[..])?;
                    Ok(())
                });
            result.map_err(|e| match e {
                TransactionError::Abort(()) => {
                    BallotError::StorageError("state batch aborted".into())
                }
                TransactionError::Storage(e) => storage_err(e),
            })?;

            *version = new_version;
            new_version
        };

        self.db.flush_async().await.map_err(storage_err)?;
        Ok(new_version)
    }
}

#[async_trait]
impl StateStore for SledStateStore {
    async fn all_entries(&self) -> BallotResult<Vec<StateEntry>> {
        self.state
            .iter()
            .map(|result| {
                result
                    .map(|(key, value)| StateEntry {
                        key: key.to_vec(),
                        value: value.to_vec(),
                    })
                    .map_err(storage_err)
            })
            .collect()
    }

    async fn entries_with_prefix(&self, prefix: &[u8]) -> BallotResult<Vec<StateEntry>> {
        // sled iterates in key order already
        self.state
            .scan_prefix(prefix)
            .map(|result| {
                result
                    .map(|(key, value)| StateEntry {
                        key: key.to_vec(),
                        value: value.to_vec(),
                    })
                    .map_err(storage_err)
            })
            .collect()
    }
}

/// Create a shared persistent state store
pub fn create_sled_store<P: AsRef<Path>>(path: P) -> BallotResult<Arc<SledStateStore>> {
    Ok(Arc::new(SledStateStore::open(path)?))
}
