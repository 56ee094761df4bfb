//! Core traits defining Ballot interfaces
//!
//! The state traits are implemented by every storage backend the ledger can
//! persist into.

use crate::types::*;
use async_trait::async_trait;

/// Result type for Ballot operations
pub type BallotResult<T> = Result<T, crate::error::BallotError>;

/// Trait for hashable types
pub trait Hashable {
    /// Compute the hash of this object
    fn hash(&self) -> Hash;
}

/// Trait for signable types
pub trait Signable {
    /// Get the bytes to be signed
    fn signing_bytes(&self) -> Vec<u8>;
}

/// State provider trait
#[async_trait]
pub trait StateProvider: Send + Sync {
    /// Get the current state version
    async fn version(&self) -> StateVersion;

    /// Get a value by key
    async fn get(&self, key: &[u8]) -> BallotResult<Option<Vec<u8>>>;
}

/// State mutator trait
#[async_trait]
pub trait StateMutator: StateProvider {
    /// Apply a batch of changes atomically
    async fn apply_batch(&self, changes: Vec<StateChange>) -> BallotResult<StateVersion>;
}

/// State change operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Set { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}
