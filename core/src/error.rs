//! Error types for Ballot

use thiserror::Error;

use crate::types::{CandidateIndex, VoterId};

/// Main error type for Ballot
#[derive(Error, Debug)]
pub enum BallotError {
    // ============ Election Errors ============
    #[error("Unauthorized: only the election owner may do this")]
    Unauthorized,

    #[error("Unknown voter: {0}")]
    UnknownVoter(VoterId),

    #[error("Address does not match the delegate registered for voter {0}")]
    AddressMismatch(VoterId),

    #[error("You have already voted.")]
    AlreadyVoted,

    #[error("Invalid candidate index {index}: {count} candidates registered")]
    InvalidCandidate { index: CandidateIndex, count: usize },

    #[error("No candidates registered")]
    NoCandidates,

    #[error("Vote tally overflow")]
    TallyOverflow,

    // ============ Cryptography Errors ============
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // ============ Call Errors ============
    #[error("Call signed for election {got}, this node serves {expected}")]
    ElectionMismatch { expected: String, got: String },

    #[error("Call expired")]
    CallExpired,

    #[error("Call already submitted: {0}")]
    ReplayedCall(String),

    #[error("Invalid call: {0}")]
    InvalidCall(String),

    // ============ State Errors ============
    #[error("State not found for key")]
    StateNotFound,

    #[error("State corruption detected: {0}")]
    StateCorruption(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization failed: {0}")]
    SerializationError(String),

    #[error("Deserialization failed: {0}")]
    DeserializationError(String),

    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ============ General Errors ============
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BallotError {
    /// Whether this error is a rule rejection by the election ledger
    pub fn is_election_rejection(&self) -> bool {
        matches!(
            self,
            BallotError::Unauthorized
                | BallotError::UnknownVoter(_)
                | BallotError::AddressMismatch(_)
                | BallotError::AlreadyVoted
                | BallotError::InvalidCandidate { .. }
                | BallotError::NoCandidates
        )
    }
}

impl From<std::io::Error> for BallotError {
    fn from(err: std::io::Error) -> Self {
        BallotError::StorageError(err.to_string())
    }
}

impl From<bincode::Error> for BallotError {
    fn from(err: bincode::Error) -> Self {
        BallotError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for BallotError {
    fn from(err: serde_json::Error) -> Self {
        BallotError::SerializationError(err.to_string())
    }
}
