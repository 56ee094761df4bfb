//! Core state store traits and types

use async_trait::async_trait;
use ballot_core::{
    Address, BallotError, BallotResult, CandidateIndex, ElectionId, Hash, StateMutator,
    StateProvider, StateRoot, Timestamp, VoterId,
};
use ballot_crypto::hashing::{hash, merkle_root};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

fn encode<T: Serialize>(value: &T) -> BallotResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| BallotError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> BallotResult<T> {
    bincode::deserialize(bytes).map_err(|e| BallotError::DeserializationError(e.to_string()))
}

/// Persisted construction parameters of the election
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionMeta {
    pub title: String,
    pub owner: Address,
}

impl ElectionMeta {
    pub fn new(title: impl Into<String>, owner: Address) -> Self {
        Self {
            title: title.into(),
            owner,
        }
    }

    pub fn to_bytes(&self) -> BallotResult<Vec<u8>> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> BallotResult<Self> {
        decode(bytes)
    }
}

/// Persisted candidate entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CandidateState {
    pub name: String,
    pub image: String,
    pub vote_count: u64,
}

impl CandidateState {
    pub fn to_bytes(&self) -> BallotResult<Vec<u8>> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> BallotResult<Self> {
        decode(bytes)
    }
}

/// Persisted voter registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VoterState {
    pub delegate: Address,
    pub voted: bool,
}

impl VoterState {
    pub fn to_bytes(&self) -> BallotResult<Vec<u8>> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> BallotResult<Self> {
        decode(bytes)
    }
}

fn decode_u64(bytes: &[u8], what: &str) -> BallotResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| BallotError::DeserializationError(format!("{} must be 8 bytes", what)))?;
    Ok(u64::from_be_bytes(arr))
}

/// Encode the total tally counter
pub fn encode_tally(total: u64) -> Vec<u8> {
    total.to_be_bytes().to_vec()
}

/// Decode the total tally counter
pub fn decode_tally(bytes: &[u8]) -> BallotResult<u64> {
    decode_u64(bytes, "tally")
}

/// Encode the signing timestamp of an admitted call
pub fn encode_call_record(timestamp: Timestamp) -> Vec<u8> {
    timestamp.as_millis().to_be_bytes().to_vec()
}

/// Decode the signing timestamp of an admitted call
pub fn decode_call_record(bytes: &[u8]) -> BallotResult<Timestamp> {
    decode_u64(bytes, "call record").map(Timestamp::from_millis)
}

/// State entry for merkle tree computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl StateEntry {
    pub fn hash(&self) -> Hash {
        let mut data = Vec::with_capacity(self.key.len() + self.value.len());
        data.extend_from_slice(&self.key);
        data.extend_from_slice(&self.value);
        hash(&data)
    }
}

/// Compute state root from entries
pub fn compute_state_root(entries: &[StateEntry]) -> StateRoot {
    if entries.is_empty() {
        return Hash::ZERO;
    }

    // Sort entries by key for deterministic ordering
    let mut sorted: Vec<_> = entries.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));

    let leaves: Vec<Hash> = sorted.iter().map(|e| e.hash()).collect();

    merkle_root(&leaves)
}

/// Abstract state store interface
#[async_trait]
pub trait StateStore: StateProvider + StateMutator {
    /// Get election metadata
    async fn get_meta(&self) -> BallotResult<Option<ElectionMeta>> {
        match self.get(META_KEY).await? {
            Some(bytes) => Ok(Some(ElectionMeta::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Id of the genesis the election was created from
    async fn get_genesis_id(&self) -> BallotResult<Option<ElectionId>> {
        match self.get(GENESIS_KEY).await? {
            Some(bytes) => {
                let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    BallotError::DeserializationError("genesis id must be 32 bytes".into())
                })?;
                Ok(Some(Hash::from_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    /// Get the total tally counter
    async fn get_tally(&self) -> BallotResult<u64> {
        match self.get(TALLY_KEY).await? {
            Some(bytes) => decode_tally(&bytes),
            None => Ok(0),
        }
    }

    /// Get all entries for state root computation
    async fn all_entries(&self) -> BallotResult<Vec<StateEntry>>;

    /// Entries whose key starts with `prefix`, sorted by key
    async fn entries_with_prefix(&self, prefix: &[u8]) -> BallotResult<Vec<StateEntry>> {
        let mut entries: Vec<StateEntry> = self
            .all_entries()
            .await?
            .into_iter()
            .filter(|e| e.key.starts_with(prefix))
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Ids and signing timestamps of admitted calls
    async fn call_records(&self) -> BallotResult<Vec<(Hash, Timestamp)>> {
        self.entries_with_prefix(CALL_PREFIX)
            .await?
            .into_iter()
            .map(|entry| {
                let call_id = parse_call_key(&entry.key).ok_or_else(|| {
                    BallotError::StateCorruption("call key must hold a 32-byte id".into())
                })?;
                Ok((call_id, decode_call_record(&entry.value)?))
            })
            .collect()
    }

    /// Compute current state root
    async fn compute_root(&self) -> BallotResult<StateRoot> {
        let entries = self.all_entries().await?;
        Ok(compute_state_root(&entries))
    }
}

/// Key holding the election metadata
pub const META_KEY: &[u8] = b"election:meta";

/// Key holding the total tally counter
pub const TALLY_KEY: &[u8] = b"election:tally";

/// Key holding the id of the genesis the election was created from
pub const GENESIS_KEY: &[u8] = b"election:genesis";

/// Key prefix for admitted call ids
pub const CALL_PREFIX: &[u8] = b"call:";

/// Key prefix for candidates
pub const CANDIDATE_PREFIX: &[u8] = b"candidate:";

/// Key prefix for voters
pub const VOTER_PREFIX: &[u8] = b"voter:";

/// Build candidate key. Big-endian so keys sort in registration order.
pub fn candidate_key(index: CandidateIndex) -> Vec<u8> {
    let mut key = CANDIDATE_PREFIX.to_vec();
    key.extend_from_slice(&(index as u64).to_be_bytes());
    key
}

/// Parse candidate key
pub fn parse_candidate_key(key: &[u8]) -> Option<CandidateIndex> {
    let rest = key.strip_prefix(CANDIDATE_PREFIX)?;
    let arr: [u8; 8] = rest.try_into().ok()?;
    usize::try_from(u64::from_be_bytes(arr)).ok()
}

/// Build voter key
pub fn voter_key(voter_id: &VoterId) -> Vec<u8> {
    let mut key = VOTER_PREFIX.to_vec();
    key.extend_from_slice(voter_id.as_str().as_bytes());
    key
}

/// Parse voter key
pub fn parse_voter_key(key: &[u8]) -> Option<VoterId> {
    let rest = key.strip_prefix(VOTER_PREFIX)?;
    String::from_utf8(rest.to_vec()).ok().map(VoterId)
}

/// Build call record key
pub fn call_key(call_id: &Hash) -> Vec<u8> {
    let mut key = CALL_PREFIX.to_vec();
    key.extend_from_slice(call_id.as_bytes());
    key
}

/// Parse call record key
pub fn parse_call_key(key: &[u8]) -> Option<Hash> {
    let rest = key.strip_prefix(CALL_PREFIX)?;
    let arr: [u8; 32] = rest.try_into().ok()?;
    Some(Hash::from_bytes(arr))
}
