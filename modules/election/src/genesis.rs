//! Genesis configuration for an election
//!
//! A genesis file fixes the election title and owner and may seed the initial
//! candidates and voters. Its hash is the election id that every signed call
//! is bound to.

use ballot_core::{Address, BallotError, BallotResult, ElectionId, StateChange, VoterId};
use ballot_crypto::hashing::hash;
use ballot_state::{StateStore, GENESIS_KEY};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::election::Election;
use crate::ledger::ElectionLedger;

/// Initial candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisCandidate {
    pub name: String,
    #[serde(default)]
    pub image: String,
}

/// Initial voter registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisVoter {
    pub voter_id: String,
    /// Hex address of the voter's delegate
    pub address: String,
}

/// Genesis configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionGenesis {
    pub title: String,
    /// Hex address of the election owner
    pub owner: String,
    #[serde(default)]
    pub candidates: Vec<GenesisCandidate>,
    #[serde(default)]
    pub voters: Vec<GenesisVoter>,
}

impl Default for ElectionGenesis {
    fn default() -> Self {
        Self {
            title: "Ballot Election".to_string(),
            owner: String::new(),
            candidates: vec![],
            voters: vec![],
        }
    }
}

impl ElectionGenesis {
    pub fn new(title: impl Into<String>, owner: Address) -> Self {
        Self {
            title: title.into(),
            owner: owner.to_hex(),
            ..Default::default()
        }
    }

    /// Development election with three candidates
    pub fn devnet(owner: Address) -> Self {
        Self::new("Ballot Devnet", owner)
            .add_candidate("Solidity", "")
            .add_candidate("Rust", "")
            .add_candidate("Web2", "")
    }

    pub fn with_owner(mut self, owner: Address) -> Self {
        self.owner = owner.to_hex();
        self
    }

    pub fn add_candidate(mut self, name: &str, image: &str) -> Self {
        self.candidates.push(GenesisCandidate {
            name: name.to_string(),
            image: image.to_string(),
        });
        self
    }

    pub fn add_voter(mut self, voter_id: &str, address: Address) -> Self {
        self.voters.push(GenesisVoter {
            voter_id: voter_id.to_string(),
            address: address.to_hex(),
        });
        self
    }

    pub fn owner_address(&self) -> BallotResult<Address> {
        Address::from_hex(&self.owner)
            .map_err(|e| BallotError::InvalidAddress(format!("genesis owner: {}", e)))
    }

    /// Parse voter registrations into ids and addresses
    pub fn parse_voters(&self) -> BallotResult<Vec<(VoterId, Address)>> {
        self.voters
            .iter()
            .map(|v| {
                let address = Address::from_hex(&v.address).map_err(|e| {
                    BallotError::InvalidAddress(format!("voter {}: {}", v.voter_id, e))
                })?;
                Ok((VoterId::new(v.voter_id.clone()), address))
            })
            .collect()
    }

    /// Hash of the compact JSON encoding
    pub fn election_id(&self) -> BallotResult<ElectionId> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| BallotError::SerializationError(e.to_string()))?;
        Ok(hash(&bytes))
    }

    pub fn to_json(&self) -> BallotResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BallotError::SerializationError(e.to_string()))
    }

    pub fn from_json(json: &str) -> BallotResult<Self> {
        serde_json::from_str(json).map_err(|e| BallotError::DeserializationError(e.to_string()))
    }
}

/// Brings a store up to the genesis election
pub struct GenesisInitializer<S: StateStore + ?Sized> {
    store: Arc<S>,
    genesis: ElectionGenesis,
}

impl<S: StateStore + ?Sized> GenesisInitializer<S> {
    pub fn new(store: Arc<S>, genesis: ElectionGenesis) -> Self {
        Self { store, genesis }
    }

    /// Open the election if the store already holds this genesis, otherwise
    /// create it with the initial registrations in a single batch.
    pub async fn initialize(self) -> BallotResult<ElectionLedger<S>> {
        let owner = self.genesis.owner_address()?;
        let voters = self.genesis.parse_voters()?;
        let election_id = self.genesis.election_id()?;

        if self.store.get_meta().await?.is_some() {
            match self.store.get_genesis_id().await? {
                Some(stored) if stored == election_id => {}
                Some(stored) => {
                    return Err(BallotError::ConfigError(format!(
                        "Store holds election {} but genesis describes {}",
                        stored.to_hex(),
                        election_id.to_hex()
                    )))
                }
                None => {
                    return Err(BallotError::ConfigError(
                        "Store holds an election without a genesis record".into(),
                    ))
                }
            }

            let ledger = ElectionLedger::open(self.store).await?;
            info!("Resuming election \"{}\"", ledger.title());
            return Ok(ledger);
        }

        info!("Initializing genesis for election: {}", self.genesis.title);
        let mut election = Election::new(self.genesis.title.clone(), owner);

        for candidate in &self.genesis.candidates {
            let index =
                election.register_proposal(&owner, candidate.name.clone(), candidate.image.clone())?;
            info!("Genesis candidate {}: {}", index, candidate.name);
        }

        for (voter_id, address) in voters {
            info!("Genesis voter {} -> {}", voter_id, address);
            election.register_voter(&owner, address, voter_id)?;
        }

        let marker = StateChange::Set {
            key: GENESIS_KEY.to_vec(),
            value: election_id.as_bytes().to_vec(),
        };
        ElectionLedger::install(self.store, election, vec![marker]).await
    }
}
