//! Election ledger service
//!
//! Wraps an [`Election`] with persistence. Calls are committed one at a time:
//! each is planned against the current state, written to the store as one
//! atomic batch, and only then applied in memory. Reads never wait on a
//! commit in progress and always see a fully applied state.

use ballot_core::{
    Address, BallotError, BallotResult, CandidateIndex, Hash, StateChange, StateProvider,
    StateRoot, StateVersion, VoterId,
};
use ballot_state::{
    call_key, candidate_key, encode_call_record, encode_tally, parse_candidate_key,
    parse_voter_key, voter_key, CandidateState, ElectionMeta, StateStore, VoterState,
    CANDIDATE_PREFIX, META_KEY, TALLY_KEY, VOTER_PREFIX,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::call::{BallotCall, VerifiedCall};
use crate::election::{Candidate, Election, ElectionSummary, Results, VoterRecord};
use crate::transition::Transition;

/// A mutation written to the store and applied in memory
#[derive(Debug, Clone)]
pub struct Commit {
    pub transition: Transition,
    /// Store version produced by this commit's batch
    pub version: StateVersion,
}

/// The election ledger
pub struct ElectionLedger<S: StateStore + ?Sized> {
    store: Arc<S>,
    election: RwLock<Election>,
    commit_lock: Mutex<()>,
}

impl<S: StateStore + ?Sized> ElectionLedger<S> {
    /// Start a new election in an empty store
    pub async fn create(store: Arc<S>, title: &str, owner: Address) -> BallotResult<Self> {
        Self::install(store, Election::new(title, owner), Vec::new()).await
    }

    /// Write `election` and `extra` into an empty store as a single batch
    pub async fn install(
        store: Arc<S>,
        election: Election,
        extra: Vec<StateChange>,
    ) -> BallotResult<Self> {
        if store.get_meta().await?.is_some() {
            return Err(BallotError::ConfigError(
                "Store already holds an election".into(),
            ));
        }

        let meta = ElectionMeta::new(election.title(), election.owner());
        let mut changes = vec![
            StateChange::Set {
                key: META_KEY.to_vec(),
                value: meta.to_bytes()?,
            },
            StateChange::Set {
                key: TALLY_KEY.to_vec(),
                value: encode_tally(election.total_votes()),
            },
        ];
        for (index, candidate) in election.candidates().iter().enumerate() {
            changes.push(StateChange::Set {
                key: candidate_key(index),
                value: CandidateState::from(candidate.clone()).to_bytes()?,
            });
        }
        for (voter_id, record) in election.voters() {
            changes.push(StateChange::Set {
                key: voter_key(voter_id),
                value: VoterState::from(*record).to_bytes()?,
            });
        }
        changes.extend(extra);

        store.apply_batch(changes).await?;

        info!(
            "Created election \"{}\" owned by {} with {} candidates and {} voters",
            election.title(),
            election.owner(),
            election.candidate_count(),
            election.voter_count()
        );

        Ok(Self::with_election(store, election))
    }

    /// Restore the election persisted in `store`
    pub async fn open(store: Arc<S>) -> BallotResult<Self> {
        let meta = store.get_meta().await?.ok_or(BallotError::StateNotFound)?;

        let mut candidates = Vec::new();
        for (position, entry) in store
            .entries_with_prefix(CANDIDATE_PREFIX)
            .await?
            .into_iter()
            .enumerate()
        {
            // Candidate keys must run 0, 1, 2, ... without gaps
            if parse_candidate_key(&entry.key) != Some(position) {
                return Err(BallotError::StateCorruption(format!(
                    "candidate record out of sequence at position {}",
                    position
                )));
            }
            candidates.push(Candidate::from(CandidateState::from_bytes(&entry.value)?));
        }

        let mut voters = HashMap::new();
        for entry in store.entries_with_prefix(VOTER_PREFIX).await? {
            let voter_id = parse_voter_key(&entry.key).ok_or_else(|| {
                BallotError::StateCorruption("voter key is not valid UTF-8".into())
            })?;
            let record = VoterRecord::from(VoterState::from_bytes(&entry.value)?);
            voters.insert(voter_id, record);
        }

        let total_votes = store.get_tally().await?;
        let election =
            Election::from_parts(meta.title, meta.owner, candidates, voters, total_votes)?;

        info!(
            "Opened election \"{}\": {} candidates, {} voters, {} votes",
            election.title(),
            election.candidate_count(),
            election.voter_count(),
            election.total_votes()
        );

        Ok(Self::with_election(store, election))
    }

    fn with_election(store: Arc<S>, election: Election) -> Self {
        Self {
            store,
            election: RwLock::new(election),
            commit_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Plan, persist, then apply. `extra` changes ride in the same batch.
    /// A failed write leaves memory untouched.
    async fn commit<F>(&self, plan: F, extra: Vec<StateChange>) -> BallotResult<Commit>
    where
        F: FnOnce(&Election) -> BallotResult<Transition>,
    {
        let _commit = self.commit_lock.lock().await;

        let transition = {
            let election = self.election.read();
            plan(&election)?
        };

        let mut changes = transition.state_changes()?;
        changes.extend(extra);

        let version = self.store.apply_batch(changes).await?;
        self.election.write().apply(&transition)?;

        debug!("Committed {} at state {}", transition.kind(), version);
        Ok(Commit {
            transition,
            version,
        })
    }

    /// Owner-only: bind `voter_id` to `address`
    pub async fn register_voter(
        &self,
        caller: &Address,
        address: Address,
        voter_id: VoterId,
    ) -> BallotResult<()> {
        self.commit(|e| e.plan_register_voter(caller, address, voter_id), Vec::new())
            .await?;
        Ok(())
    }

    /// Owner-only: append a candidate, returning its index
    pub async fn register_proposal(
        &self,
        caller: &Address,
        name: impl Into<String>,
        image: impl Into<String>,
    ) -> BallotResult<CandidateIndex> {
        let (name, image) = (name.into(), image.into());
        let commit = self
            .commit(|e| e.plan_register_proposal(caller, name, image), Vec::new())
            .await?;
        match commit.transition {
            Transition::ProposalRegistered { index, .. } => Ok(index),
            other => Err(BallotError::Internal(format!(
                "unexpected {} for proposal",
                other.kind()
            ))),
        }
    }

    /// Cast the vote of `voter_id`; `caller` must be its registered delegate
    pub async fn vote(
        &self,
        caller: &Address,
        voter_id: &VoterId,
        candidate_index: CandidateIndex,
    ) -> BallotResult<()> {
        self.commit(|e| e.plan_vote(caller, voter_id, candidate_index), Vec::new())
            .await?;
        Ok(())
    }

    /// Dispatch a verified call. Its id is recorded in the same batch as the
    /// transition, and the records listed in `forget` are removed with it.
    pub async fn execute_call(&self, call: &VerifiedCall, forget: &[Hash]) -> BallotResult<Commit> {
        let caller = &call.caller;

        let mut extra = vec![StateChange::Set {
            key: call_key(&call.call_id),
            value: encode_call_record(call.timestamp),
        }];
        extra.extend(forget.iter().map(|id| StateChange::Delete { key: call_key(id) }));

        let commit = match &call.call {
            BallotCall::RegisterVoter { address, voter_id } => {
                self.commit(
                    |e| e.plan_register_voter(caller, *address, voter_id.clone()),
                    extra,
                )
                .await?
            }
            BallotCall::RegisterProposal { name, image } => {
                self.commit(
                    |e| e.plan_register_proposal(caller, name.clone(), image.clone()),
                    extra,
                )
                .await?
            }
            BallotCall::Vote {
                voter_id,
                candidate_index,
            } => {
                self.commit(|e| e.plan_vote(caller, voter_id, *candidate_index), extra)
                    .await?
            }
        };

        info!("{} by {}", call.call.name(), caller);
        Ok(commit)
    }

    /// Store version and state root, read between commits so they match
    pub async fn state(&self) -> BallotResult<(StateVersion, StateRoot)> {
        let _commit = self.commit_lock.lock().await;
        let version = self.store.version().await;
        let root = self.store.compute_root().await?;
        Ok((version, root))
    }

    pub fn title(&self) -> String {
        self.election.read().title().to_string()
    }

    pub fn owner(&self) -> Address {
        self.election.read().owner()
    }

    pub fn voter(&self, voter_id: &VoterId) -> VoterRecord {
        self.election.read().voter(voter_id)
    }

    pub fn registration(&self, voter_id: &VoterId) -> Option<VoterRecord> {
        self.election.read().registration(voter_id)
    }

    pub fn summary(&self) -> ElectionSummary {
        self.election.read().summary()
    }

    pub fn results(&self) -> Results {
        self.election.read().results()
    }

    pub fn winner(&self) -> BallotResult<(CandidateIndex, Candidate)> {
        self.election
            .read()
            .winner()
            .map(|(index, candidate)| (index, candidate.clone()))
    }

    pub fn winner_name(&self) -> BallotResult<String> {
        self.winner().map(|(_, candidate)| candidate.name)
    }
}
