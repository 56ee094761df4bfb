//! Planned state transitions
//!
//! A transition carries the post-state of every record it touches, so the
//! same value can be written to the store and installed in memory.

use ballot_core::{BallotResult, CandidateIndex, StateChange, VoterId};
use ballot_state::{
    candidate_key, encode_tally, voter_key, CandidateState, VoterState, TALLY_KEY,
};
use serde::{Deserialize, Serialize};

use crate::election::{Candidate, VoterRecord};

/// Outcome of a successful ledger call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transition {
    VoterRegistered {
        voter_id: VoterId,
        record: VoterRecord,
    },
    ProposalRegistered {
        index: CandidateIndex,
        candidate: Candidate,
    },
    VoteCast {
        voter_id: VoterId,
        record: VoterRecord,
        candidate_index: CandidateIndex,
        candidate: Candidate,
        total_votes: u64,
    },
}

impl Transition {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Transition::VoterRegistered { .. } => "voter_registered",
            Transition::ProposalRegistered { .. } => "proposal_registered",
            Transition::VoteCast { .. } => "vote_cast",
        }
    }

    /// Store writes that make this transition durable
    pub fn state_changes(&self) -> BallotResult<Vec<StateChange>> {
        let changes = match self {
            Transition::VoterRegistered { voter_id, record } => {
                vec![voter_change(voter_id, record)?]
            }
            Transition::ProposalRegistered { index, candidate } => {
                vec![candidate_change(*index, candidate)?]
            }
            Transition::VoteCast {
                voter_id,
                record,
                candidate_index,
                candidate,
                total_votes,
            } => vec![
                candidate_change(*candidate_index, candidate)?,
                voter_change(voter_id, record)?,
                StateChange::Set {
                    key: TALLY_KEY.to_vec(),
                    value: encode_tally(*total_votes),
                },
            ],
        };
        Ok(changes)
    }
}

fn voter_change(voter_id: &VoterId, record: &VoterRecord) -> BallotResult<StateChange> {
    let state = VoterState::from(*record);
    Ok(StateChange::Set {
        key: voter_key(voter_id),
        value: state.to_bytes()?,
    })
}

fn candidate_change(index: CandidateIndex, candidate: &Candidate) -> BallotResult<StateChange> {
    let state = CandidateState::from(candidate.clone());
    Ok(StateChange::Set {
        key: candidate_key(index),
        value: state.to_bytes()?,
    })
}

impl From<VoterRecord> for VoterState {
    fn from(record: VoterRecord) -> Self {
        VoterState {
            delegate: record.delegate,
            voted: record.voted,
        }
    }
}

impl From<VoterState> for VoterRecord {
    fn from(state: VoterState) -> Self {
        VoterRecord {
            delegate: state.delegate,
            voted: state.voted,
        }
    }
}

impl From<Candidate> for CandidateState {
    fn from(candidate: Candidate) -> Self {
        CandidateState {
            name: candidate.name,
            image: candidate.image,
            vote_count: candidate.vote_count,
        }
    }
}

impl From<CandidateState> for Candidate {
    fn from(state: CandidateState) -> Self {
        Candidate {
            name: state.name,
            image: state.image,
            vote_count: state.vote_count,
        }
    }
}
