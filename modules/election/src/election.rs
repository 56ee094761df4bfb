//! Election state machine
//!
//! `Election` owns the candidate sequence, the voter registry and the running
//! tally. Every mutation is split in two: a `plan_*` method checks the rules
//! against the current state and describes the result as a [`Transition`],
//! and [`Election::apply`] installs it. Planning never mutates, so a rejected
//! call leaves the election exactly as it was.

use ballot_core::{Address, BallotError, BallotResult, CandidateIndex, VoterId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::transition::Transition;

/// A registered candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    /// Optional image reference, empty when not provided
    pub image: String,
    pub vote_count: u64,
}

impl Candidate {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            vote_count: 0,
        }
    }
}

/// Voter registration bound to a voter id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoterRecord {
    /// Address allowed to cast this voter's vote
    pub delegate: Address,
    pub voted: bool,
}

/// Snapshot of the tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Results {
    pub candidates: Vec<Candidate>,
    pub total_votes: u64,
}

/// Construction parameters and counters, read together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub title: String,
    pub owner: Address,
    pub candidate_count: usize,
    pub voter_count: usize,
    pub total_votes: u64,
}

/// The election aggregate
#[derive(Debug, Clone)]
pub struct Election {
    title: String,
    owner: Address,
    candidates: Vec<Candidate>,
    voters: HashMap<VoterId, VoterRecord>,
    total_votes: u64,
}

impl Election {
    /// Create an empty election owned by `owner`
    pub fn new(title: impl Into<String>, owner: Address) -> Self {
        Self {
            title: title.into(),
            owner,
            candidates: Vec::new(),
            voters: HashMap::new(),
            total_votes: 0,
        }
    }

    /// Rebuild an election from persisted parts, checking the tally invariant
    pub fn from_parts(
        title: String,
        owner: Address,
        candidates: Vec<Candidate>,
        voters: HashMap<VoterId, VoterRecord>,
        total_votes: u64,
    ) -> BallotResult<Self> {
        let counted = candidates
            .iter()
            .try_fold(0u64, |sum, c| sum.checked_add(c.vote_count))
            .ok_or(BallotError::TallyOverflow)?;

        if counted != total_votes {
            return Err(BallotError::StateCorruption(format!(
                "candidate votes sum to {} but tally is {}",
                counted, total_votes
            )));
        }

        let voted = voters.values().filter(|v| v.voted).count() as u64;
        if voted != total_votes {
            return Err(BallotError::StateCorruption(format!(
                "{} voters marked voted but tally is {}",
                voted, total_votes
            )));
        }

        Ok(Self {
            title,
            owner,
            candidates,
            voters,
            total_votes,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    pub fn voter_count(&self) -> usize {
        self.voters.len()
    }

    pub fn total_votes(&self) -> u64 {
        self.total_votes
    }

    fn ensure_owner(&self, caller: &Address) -> BallotResult<()> {
        if *caller != self.owner {
            return Err(BallotError::Unauthorized);
        }
        Ok(())
    }

    /// Plan binding `voter_id` to `address`.
    ///
    /// Rebinding an existing id keeps its `voted` flag, so re-registration can
    /// never hand out a second vote.
    pub fn plan_register_voter(
        &self,
        caller: &Address,
        address: Address,
        voter_id: VoterId,
    ) -> BallotResult<Transition> {
        self.ensure_owner(caller)?;

        let voted = self.voters.get(&voter_id).map(|r| r.voted).unwrap_or(false);

        Ok(Transition::VoterRegistered {
            voter_id,
            record: VoterRecord {
                delegate: address,
                voted,
            },
        })
    }

    /// Plan appending a candidate. No deduplication, empty strings allowed.
    pub fn plan_register_proposal(
        &self,
        caller: &Address,
        name: String,
        image: String,
    ) -> BallotResult<Transition> {
        self.ensure_owner(caller)?;

        Ok(Transition::ProposalRegistered {
            index: self.candidates.len(),
            candidate: Candidate::new(name, image),
        })
    }

    /// Plan a vote. Checks run in a fixed order: registration, delegate,
    /// already voted, candidate range.
    pub fn plan_vote(
        &self,
        caller: &Address,
        voter_id: &VoterId,
        candidate_index: CandidateIndex,
    ) -> BallotResult<Transition> {
        let record = self
            .voters
            .get(voter_id)
            .ok_or_else(|| BallotError::UnknownVoter(voter_id.clone()))?;

        if record.delegate != *caller {
            return Err(BallotError::AddressMismatch(voter_id.clone()));
        }

        if record.voted {
            return Err(BallotError::AlreadyVoted);
        }

        let candidate = self.candidates.get(candidate_index).ok_or(
            BallotError::InvalidCandidate {
                index: candidate_index,
                count: self.candidates.len(),
            },
        )?;

        let vote_count = candidate
            .vote_count
            .checked_add(1)
            .ok_or(BallotError::TallyOverflow)?;
        let total_votes = self
            .total_votes
            .checked_add(1)
            .ok_or(BallotError::TallyOverflow)?;

        Ok(Transition::VoteCast {
            voter_id: voter_id.clone(),
            record: VoterRecord {
                delegate: record.delegate,
                voted: true,
            },
            candidate_index,
            candidate: Candidate {
                vote_count,
                ..candidate.clone()
            },
            total_votes,
        })
    }

    /// Install a planned transition.
    ///
    /// Fails only if the transition was planned against a different state.
    pub fn apply(&mut self, transition: &Transition) -> BallotResult<()> {
        match transition {
            Transition::VoterRegistered { voter_id, record } => {
                self.voters.insert(voter_id.clone(), *record);
            }
            Transition::ProposalRegistered { index, candidate } => {
                if *index != self.candidates.len() {
                    return Err(BallotError::Internal(format!(
                        "stale proposal transition: index {} with {} candidates",
                        index,
                        self.candidates.len()
                    )));
                }
                self.candidates.push(candidate.clone());
            }
            Transition::VoteCast {
                voter_id,
                record,
                candidate_index,
                candidate,
                total_votes,
            } => {
                let slot = self.candidates.get_mut(*candidate_index).ok_or_else(|| {
                    BallotError::Internal(format!(
                        "stale vote transition: candidate {} missing",
                        candidate_index
                    ))
                })?;
                *slot = candidate.clone();
                self.voters.insert(voter_id.clone(), *record);
                self.total_votes = *total_votes;
            }
        }
        Ok(())
    }

    /// Owner-only: register or rebind a voter
    pub fn register_voter(
        &mut self,
        caller: &Address,
        address: Address,
        voter_id: VoterId,
    ) -> BallotResult<()> {
        let transition = self.plan_register_voter(caller, address, voter_id)?;
        self.apply(&transition)
    }

    /// Owner-only: append a candidate, returning its index
    pub fn register_proposal(
        &mut self,
        caller: &Address,
        name: impl Into<String>,
        image: impl Into<String>,
    ) -> BallotResult<CandidateIndex> {
        let transition = self.plan_register_proposal(caller, name.into(), image.into())?;
        let index = self.candidates.len();
        self.apply(&transition)?;
        Ok(index)
    }

    /// Cast the vote of `voter_id` for `candidate_index`
    pub fn vote(
        &mut self,
        caller: &Address,
        voter_id: &VoterId,
        candidate_index: CandidateIndex,
    ) -> BallotResult<()> {
        let transition = self.plan_vote(caller, voter_id, candidate_index)?;
        self.apply(&transition)
    }

    /// Voter record for `voter_id`; unregistered ids read as the default record
    pub fn voter(&self, voter_id: &VoterId) -> VoterRecord {
        self.voters.get(voter_id).copied().unwrap_or_default()
    }

    /// Voter record for `voter_id`, or `None` if it was never registered
    pub fn registration(&self, voter_id: &VoterId) -> Option<VoterRecord> {
        self.voters.get(voter_id).copied()
    }

    pub fn summary(&self) -> ElectionSummary {
        ElectionSummary {
            title: self.title.clone(),
            owner: self.owner,
            candidate_count: self.candidates.len(),
            voter_count: self.voters.len(),
            total_votes: self.total_votes,
        }
    }

    pub fn voters(&self) -> impl Iterator<Item = (&VoterId, &VoterRecord)> {
        self.voters.iter()
    }

    pub fn results(&self) -> Results {
        Results {
            candidates: self.candidates.clone(),
            total_votes: self.total_votes,
        }
    }

    /// Current leader. Ties go to the lowest index.
    pub fn winner(&self) -> BallotResult<(CandidateIndex, &Candidate)> {
        let mut iter = self.candidates.iter().enumerate();
        let mut best = iter.next().ok_or(BallotError::NoCandidates)?;

        for (index, candidate) in iter {
            if candidate.vote_count > best.1.vote_count {
                best = (index, candidate);
            }
        }

        Ok(best)
    }

    pub fn winner_name(&self) -> BallotResult<&str> {
        self.winner().map(|(_, c)| c.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address([byte; 32])
    }

    const OWNER: u8 = 1;

    fn election_with(names: &[&str]) -> Election {
        let mut election = Election::new("Referendum", addr(OWNER));
        for name in names {
            election.register_proposal(&addr(OWNER), *name, "").unwrap();
        }
        election
    }

    fn sum_of_counts(election: &Election) -> u64 {
        election.candidates().iter().map(|c| c.vote_count).sum()
    }

    #[test]
    fn test_construction() {
        let election = Election::new("Referendum", addr(OWNER));

        assert_eq!(election.title(), "Referendum");
        assert_eq!(election.owner(), addr(OWNER));
        assert_eq!(election.candidate_count(), 0);
        assert_eq!(election.total_votes(), 0);
    }

    #[test]
    fn test_register_and_rebind_voter() {
        let mut election = election_with(&[]);
        let id = VoterId::from("SCII/00724/2017");

        election.register_voter(&addr(OWNER), addr(10), id.clone()).unwrap();
        assert_eq!(
            election.voter(&id),
            VoterRecord {
                delegate: addr(10),
                voted: false
            }
        );

        election.register_voter(&addr(OWNER), addr(11), id.clone()).unwrap();
        assert_eq!(
            election.voter(&id),
            VoterRecord {
                delegate: addr(11),
                voted: false
            }
        );
    }

    #[test]
    fn test_rebinding_after_vote_keeps_voted() {
        let mut election = election_with(&["Solidity"]);
        let id = VoterId::from("SCII/00721/2017");

        election.register_voter(&addr(OWNER), addr(10), id.clone()).unwrap();
        election.vote(&addr(10), &id, 0).unwrap();

        election.register_voter(&addr(OWNER), addr(20), id.clone()).unwrap();
        let record = election.voter(&id);
        assert_eq!(record.delegate, addr(20));
        assert!(record.voted);

        // The new delegate cannot use the id to vote again
        assert!(matches!(
            election.vote(&addr(20), &id, 0),
            Err(BallotError::AlreadyVoted)
        ));
        assert_eq!(election.total_votes(), 1);
    }

    #[test]
    fn test_one_address_many_ids() {
        let mut election = election_with(&["Solidity", "Rust"]);
        let a = VoterId::from("a");
        let b = VoterId::from("b");

        election.register_voter(&addr(OWNER), addr(10), a.clone()).unwrap();
        election.register_voter(&addr(OWNER), addr(10), b.clone()).unwrap();

        election.vote(&addr(10), &a, 0).unwrap();
        election.vote(&addr(10), &b, 1).unwrap();
        assert_eq!(election.total_votes(), 2);
    }

    #[test]
    fn test_non_owner_cannot_register() {
        let mut election = election_with(&["Solidity"]);
        let before = election.results();

        assert!(matches!(
            election.register_voter(&addr(10), addr(10), VoterId::from("x")),
            Err(BallotError::Unauthorized)
        ));
        assert!(matches!(
            election.register_proposal(&addr(10), "Rust", ""),
            Err(BallotError::Unauthorized)
        ));

        assert_eq!(election.results(), before);
        assert!(election.registration(&VoterId::from("x")).is_none());
    }

    #[test]
    fn test_proposals_are_append_only() {
        let mut election = election_with(&[]);
        let names = ["Solidity", "Rust", "Web2", "Rust"];

        for (n, name) in names.iter().enumerate() {
            let before: Vec<Candidate> = election.candidates().to_vec();
            let index = election.register_proposal(&addr(OWNER), *name, "").unwrap();

            assert_eq!(index, n);
            assert_eq!(election.candidate_count(), n + 1);
            assert_eq!(&election.candidates()[..n], &before[..]);
            assert_eq!(election.candidates()[n], Candidate::new(*name, ""));
        }

        // Duplicate names are distinct entries
        assert_eq!(election.candidates()[1].name, election.candidates()[3].name);
    }

    #[test]
    fn test_reference_scenario() {
        let mut election = election_with(&["Solidity", "Rust", "Web2"]);
        let ids: Vec<VoterId> = ["SCII/00721/2017", "SCII/00722/2017", "SCII/00723/2017"]
            .iter()
            .map(|s| VoterId::from(*s))
            .collect();

        for (i, id) in ids.iter().enumerate() {
            election
                .register_voter(&addr(OWNER), addr(10 + i as u8), id.clone())
                .unwrap();
        }

        election.vote(&addr(10), &ids[0], 0).unwrap();
        assert!(election.voter(&ids[0]).voted);
        assert_eq!(election.total_votes(), 1);

        election.vote(&addr(11), &ids[1], 1).unwrap();
        election.vote(&addr(12), &ids[2], 1).unwrap();

        let results = election.results();
        let counts: Vec<u64> = results.candidates.iter().map(|c| c.vote_count).collect();
        assert_eq!(counts, vec![1, 2, 0]);
        assert_eq!(results.total_votes, 3);
        assert_eq!(election.winner_name().unwrap(), "Rust");
    }

    #[test]
    fn test_vote_rejections_leave_tally_unchanged() {
        let mut election = election_with(&["Solidity", "Rust", "Web2"]);
        let id1 = VoterId::from("SCII/00721/2017");
        let id2 = VoterId::from("SCII/00722/2017");
        let id3 = VoterId::from("SCII/00723/2017");

        election.register_voter(&addr(OWNER), addr(10), id1.clone()).unwrap();
        election.register_voter(&addr(OWNER), addr(11), id2.clone()).unwrap();

        election.vote(&addr(11), &id2, 1).unwrap();
        let after_valid = election.results();

        // Registered id, wrong caller
        assert!(matches!(
            election.vote(&addr(10), &id2, 1),
            Err(BallotError::AddressMismatch(id)) if id == id2
        ));
        // Unregistered id
        assert!(matches!(
            election.vote(&addr(10), &id3, 1),
            Err(BallotError::UnknownVoter(id)) if id == id3
        ));
        // Caller that was never registered at all
        assert!(matches!(
            election.vote(&addr(12), &id1, 1),
            Err(BallotError::AddressMismatch(_))
        ));
        // Out of range candidate
        assert!(matches!(
            election.vote(&addr(10), &id1, 3),
            Err(BallotError::InvalidCandidate { index: 3, count: 3 })
        ));

        assert_eq!(election.results(), after_valid);
        assert_eq!(election.total_votes(), 1);
        assert!(!election.voter(&id1).voted);
    }

    #[test]
    fn test_double_vote() {
        let mut election = election_with(&["Solidity"]);
        let id = VoterId::from("SCII/00721/2017");
        election.register_voter(&addr(OWNER), addr(10), id.clone()).unwrap();

        election.vote(&addr(10), &id, 0).unwrap();
        let err = election.vote(&addr(10), &id, 0).unwrap_err();

        assert!(matches!(err, BallotError::AlreadyVoted));
        assert_eq!(err.to_string(), "You have already voted.");
        assert_eq!(election.total_votes(), 1);
        assert_eq!(election.candidates()[0].vote_count, 1);
    }

    #[test]
    fn test_precondition_order() {
        let mut election = election_with(&["Solidity"]);
        let id = VoterId::from("v");
        election.register_voter(&addr(OWNER), addr(10), id.clone()).unwrap();
        election.vote(&addr(10), &id, 0).unwrap();

        // Wrong caller is reported before the already-voted check
        assert!(matches!(
            election.vote(&addr(99), &id, 0),
            Err(BallotError::AddressMismatch(_))
        ));
        // Already voted is reported before the candidate range check
        assert!(matches!(
            election.vote(&addr(10), &id, 42),
            Err(BallotError::AlreadyVoted)
        ));
    }

    #[test]
    fn test_voted_flag_is_sticky() {
        let mut election = election_with(&["Solidity", "Rust"]);
        let id = VoterId::from("v");
        election.register_voter(&addr(OWNER), addr(10), id.clone()).unwrap();
        election.vote(&addr(10), &id, 1).unwrap();

        // Throw every kind of call at the election afterwards
        election.register_voter(&addr(OWNER), addr(10), id.clone()).unwrap();
        election.register_proposal(&addr(OWNER), "Web2", "").unwrap();
        let _ = election.vote(&addr(10), &id, 0);
        let _ = election.register_voter(&addr(10), addr(10), id.clone());

        assert!(election.voter(&id).voted);
        assert_eq!(sum_of_counts(&election), election.total_votes());
    }

    #[test]
    fn test_tally_matches_counts_over_many_votes() {
        let mut election = election_with(&["A", "B", "C", "D"]);

        for i in 0..40u8 {
            let id = VoterId::new(format!("voter-{}", i));
            election
                .register_voter(&addr(OWNER), addr(100 + i), id.clone())
                .unwrap();
            election.vote(&addr(100 + i), &id, (i as usize * 7) % 4).unwrap();
            assert_eq!(sum_of_counts(&election), election.total_votes());
        }

        assert_eq!(election.total_votes(), 40);
    }

    #[test]
    fn test_winner_tie_goes_to_lowest_index() {
        let mut election = election_with(&["Solidity", "Rust", "Web2"]);
        let a = VoterId::from("a");
        let b = VoterId::from("b");
        election.register_voter(&addr(OWNER), addr(10), a.clone()).unwrap();
        election.register_voter(&addr(OWNER), addr(11), b.clone()).unwrap();

        election.vote(&addr(10), &a, 2).unwrap();
        election.vote(&addr(11), &b, 1).unwrap();

        let (index, candidate) = election.winner().unwrap();
        assert_eq!(index, 1);
        assert_eq!(candidate.name, "Rust");
    }

    #[test]
    fn test_winner_without_votes_is_first_candidate() {
        let election = election_with(&["Solidity", "Rust"]);
        assert_eq!(election.winner_name().unwrap(), "Solidity");
    }

    #[test]
    fn test_winner_without_candidates() {
        let election = election_with(&[]);
        assert!(matches!(election.winner_name(), Err(BallotError::NoCandidates)));
    }

    #[test]
    fn test_unknown_voter_reads_default() {
        let election = election_with(&["Solidity"]);
        let record = election.voter(&VoterId::from("nobody"));

        assert_eq!(record.delegate, Address::ZERO);
        assert!(!record.voted);
    }

    #[test]
    fn test_registration_and_summary() {
        let mut election = election_with(&["Solidity", "Rust"]);
        let id = VoterId::from("SCII/00721/2017");
        election.register_voter(&addr(OWNER), addr(10), id.clone()).unwrap();
        election.vote(&addr(10), &id, 1).unwrap();

        assert_eq!(
            election.registration(&id),
            Some(VoterRecord {
                delegate: addr(10),
                voted: true
            })
        );

        let summary = election.summary();
        assert_eq!(summary.title, "Referendum");
        assert_eq!(summary.candidate_count, 2);
        assert_eq!(summary.voter_count, 1);
        assert_eq!(summary.total_votes, 1);
    }

    #[test]
    fn test_from_parts_checks_tally() {
        let mut candidates = vec![Candidate::new("A", ""), Candidate::new("B", "")];
        candidates[0].vote_count = 2;

        let mut voters = HashMap::new();
        for id in ["x", "y"] {
            voters.insert(
                VoterId::from(id),
                VoterRecord {
                    delegate: addr(5),
                    voted: true,
                },
            );
        }

        let ok = Election::from_parts(
            "T".into(),
            addr(OWNER),
            candidates.clone(),
            voters.clone(),
            2,
        );
        assert!(ok.is_ok());

        let bad = Election::from_parts("T".into(), addr(OWNER), candidates, voters, 3);
        assert!(matches!(bad, Err(BallotError::StateCorruption(_))));
    }

    #[test]
    fn test_stale_transition_rejected() {
        let mut election = election_with(&[]);
        let transition = election
            .plan_register_proposal(&addr(OWNER), "A".into(), "".into())
            .unwrap();

        election.apply(&transition).unwrap();
        assert!(matches!(
            election.apply(&transition),
            Err(BallotError::Internal(_))
        ));
        assert_eq!(election.candidate_count(), 1);
    }
}
