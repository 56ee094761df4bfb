//! Signed ledger calls
//!
//! Every mutation reaches the ledger as a [`SignedCall`]: the call itself,
//! the election it targets, and an Ed25519 signature by the caller. The
//! caller's address is the BLAKE3 hash of the signing key, which is the
//! identity the ledger checks ownership and voter delegation against.

use ballot_core::{
    Address, BallotError, BallotResult, CandidateIndex, ElectionId, Hash, Hashable, PublicKey,
    Signable, Signature, Timestamp, VoterId,
};
use ballot_crypto::hashing::hash_multiple;
use ballot_crypto::keys::{verify_address, KeyPair};
use ballot_crypto::signing::{sign, verify};
use serde::{Deserialize, Serialize};

const SIGNING_DOMAIN: &[u8] = b"BALLOT_CALL:";

/// A ledger mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BallotCall {
    RegisterVoter {
        address: Address,
        voter_id: VoterId,
    },
    RegisterProposal {
        name: String,
        #[serde(default)]
        image: String,
    },
    Vote {
        voter_id: VoterId,
        candidate_index: CandidateIndex,
    },
}

impl BallotCall {
    pub fn name(&self) -> &'static str {
        match self {
            BallotCall::RegisterVoter { .. } => "register_voter",
            BallotCall::RegisterProposal { .. } => "register_proposal",
            BallotCall::Vote { .. } => "vote",
        }
    }

    /// Canonical byte encoding: a tag byte, then each field with strings
    /// length-prefixed.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(64);
        match self {
            BallotCall::RegisterVoter { address, voter_id } => {
                bytes.push(0);
                bytes.extend_from_slice(address.as_bytes());
                put_str(&mut bytes, voter_id.as_str());
            }
            BallotCall::RegisterProposal { name, image } => {
                bytes.push(1);
                put_str(&mut bytes, name);
                put_str(&mut bytes, image);
            }
            BallotCall::Vote {
                voter_id,
                candidate_index,
            } => {
                bytes.push(2);
                put_str(&mut bytes, voter_id.as_str());
                bytes.extend_from_slice(&(*candidate_index as u64).to_le_bytes());
            }
        }
        bytes
    }
}

fn put_str(bytes: &mut Vec<u8>, s: &str) {
    bytes.extend_from_slice(&(s.len() as u64).to_le_bytes());
    bytes.extend_from_slice(s.as_bytes());
}

/// A call signed by its caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedCall {
    pub call: BallotCall,
    /// Election this call was signed for
    pub election_id: ElectionId,
    /// Caller address
    pub caller: Address,
    /// Caller's public key
    pub public_key: PublicKey,
    pub timestamp: Timestamp,
    pub signature: Signature,
}

impl SignedCall {
    /// Sign `call` for `election_id` with `keypair`, timestamped now
    pub fn new(call: BallotCall, election_id: ElectionId, keypair: &KeyPair) -> Self {
        Self::new_at(call, election_id, keypair, Timestamp::now())
    }

    /// Sign with an explicit timestamp
    pub fn new_at(
        call: BallotCall,
        election_id: ElectionId,
        keypair: &KeyPair,
        timestamp: Timestamp,
    ) -> Self {
        let caller = keypair.address();
        let signing_bytes = Self::compute_signing_bytes(&call, &election_id, &caller, timestamp);
        let signature = sign(keypair, &signing_bytes);

        Self {
            call,
            election_id,
            caller,
            public_key: keypair.public_key(),
            timestamp,
            signature,
        }
    }

    fn compute_signing_bytes(
        call: &BallotCall,
        election_id: &ElectionId,
        caller: &Address,
        timestamp: Timestamp,
    ) -> Vec<u8> {
        let encoded = call.encode();
        let mut bytes = Vec::with_capacity(SIGNING_DOMAIN.len() + 72 + encoded.len());
        bytes.extend_from_slice(SIGNING_DOMAIN);
        bytes.extend_from_slice(election_id.as_bytes());
        bytes.extend_from_slice(caller.as_bytes());
        bytes.extend_from_slice(&timestamp.0.to_le_bytes());
        bytes.extend_from_slice(&encoded);
        bytes
    }

    /// Check that the public key owns the caller address and signed the call
    pub fn verify_signature(&self) -> BallotResult<()> {
        if !verify_address(&self.caller, &self.public_key) {
            return Err(BallotError::InvalidAddress(
                "Caller address does not match public key".into(),
            ));
        }

        verify(&self.public_key, &self.signing_bytes(), &self.signature)
    }

    /// Whether the call is older than `expiry_seconds` at `now`
    pub fn is_expired(&self, expiry_seconds: u64, now: Timestamp) -> bool {
        self.timestamp.elapsed_millis(now) > expiry_seconds.saturating_mul(1000)
    }

    /// Unique id used for replay detection
    pub fn call_id(&self) -> Hash {
        self.hash()
    }
}

impl Hashable for SignedCall {
    fn hash(&self) -> Hash {
        let signing_bytes = self.signing_bytes();
        hash_multiple(&[signing_bytes.as_slice(), self.signature.as_bytes().as_slice()])
    }
}

impl Signable for SignedCall {
    fn signing_bytes(&self) -> Vec<u8> {
        Self::compute_signing_bytes(&self.call, &self.election_id, &self.caller, self.timestamp)
    }
}

/// A call whose signature has been checked
#[derive(Debug, Clone)]
pub struct VerifiedCall {
    pub call: BallotCall,
    pub caller: Address,
    pub call_id: Hash,
    pub timestamp: Timestamp,
}

impl VerifiedCall {
    pub fn new(signed: SignedCall) -> BallotResult<Self> {
        signed.verify_signature()?;
        let call_id = signed.call_id();

        Ok(Self {
            call: signed.call,
            caller: signed.caller,
            call_id,
            timestamp: signed.timestamp,
        })
    }
}
