//! Key management for Ballot
//!
//! Handles key generation, import, and address derivation. An address is the
//! identity the election ledger compares against its owner and voter delegates.

use ballot_core::{Address, BallotError, BallotResult, PublicKey};
use ed25519_dalek::{
    SigningKey as Ed25519SigningKey, VerifyingKey as Ed25519VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::hashing::blake3_hash;

/// A keypair for signing calls
#[derive(Clone)]
pub struct KeyPair {
    signing_key: Ed25519SigningKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let signing_key = Ed25519SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create keypair from seed bytes
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = Ed25519SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Create keypair from secret key bytes
    pub fn from_secret_bytes(bytes: &[u8]) -> BallotResult<Self> {
        if bytes.len() != SECRET_KEY_LENGTH {
            return Err(BallotError::InvalidPrivateKey);
        }
        let mut seed = Zeroizing::new([0u8; 32]);
        seed.copy_from_slice(bytes);
        Ok(Self::from_seed(&seed))
    }

    /// Create keypair from a hex-encoded secret key
    pub fn from_secret_hex(secret_hex: &str) -> BallotResult<Self> {
        let bytes = Zeroizing::new(
            hex::decode(secret_hex.trim()).map_err(|_| BallotError::InvalidPrivateKey)?,
        );
        Self::from_secret_bytes(&bytes)
    }

    /// Get the public key
    pub fn public_key(&self) -> PublicKey {
        let verifying_key = self.signing_key.verifying_key();
        PublicKey::from_bytes(verifying_key.to_bytes())
    }

    /// Get the address (hash of public key)
    pub fn address(&self) -> Address {
        address_from_public_key(&self.public_key())
    }

    /// Get the secret key bytes. Callers are responsible for not leaking them.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    pub(crate) fn signing_key(&self) -> &Ed25519SigningKey {
        &self.signing_key
    }
}

/// Derive address from public key using BLAKE3 hash
pub fn address_from_public_key(public_key: &PublicKey) -> Address {
    let hash = blake3_hash(public_key.as_bytes());
    Address::from_bytes(*hash.as_bytes())
}

/// Verify that an address matches a public key
pub fn verify_address(address: &Address, public_key: &PublicKey) -> bool {
    let derived = address_from_public_key(public_key);
    address == &derived
}

/// Convert our PublicKey type to Ed25519 verifying key
pub fn public_key_to_ed25519(key: &PublicKey) -> BallotResult<Ed25519VerifyingKey> {
    Ed25519VerifyingKey::from_bytes(key.as_bytes()).map_err(|_| BallotError::InvalidPublicKey)
}
