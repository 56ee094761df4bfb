//! Ballot Cryptography Module
//! 
//! Caller identities for the election ledger:
//! - Ed25519 keypairs and signatures
//! - BLAKE3 hashing, addresses and state roots

pub mod keys;
pub mod signing;
pub mod hashing;

pub use keys::*;
pub use signing::*;
pub use hashing::*;
