//! Ballot State Management
//! 
//! Key-value persistence for the election ledger: typed records for the
//! election metadata, candidates, voters and tally, plus in-memory and
//! sled-backed stores with atomic batch commits and state roots.

pub mod store;
pub mod memory;
pub mod persistent;

pub use store::*;
pub use memory::*;
pub use persistent::*;
