//! Election Ledger Module for Ballot
//! 
//! Implements the single-election voting ledger:
//! - Owner-gated voter and candidate registration
//! - One vote per registered voter id, cast by its bound address
//! - Live tallies and the current leader
//! - Signed calls binding a caller identity to each mutation

pub mod election;
pub mod transition;
pub mod call;
pub mod ledger;
pub mod genesis;

pub use election::*;
pub use transition::*;
pub use call::*;
pub use ledger::*;
pub use genesis::*;
