//! Ballot Core Library
//! 
//! Core types, traits, and configuration for the Ballot election ledger.
//! Every other Ballot crate builds on the definitions in here.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
