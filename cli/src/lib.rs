//! Ballot CLI Library
//!
//! Wallets holding caller keys, and a client for the node HTTP API.

pub mod commands;
pub mod wallet;

pub use commands::*;
pub use wallet::*;
