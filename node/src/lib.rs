//! Ballot Node Implementation
//! 
//! Serves one election over HTTP:
//! - Storage backend selection and genesis initialization
//! - Signed call verification with expiry and replay protection
//! - HTTP API for calls, tallies and voter lookups

mod api;
mod node;
mod runtime;

pub use api::*;
pub use node::*;
pub use runtime::*;
