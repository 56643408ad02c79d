//! Shared chain objects for pollbus.
//!
//! The JSON-RPC client lives behind the `client` feature so crates that
//! only need the types do not pull in `reqwest`.

pub mod objects;

#[cfg(feature = "client")]
pub mod client;
