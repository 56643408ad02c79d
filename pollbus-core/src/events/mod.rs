//! Event and identity types.
//!
//! Events are ephemeral: they are built at emission time, handed to the
//! listeners that are registered at that moment, and dropped.

pub mod types;

pub use types::{ERROR_EVENT, EmitterId, Event, EventType, ListenerId};
