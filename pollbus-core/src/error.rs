//! Error types for the event bus.

use crate::events::{EmitterId, EventType};
use compact_str::CompactString;
use thiserror::Error;

/// Boxed error produced by a state getter.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by emitter and service operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The event type is reserved by the bus itself.
    #[error("event type `{0}` is reserved")]
    ReservedEventType(EventType),

    /// The emitter already owns a poll for this event type.
    #[error("emitter {emitter} already has a poll for `{event_type}`")]
    DuplicatePoll {
        emitter: EmitterId,
        event_type: EventType,
    },

    /// The default emitter slot is taken for the lifetime of the service.
    #[error("the default emitter already exists")]
    DefaultEmitterExists,
}

/// A single state getter failed.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StateError(BoxError);

impl StateError {
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self(err.into())
    }

    /// The underlying error.
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

/// A payload fetch failed because one of its fields failed.
///
/// No partial snapshot is ever produced.
#[derive(Debug, Error)]
#[error("field `{field}` failed: {source}")]
pub struct FetchError {
    /// Name of the first field whose getter failed.
    pub field: CompactString,
    #[source]
    pub source: StateError,
}
