//! Event type definitions.

use compact_str::{CompactString, format_compact};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Name of an event type, e.g. `"DEBT"`.
pub type EventType = CompactString;

/// Reserved event type carrying human-readable failure messages.
///
/// Every emitter listens to its own `error` events and forwards them to the
/// service's [`ErrorLog`](crate::ErrorLog).
pub const ERROR_EVENT: &str = "error";

/// An emitted event.
///
/// `index` is assigned by the owning emitter and strictly increases per
/// emitter. `block` is the tick context the event was emitted in; it is only
/// `None` before the service has seen its first tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event<B> {
    #[serde(rename = "type")]
    pub kind: EventType,
    pub payload: Value,
    pub block: Option<B>,
    pub index: u64,
}

impl<B> Event<B> {
    /// The message of an `error` event.
    pub fn error_message(&self) -> Option<&str> {
        if self.kind == ERROR_EVENT {
            self.payload.as_str()
        } else {
            None
        }
    }
}

/// Identity of an emitter inside an [`EventService`](crate::EventService).
///
/// `Default` names the one emitter that exists for the lifetime of the
/// service and can never be disposed. Every other emitter gets a generated
/// slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EmitterId {
    Default,
    Slug(CompactString),
}

impl EmitterId {
    /// Generate a fresh slug.
    ///
    /// Slugs come from UUIDv7 values, so they sort by creation time.
    pub fn generate() -> Self {
        EmitterId::Slug(format_compact!("{}", Uuid::now_v7().simple()))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, EmitterId::Default)
    }
}

impl std::fmt::Display for EmitterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmitterId::Default => write!(f, "default"),
            EmitterId::Slug(slug) => write!(f, "{}", slug),
        }
    }
}

/// Handle for a registered listener, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);
