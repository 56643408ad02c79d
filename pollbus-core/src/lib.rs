//! Adaptive polling event bus.
//!
//! An [`EventService`] owns any number of [`Emitter`]s. Each emitter is an
//! isolated publish/subscribe channel that can own memoized polls: state
//! snapshots that are re-fetched on every external tick, but only while
//! somebody listens for their event type, and that only emit when the
//! snapshot actually changed.
//!
//! # Event Flow
//!
//! 1. The chain follower calls [`EventService::ping`] once per new block
//! 2. Every emitter forwards the ping to each of its polls
//! 3. Live polls re-fetch their snapshot and emit on change
//! 4. Listeners registered with [`Emitter::on`] receive the [`Event`]

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod cdp;
pub mod config;
pub mod emitter;
pub mod error;
pub mod events;
pub mod log;
pub mod polling;
pub mod service;
pub(crate) mod utils;

pub use config::{BusConfig, HeatFailurePolicy};
pub use emitter::{Emitter, Listener};
pub use error::{BusError, FetchError, StateError};
pub use events::{ERROR_EVENT, EmitterId, Event, EventType, ListenerId};
pub use log::{ErrorLog, TracingErrorLog};
pub use polling::{
    EventSink, Indexer, MemoizedPoll, PayloadFetcher, PayloadSchema, Poll, Snapshot, StateGetter,
};
pub use service::{EmitterOptions, EventService};
