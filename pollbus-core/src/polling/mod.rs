//! Polling building blocks.
//!
//! - [`Indexer`]: per-emitter event counter
//! - [`PayloadFetcher`]: runs a [`PayloadSchema`] into a [`Snapshot`]
//! - [`MemoizedPoll`]: hot/cold poll that emits only when its snapshot changes

pub mod fetcher;
pub mod indexer;
pub mod memoized_poll;

pub use fetcher::{PayloadFetcher, PayloadSchema, Snapshot, StateGetter};
pub use indexer::Indexer;
pub use memoized_poll::{EventSink, MemoizedPoll, Poll};
