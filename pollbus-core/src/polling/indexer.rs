use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out event indices 0, 1, 2, ... for one emitter.
#[derive(Debug, Default)]
pub struct Indexer {
    next: AtomicU64,
}

impl Indexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume and return the next index.
    pub fn next_index(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The index the next call to [`next_index`](Self::next_index) returns.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}
