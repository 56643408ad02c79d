//! Memoized polls.
//!
//! A poll is either cold (skipped on every tick) or hot (re-fetched on every
//! tick). Hot polls compare each fresh snapshot with the last one and emit
//! only when they differ.

use super::fetcher::{PayloadFetcher, PayloadSchema, Snapshot};
use crate::config::HeatFailurePolicy;
use crate::events::{ERROR_EVENT, EventType};
use crate::utils::locks;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Where polls deliver what they emit.
///
/// Implemented by [`Emitter`](crate::Emitter); polls never hold a reference
/// to their owner and receive the sink on every call instead.
pub trait EventSink: Send + Sync {
    fn emit_payload(&self, kind: &str, payload: Value);
}

/// A lazily activated source of change events for one event type.
#[async_trait]
pub trait Poll: Send + Sync {
    /// The event type this poll emits.
    fn event_type(&self) -> &str;

    /// Whether the poll is hot.
    fn is_live(&self) -> bool;

    /// Fetch a fresh snapshot and become hot.
    ///
    /// Never emits a change event. Fetch failures are reported as an
    /// `error` event on `sink`.
    async fn heat(&self, sink: &dyn EventSink);

    /// Become cold. No fetch, no emission.
    fn cool(&self);

    /// Re-fetch and emit if the snapshot changed. No-op while cold.
    async fn ping(&self, sink: &dyn EventSink);
}

#[derive(Debug, Default)]
struct PollState {
    live: bool,
    last: Snapshot,
    /// Bumped by every `cool`. A fetch that started in an earlier epoch is
    /// stale and its result is dropped.
    epoch: u64,
}

/// [`Poll`] backed by a [`PayloadFetcher`] and structural snapshot diffing.
#[derive(Debug)]
pub struct MemoizedPoll {
    event_type: EventType,
    fetcher: PayloadFetcher,
    heat_failure: HeatFailurePolicy,
    state: Mutex<PollState>,
}

impl MemoizedPoll {
    pub fn new(
        event_type: impl Into<EventType>,
        schema: PayloadSchema,
        heat_failure: HeatFailurePolicy,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            fetcher: PayloadFetcher::new(schema),
            heat_failure,
            state: Mutex::new(PollState::default()),
        }
    }

    /// The last snapshot this poll fetched successfully.
    pub fn last_snapshot(&self) -> Snapshot {
        locks::lock(&self.state).last.clone()
    }
}

#[async_trait]
impl Poll for MemoizedPoll {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn is_live(&self) -> bool {
        locks::lock(&self.state).live
    }

    async fn heat(&self, sink: &dyn EventSink) {
        let epoch = locks::lock(&self.state).epoch;

        match self.fetcher.fetch().await {
            Ok(snapshot) => {
                let mut state = locks::lock(&self.state);
                if state.epoch != epoch {
                    debug!(event_type = %self.event_type, "Poll cooled while heating, dropping snapshot");
                    return;
                }
                state.last = snapshot;
                state.live = true;
                debug!(event_type = %self.event_type, "Poll heated");
            }
            Err(err) => {
                warn!(event_type = %self.event_type, error = %err, "Initial state fetch failed");
                if self.heat_failure == HeatFailurePolicy::GoLive {
                    let mut state = locks::lock(&self.state);
                    if state.epoch == epoch && !state.live {
                        state.last = Snapshot::default();
                        state.live = true;
                    }
                }
                let message = format!(
                    "Failed to get initial {} state. Message: {}",
                    self.event_type, err
                );
                sink.emit_payload(ERROR_EVENT, Value::String(message));
            }
        }
    }

    fn cool(&self) {
        let mut state = locks::lock(&self.state);
        state.epoch += 1;
        if state.live {
            state.live = false;
            debug!(event_type = %self.event_type, "Poll cooled");
        }
    }

    async fn ping(&self, sink: &dyn EventSink) {
        let epoch = {
            let state = locks::lock(&self.state);
            if !state.live {
                return;
            }
            state.epoch
        };

        match self.fetcher.fetch().await {
            Ok(next) => {
                let payload = {
                    let mut state = locks::lock(&self.state);
                    if !state.live || state.epoch != epoch {
                        return;
                    }
                    if state.last == next {
                        return;
                    }
                    let payload = next.to_payload();
                    state.last = next;
                    payload
                };
                debug!(event_type = %self.event_type, "Snapshot changed");
                sink.emit_payload(&self.event_type, payload);
            }
            Err(err) => {
                {
                    let state = locks::lock(&self.state);
                    if !state.live || state.epoch != epoch {
                        return;
                    }
                }
                warn!(event_type = %self.event_type, error = %err, "State fetch failed");
                let message = format!(
                    "Failed to get latest {} state. Message: {}",
                    self.event_type, err
                );
                sink.emit_payload(ERROR_EVENT, Value::String(message));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polling::StateGetter;
    use serde_json::json;
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingSink {
        emitted: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingSink {
        fn take(&self) -> Vec<(String, Value)> {
            std::mem::take(&mut *self.emitted.lock().unwrap())
        }
    }

    impl EventSink for RecordingSink {
        fn emit_payload(&self, kind: &str, payload: Value) {
            self.emitted.lock().unwrap().push((kind.to_string(), payload));
        }
    }

    /// Getter that walks through `values` (repeating the last one) and
    /// fails on `None`.
    fn scripted(values: Vec<Option<i64>>) -> (StateGetter, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let getter = StateGetter::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let value = values[n.min(values.len() - 1)];
            async move { value.ok_or("rpc timeout") }
        });
        (getter, calls)
    }

    /// Like [`scripted`], but call number `held` blocks until `gate` is
    /// notified.
    fn gated(values: Vec<i64>, held: usize) -> (StateGetter, Arc<Notify>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let counter = Arc::clone(&calls);
        let release = Arc::clone(&gate);
        let getter = StateGetter::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let value = values[n.min(values.len() - 1)];
            let wait = (n == held).then(|| Arc::clone(&release));
            async move {
                if let Some(gate) = wait {
                    gate.notified().await;
                }
                Ok::<_, Infallible>(value)
            }
        });
        (getter, gate, calls)
    }

    async fn started(calls: &AtomicUsize, count: usize) {
        while calls.load(Ordering::SeqCst) < count {
            tokio::task::yield_now().await;
        }
    }

    fn debt_poll(getter: StateGetter, policy: HeatFailurePolicy) -> MemoizedPoll {
        MemoizedPoll::new("DEBT", PayloadSchema::new().field("dai", getter), policy)
    }

    #[tokio::test]
    async fn test_cold_poll_ignores_ping() {
        let (getter, calls) = scripted(vec![Some(1)]);
        let poll = debt_poll(getter, HeatFailurePolicy::StayCold);
        let sink = RecordingSink::default();

        poll.ping(&sink).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(sink.take().is_empty());
        assert!(!poll.is_live());
    }

    #[tokio::test]
    async fn test_heat_stores_snapshot_without_emitting() {
        let (getter, calls) = scripted(vec![Some(10)]);
        let poll = debt_poll(getter, HeatFailurePolicy::StayCold);
        let sink = RecordingSink::default();

        poll.heat(&sink).await;

        assert!(poll.is_live());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(poll.last_snapshot().get("dai"), Some(&json!(10)));
        assert!(sink.take().is_empty());
    }

    #[tokio::test]
    async fn test_ping_emits_only_on_change() {
        let (getter, _) = scripted(vec![Some(0), Some(1), Some(1), Some(2), Some(2), Some(1)]);
        let poll = debt_poll(getter, HeatFailurePolicy::StayCold);
        let sink = RecordingSink::default();

        poll.heat(&sink).await;
        for _ in 0..5 {
            poll.ping(&sink).await;
        }

        let payloads: Vec<Value> = sink.take().into_iter().map(|(_, p)| p).collect();
        assert_eq!(
            payloads,
            vec![json!({ "dai": 1 }), json!({ "dai": 2 }), json!({ "dai": 1 })]
        );
    }

    #[tokio::test]
    async fn test_reheat_overwrites_snapshot_silently() {
        let (getter, _) = scripted(vec![Some(1), Some(5), Some(5)]);
        let poll = debt_poll(getter, HeatFailurePolicy::StayCold);
        let sink = RecordingSink::default();

        poll.heat(&sink).await;
        poll.heat(&sink).await;
        poll.ping(&sink).await;

        assert_eq!(poll.last_snapshot().get("dai"), Some(&json!(5)));
        assert!(sink.take().is_empty());
    }

    #[tokio::test]
    async fn test_cool_stops_fetching() {
        let (getter, calls) = scripted(vec![Some(1), Some(2)]);
        let poll = debt_poll(getter, HeatFailurePolicy::StayCold);
        let sink = RecordingSink::default();

        poll.heat(&sink).await;
        poll.cool();
        poll.cool();
        poll.ping(&sink).await;

        assert!(!poll.is_live());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sink.take().is_empty());
    }

    #[tokio::test]
    async fn test_failed_heat_stays_cold() {
        let (getter, calls) = scripted(vec![None, Some(3)]);
        let poll = debt_poll(getter, HeatFailurePolicy::StayCold);
        let sink = RecordingSink::default();

        poll.heat(&sink).await;
        poll.ping(&sink).await;

        assert!(!poll.is_live());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let emitted = sink.take();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].0, ERROR_EVENT);
        assert_eq!(
            emitted[0].1,
            json!("Failed to get initial DEBT state. Message: field `dai` failed: rpc timeout")
        );
    }

    #[tokio::test]
    async fn test_failed_heat_goes_live_when_configured() {
        let (getter, _) = scripted(vec![None, Some(3)]);
        let poll = debt_poll(getter, HeatFailurePolicy::GoLive);
        let sink = RecordingSink::default();

        poll.heat(&sink).await;
        assert!(poll.is_live());
        poll.ping(&sink).await;

        let emitted = sink.take();
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].0, ERROR_EVENT);
        assert_eq!(emitted[1], ("DEBT".to_string(), json!({ "dai": 3 })));
    }

    #[tokio::test]
    async fn test_failed_ping_keeps_poll_hot_and_snapshot() {
        let (getter, _) = scripted(vec![Some(4), None, Some(4), Some(6)]);
        let poll = debt_poll(getter, HeatFailurePolicy::StayCold);
        let sink = RecordingSink::default();

        poll.heat(&sink).await;
        poll.ping(&sink).await;
        assert!(poll.is_live());
        assert_eq!(poll.last_snapshot().get("dai"), Some(&json!(4)));

        poll.ping(&sink).await;
        poll.ping(&sink).await;

        let emitted = sink.take();
        assert_eq!(emitted.len(), 2);
        assert_eq!(
            emitted[0].1,
            json!("Failed to get latest DEBT state. Message: field `dai` failed: rpc timeout")
        );
        assert_eq!(emitted[1], ("DEBT".to_string(), json!({ "dai": 6 })));
    }

    #[tokio::test]
    async fn test_ping_result_dropped_after_cool_and_reheat() {
        let (getter, gate, calls) = gated(vec![1, 2, 3], 1);
        let poll = debt_poll(getter, HeatFailurePolicy::StayCold);
        let sink = RecordingSink::default();
        poll.heat(&sink).await;

        tokio::join!(poll.ping(&sink), async {
            started(&calls, 2).await;
            poll.cool();
            poll.heat(&sink).await;
            gate.notify_one();
        });

        assert!(poll.is_live());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(poll.last_snapshot().get("dai"), Some(&json!(3)));
        assert!(sink.take().is_empty());

        poll.ping(&sink).await;
        assert!(sink.take().is_empty());
    }

    #[tokio::test]
    async fn test_heat_result_dropped_after_cool() {
        let (getter, gate, calls) = gated(vec![7], 0);
        let poll = debt_poll(getter, HeatFailurePolicy::StayCold);
        let sink = RecordingSink::default();

        tokio::join!(poll.heat(&sink), async {
            started(&calls, 1).await;
            poll.cool();
            gate.notify_one();
        });

        assert!(!poll.is_live());
        assert!(poll.last_snapshot().is_empty());
        assert!(sink.take().is_empty());
    }
}
