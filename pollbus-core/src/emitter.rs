//! Emitters: isolated publish/subscribe channels that own their polls.

use crate::config::HeatFailurePolicy;
use crate::error::BusError;
use crate::events::{ERROR_EVENT, EmitterId, Event, EventType, ListenerId};
use crate::log::{self, ErrorLog};
use crate::polling::{EventSink, MemoizedPoll, PayloadSchema, Poll};
use crate::service::ServiceShared;
use crate::utils::locks;
use compact_str::CompactString;
use futures_util::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::debug;

/// Callback invoked synchronously for every delivered event.
pub type Listener<B> = Arc<dyn Fn(&Event<B>) + Send + Sync>;

struct ListenerEntry<B> {
    id: ListenerId,
    listener: Listener<B>,
}

struct EmitterInner<B> {
    id: EmitterId,
    group: Option<CompactString>,
    heat_failure: HeatFailurePolicy,
    indexer: crate::polling::Indexer,
    /// Listeners per event type, in registration order.
    listeners: Mutex<HashMap<EventType, Vec<ListenerEntry<B>>>>,
    next_listener: AtomicU64,
    polls: RwLock<Vec<Arc<dyn Poll>>>,
    disposed: AtomicBool,
    error_log: Arc<dyn ErrorLog>,
    service: Weak<ServiceShared<B>>,
}

/// A publish/subscribe channel.
///
/// Cloning an `Emitter` yields another handle to the same channel.
///
/// Polls registered with [`register_poll_events`](Self::register_poll_events)
/// are heated when their event type gets its first listener and cooled when
/// it loses its last one, so an emitter nobody listens to costs nothing per
/// tick.
pub struct Emitter<B> {
    inner: Arc<EmitterInner<B>>,
}

impl<B> Clone for Emitter<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B> std::fmt::Debug for Emitter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("id", &self.inner.id)
            .field("group", &self.inner.group)
            .field("disposed", &self.inner.disposed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<B> Emitter<B>
where
    B: Clone + Send + Sync + 'static,
{
    /// Build an emitter whose `error` events are forwarded to `error_log`.
    pub(crate) fn new(
        id: EmitterId,
        group: Option<CompactString>,
        heat_failure: HeatFailurePolicy,
        service: Weak<ServiceShared<B>>,
        error_log: Arc<dyn ErrorLog>,
    ) -> Self {
        let emitter = Self {
            inner: Arc::new(EmitterInner {
                id,
                group,
                heat_failure,
                indexer: crate::polling::Indexer::new(),
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(0),
                polls: RwLock::new(Vec::new()),
                disposed: AtomicBool::new(false),
                error_log: Arc::clone(&error_log),
                service,
            }),
        };

        let id = emitter.inner.id.clone();
        emitter.add_listener(
            ERROR_EVENT,
            Arc::new(move |event: &Event<B>| {
                if let Some(message) = event.error_message() {
                    log::report(error_log.as_ref(), &id, message);
                }
            }),
        );
        emitter
    }

    pub fn id(&self) -> &EmitterId {
        &self.inner.id
    }

    /// Label given at build time, e.g. `"cdp"`.
    pub fn group(&self) -> Option<&str> {
        self.inner.group.as_deref()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Register a listener for `kind`.
    ///
    /// Afterwards every cold poll whose event type has listeners is heated;
    /// polls that are already hot are left alone. Once the emitter is
    /// disposed this registers nothing.
    pub async fn on<F>(&self, kind: impl Into<EventType>, listener: F) -> ListenerId
    where
        F: Fn(&Event<B>) + Send + Sync + 'static,
    {
        if self.is_disposed() {
            debug!(emitter = %self.inner.id, "Ignoring listener on disposed emitter");
            return self.allocate_listener_id();
        }

        let id = self.add_listener(kind, Arc::new(listener));

        let cold: Vec<Arc<dyn Poll>> = {
            let listeners = locks::lock(&self.inner.listeners);
            locks::read(&self.inner.polls)
                .iter()
                .filter(|poll| has_listeners(&listeners, poll.event_type()) && !poll.is_live())
                .cloned()
                .collect()
        };
        join_all(cold.iter().map(|poll| poll.heat(self))).await;

        id
    }

    /// Unregister a listener. Returns whether it was registered.
    ///
    /// Afterwards every poll whose event type has no listeners left is cooled.
    pub fn remove_listener(&self, kind: &str, id: ListenerId) -> bool {
        let mut listeners = locks::lock(&self.inner.listeners);
        let removed = match listeners.get_mut(kind) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|entry| entry.id != id);
                let removed = entries.len() != before;
                if entries.is_empty() {
                    listeners.remove(kind);
                }
                removed
            }
            None => false,
        };

        for poll in locks::read(&self.inner.polls).iter() {
            if !has_listeners(&listeners, poll.event_type()) {
                poll.cool();
            }
        }
        removed
    }

    /// Number of listeners currently registered for `kind`.
    pub fn listener_count(&self, kind: &str) -> usize {
        locks::lock(&self.inner.listeners)
            .get(kind)
            .map_or(0, Vec::len)
    }

    /// Deliver an event to every listener of `kind`, in registration order.
    ///
    /// Without listeners this is a no-op: no event is built and no index is
    /// consumed. `block` defaults to the service's latest tick context.
    ///
    /// Listeners run synchronously on the caller's task, outside of any
    /// lock; a panicking listener unwinds into the caller.
    pub fn emit(&self, kind: &str, payload: Value, block: Option<B>) {
        if self.is_disposed() {
            return;
        }

        let listeners: Vec<Listener<B>> = match locks::lock(&self.inner.listeners).get(kind) {
            Some(entries) => entries.iter().map(|entry| Arc::clone(&entry.listener)).collect(),
            None => return,
        };

        let block = block.or_else(|| {
            self.inner
                .service
                .upgrade()
                .and_then(|service| service.current_block())
        });
        let event = Event {
            kind: kind.into(),
            payload,
            block,
            index: self.inner.indexer.next_index(),
        };

        for listener in listeners {
            listener(&event);
        }
    }

    /// Add one memoized poll per entry of `events`.
    ///
    /// Nothing is added if any entry is rejected. Register polls before
    /// attaching listeners; a poll registered for a type that already has
    /// listeners stays cold until the next [`on`](Self::on) or
    /// [`start_polls`](Self::start_polls).
    pub fn register_poll_events<I, K>(&self, events: I) -> Result<(), BusError>
    where
        I: IntoIterator<Item = (K, PayloadSchema)>,
        K: Into<EventType>,
    {
        let events: Vec<(EventType, PayloadSchema)> = events
            .into_iter()
            .map(|(kind, schema)| (kind.into(), schema))
            .collect();

        let mut polls = locks::write(&self.inner.polls);
        for (index, (kind, _)) in events.iter().enumerate() {
            if kind == ERROR_EVENT {
                return Err(BusError::ReservedEventType(kind.clone()));
            }
            let taken = polls.iter().any(|poll| poll.event_type() == kind.as_str())
                || events[..index].iter().any(|(earlier, _)| earlier == kind);
            if taken {
                return Err(BusError::DuplicatePoll {
                    emitter: self.inner.id.clone(),
                    event_type: kind.clone(),
                });
            }
        }

        for (kind, schema) in events {
            debug!(emitter = %self.inner.id, event_type = %kind, fields = schema.len(), "Registered poll");
            polls.push(Arc::new(MemoizedPoll::new(kind, schema, self.inner.heat_failure)));
        }
        Ok(())
    }

    /// Event types of the polls this emitter owns, in registration order.
    pub fn poll_types(&self) -> Vec<EventType> {
        locks::read(&self.inner.polls)
            .iter()
            .map(|poll| poll.event_type().into())
            .collect()
    }

    /// Whether the poll for `kind` is hot.
    pub fn is_poll_live(&self, kind: &str) -> bool {
        locks::read(&self.inner.polls)
            .iter()
            .any(|poll| poll.event_type() == kind && poll.is_live())
    }

    /// Permanently disable this emitter and remove it from its service.
    ///
    /// The default emitter cannot be disposed: the attempt is reported to
    /// the error log and the emitter keeps working.
    pub fn dispose(&self) {
        if self.inner.id.is_default() {
            log::report(
                self.inner.error_log.as_ref(),
                &self.inner.id,
                "cannot dispose default emitter",
            );
            return;
        }

        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop_polls();
        if let Some(service) = self.inner.service.upgrade() {
            service.remove_emitter(&self.inner.id);
        }
        debug!(emitter = %self.inner.id, "Emitter disposed");
    }

    /// Heat every owned poll, regardless of listeners.
    pub async fn start_polls(&self) {
        let polls = self.polls();
        join_all(polls.iter().map(|poll| poll.heat(self))).await;
    }

    /// Cool every owned poll, regardless of listeners.
    pub fn stop_polls(&self) {
        for poll in locks::read(&self.inner.polls).iter() {
            poll.cool();
        }
    }

    /// Forward a tick to every owned poll.
    pub(crate) async fn ping_polls(&self) {
        let polls = self.polls();
        join_all(polls.iter().map(|poll| poll.ping(self))).await;
    }

    fn polls(&self) -> Vec<Arc<dyn Poll>> {
        locks::read(&self.inner.polls).clone()
    }

    fn allocate_listener_id(&self) -> ListenerId {
        ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed))
    }

    fn add_listener(&self, kind: impl Into<EventType>, listener: Listener<B>) -> ListenerId {
        let id = self.allocate_listener_id();
        locks::lock(&self.inner.listeners)
            .entry(kind.into())
            .or_default()
            .push(ListenerEntry { id, listener });
        id
    }
}

impl<B> EventSink for Emitter<B>
where
    B: Clone + Send + Sync + 'static,
{
    fn emit_payload(&self, kind: &str, payload: Value) {
        self.emit(kind, payload, None);
    }
}

fn has_listeners<B>(listeners: &HashMap<EventType, Vec<ListenerEntry<B>>>, kind: &str) -> bool {
    listeners.get(kind).is_some_and(|entries| !entries.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventService;
    use crate::polling::StateGetter;
    use serde_json::json;
    use std::convert::Infallible;

    fn constant(value: i64) -> PayloadSchema {
        PayloadSchema::new().field(
            "value",
            StateGetter::new(move || async move { Ok::<_, Infallible>(value) }),
        )
    }

    fn recorder() -> (Arc<Mutex<Vec<Event<u64>>>>, impl Fn(&Event<u64>) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |event: &Event<u64>| sink.lock().unwrap().push(event.clone()))
    }

    #[test]
    fn test_register_rejects_reserved_error_type() {
        let service: EventService<u64> = EventService::new();
        let emitter = service.build_emitter();

        let err = emitter
            .register_poll_events([("DEBT", constant(1)), (ERROR_EVENT, constant(2))])
            .unwrap_err();

        assert!(matches!(err, BusError::ReservedEventType(kind) if kind == ERROR_EVENT));
        assert!(emitter.poll_types().is_empty());
    }

    #[test]
    fn test_register_rejects_duplicate_types() {
        let service: EventService<u64> = EventService::new();
        let emitter = service.build_emitter();

        emitter.register_poll_events([("DEBT", constant(1))]).unwrap();
        let err = emitter
            .register_poll_events([("COLLATERAL", constant(1)), ("DEBT", constant(2))])
            .unwrap_err();
        assert!(matches!(err, BusError::DuplicatePoll { .. }));

        let err = emitter
            .register_poll_events([("A", constant(1)), ("A", constant(2))])
            .unwrap_err();
        assert!(matches!(err, BusError::DuplicatePoll { event_type, .. } if event_type == "A"));

        assert_eq!(emitter.poll_types(), vec![EventType::from("DEBT")]);
    }

    #[tokio::test]
    async fn test_emit_delivers_in_registration_order() {
        let service: EventService<u64> = EventService::new();
        let emitter = service.build_emitter();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            emitter
                .on("PING", move |_: &Event<u64>| order.lock().unwrap().push(tag))
                .await;
        }
        emitter.emit("PING", json!({}), Some(1));

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_explicit_block_overrides_current_tick() {
        let service: EventService<u64> = EventService::new();
        let emitter = service.build_emitter();
        let (seen, listener) = recorder();
        emitter.on("PING", listener).await;

        emitter.emit("PING", json!(1), None);
        service.ping(Some(40)).await;
        emitter.emit("PING", json!(2), None);
        emitter.emit("PING", json!(3), Some(7));

        let blocks: Vec<Option<u64>> = seen.lock().unwrap().iter().map(|e| e.block).collect();
        assert_eq!(blocks, vec![None, Some(40), Some(7)]);
    }

    #[tokio::test]
    async fn test_listener_may_unsubscribe_itself_while_emitting() {
        let service: EventService<u64> = EventService::new();
        let emitter = service.build_emitter();
        let calls = Arc::new(AtomicU64::new(0));
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let id = {
            let emitter = emitter.clone();
            let calls = Arc::clone(&calls);
            let slot = Arc::clone(&slot);
            emitter
                .clone()
                .on("ONCE", move |_: &Event<u64>| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if let Some(id) = *slot.lock().unwrap() {
                        emitter.remove_listener("ONCE", id);
                    }
                })
                .await
        };
        *slot.lock().unwrap() = Some(id);

        emitter.emit("ONCE", json!(null), None);
        emitter.emit("ONCE", json!(null), None);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count("ONCE"), 0);
    }

    #[tokio::test]
    async fn test_remove_unknown_listener_is_ignored() {
        let service: EventService<u64> = EventService::new();
        let emitter = service.build_emitter();
        let (_, listener) = recorder();
        let id = emitter.on("PING", listener).await;

        assert!(!emitter.remove_listener("OTHER", id));
        assert!(emitter.remove_listener("PING", id));
        assert!(!emitter.remove_listener("PING", id));
    }

    #[tokio::test]
    async fn test_disposed_emitter_ignores_on_and_emit() {
        let service: EventService<u64> = EventService::new();
        let emitter = service.build_emitter();
        emitter.register_poll_events([("DEBT", constant(1))]).unwrap();
        let (seen, listener) = recorder();
        emitter.on("DEBT", listener).await;
        assert!(emitter.is_poll_live("DEBT"));

        emitter.dispose();
        emitter.dispose();

        assert!(emitter.is_disposed());
        assert!(!emitter.is_poll_live("DEBT"));
        assert!(service.emitter(emitter.id()).is_none());

        let (late, late_listener) = recorder();
        emitter.on("DEBT", late_listener).await;
        emitter.emit("DEBT", json!(1), None);
        assert!(seen.lock().unwrap().is_empty());
        assert!(late.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_and_stop_polls_ignore_listeners() {
        let service: EventService<u64> = EventService::new();
        let emitter = service.build_emitter();
        emitter
            .register_poll_events([("DEBT", constant(1)), ("COLLATERAL", constant(2))])
            .unwrap();

        emitter.start_polls().await;
        assert!(emitter.is_poll_live("DEBT"));
        assert!(emitter.is_poll_live("COLLATERAL"));

        emitter.stop_polls();
        assert!(!emitter.is_poll_live("DEBT"));
        assert!(!emitter.is_poll_live("COLLATERAL"));
    }

    #[derive(Default)]
    struct RecordingLog {
        messages: Mutex<Vec<String>>,
    }

    impl ErrorLog for RecordingLog {
        fn error(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn test_disposing_default_is_reported_after_service_dropped() {
        let log = Arc::new(RecordingLog::default());
        let service: EventService<u64> =
            EventService::with_config(crate::BusConfig::default(), log.clone());
        let default = service.default_emitter().clone();
        drop(service);

        default.dispose();

        assert!(!default.is_disposed());
        assert_eq!(
            *log.messages.lock().unwrap(),
            vec!["Problem encountered in emitter default: cannot dispose default emitter"]
        );
    }
}
