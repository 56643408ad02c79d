//! The process-wide registry of emitters and the tick entry point.

use crate::config::BusConfig;
use crate::emitter::Emitter;
use crate::error::BusError;
use crate::events::{EmitterId, Event, EventType, ListenerId};
use crate::log::{ErrorLog, TracingErrorLog};
use crate::polling::PayloadSchema;
use crate::utils::locks;
use compact_str::CompactString;
use futures_util::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, trace};

/// Options for [`EventService::build_emitter_with`].
#[derive(Debug, Clone, Default)]
pub struct EmitterOptions {
    /// Claim the default slot instead of allocating a slug. The slot is
    /// filled when the service is constructed, so this always fails
    /// afterwards.
    pub default_slot: bool,
    /// Free-form label recorded on the emitter, e.g. `"cdp"`.
    pub group: Option<CompactString>,
}

impl EmitterOptions {
    pub fn group(group: impl Into<CompactString>) -> Self {
        Self {
            default_slot: false,
            group: Some(group.into()),
        }
    }
}

/// State shared between the service handle and its emitters.
///
/// Emitters only hold a weak reference to it, so dropping every service
/// handle tears the whole bus down.
pub(crate) struct ServiceShared<B> {
    config: BusConfig,
    error_log: Arc<dyn ErrorLog>,
    emitters: Mutex<HashMap<EmitterId, Emitter<B>>>,
    block: RwLock<Option<B>>,
}

impl<B> ServiceShared<B>
where
    B: Clone + Send + Sync + 'static,
{
    pub(crate) fn current_block(&self) -> Option<B> {
        locks::read(&self.block).clone()
    }

    pub(crate) fn remove_emitter(&self, id: &EmitterId) {
        locks::lock(&self.emitters).remove(id);
    }

    fn emitters_sorted(&self) -> Vec<Emitter<B>> {
        let registry = locks::lock(&self.emitters);
        let mut ids: Vec<&EmitterId> = registry.keys().collect();
        ids.sort();
        ids.into_iter().filter_map(|id| registry.get(id).cloned()).collect()
    }
}

/// Registry of emitters driven by external ticks.
///
/// `B` is the opaque tick context (e.g. a block header) attached to every
/// event. The service has no timer of its own: whoever follows the chain
/// calls [`ping`](Self::ping) once per new block.
///
/// Cloning yields another handle to the same registry.
pub struct EventService<B> {
    shared: Arc<ServiceShared<B>>,
    default: Emitter<B>,
}

impl<B> Clone for EventService<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            default: self.default.clone(),
        }
    }
}

impl<B> EventService<B>
where
    B: Clone + Send + Sync + 'static,
{
    /// Service with the default config that logs through `tracing`.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default(), Arc::new(TracingErrorLog))
    }

    pub fn with_config(config: BusConfig, error_log: Arc<dyn ErrorLog>) -> Self {
        let shared = Arc::new(ServiceShared {
            config,
            error_log,
            emitters: Mutex::new(HashMap::new()),
            block: RwLock::new(None),
        });
        let default = Self::register(&shared, EmitterId::Default, None);
        Self { shared, default }
    }

    fn register(
        shared: &Arc<ServiceShared<B>>,
        id: EmitterId,
        group: Option<CompactString>,
    ) -> Emitter<B> {
        let emitter = Emitter::new(
            id.clone(),
            group,
            shared.config.heat_failure,
            Arc::downgrade(shared),
            Arc::clone(&shared.error_log),
        );
        debug!(emitter = %id, group = ?emitter.group(), "Emitter built");
        locks::lock(&shared.emitters).insert(id, emitter.clone());
        emitter
    }

    pub fn config(&self) -> &BusConfig {
        &self.shared.config
    }

    /// Build and register an emitter with a fresh slug.
    pub fn build_emitter(&self) -> Emitter<B> {
        Self::register(&self.shared, EmitterId::generate(), None)
    }

    pub fn build_emitter_with(&self, options: EmitterOptions) -> Result<Emitter<B>, BusError> {
        if options.default_slot {
            // The default emitter is built with the service and never removed.
            return Err(BusError::DefaultEmitterExists);
        }
        Ok(Self::register(
            &self.shared,
            EmitterId::generate(),
            options.group,
        ))
    }

    /// Advance every live poll of every emitter by one tick.
    ///
    /// `Some(block)` becomes the current tick context before any poll runs;
    /// `None` keeps the previous one. Fetch failures surface as `error`
    /// events, never as a failure of this call.
    pub async fn ping(&self, block: Option<B>) {
        if let Some(block) = block {
            *locks::write(&self.shared.block) = Some(block);
        }

        let emitters = self.shared.emitters_sorted();
        trace!(emitters = emitters.len(), "Pinging emitters");
        join_all(emitters.iter().map(|emitter| emitter.ping_polls())).await;
    }

    /// The latest tick context, if any tick carried one.
    pub fn current_block(&self) -> Option<B> {
        self.shared.current_block()
    }

    pub fn default_emitter(&self) -> &Emitter<B> {
        &self.default
    }

    pub fn emitter(&self, id: &EmitterId) -> Option<Emitter<B>> {
        locks::lock(&self.shared.emitters).get(id).cloned()
    }

    /// Ids of all registered emitters, default first.
    pub fn emitter_ids(&self) -> Vec<EmitterId> {
        let mut ids: Vec<EmitterId> = locks::lock(&self.shared.emitters).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Dispose the emitter registered under `id`.
    ///
    /// Disposing the default emitter is reported to the error log and
    /// otherwise ignored.
    pub fn dispose_emitter(&self, id: &EmitterId) {
        if id.is_default() {
            self.default.dispose();
            return;
        }
        if let Some(emitter) = self.emitter(id) {
            emitter.dispose();
        }
    }

    /// Heat every poll of every emitter.
    pub async fn start_all_polls(&self) {
        let emitters = self.shared.emitters_sorted();
        join_all(emitters.iter().map(|emitter| emitter.start_polls())).await;
    }

    /// Cool every poll of every emitter.
    pub fn stop_all_polls(&self) {
        for emitter in self.shared.emitters_sorted() {
            emitter.stop_polls();
        }
    }

    /// [`Emitter::on`] on the default emitter.
    pub async fn on<F>(&self, kind: impl Into<EventType>, listener: F) -> ListenerId
    where
        F: Fn(&Event<B>) + Send + Sync + 'static,
    {
        self.default.on(kind, listener).await
    }

    /// [`Emitter::emit`] on the default emitter.
    pub fn emit(&self, kind: &str, payload: Value, block: Option<B>) {
        self.default.emit(kind, payload, block);
    }

    /// [`Emitter::remove_listener`] on the default emitter.
    pub fn remove_listener(&self, kind: &str, id: ListenerId) -> bool {
        self.default.remove_listener(kind, id)
    }

    /// [`Emitter::register_poll_events`] on the default emitter.
    pub fn register_poll_events<I, K>(&self, events: I) -> Result<(), BusError>
    where
        I: IntoIterator<Item = (K, PayloadSchema)>,
        K: Into<EventType>,
    {
        self.default.register_poll_events(events)
    }
}

impl<B> Default for EventService<B>
where
    B: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
