//! State getters, payload schemas and the fetcher that merges them.

use crate::error::{BoxError, FetchError, StateError};
use compact_str::CompactString;
use futures_util::future::{BoxFuture, try_join_all};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

type GetterFn = dyn Fn() -> BoxFuture<'static, Result<Value, StateError>> + Send + Sync;

/// A no-argument async producer of one piece of external state.
///
/// Cheap to clone; clones share the same closure.
#[derive(Clone)]
pub struct StateGetter(Arc<GetterFn>);

impl StateGetter {
    /// Wrap an async closure.
    ///
    /// The produced value is serialized into a JSON value so snapshots can be
    /// compared structurally and shipped as event payloads.
    pub fn new<F, Fut, T, E>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        Self(Arc::new(move || -> BoxFuture<'static, Result<Value, StateError>> {
            let pending = f();
            Box::pin(async move {
                let state = pending.await.map_err(StateError::new)?;
                serde_json::to_value(state).map_err(StateError::new)
            })
        }))
    }

    /// Run the getter once.
    pub async fn get(&self) -> Result<Value, StateError> {
        (self.0)().await
    }
}

impl std::fmt::Debug for StateGetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StateGetter")
    }
}

/// Named state getters that together describe one snapshot.
///
/// Fixed once it is handed to a poll.
#[derive(Debug, Clone, Default)]
pub struct PayloadSchema {
    fields: Vec<(CompactString, StateGetter)>,
}

impl PayloadSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. A field registered twice keeps the later getter.
    pub fn field(mut self, name: impl Into<CompactString>, getter: StateGetter) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = getter,
            None => self.fields.push((name, getter)),
        }
        self
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The merged result of one payload fetch: field name to fetched value.
///
/// Equality is structural over every field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<CompactString, Value>);

impl Snapshot {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The snapshot as a JSON object, the shape listeners receive.
    pub fn to_payload(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(field, value)| (field.to_string(), value.clone()))
                .collect(),
        )
    }
}

impl FromIterator<(CompactString, Value)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (CompactString, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Turns a [`PayloadSchema`] into [`Snapshot`]s.
#[derive(Debug, Clone)]
pub struct PayloadFetcher {
    schema: PayloadSchema,
}

impl PayloadFetcher {
    pub fn new(schema: PayloadSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &PayloadSchema {
        &self.schema
    }

    /// Fetch every field concurrently and merge the results.
    ///
    /// All getters are in flight at the same time. If any of them fails the
    /// whole fetch fails.
    pub async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let pending = self.schema.fields.iter().map(|(field, getter)| async move {
            match getter.get().await {
                Ok(state) => Ok((field.clone(), state)),
                Err(source) => Err(FetchError {
                    field: field.clone(),
                    source,
                }),
            }
        });

        let states = try_join_all(pending).await?;
        Ok(states.into_iter().collect())
    }
}
