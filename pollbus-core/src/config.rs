//! Bus configuration.

use serde::{Deserialize, Serialize};

/// What a poll does when the fetch made while heating it fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatFailurePolicy {
    /// Stay cold. Ticks skip the poll until it is heated again (by the next
    /// subscription or an explicit `start_polls`).
    #[default]
    StayCold,
    /// Become live with an empty snapshot, so the next successful tick
    /// emits the state it fetched.
    GoLive,
}

/// Configuration shared by every emitter of an [`EventService`](crate::EventService).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub heat_failure: HeatFailurePolicy,
}
