//! Change notifications for a single CDP.
//!
//! A [`CdpWatch`] owns one emitter (group `cdp`) with two polls:
//!
//! - `COLLATERAL`: `{ USD, ETH }`, the collateral value in both units
//! - `DEBT`: `{ dai }`, the outstanding debt
//!
//! How those values are read from the chain is up to the [`CdpValuation`]
//! implementation; the bus only sees them as opaque state getters.

use crate::emitter::Emitter;
use crate::error::BusError;
use crate::events::{Event, EventType, ListenerId};
use crate::polling::{PayloadSchema, StateGetter};
use crate::service::{EmitterOptions, EventService};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const COLLATERAL_EVENT: &str = "COLLATERAL";
pub const DEBT_EVENT: &str = "DEBT";

/// On-chain identifier of a CDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CdpId(pub u64);

impl std::fmt::Display for CdpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reads the valuation of a CDP.
#[async_trait]
pub trait CdpValuation: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn collateral_value_usd(&self, cdp: CdpId) -> Result<Decimal, Self::Error>;

    async fn collateral_value_eth(&self, cdp: CdpId) -> Result<Decimal, Self::Error>;

    async fn debt_value_dai(&self, cdp: CdpId) -> Result<Decimal, Self::Error>;
}

/// Emitter wired to the valuation of one CDP.
pub struct CdpWatch<B> {
    cdp: CdpId,
    emitter: Emitter<B>,
}

impl<B> CdpWatch<B>
where
    B: Clone + Send + Sync + 'static,
{
    pub fn new<V: CdpValuation>(
        service: &EventService<B>,
        cdp: CdpId,
        valuation: Arc<V>,
    ) -> Result<Self, BusError> {
        let emitter = service.build_emitter_with(EmitterOptions::group("cdp"))?;

        let usd = getter(&valuation, cdp, Reading::CollateralUsd);
        let eth = getter(&valuation, cdp, Reading::CollateralEth);
        let dai = getter(&valuation, cdp, Reading::DebtDai);

        let registered = emitter.register_poll_events([
            (
                COLLATERAL_EVENT,
                PayloadSchema::new().field("USD", usd).field("ETH", eth),
            ),
            (DEBT_EVENT, PayloadSchema::new().field("dai", dai)),
        ]);
        if let Err(err) = registered {
            emitter.dispose();
            return Err(err);
        }

        Ok(Self { cdp, emitter })
    }

    pub fn cdp(&self) -> CdpId {
        self.cdp
    }

    pub fn emitter(&self) -> &Emitter<B> {
        &self.emitter
    }

    pub async fn on<F>(&self, kind: impl Into<EventType>, listener: F) -> ListenerId
    where
        F: Fn(&Event<B>) + Send + Sync + 'static,
    {
        self.emitter.on(kind, listener).await
    }

    pub fn remove_listener(&self, kind: &str, id: ListenerId) -> bool {
        self.emitter.remove_listener(kind, id)
    }

    /// Stop watching. The emitter is removed from the service.
    pub fn dispose(self) {
        self.emitter.dispose();
    }
}

#[derive(Debug, Clone, Copy)]
enum Reading {
    CollateralUsd,
    CollateralEth,
    DebtDai,
}

fn getter<V: CdpValuation>(valuation: &Arc<V>, cdp: CdpId, reading: Reading) -> StateGetter {
    let valuation = Arc::clone(valuation);
    StateGetter::new(move || {
        let valuation = Arc::clone(&valuation);
        async move {
            match reading {
                Reading::CollateralUsd => valuation.collateral_value_usd(cdp).await,
                Reading::CollateralEth => valuation.collateral_value_eth(cdp).await,
                Reading::DebtDai => valuation.debt_value_dai(cdp).await,
            }
        }
    })
}
