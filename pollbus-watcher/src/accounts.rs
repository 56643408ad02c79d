//! One emitter per watched account, reconciled against the configuration.

use crate::chain::ChainSource;
use crate::config::WatchedAccount;
use pollbus_core::{
    BusError, Emitter, EmitterOptions, Event, EventService, PayloadSchema, StateGetter,
};
use pollbus_sdk::objects::block::BlockContext;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Event type carrying `{ balance_wei, nonce }`.
pub const ACCOUNT_EVENT: &str = "ACCOUNT";

const ACCOUNT_GROUP: &str = "account";

struct ActiveAccount {
    address: String,
    emitter: Emitter<BlockContext>,
}

/// Keeps the service's account emitters in step with the configured
/// account list.
pub struct AccountRegistry<C> {
    chain: Arc<C>,
    service: EventService<BlockContext>,
    active: Mutex<HashMap<String, ActiveAccount>>,
}

impl<C: ChainSource> AccountRegistry<C> {
    pub fn new(chain: Arc<C>, service: EventService<BlockContext>) -> Self {
        Self {
            chain,
            service,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Diff the active emitters against `accounts` and reconcile:
    /// - Dispose emitters whose label is gone or whose address changed.
    /// - Build emitters for labels not yet active.
    ///
    /// New emitters are subscribed immediately, so their first state is
    /// fetched before this returns.
    pub async fn apply(&self, accounts: &[WatchedAccount]) -> Result<(), BusError> {
        let mut active = self.active.lock().await;

        active.retain(|label, current| {
            let keep = accounts
                .iter()
                .any(|a| &a.label == label && a.address == current.address);
            if !keep {
                info!(account = %label, address = %current.address, "Disposing removed account emitter");
                current.emitter.dispose();
            }
            keep
        });

        for account in accounts {
            if active.contains_key(&account.label) {
                continue;
            }
            info!(account = %account.label, address = %account.address, "Watching account");
            let emitter = self.build_account_emitter(account).await?;
            active.insert(
                account.label.clone(),
                ActiveAccount {
                    address: account.address.clone(),
                    emitter,
                },
            );
        }
        Ok(())
    }

    #[cfg(test)]
    pub async fn emitter(&self, label: &str) -> Option<Emitter<BlockContext>> {
        self.active
            .lock()
            .await
            .get(label)
            .map(|account| account.emitter.clone())
    }

    pub async fn len(&self) -> usize {
        self.active.lock().await.len()
    }

    async fn build_account_emitter(
        &self,
        account: &WatchedAccount,
    ) -> Result<Emitter<BlockContext>, BusError> {
        let emitter = self
            .service
            .build_emitter_with(EmitterOptions::group(ACCOUNT_GROUP))?;

        let chain = self.chain.clone();
        let address = account.address.clone();
        let balance = StateGetter::new(move || {
            let chain = chain.clone();
            let address = address.clone();
            async move {
                // Wei amounts overflow JSON numbers.
                chain.balance(&address).await.map(|wei| wei.to_string())
            }
        });

        let chain = self.chain.clone();
        let address = account.address.clone();
        let nonce = StateGetter::new(move || {
            let chain = chain.clone();
            let address = address.clone();
            async move { chain.transaction_count(&address).await }
        });

        let schema = PayloadSchema::new()
            .field("balance_wei", balance)
            .field("nonce", nonce);
        if let Err(err) = emitter.register_poll_events([(ACCOUNT_EVENT, schema)]) {
            emitter.dispose();
            return Err(err);
        }

        let label = account.label.clone();
        emitter
            .on(ACCOUNT_EVENT, move |event: &Event<BlockContext>| {
                log_account_change(&label, event)
            })
            .await;
        Ok(emitter)
    }
}

fn log_account_change(label: &str, event: &Event<BlockContext>) {
    match &event.block {
        Some(block) => info!(
            account = %label,
            block = block.number,
            index = event.index,
            state = %event.payload,
            "Account state changed"
        ),
        None => warn!(
            account = %label,
            index = event.index,
            state = %event.payload,
            "Account state changed before the first block"
        ),
    }
}
