//! Head follower: turns new blocks into bus ticks.

use crate::chain::ChainSource;
use pollbus_core::EventService;
use pollbus_sdk::objects::block::BlockContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct HeadFollower<C> {
    chain: Arc<C>,
    service: EventService<BlockContext>,
    interval: Duration,
    last_seen: Option<u64>,
}

impl<C: ChainSource> HeadFollower<C> {
    pub fn new(chain: Arc<C>, service: EventService<BlockContext>, interval: Duration) -> Self {
        Self {
            chain,
            service,
            interval,
            last_seen: None,
        }
    }

    /// Poll the head forever. Never returns; drop the future to stop.
    pub async fn run(mut self) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "Following chain head");

        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// Ask for the latest block and ping the bus if it is new.
    ///
    /// Returns whether the bus was pinged. RPC failures are logged and
    /// retried on the next call.
    pub async fn tick(&mut self) -> bool {
        let block = match self.chain.latest_block().await {
            Ok(block) => block,
            Err(e) => {
                warn!(error = %e, "Failed to fetch latest block");
                return false;
            }
        };

        if self.last_seen.is_some_and(|last| block.number <= last) {
            debug!(block = block.number, "No new block");
            return false;
        }

        debug!(%block, "New block");
        self.last_seen = Some(block.number);
        self.service.ping(Some(block)).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::fake::FakeChain;

    fn follower() -> (Arc<FakeChain>, EventService<BlockContext>, HeadFollower<FakeChain>) {
        let chain = Arc::new(FakeChain::default());
        let service = EventService::new();
        let follower = HeadFollower::new(chain.clone(), service.clone(), Duration::from_secs(1));
        (chain, service, follower)
    }

    #[tokio::test]
    async fn test_pings_only_on_new_blocks() {
        let (chain, service, mut follower) = follower();
        chain.set_head(100);
        assert!(follower.tick().await);
        assert_eq!(service.current_block().map(|b| b.number), Some(100));

        assert!(!follower.tick().await);

        // reorg to a lower height is not a new tick
        chain.set_head(99);
        assert!(!follower.tick().await);
        assert_eq!(service.current_block().map(|b| b.number), Some(100));

        chain.set_head(102);
        assert!(follower.tick().await);
        assert_eq!(service.current_block().map(|b| b.number), Some(102));
    }

    #[tokio::test]
    async fn test_rpc_failure_is_retried() {
        let (chain, service, mut follower) = follower();
        assert!(!follower.tick().await);
        assert!(service.current_block().is_none());

        chain.set_head(1);
        assert!(follower.tick().await);
        assert_eq!(service.current_block().map(|b| b.number), Some(1));
    }

    #[tokio::test]
    async fn test_run_pings_on_first_tick() {
        let (chain, service, follower) = follower();
        chain.set_head(7);

        let stopped = time::timeout(Duration::from_millis(50), follower.run()).await;

        assert!(stopped.is_err());
        assert_eq!(service.current_block().map(|b| b.number), Some(7));
    }
}
