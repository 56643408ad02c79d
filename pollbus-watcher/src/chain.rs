//! The node queries the watcher depends on.

use async_trait::async_trait;
use pollbus_sdk::client::{ClientError, RpcClient};
use pollbus_sdk::objects::block::BlockContext;

/// Read access to chain state.
///
/// Implemented by [`RpcClient`]; tests substitute an in-memory chain.
#[async_trait]
pub trait ChainSource: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn latest_block(&self) -> Result<BlockContext, Self::Error>;

    /// Balance in wei at the latest block.
    async fn balance(&self, address: &str) -> Result<u128, Self::Error>;

    /// Nonce at the latest block.
    async fn transaction_count(&self, address: &str) -> Result<u64, Self::Error>;
}

#[async_trait]
impl ChainSource for RpcClient {
    type Error = ClientError;

    async fn latest_block(&self) -> Result<BlockContext, ClientError> {
        RpcClient::latest_block(self).await
    }

    async fn balance(&self, address: &str) -> Result<u128, ClientError> {
        RpcClient::balance(self, address).await
    }

    async fn transaction_count(&self, address: &str) -> Result<u64, ClientError> {
        RpcClient::transaction_count(self, address).await
    }
}
