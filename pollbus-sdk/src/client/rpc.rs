use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

use super::ClientError;
use crate::objects::block::{BlockContext, RawBlockHeader};
use crate::objects::quantity::{parse_quantity, parse_u64_quantity};
use crate::objects::rpc::{RpcRequest, RpcResponse};

/// Typed client for the subset of the Ethereum JSON-RPC API the watcher
/// needs.
#[derive(Debug)]
pub struct RpcClient {
    http: Client,
    url: Url,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a new `RpcClient` talking to the node at `url`.
    pub fn new(url: Url) -> Self {
        Self {
            http: Client::new(),
            url,
            next_id: AtomicU64::new(1),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts or a proxy).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `eth_blockNumber`
    pub async fn block_number(&self) -> Result<u64, ClientError> {
        let raw: String = self.call("eth_blockNumber", [(); 0]).await?;
        Ok(parse_u64_quantity(&raw)?)
    }

    /// `eth_getBlockByNumber("latest", false)`
    pub async fn latest_block(&self) -> Result<BlockContext, ClientError> {
        let raw: RawBlockHeader = self
            .call("eth_getBlockByNumber", ("latest", false))
            .await?;
        Ok(BlockContext::try_from(raw)?)
    }

    /// `eth_getBalance(address, "latest")`, in wei.
    pub async fn balance(&self, address: &str) -> Result<u128, ClientError> {
        let raw: String = self.call("eth_getBalance", (address, "latest")).await?;
        Ok(parse_quantity(&raw)?)
    }

    /// `eth_getTransactionCount(address, "latest")`
    pub async fn transaction_count(&self, address: &str) -> Result<u64, ClientError> {
        let raw: String = self
            .call("eth_getTransactionCount", (address, "latest"))
            .await?;
        Ok(parse_u64_quantity(&raw)?)
    }

    async fn call<P, T>(&self, method: &str, params: P) -> Result<T, ClientError>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);

        let resp = self
            .http
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let bytes = resp.bytes().await?;
        let response: RpcResponse<T> = serde_json::from_slice(&bytes)?;
        match (response.result, response.error) {
            (_, Some(error)) => Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(ClientError::MissingResult(method.to_string())),
        }
    }
}
