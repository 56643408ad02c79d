//! JSON-RPC client for an Ethereum node.
//!
//! Gated behind the `client` cargo feature.

mod rpc;

pub use rpc::RpcClient;

use crate::objects::quantity::QuantityError;

/// Errors produced by the node client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The response carried neither a result nor an error.
    #[error("rpc method {0} returned no result")]
    MissingResult(String),

    /// Response body could not be deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A hex quantity in the response could not be parsed.
    #[error("quantity error: {0}")]
    Quantity(#[from] QuantityError),
}
