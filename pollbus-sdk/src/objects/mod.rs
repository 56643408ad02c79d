pub mod block;
pub mod quantity;
pub mod rpc;
