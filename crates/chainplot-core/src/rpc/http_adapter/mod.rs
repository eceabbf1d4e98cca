//! [`NodeRpc`](super::NodeRpc) over HTTP JSON-RPC for PIVX-style nodes.
//!
//! `connection` settles the endpoint and credentials, `protocol` frames
//! calls and replies, and `client` sends them.

mod client;
mod connection;
mod protocol;

pub use client::HttpRpcClient;
