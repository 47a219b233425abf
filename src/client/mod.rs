//! Control-socket client
//!
//! Provides the synchronous request/reply call used by sinks for every
//! query they send to a source.

pub mod rpc;

pub use rpc::{RpcClient, RpcResult, SequenceCounter};
