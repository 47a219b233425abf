//! Stream sink
//!
//! A sink attaches to one source, either over TCP or through the local
//! sockets of a named stream, and runs a single worker task:
//!
//! ```text
//!            +---------------------- worker ----------------------+
//!  source ---| SUB (media, info, custom channels) -> sub handlers |--> SinkListener
//!   pub      |  every tick: LeaseRenewer -> CLIENT_HEARTBEAT      |
//!            +----------------------------------------------------+
//!  source <--- RpcClient (metadata, statistics, key frame, client list, call)
//!   api
//! ```
//!
//! Heartbeats use a socket of their own so a slow application RPC never
//! delays lease renewal.

pub mod config;
pub mod engine;
pub mod heartbeat;
pub mod info;
pub mod listener;

pub use config::SinkConfig;
pub use engine::{StreamSink, SubHandler};
pub use heartbeat::{HeartbeatSchedule, LeaseRenewer};
pub use info::StreamInfo;
pub use listener::SinkListener;
