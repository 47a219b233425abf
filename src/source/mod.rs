//! Stream source
//!
//! The producing side of a stream. A [`StreamSource`] answers control
//! requests from sinks and broadcasts the media frames handed to
//! [`StreamSource::send_live_media_frame`].
//!
//! ```text
//!   producer ── send_live_media_frame() ──► [broadcast] ──► sinks
//!                                              ▲
//!   worker task ── tick: bps, leases, info ────┘
//!        │
//!        └── [control] ◄── metadata / key frame / statistic /
//!                           heartbeat / client list / custom opcodes
//! ```

pub mod config;
pub mod engine;
pub mod handler;
pub mod listener;

pub use config::SourceConfig;
pub use engine::StreamSource;
pub use handler::{ApiHandler, Responder, RpcRequest};
pub use listener::SourceListener;
