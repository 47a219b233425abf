//! Client lease registry
//!
//! A source keeps one [`ClientInfo`] per remote sink. Sinks renew their
//! entry through periodic heartbeats; entries that go quiet for a full
//! lease are evicted on the source's heartbeat tick.
//!
//! ```text
//!   sink ── heartbeat(ip, port, token) ──► ClientRegistry::touch()
//!                                              │
//!                        source tick ──► ClientRegistry::evict(now)
//!                                              │
//!   sink ── client list(start, n) ─────► ClientRegistry::list()
//! ```
//!
//! Clients are kept in first-seen order so paged listings stay stable
//! between calls.

pub mod client;
pub mod error;
pub mod lease;

pub use client::{ClientInfo, ClientKey};
pub use error::RegistryError;
pub use lease::{ClientRegistry, Touch};
