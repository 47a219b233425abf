//! Transport error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("address already in use: {0}")]
    AddrInUse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation not valid in the current socket state")]
    InvalidState,

    #[error("peer {0} is gone")]
    PeerGone(u64),

    #[error("socket closed")]
    Closed,
}
