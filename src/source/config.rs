//! Source configuration

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::constants::*;

/// Source configuration options
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Stream name; selects the local socket addresses
    pub stream_name: String,

    /// Also serve on TCP: control on this port, broadcast on the next one
    pub tcp_port: Option<u16>,

    /// Per-subscriber broadcast queue bound
    pub pub_queue_size: usize,

    /// Interval of bitrate computation, lease eviction and stream-info
    /// broadcast
    pub heartbeat_interval: Duration,

    /// Lease granted to clients, in seconds
    pub client_lease_secs: u32,

    /// Maximum registered clients
    pub max_clients: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            stream_name: String::new(),
            tcp_port: None,
            pub_queue_size: DEFAULT_HWM,
            heartbeat_interval: SOURCE_HEARTBEAT_INTERVAL,
            client_lease_secs: CLIENT_LEASE_SECS,
            max_clients: MAX_CLIENT_NUM,
        }
    }
}

impl SourceConfig {
    /// Create a config for stream `name`
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            ..Default::default()
        }
    }

    /// Serve on TCP `port` (control) and `port + 1` (broadcast)
    pub fn tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = Some(port);
        self
    }

    /// Set the per-subscriber queue bound
    pub fn pub_queue_size(mut self, size: usize) -> Self {
        self.pub_queue_size = size;
        self
    }

    /// Set the heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the lease granted to clients
    pub fn client_lease_secs(mut self, secs: u32) -> Self {
        self.client_lease_secs = secs;
        self
    }

    /// Set the maximum number of registered clients
    pub fn max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    /// Check the config before any socket is created
    pub fn validate(&self) -> Result<()> {
        validate_stream_name(&self.stream_name)?;
        if self.tcp_port == Some(u16::MAX) {
            return Err(Error::Param("tcp port leaves no room for the broadcast port".into()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(Error::Param("heartbeat interval must be positive".into()));
        }
        Ok(())
    }
}

/// Stream names become directory names, so they must be a single path
/// component shorter than `MAX_STREAM_NAME_LEN`
pub(crate) fn validate_stream_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() >= MAX_STREAM_NAME_LEN {
        return Err(Error::Param(format!(
            "stream name must be 1 to {} bytes long",
            MAX_STREAM_NAME_LEN - 1
        )));
    }
    if name.contains(|c: char| c == '/' || c == '\\') || name == "." || name == ".." {
        return Err(Error::Param(format!("invalid stream name: {}", name)));
    }
    Ok(())
}
