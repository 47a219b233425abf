//! Sink configuration

use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::constants::*;
use crate::registry::ClientInfo;

/// Sink configuration options
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Identity announced to the source with every heartbeat
    pub client_info: ClientInfo,

    /// Received broadcast messages buffered before new ones are dropped
    pub sub_queue_size: usize,

    /// Worker tick; heartbeats are checked on every tick
    pub heartbeat_interval: Duration,

    /// An unanswered heartbeat is abandoned after this long
    pub heartbeat_timeout: Duration,

    /// Delay before retrying after a rejected heartbeat
    pub heartbeat_retry: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            client_info: ClientInfo::default(),
            sub_queue_size: DEFAULT_HWM,
            heartbeat_interval: SINK_HEARTBEAT_INTERVAL,
            heartbeat_timeout: HEARTBEAT_REPLY_TIMEOUT,
            heartbeat_retry: HEARTBEAT_RETRY_DELAY,
        }
    }
}

impl SinkConfig {
    /// Create a config announcing `client_info`
    pub fn new(client_info: ClientInfo) -> Self {
        Self {
            client_info,
            ..Default::default()
        }
    }

    pub fn sub_queue_size(mut self, size: usize) -> Self {
        self.sub_queue_size = size;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn heartbeat_retry(mut self, delay: Duration) -> Self {
        self.heartbeat_retry = delay;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sub_queue_size == 0 {
            return Err(Error::Param("subscription queue size must be positive".into()));
        }
        if self.heartbeat_interval.is_zero() || self.heartbeat_timeout.is_zero() {
            return Err(Error::Param("heartbeat durations must be positive".into()));
        }
        Ok(())
    }
}
