//! Protocol constants

use std::time::Duration;

// Socket addressing

/// Directory name under the system temp dir that holds local stream sockets
pub const STREAM_SOCKET_PREFIX: &str = "stsw_stream";
/// Control (request/reply) socket name
pub const API_SOCKET_NAME: &str = "api";
/// Broadcast (publish/subscribe) socket name
pub const PUBLISH_SOCKET_NAME: &str = "broadcast";

/// Maximum stream name length (exclusive)
pub const MAX_STREAM_NAME_LEN: usize = 64;

// Broadcast channels

/// Channel carrying media frames
pub const MEDIA_CHANNEL: &str = "media";
/// Channel carrying stream-info messages
pub const STREAM_INFO_CHANNEL: &str = "info";

// Queues

/// Default per-subscriber queue bound (messages)
pub const DEFAULT_HWM: usize = 250;
/// Largest multipart message accepted off the wire
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

// Leases

/// Lease granted to a client by a heartbeat, in seconds
pub const CLIENT_LEASE_SECS: u32 = 15;
/// Maximum number of registered clients per source
pub const MAX_CLIENT_NUM: usize = 32767;

// Timing

/// Event loop poll ceiling
pub const POLL_CEILING: Duration = Duration::from_millis(100);
/// Source heartbeat tick
pub const SOURCE_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);
/// Sink heartbeat tick
pub const SINK_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);
/// How long a sink waits for a heartbeat reply before resetting its socket
pub const HEARTBEAT_REPLY_TIMEOUT: Duration = Duration::from_millis(3000);
/// Delay before retrying after a rejected or malformed heartbeat reply
pub const HEARTBEAT_RETRY_DELAY: Duration = Duration::from_millis(5000);
/// Delay between transport reconnect attempts
pub const RECONNECT_INTERVAL: Duration = Duration::from_millis(100);
