//! Synchronous RPC over a request socket
//!
//! Each call borrows the cached request socket (or opens a new one), sends
//! `[packet][blob?]` and waits for the matching reply. A socket whose call
//! timed out or returned garbage is discarded rather than cached, since its
//! request/reply alternation can no longer be trusted.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use prost::Message;

use crate::error::{Error, Result};
use crate::protocol::packet::{self, CommonPacket, PacketType};
use crate::transport::{lock, Endpoint, ReqSocket};

/// Monotonic request sequence numbers shared by all sockets of one sink
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU32);

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next sequence number
    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }
}

/// A validated reply
#[derive(Debug, Clone)]
pub struct RpcResult {
    pub reply: CommonPacket,
    pub blob: Option<Bytes>,
}

/// Request/reply caller with a single cached socket
pub struct RpcClient {
    endpoint: Endpoint,
    cached: Mutex<Option<ReqSocket>>,
    seq: Arc<SequenceCounter>,
}

impl RpcClient {
    pub fn new(endpoint: Endpoint, seq: Arc<SequenceCounter>) -> Self {
        Self {
            endpoint,
            cached: Mutex::new(None),
            seq,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Drop the cached socket
    pub fn reset(&self) {
        lock(&self.cached).take();
    }

    /// Send a request with opcode `code` and wait up to `timeout` for its
    /// reply.
    ///
    /// Fails with `Timeout` if no reply arrives in time, `Parse` if the reply
    /// cannot be decoded, `General` if it does not answer this request, and
    /// `Client`/`Server` if the source reported an error status.
    pub async fn call(
        &self,
        code: i32,
        body: Bytes,
        blob: Option<Bytes>,
        timeout: Duration,
    ) -> Result<RpcResult> {
        let request = CommonPacket::request(code, self.seq.next(), body);

        let cached = lock(&self.cached).take();
        let mut socket = match cached {
            Some(socket) => socket,
            None => ReqSocket::connect(self.endpoint.clone()),
        };

        socket.send(packet::encode(&request, blob))?;

        let parts = match tokio::time::timeout(timeout, socket.recv()).await {
            Ok(parts) => parts?,
            Err(_) => {
                tracing::debug!(
                    endpoint = %self.endpoint,
                    code = code,
                    seq = request.seq(),
                    "RPC call timed out"
                );
                return Err(Error::Timeout(format!(
                    "no reply for code({}) within {:?}",
                    code, timeout
                )));
            }
        };

        let (reply, blob) = packet::decode(parts)?;
        tracing::trace!(
            code = reply.code(),
            seq = reply.seq(),
            status = reply.status(),
            "RPC reply"
        );

        // the exchange completed, so the socket is reusable from here on
        *lock(&self.cached) = Some(socket);

        if reply.kind() != Some(PacketType::Reply)
            || reply.seq() != request.seq()
            || reply.code() != request.code()
        {
            return Err(Error::General(format!(
                "reply mismatch: expected code({}) seq({}), got code({}) seq({})",
                request.code(),
                request.seq(),
                reply.code(),
                reply.seq()
            )));
        }
        reply.check_status()?;

        Ok(RpcResult { reply, blob })
    }

    /// Typed call: encode `body`, check the status and decode the reply body
    pub async fn request<Req, Rep>(&self, code: i32, body: &Req, timeout: Duration) -> Result<Rep>
    where
        Req: Message,
        Rep: Message + Default,
    {
        let result = self
            .call(code, Bytes::from(body.encode_to_vec()), None, timeout)
            .await?;
        result.reply.decode_body()
    }
}
