//! Control request handlers
//!
//! A handler receives the decoded request and a [`Responder`]. The responder
//! is the only way to answer, and it is consumed by answering, so a request
//! gets at most one reply. A responder dropped without answering sends an
//! internal-error reply, so the requester never waits for its timeout.
//! Handlers may move the responder to another task and answer later.

use std::sync::Arc;

use bytes::Bytes;
use prost::Message;

use crate::error::{Error, Result};
use crate::protocol::packet::{self, status, CommonPacket};
use crate::transport::rep::Replier;

/// A request received on the control socket
#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub packet: CommonPacket,
    pub blob: Option<Bytes>,
}

impl RpcRequest {
    pub fn code(&self) -> i32 {
        self.packet.code()
    }

    /// Decode the request body
    pub fn decode_body<M: Message + Default>(&self) -> Result<M> {
        self.packet.decode_body()
    }
}

/// Handler for one opcode
pub type ApiHandler = Arc<dyn Fn(RpcRequest, Responder) + Send + Sync>;

/// Single-use reply path of one request
pub struct Responder {
    code: i32,
    seq: u32,
    peer: u64,
    replier: Option<Replier>,
}

impl Responder {
    pub(crate) fn new(request: &CommonPacket, peer: u64, replier: Replier) -> Self {
        Self {
            code: request.code(),
            seq: request.seq(),
            peer,
            replier: Some(replier),
        }
    }

    /// Opcode of the request being answered
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Send a reply with an explicit status
    pub fn reply(
        mut self,
        status: i32,
        info: &str,
        body: Bytes,
        blob: Option<Bytes>,
    ) -> Result<()> {
        let replier = self
            .replier
            .take()
            .ok_or_else(|| Error::General("reply already sent".into()))?;
        self.send(&replier, status, info, body, blob)
    }

    /// Reply `OK` with `body`
    pub fn ok<M: Message>(self, body: &M) -> Result<()> {
        self.reply(status::OK, "", Bytes::from(body.encode_to_vec()), None)
    }

    /// Reply `OK` without a body
    pub fn ok_empty(self) -> Result<()> {
        self.reply(status::OK, "", Bytes::new(), None)
    }

    /// Reply with an error status
    pub fn error(self, status: i32, info: &str) -> Result<()> {
        self.reply(status, info, Bytes::new(), None)
    }

    fn send(
        &self,
        replier: &Replier,
        status: i32,
        info: &str,
        body: Bytes,
        blob: Option<Bytes>,
    ) -> Result<()> {
        let reply = CommonPacket::reply(self.code, self.seq, status, info, body);
        tracing::trace!(code = self.code, seq = self.seq, status = status, "Sending reply");
        replier
            .send(self.peer, packet::encode(&reply, blob))
            .map_err(|e| Error::System(e.to_string()))
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        if let Some(replier) = self.replier.take() {
            tracing::warn!(code = self.code, seq = self.seq, "Handler did not reply");
            let info = format!("Handler for code({}) sent no reply", self.code);
            let _ = self.send(&replier, status::INTERNAL_ERR, &info, Bytes::new(), None);
        }
    }
}
