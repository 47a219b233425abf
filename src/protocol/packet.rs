//! Common packet envelope
//!
//! Every message on the control and broadcast sockets is a multipart message
//! whose packet part is a protobuf-encoded [`CommonPacket`]:
//!
//! ```text
//! control:   [packet][blob?]
//! broadcast: [channel][packet][blob?]
//! ```
//!
//! The optional blob carries media payloads and opaque RPC payloads without
//! re-serializing them into the envelope.

use bytes::Bytes;
use prost::Message;

use crate::error::{Error, Result};
use crate::transport::Multipart;

/// Packet direction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PacketType {
    Request = 0,
    Reply = 1,
    Message = 2,
}

/// Built-in opcodes
pub mod opcode {
    /// Metadata query
    pub const METADATA: i32 = 1;
    /// Key frame request
    pub const KEY_FRAME: i32 = 2;
    /// Statistics query
    pub const MEDIA_STATISTIC: i32 = 3;
    /// Client lease renewal
    pub const CLIENT_HEARTBEAT: i32 = 4;
    /// Paged client list query
    pub const CLIENT_LIST: i32 = 5;

    /// Media frame broadcast
    pub const MEDIA: i32 = 64;
    /// Stream-info broadcast
    pub const STREAM_INFO: i32 = 65;

    /// First opcode free for application-defined requests
    pub const USER_DEFINED_BASE: i32 = 0x1000;
}

/// HTTP-like reply statuses
pub mod status {
    pub const OK: i32 = 200;
    pub const BAD_REQUEST: i32 = 400;
    pub const NOT_FOUND: i32 = 404;
    pub const INTERNAL_ERR: i32 = 500;
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PacketHeader {
    #[prost(enumeration = "PacketType", tag = "1")]
    pub packet_type: i32,
    #[prost(int32, tag = "2")]
    pub code: i32,
    #[prost(uint32, tag = "3")]
    pub seq: u32,
    #[prost(int32, tag = "4")]
    pub status: i32,
    #[prost(string, tag = "5")]
    pub info: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommonPacket {
    #[prost(message, optional, tag = "1")]
    pub header: ::core::option::Option<PacketHeader>,
    #[prost(bytes = "bytes", tag = "2")]
    pub body: Bytes,
}

impl CommonPacket {
    fn with_header(packet_type: PacketType, code: i32, seq: u32, body: Bytes) -> Self {
        Self {
            header: Some(PacketHeader {
                packet_type: packet_type as i32,
                code,
                seq,
                status: 0,
                info: String::new(),
            }),
            body,
        }
    }

    /// Create a request packet
    pub fn request(code: i32, seq: u32, body: Bytes) -> Self {
        Self::with_header(PacketType::Request, code, seq, body)
    }

    /// Create a broadcast message packet
    pub fn message(code: i32, body: Bytes) -> Self {
        Self::with_header(PacketType::Message, code, 0, body)
    }

    /// Create a reply packet
    pub fn reply(code: i32, seq: u32, status: i32, info: impl Into<String>, body: Bytes) -> Self {
        let mut reply = Self::with_header(PacketType::Reply, code, seq, body);
        if let Some(header) = reply.header.as_mut() {
            header.status = status;
            header.info = info.into();
        }
        reply
    }

    /// Create a reply to `request`, copying its opcode and sequence number
    pub fn reply_to(
        request: &CommonPacket,
        status: i32,
        info: impl Into<String>,
        body: Bytes,
    ) -> Self {
        Self::reply(request.code(), request.seq(), status, info, body)
    }

    /// Create a reply that is not tied to a decoded request.
    ///
    /// Used when the request itself could not be parsed.
    pub fn orphan_reply(status: i32, info: impl Into<String>) -> Self {
        Self::reply(0, 0, status, info, Bytes::new())
    }

    pub fn kind(&self) -> Option<PacketType> {
        self.header
            .as_ref()
            .and_then(|h| PacketType::try_from(h.packet_type).ok())
    }

    pub fn code(&self) -> i32 {
        self.header.as_ref().map_or(0, |h| h.code)
    }

    pub fn seq(&self) -> u32 {
        self.header.as_ref().map_or(0, |h| h.seq)
    }

    pub fn status(&self) -> i32 {
        self.header.as_ref().map_or(0, |h| h.status)
    }

    pub fn info(&self) -> &str {
        self.header.as_ref().map_or("", |h| h.info.as_str())
    }

    /// Decode the opcode-specific body
    pub fn decode_body<M: Message + Default>(&self) -> Result<M> {
        Ok(M::decode(self.body.clone())?)
    }

    /// Check the reply status, translating failures into errors
    pub fn check_status(&self) -> Result<()> {
        match Error::from_status(self.status(), self.info()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Encode a packet and optional blob into a control message
pub fn encode(packet: &CommonPacket, blob: Option<Bytes>) -> Multipart {
    let mut parts = Vec::with_capacity(2);
    parts.push(Bytes::from(packet.encode_to_vec()));
    parts.extend(blob);
    parts
}

/// Decode a control message into its packet and optional blob
pub fn decode(parts: Multipart) -> Result<(CommonPacket, Option<Bytes>)> {
    let mut parts = parts.into_iter();
    let packet = parts
        .next()
        .ok_or_else(|| Error::Parse("empty message".into()))?;
    let packet = CommonPacket::decode(packet)?;
    if packet.header.is_none() {
        return Err(Error::Parse("packet has no header".into()));
    }
    Ok((packet, parts.next()))
}

/// Encode a broadcast message on `channel`
pub fn encode_broadcast(channel: &str, packet: &CommonPacket, blob: Option<Bytes>) -> Multipart {
    let mut parts = Vec::with_capacity(3);
    parts.push(Bytes::copy_from_slice(channel.as_bytes()));
    parts.extend(encode(packet, blob));
    parts
}

/// Decode a broadcast message into its channel, packet and optional blob
pub fn decode_broadcast(mut parts: Multipart) -> Result<(String, CommonPacket, Option<Bytes>)> {
    if parts.is_empty() {
        return Err(Error::Parse("empty broadcast message".into()));
    }
    let channel = parts.remove(0);
    let channel = String::from_utf8(channel.to_vec())
        .map_err(|_| Error::Parse("channel name is not valid UTF-8".into()))?;
    let (packet, blob) = decode(parts)?;
    Ok((channel, packet, blob))
}
