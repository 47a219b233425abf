//! Multipart framing
//!
//! ```text
//! +-----------+-----------+-----------+---------+-----+
//! | total u32 | count u16 | len u32   | part    | ... |
//! +-----------+-----------+-----------+---------+-----+
//! ```
//!
//! All integers are big-endian. `total` counts every byte after itself.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::Multipart;
use crate::protocol::constants::MAX_MESSAGE_SIZE;

const LENGTH_SIZE: usize = 4;
const COUNT_SIZE: usize = 2;

/// Codec for [`Multipart`] messages
#[derive(Debug, Clone, Copy)]
pub struct MultipartCodec {
    max_message_size: usize,
}

impl Default for MultipartCodec {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}

impl MultipartCodec {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

impl Decoder for MultipartCodec {
    type Item = Multipart;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Multipart>, io::Error> {
        if src.len() < LENGTH_SIZE {
            return Ok(None);
        }

        let total = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if total > self.max_message_size {
            return Err(invalid("message exceeds maximum size"));
        }
        if total < COUNT_SIZE {
            return Err(invalid("message too short"));
        }
        if src.len() < LENGTH_SIZE + total {
            src.reserve(LENGTH_SIZE + total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_SIZE);
        let mut frame = src.split_to(total).freeze();
        let count = frame.get_u16() as usize;

        let mut parts = Vec::with_capacity(count);
        for _ in 0..count {
            if frame.remaining() < LENGTH_SIZE {
                return Err(invalid("truncated part header"));
            }
            let len = frame.get_u32() as usize;
            if frame.remaining() < len {
                return Err(invalid("truncated part"));
            }
            parts.push(frame.split_to(len));
        }
        if frame.has_remaining() {
            return Err(invalid("trailing bytes after last part"));
        }

        Ok(Some(parts))
    }
}

impl Encoder<Multipart> for MultipartCodec {
    type Error = io::Error;

    fn encode(&mut self, parts: Multipart, dst: &mut BytesMut) -> Result<(), io::Error> {
        let count = u16::try_from(parts.len()).map_err(|_| invalid("too many parts"))?;
        let total = COUNT_SIZE + parts.iter().map(|p| LENGTH_SIZE + p.len()).sum::<usize>();
        if total > self.max_message_size {
            return Err(invalid("message exceeds maximum size"));
        }

        dst.reserve(LENGTH_SIZE + total);
        dst.put_u32(total as u32);
        dst.put_u16(count);
        for part in parts {
            dst.put_u32(part.len() as u32);
            dst.put_slice(&part);
        }
        Ok(())
    }
}
