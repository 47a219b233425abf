//! Wire protocol
//!
//! - `constants`: socket names, channels, timing and limits
//! - `packet`: the common packet envelope and multipart framing
//! - `message`: opcode-specific protobuf bodies

pub mod constants;
pub mod message;
pub mod packet;

pub use packet::{opcode, status, CommonPacket, PacketHeader, PacketType};
