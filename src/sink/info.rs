//! Stream-info broadcasts

use std::time::Duration;

use crate::error::{Error, Result};
use crate::media::PlayType;
use crate::protocol::message::{SourceStreamState, StreamInfoMsg};
use crate::protocol::packet::{opcode, CommonPacket};

/// Periodic status report of a source, as broadcast on the info channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub stream_name: String,
    pub state: SourceStreamState,
    pub play_type: PlayType,
    pub ssrc: u32,
    pub source_proto: String,
    /// Bitrate over the source's last heartbeat interval
    pub cur_bps: u64,
    /// Timestamp of the last frame sent
    pub last_frame_time: Duration,
    /// Clients holding a lease
    pub client_num: u32,
}

impl StreamInfo {
    /// Decode the body of a `STREAM_INFO` message
    pub fn from_packet(packet: &CommonPacket) -> Result<Self> {
        if packet.code() != opcode::STREAM_INFO {
            return Err(Error::Param(format!(
                "code({}) is not a stream info message",
                packet.code()
            )));
        }
        let msg: StreamInfoMsg = packet.decode_body()?;
        Ok(Self::from(msg))
    }
}

impl From<StreamInfoMsg> for StreamInfo {
    fn from(msg: StreamInfoMsg) -> Self {
        let secs = u64::try_from(msg.last_frame_sec).unwrap_or(0);
        let micros = u64::try_from(msg.last_frame_usec).unwrap_or(0);
        Self {
            state: msg.state(),
            play_type: msg.play_type(),
            stream_name: msg.stream_name,
            ssrc: msg.ssrc,
            source_proto: msg.source_proto,
            cur_bps: msg.cur_bps,
            last_frame_time: Duration::from_secs(secs) + Duration::from_micros(micros),
            client_num: msg.client_num,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use prost::Message;

    #[test]
    fn test_decode_stream_info() {
        let msg = StreamInfoMsg {
            state: SourceStreamState::ErrMediaStop as i32,
            play_type: PlayType::Replay as i32,
            ssrc: 42,
            source_proto: "file".into(),
            cur_bps: 128_000,
            last_frame_sec: 10,
            last_frame_usec: 500,
            stream_name: "cam".into(),
            client_num: 3,
        };
        let packet = CommonPacket::message(opcode::STREAM_INFO, Bytes::from(msg.encode_to_vec()));

        let info = StreamInfo::from_packet(&packet).unwrap();
        assert_eq!(info.state, SourceStreamState::ErrMediaStop);
        assert_eq!(info.play_type, PlayType::Replay);
        assert_eq!(info.last_frame_time, Duration::from_micros(10_000_500));
        assert_eq!(info.client_num, 3);
        assert_eq!(info.stream_name, "cam");
    }

    #[test]
    fn test_wrong_opcode() {
        let packet = CommonPacket::message(opcode::MEDIA, Bytes::new());
        assert!(StreamInfo::from_packet(&packet).is_err());
    }
}
