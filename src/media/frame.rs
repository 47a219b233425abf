//! Media frame information
//!
//! Describes one broadcast frame. The payload itself travels next to it as
//! a separate `Bytes` value, so cloning a frame never copies media data.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::protocol::message::{MediaFrameMsg, MediaFrameType};

/// Per-frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaFrameInfo {
    /// Substream index in the current metadata
    pub sub_stream_index: i32,
    pub frame_type: MediaFrameType,
    /// Absolute time since the epoch for live streams, offset from the
    /// beginning for replay streams
    pub timestamp: Duration,
    /// Must match the ssrc of the metadata describing this frame
    pub ssrc: u32,
}

impl MediaFrameInfo {
    /// Create a frame stamped with the current wall-clock time
    pub fn new(sub_stream_index: i32, frame_type: MediaFrameType, ssrc: u32) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            sub_stream_index,
            frame_type,
            timestamp,
            ssrc,
        }
    }

    /// Set an explicit timestamp
    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Key and data frames carry media and take part in statistics
    pub fn is_media(&self) -> bool {
        matches!(self.frame_type, MediaFrameType::Key | MediaFrameType::Data)
    }

    pub fn is_key(&self) -> bool {
        self.frame_type == MediaFrameType::Key
    }

    /// Build the wire header for this frame
    pub fn to_msg(&self, seq: u64) -> MediaFrameMsg {
        MediaFrameMsg {
            stream_index: self.sub_stream_index,
            frame_type: self.frame_type as i32,
            ssrc: self.ssrc,
            sec: self.timestamp.as_secs() as i64,
            usec: i64::from(self.timestamp.subsec_micros()),
            seq,
        }
    }

    /// Rebuild frame info from a wire header
    pub fn from_msg(msg: &MediaFrameMsg) -> Self {
        let sec = u64::try_from(msg.sec).unwrap_or(0);
        let usec = u64::try_from(msg.usec).unwrap_or(0);
        Self {
            sub_stream_index: msg.stream_index,
            frame_type: msg.frame_type(),
            timestamp: Duration::from_secs(sec) + Duration::from_micros(usec),
            ssrc: msg.ssrc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_kinds() {
        assert!(MediaFrameInfo::new(0, MediaFrameType::Key, 1).is_media());
        assert!(MediaFrameInfo::new(0, MediaFrameType::Data, 1).is_media());
        assert!(!MediaFrameInfo::new(0, MediaFrameType::Param, 1).is_media());
        assert!(!MediaFrameInfo::new(0, MediaFrameType::Eof, 1).is_media());
    }

    #[test]
    fn test_timestamp_split_into_sec_and_usec() {
        let frame = MediaFrameInfo::new(1, MediaFrameType::Data, 9)
            .with_timestamp(Duration::from_micros(3_250_000));
        let msg = frame.to_msg(12);

        assert_eq!(msg.sec, 3);
        assert_eq!(msg.usec, 250_000);
        assert_eq!(msg.seq, 12);
        assert_eq!(MediaFrameInfo::from_msg(&msg), frame);
    }
}
