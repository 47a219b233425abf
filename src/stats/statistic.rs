//! Per-substream frame statistics
//!
//! Both ends keep a [`StatisticsTable`]: the source counts frames it sent and
//! the sink counts frames it received, so a sink can compare the two to see
//! what got lost on the way.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::media::StreamMetadata;
use crate::protocol::message::{MediaStatisticReply, MediaType, SubStreamStatisticMsg};

/// Counters for one substream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubStreamStatistic {
    pub sub_stream_index: i32,
    pub media_type: MediaType,
    /// Bytes of all media frames
    pub data_bytes: u64,
    /// Bytes of key frames only, always <= `data_bytes`
    pub key_bytes: u64,
    pub data_frames: u64,
    pub key_frames: u64,
    /// Frames missing from the sequence numbering
    pub lost_frames: u64,
    /// Length of the last complete GOP
    pub last_gop: u64,
    /// Frames since the last key frame
    pub current_gop: u64,
    /// Sequence number of the last media frame
    pub last_seq: u64,
}

impl SubStreamStatistic {
    pub fn new(sub_stream_index: i32, media_type: MediaType) -> Self {
        Self {
            sub_stream_index,
            media_type,
            ..Default::default()
        }
    }

    /// Account one media frame.
    ///
    /// A `seq` of zero means the frame carries no sequence number, so no loss
    /// can be inferred from it.
    pub fn record(&mut self, is_key: bool, size: usize, seq: u64) {
        let size = size as u64;
        self.data_frames = self.data_frames.saturating_add(1);
        self.data_bytes = self.data_bytes.saturating_add(size);

        // seq comes off the wire, so it may sit anywhere in the u64 range
        let expected = self.last_seq.checked_add(1);
        if seq != 0 && self.last_seq != 0 && expected.map_or(false, |next| seq > next) {
            let gap = seq - self.last_seq - 1;
            self.lost_frames = self.lost_frames.saturating_add(gap);
        }
        self.last_seq = seq;

        if is_key {
            self.key_frames = self.key_frames.saturating_add(1);
            self.key_bytes = self.key_bytes.saturating_add(size);
            self.last_gop = self.current_gop;
            self.current_gop = 0;
        }
        self.current_gop = self.current_gop.saturating_add(1);
    }

    /// Account a frame on the sending side, minting its sequence number.
    ///
    /// Numbering wraps past `u64::MAX` to 1, since 0 means "no sequence".
    pub fn record_sent(&mut self, is_key: bool, size: usize) -> u64 {
        let seq = self.last_seq.checked_add(1).unwrap_or(1);
        self.record(is_key, size, seq);
        seq
    }

    pub fn to_msg(&self) -> SubStreamStatisticMsg {
        SubStreamStatisticMsg {
            sub_stream_index: self.sub_stream_index,
            media_type: self.media_type as i32,
            data_bytes: self.data_bytes,
            key_bytes: self.key_bytes,
            data_frames: self.data_frames,
            key_frames: self.key_frames,
            lost_frames: self.lost_frames,
            last_gop: self.last_gop,
        }
    }

    pub fn from_msg(msg: &SubStreamStatisticMsg) -> Self {
        Self {
            sub_stream_index: msg.sub_stream_index,
            media_type: msg.media_type(),
            data_bytes: msg.data_bytes,
            key_bytes: msg.key_bytes,
            data_frames: msg.data_frames,
            key_frames: msg.key_frames,
            lost_frames: msg.lost_frames,
            last_gop: msg.last_gop,
            current_gop: 0,
            last_seq: 0,
        }
    }
}

/// One statistic slot per substream of the current metadata
#[derive(Debug, Clone, Default)]
pub struct StatisticsTable {
    sub_streams: Vec<SubStreamStatistic>,
}

impl StatisticsTable {
    /// Create zeroed counters matching `meta`
    pub fn for_metadata(meta: &StreamMetadata) -> Self {
        Self {
            sub_streams: meta
                .sub_streams
                .iter()
                .map(|s| SubStreamStatistic::new(s.index, s.media_type))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.sub_streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sub_streams.is_empty()
    }

    pub fn get(&self, index: i32) -> Option<&SubStreamStatistic> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.sub_streams.get(i))
    }

    pub fn get_mut(&mut self, index: i32) -> Option<&mut SubStreamStatistic> {
        usize::try_from(index)
            .ok()
            .and_then(move |i| self.sub_streams.get_mut(i))
    }

    /// Sum of data bytes over all substreams
    pub fn total_bytes(&self) -> u64 {
        self.sub_streams.iter().map(|s| s.data_bytes).sum()
    }

    /// Take a timestamped copy of all counters
    pub fn snapshot(&self, ssrc: u32) -> MediaStatisticInfo {
        MediaStatisticInfo {
            ssrc,
            timestamp: unix_now(),
            sum_bytes: self.total_bytes(),
            sub_streams: self.sub_streams.clone(),
        }
    }
}

/// Aggregate statistics of a stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaStatisticInfo {
    pub ssrc: u32,
    /// Generation time, seconds since the epoch
    pub timestamp: i64,
    pub sum_bytes: u64,
    pub sub_streams: Vec<SubStreamStatistic>,
}

impl MediaStatisticInfo {
    pub fn to_reply(&self) -> MediaStatisticReply {
        MediaStatisticReply {
            timestamp: self.timestamp,
            ssrc: self.ssrc,
            sum_bytes: self.sum_bytes,
            sub_stream_stats: self.sub_streams.iter().map(|s| s.to_msg()).collect(),
        }
    }
}

impl From<MediaStatisticReply> for MediaStatisticInfo {
    fn from(reply: MediaStatisticReply) -> Self {
        Self {
            ssrc: reply.ssrc,
            timestamp: reply.timestamp,
            sum_bytes: reply.sum_bytes,
            sub_streams: reply
                .sub_stream_stats
                .iter()
                .map(SubStreamStatistic::from_msg)
                .collect(),
        }
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
