//! Stream metadata
//!
//! A [`StreamMetadata`] describes one content generation of a stream. Its
//! `ssrc` ties frames to the metadata that can describe them: whenever the
//! substream layout changes a new `ssrc` must be minted.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::protocol::message::{
    AudioParamsMsg, Direction, MediaParamsMsg, MediaType, MetadataReply, PlayType,
    SubStreamInfoMsg, TextParamsMsg, VideoParamsMsg,
};

/// Video parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Group-of-pictures length
    pub gov: u32,
}

/// Audio parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioParams {
    pub samples_per_second: u32,
    pub channels: u32,
    pub bits_per_sample: u32,
    pub samples_per_frame: u32,
}

/// Text overlay parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextParams {
    pub x: u32,
    pub y: u32,
    pub font_size: u32,
    pub font_type: u32,
}

/// Kind-specific substream parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MediaParams {
    #[default]
    None,
    Video(VideoParams),
    Audio(AudioParams),
    Text(TextParams),
}

/// One elementary stream within a session
#[derive(Debug, Clone, PartialEq)]
pub struct SubStreamMetadata {
    /// Position of this substream, assigned at registration
    pub index: i32,
    pub media_type: MediaType,
    pub codec_name: String,
    pub direction: Direction,
    /// Opaque codec configuration (e.g. SPS/PPS)
    pub extra_data: Bytes,
    pub params: MediaParams,
}

impl SubStreamMetadata {
    pub fn new(index: i32, media_type: MediaType, codec_name: impl Into<String>) -> Self {
        Self {
            index,
            media_type,
            codec_name: codec_name.into(),
            direction: Direction::Outbound,
            extra_data: Bytes::new(),
            params: MediaParams::None,
        }
    }
}

/// Metadata of a whole stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMetadata {
    pub play_type: PlayType,
    /// Protocol tag of the producer (e.g. "rtsp", "file")
    pub source_proto: String,
    /// Session identifier of this content generation
    pub ssrc: u32,
    /// Announced total bitrate, 0 if unknown
    pub bps: u32,
    pub sub_streams: Vec<SubStreamMetadata>,
}

impl Default for StreamMetadata {
    fn default() -> Self {
        Self {
            play_type: PlayType::Live,
            source_proto: String::new(),
            ssrc: 0,
            bps: 0,
            sub_streams: Vec::new(),
        }
    }
}

impl StreamMetadata {
    /// Create live metadata with a freshly minted ssrc
    pub fn live(source_proto: impl Into<String>) -> Self {
        Self {
            source_proto: source_proto.into(),
            ssrc: Self::mint_ssrc(),
            ..Default::default()
        }
    }

    /// Create replay metadata with a freshly minted ssrc
    pub fn replay(source_proto: impl Into<String>) -> Self {
        Self {
            play_type: PlayType::Replay,
            ..Self::live(source_proto)
        }
    }

    /// Generate a random non-zero ssrc
    pub fn mint_ssrc() -> u32 {
        loop {
            let ssrc = rand::random::<u32>();
            if ssrc != 0 {
                return ssrc;
            }
        }
    }

    /// Replace the ssrc with a new one, marking a new content generation
    pub fn regenerate_ssrc(&mut self) {
        let previous = self.ssrc;
        while self.ssrc == previous {
            self.ssrc = Self::mint_ssrc();
        }
    }

    /// Append a substream and return its index
    pub fn add_sub_stream(
        &mut self,
        media_type: MediaType,
        codec_name: impl Into<String>,
        params: MediaParams,
    ) -> i32 {
        let index = self.sub_streams.len() as i32;
        let mut sub_stream = SubStreamMetadata::new(index, media_type, codec_name);
        sub_stream.params = params;
        self.sub_streams.push(sub_stream);
        index
    }

    /// Look up a substream by index
    pub fn sub_stream(&self, index: i32) -> Option<&SubStreamMetadata> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.sub_streams.get(i))
    }

    /// Check that substream indices match their positions
    pub fn validate(&self) -> Result<()> {
        for (position, sub_stream) in self.sub_streams.iter().enumerate() {
            if sub_stream.index != position as i32 {
                return Err(Error::Param(format!(
                    "sub stream at position {} has index {}",
                    position, sub_stream.index
                )));
            }
        }
        Ok(())
    }

    /// Convert to the metadata reply body
    pub fn to_reply(&self) -> MetadataReply {
        MetadataReply {
            play_type: self.play_type as i32,
            source_proto: self.source_proto.clone(),
            ssrc: self.ssrc,
            bps: self.bps,
            sub_streams: self.sub_streams.iter().map(SubStreamInfoMsg::from).collect(),
        }
    }
}

impl From<MetadataReply> for StreamMetadata {
    fn from(reply: MetadataReply) -> Self {
        Self {
            play_type: reply.play_type(),
            ssrc: reply.ssrc,
            bps: reply.bps,
            sub_streams: reply
                .sub_streams
                .into_iter()
                .map(SubStreamMetadata::from)
                .collect(),
            source_proto: reply.source_proto,
        }
    }
}

impl From<&SubStreamMetadata> for SubStreamInfoMsg {
    fn from(sub: &SubStreamMetadata) -> Self {
        let params = match sub.params {
            MediaParams::None => None,
            MediaParams::Video(v) => Some(MediaParamsMsg::Video(VideoParamsMsg {
                height: v.height,
                width: v.width,
                fps: v.fps,
                gov: v.gov,
            })),
            MediaParams::Audio(a) => Some(MediaParamsMsg::Audio(AudioParamsMsg {
                samples_per_second: a.samples_per_second,
                channels: a.channels,
                bits_per_sample: a.bits_per_sample,
                samples_per_frame: a.samples_per_frame,
            })),
            MediaParams::Text(t) => Some(MediaParamsMsg::Text(TextParamsMsg {
                x: t.x,
                y: t.y,
                font_size: t.font_size,
                font_type: t.font_type,
            })),
        };
        Self {
            index: sub.index,
            media_type: sub.media_type as i32,
            codec_name: sub.codec_name.clone(),
            direction: sub.direction as i32,
            extra_data: sub.extra_data.clone(),
            params,
        }
    }
}

impl From<SubStreamInfoMsg> for SubStreamMetadata {
    fn from(msg: SubStreamInfoMsg) -> Self {
        let media_type = msg.media_type();
        let direction = msg.direction();
        let params = match msg.params {
            None => MediaParams::None,
            Some(MediaParamsMsg::Video(v)) => MediaParams::Video(VideoParams {
                width: v.width,
                height: v.height,
                fps: v.fps,
                gov: v.gov,
            }),
            Some(MediaParamsMsg::Audio(a)) => MediaParams::Audio(AudioParams {
                samples_per_second: a.samples_per_second,
                channels: a.channels,
                bits_per_sample: a.bits_per_sample,
                samples_per_frame: a.samples_per_frame,
            }),
            Some(MediaParamsMsg::Text(t)) => MediaParams::Text(TextParams {
                x: t.x,
                y: t.y,
                font_size: t.font_size,
                font_type: t.font_type,
            }),
        };
        Self {
            index: msg.index,
            media_type,
            direction,
            codec_name: msg.codec_name,
            extra_data: msg.extra_data,
            params,
        }
    }
}
