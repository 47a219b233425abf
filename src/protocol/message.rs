//! Opcode bodies
//!
//! Protobuf messages carried in [`CommonPacket::body`](super::CommonPacket).

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PlayType {
    Live = 0,
    Replay = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MediaType {
    Video = 0,
    Audio = 1,
    Text = 2,
    Private = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Direction {
    Outbound = 0,
    Inbound = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MediaFrameType {
    Key = 0,
    Data = 1,
    Param = 2,
    Eof = 256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SourceStreamState {
    Connecting = 0,
    Ok = 1,
    Err = -1,
    ErrConnectFail = -2,
    ErrMediaStop = -3,
    ErrTime = -4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum IpVersion {
    V4 = 0,
    V6 = 1,
}

/// Header of a media frame broadcast; the payload follows as a blob
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MediaFrameMsg {
    #[prost(int32, tag = "1")]
    pub stream_index: i32,
    #[prost(enumeration = "MediaFrameType", tag = "2")]
    pub frame_type: i32,
    #[prost(uint32, tag = "3")]
    pub ssrc: u32,
    #[prost(int64, tag = "4")]
    pub sec: i64,
    #[prost(int64, tag = "5")]
    pub usec: i64,
    #[prost(uint64, tag = "6")]
    pub seq: u64,
}

/// Stream-info broadcast
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StreamInfoMsg {
    #[prost(enumeration = "SourceStreamState", tag = "1")]
    pub state: i32,
    #[prost(enumeration = "PlayType", tag = "2")]
    pub play_type: i32,
    #[prost(uint32, tag = "3")]
    pub ssrc: u32,
    #[prost(string, tag = "4")]
    pub source_proto: ::prost::alloc::string::String,
    #[prost(uint64, tag = "5")]
    pub cur_bps: u64,
    #[prost(int64, tag = "6")]
    pub last_frame_sec: i64,
    #[prost(int64, tag = "7")]
    pub last_frame_usec: i64,
    #[prost(string, tag = "8")]
    pub stream_name: ::prost::alloc::string::String,
    #[prost(uint32, tag = "9")]
    pub client_num: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VideoParamsMsg {
    #[prost(uint32, tag = "1")]
    pub height: u32,
    #[prost(uint32, tag = "2")]
    pub width: u32,
    #[prost(uint32, tag = "3")]
    pub fps: u32,
    #[prost(uint32, tag = "4")]
    pub gov: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AudioParamsMsg {
    #[prost(uint32, tag = "1")]
    pub samples_per_second: u32,
    #[prost(uint32, tag = "2")]
    pub channels: u32,
    #[prost(uint32, tag = "3")]
    pub bits_per_sample: u32,
    #[prost(uint32, tag = "4")]
    pub samples_per_frame: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TextParamsMsg {
    #[prost(uint32, tag = "1")]
    pub x: u32,
    #[prost(uint32, tag = "2")]
    pub y: u32,
    #[prost(uint32, tag = "3")]
    pub font_size: u32,
    #[prost(uint32, tag = "4")]
    pub font_type: u32,
}

#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum MediaParamsMsg {
    #[prost(message, tag = "10")]
    Video(VideoParamsMsg),
    #[prost(message, tag = "11")]
    Audio(AudioParamsMsg),
    #[prost(message, tag = "12")]
    Text(TextParamsMsg),
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubStreamInfoMsg {
    #[prost(int32, tag = "1")]
    pub index: i32,
    #[prost(enumeration = "MediaType", tag = "2")]
    pub media_type: i32,
    #[prost(string, tag = "3")]
    pub codec_name: ::prost::alloc::string::String,
    #[prost(enumeration = "Direction", tag = "4")]
    pub direction: i32,
    #[prost(bytes = "bytes", tag = "5")]
    pub extra_data: ::bytes::Bytes,
    #[prost(oneof = "MediaParamsMsg", tags = "10, 11, 12")]
    pub params: ::core::option::Option<MediaParamsMsg>,
}

/// Reply body of a metadata query
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetadataReply {
    #[prost(enumeration = "PlayType", tag = "1")]
    pub play_type: i32,
    #[prost(string, tag = "2")]
    pub source_proto: ::prost::alloc::string::String,
    #[prost(uint32, tag = "3")]
    pub ssrc: u32,
    #[prost(uint32, tag = "4")]
    pub bps: u32,
    #[prost(message, repeated, tag = "5")]
    pub sub_streams: ::prost::alloc::vec::Vec<SubStreamInfoMsg>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubStreamStatisticMsg {
    #[prost(int32, tag = "1")]
    pub sub_stream_index: i32,
    #[prost(enumeration = "MediaType", tag = "2")]
    pub media_type: i32,
    #[prost(uint64, tag = "3")]
    pub data_bytes: u64,
    #[prost(uint64, tag = "4")]
    pub key_bytes: u64,
    #[prost(uint64, tag = "5")]
    pub data_frames: u64,
    #[prost(uint64, tag = "6")]
    pub key_frames: u64,
    #[prost(uint64, tag = "7")]
    pub lost_frames: u64,
    #[prost(uint64, tag = "8")]
    pub last_gop: u64,
}

/// Reply body of a statistics query
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MediaStatisticReply {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(uint32, tag = "2")]
    pub ssrc: u32,
    #[prost(uint64, tag = "3")]
    pub sum_bytes: u64,
    #[prost(message, repeated, tag = "4")]
    pub sub_stream_stats: ::prost::alloc::vec::Vec<SubStreamStatisticMsg>,
}

/// Client identity, sent as the heartbeat request body and returned in
/// client lists
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientHeartbeatReq {
    #[prost(enumeration = "IpVersion", tag = "1")]
    pub client_ip_version: i32,
    #[prost(string, tag = "2")]
    pub client_ip: ::prost::alloc::string::String,
    #[prost(int32, tag = "3")]
    pub client_port: i32,
    #[prost(string, tag = "4")]
    pub client_token: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub client_protocol: ::prost::alloc::string::String,
    #[prost(string, tag = "6")]
    pub client_text: ::prost::alloc::string::String,
    #[prost(int64, tag = "7")]
    pub last_active_time: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientHeartbeatRep {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(uint32, tag = "2")]
    pub lease: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientListReq {
    #[prost(uint32, tag = "1")]
    pub start_index: u32,
    #[prost(uint32, tag = "2")]
    pub client_num: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientListRep {
    #[prost(uint32, tag = "1")]
    pub total_num: u32,
    #[prost(uint32, tag = "2")]
    pub start_index: u32,
    #[prost(message, repeated, tag = "3")]
    pub client_list: ::prost::alloc::vec::Vec<ClientHeartbeatReq>,
}
