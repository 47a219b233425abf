//! Media description types
//!
//! This module provides:
//! - Stream and substream metadata, with conversions to the wire form
//! - Per-frame information that accompanies each broadcast payload

pub mod frame;
pub mod metadata;

pub use frame::MediaFrameInfo;
pub use metadata::{
    AudioParams, MediaParams, StreamMetadata, SubStreamMetadata, TextParams, VideoParams,
};

pub use crate::protocol::message::{Direction, MediaFrameType, MediaType, PlayType};
