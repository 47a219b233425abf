//! Sink event callbacks

use bytes::Bytes;

use crate::media::MediaFrameInfo;

/// Callbacks from a sink's worker task.
///
/// Both run outside the sink's lock, so they may call back into the sink.
/// Keep them short: the worker does not poll while a callback runs.
pub trait SinkListener: Send + Sync {
    /// A frame matching the current metadata arrived
    fn on_live_media_frame(&self, _frame: &MediaFrameInfo, _payload: &Bytes) {}

    /// Frames carry an ssrc other than the metadata's; fetch the metadata
    /// again with `update_stream_metadata`
    fn on_metadata_mismatch(&self, _ssrc: u32) {}
}
