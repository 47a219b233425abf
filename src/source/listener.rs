//! Source event callbacks

use crate::stats::MediaStatisticInfo;

/// Callbacks a source invokes on behalf of remote sinks.
///
/// Called from the source's worker task, never while internal locks are
/// held.
pub trait SourceListener: Send + Sync {
    /// A sink asked for a key frame
    fn on_key_frame(&self) {}

    /// A sink queried statistics; the listener may adjust the snapshot
    /// before it is returned
    fn on_media_statistic(&self, _statistic: &mut MediaStatisticInfo) {}
}
