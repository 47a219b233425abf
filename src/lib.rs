//! # streamswitch
//!
//! Broker-less live media distribution between one producing endpoint
//! (a [`StreamSource`]) and any number of consuming endpoints
//! (a [`StreamSink`]).
//!
//! A source binds two sockets per stream: a request/reply control socket that
//! answers metadata, statistics, key frame and heartbeat queries, and a
//! publish socket that broadcasts media frames and periodic stream-info
//! messages. Sinks subscribe to the broadcast, renew a lease with the source
//! through heartbeats, and issue synchronous RPC calls for everything else.
//!
//! ## Example: publishing frames
//!
//! ```no_run
//! use bytes::Bytes;
//! use streamswitch::media::{MediaFrameInfo, MediaFrameType, MediaParams, StreamMetadata};
//! use streamswitch::protocol::message::MediaType;
//! use streamswitch::source::{SourceConfig, StreamSource};
//!
//! # async fn run() -> streamswitch::Result<()> {
//! let source = StreamSource::new(SourceConfig::new("camera1"));
//! source.init().await?;
//!
//! let mut meta = StreamMetadata::live("demo");
//! meta.add_sub_stream(MediaType::Text, "text", MediaParams::None);
//! let ssrc = meta.ssrc;
//! source.set_stream_meta(meta)?;
//! source.start()?;
//!
//! let frame = MediaFrameInfo::new(0, MediaFrameType::Key, ssrc);
//! source.send_live_media_frame(&frame, Bytes::from_static(b"hello"))?;
//!
//! source.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Example: receiving frames
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use bytes::Bytes;
//! use streamswitch::media::MediaFrameInfo;
//! use streamswitch::{SinkConfig, SinkListener, StreamSink};
//!
//! struct Printer;
//!
//! impl SinkListener for Printer {
//!     fn on_live_media_frame(&self, frame: &MediaFrameInfo, payload: &Bytes) {
//!         println!("substream {}: {} bytes", frame.sub_stream_index, payload.len());
//!     }
//! }
//!
//! # async fn run() -> streamswitch::Result<()> {
//! let sink = StreamSink::with_listener(SinkConfig::default(), Arc::new(Printer));
//! sink.init_local("camera1")?;
//! sink.update_stream_metadata(Duration::from_secs(5)).await?;
//! sink.start()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod engine;
pub mod error;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod sink;
pub mod source;
pub mod stats;
pub mod transport;

pub use error::{Error, ErrorKind, Result};
pub use sink::{SinkConfig, SinkListener, StreamSink};
pub use source::{SourceConfig, SourceListener, StreamSource};
