//! Text stream source
//!
//! Publishes one line of text per second on a single text substream.
//!
//! Run with: cargo run --example text_source [STREAM_NAME] [TCP_PORT]
//!
//! Examples:
//!   cargo run --example text_source                # local stream "text"
//!   cargo run --example text_source clock 8100     # also on tcp 8100/8101
//!
//! Then attach a sink with `cargo run --example text_sink local clock`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use streamswitch::media::{
    MediaFrameInfo, MediaFrameType, MediaParams, MediaType, StreamMetadata, TextParams,
};
use streamswitch::protocol::message::SourceStreamState;
use streamswitch::stats::MediaStatisticInfo;
use streamswitch::{SourceConfig, SourceListener, StreamSource};

/// Counts what sinks asked for
struct TextListener {
    key_requests: AtomicU64,
}

impl SourceListener for TextListener {
    fn on_key_frame(&self) {
        let n = self.key_requests.fetch_add(1, Ordering::Relaxed) + 1;
        println!("Key frame requested ({} so far)", n);
    }

    fn on_media_statistic(&self, statistic: &mut MediaStatisticInfo) {
        println!("Statistic requested: {} bytes sent", statistic.sum_bytes);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("streamswitch=info".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let stream_name = args.next().unwrap_or_else(|| "text".to_string());
    let mut config = SourceConfig::new(&stream_name);
    if let Some(port) = args.next() {
        config = config.tcp_port(port.parse()?);
    }

    let listener = Arc::new(TextListener {
        key_requests: AtomicU64::new(0),
    });
    let source = StreamSource::with_listener(config, listener);
    source.init().await?;

    let mut meta = StreamMetadata::live("text");
    let params = MediaParams::Text(TextParams {
        x: 0,
        y: 0,
        font_size: 12,
        font_type: 0,
    });
    let index = meta.add_sub_stream(MediaType::Text, "utf8", params);
    let ssrc = meta.ssrc;
    source.set_stream_meta(meta)?;

    source.start()?;
    source.set_stream_state(SourceStreamState::Ok);
    println!("Publishing stream '{}' (ssrc 0x{:x})", stream_name, ssrc);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut line_no = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                line_no += 1;
                let frame_type = if line_no % 5 == 1 {
                    MediaFrameType::Key
                } else {
                    MediaFrameType::Data
                };
                let frame = MediaFrameInfo::new(index, frame_type, ssrc);
                let text = format!("line {} from {}", line_no, stream_name);
                source.send_live_media_frame(&frame, Bytes::from(text))?;

                if line_no % 10 == 0 {
                    println!(
                        "Sent {} lines, {} bps, {} clients",
                        line_no,
                        source.current_bps(),
                        source.client_count()
                    );
                }
            }
        }
    }

    println!("Shutting down");
    source.set_stream_state(SourceStreamState::ErrMediaStop);
    source.uninit().await?;
    Ok(())
}
