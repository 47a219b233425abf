//! Text stream sink
//!
//! Prints every frame received from a source and its statistics every five
//! seconds. Metadata is fetched again whenever the source restarts with a
//! new ssrc.
//!
//! Run with:
//!   cargo run --example text_sink local STREAM_NAME
//!   cargo run --example text_sink remote HOST PORT

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use streamswitch::media::MediaFrameInfo;
use streamswitch::protocol::constants::STREAM_INFO_CHANNEL;
use streamswitch::protocol::packet::opcode;
use streamswitch::registry::ClientInfo;
use streamswitch::sink::StreamInfo;
use streamswitch::{SinkConfig, SinkListener, StreamSink};

const RPC_TIMEOUT: Duration = Duration::from_secs(5);

struct Printer {
    mismatch: AtomicBool,
}

impl SinkListener for Printer {
    fn on_live_media_frame(&self, frame: &MediaFrameInfo, payload: &Bytes) {
        println!(
            "index:{} type:{:?} time:{}.{:03} ssrc:0x{:x} size:{} | {}",
            frame.sub_stream_index,
            frame.frame_type,
            frame.timestamp.as_secs(),
            frame.timestamp.subsec_millis(),
            frame.ssrc,
            payload.len(),
            String::from_utf8_lossy(payload)
        );
    }

    fn on_metadata_mismatch(&self, ssrc: u32) {
        println!("Frames now carry ssrc 0x{:x}", ssrc);
        self.mismatch.store(true, Ordering::Relaxed);
    }
}

fn usage() -> Box<dyn std::error::Error> {
    "usage: text_sink local STREAM_NAME | text_sink remote HOST PORT".into()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("streamswitch=info".parse()?),
        )
        .init();

    let token = format!("{:06x}", std::process::id() & 0xff_ffff);
    let client = ClientInfo::new("text_dump")
        .token(token)
        .text("text_sink which prints media frames");
    let printer = Arc::new(Printer {
        mismatch: AtomicBool::new(false),
    });
    let sink = StreamSink::with_listener(SinkConfig::new(client), printer.clone());

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["local", name] => sink.init_local(name)?,
        ["remote", host, port] => sink.init_remote(host, port.parse()?)?,
        _ => return Err(usage()),
    }

    sink.register_sub_handler(opcode::STREAM_INFO, STREAM_INFO_CHANNEL, |packet, _| {
        if let Ok(info) = StreamInfo::from_packet(packet) {
            println!(
                "Stream '{}' state:{:?} bps:{} clients:{}",
                info.stream_name, info.state, info.cur_bps, info.client_num
            );
        }
    })?;

    let meta = sink.update_stream_metadata(RPC_TIMEOUT).await?;
    println!(
        "Metadata: ssrc 0x{:x}, {} substream(s)",
        meta.ssrc,
        meta.sub_streams.len()
    );
    sink.start()?;
    if let Err(e) = sink.key_frame(RPC_TIMEOUT).await {
        println!("Key frame request failed: {}", e);
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                if printer.mismatch.swap(false, Ordering::Relaxed) {
                    sink.stop().await?;
                    match sink.update_stream_metadata(RPC_TIMEOUT).await {
                        Ok(meta) => println!("Metadata refreshed, ssrc 0x{:x}", meta.ssrc),
                        Err(e) => println!("Metadata refresh failed: {}", e),
                    }
                    sink.start()?;
                }

                let local = sink.receiver_statistic();
                println!("Received {} bytes", local.sum_bytes);
                for sub in &local.sub_streams {
                    println!(
                        "  #{} frames:{} key:{} lost:{} gop:{}",
                        sub.sub_stream_index,
                        sub.data_frames,
                        sub.key_frames,
                        sub.lost_frames,
                        sub.last_gop
                    );
                }
                match sink.source_statistic(RPC_TIMEOUT).await {
                    Ok(remote) => println!("Source sent {} bytes", remote.sum_bytes),
                    Err(e) => println!("Source statistic failed: {}", e),
                }
            }
        }
    }

    sink.uninit().await?;
    Ok(())
}
