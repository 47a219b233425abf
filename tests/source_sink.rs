//! Source and sink talking over local sockets

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use prost::Message;
use tokio_test::{assert_err, assert_ok};

use streamswitch::media::{MediaFrameInfo, MediaFrameType, MediaParams, MediaType, StreamMetadata};
use streamswitch::protocol::constants::{
    API_SOCKET_NAME, MEDIA_CHANNEL, PUBLISH_SOCKET_NAME, STREAM_INFO_CHANNEL,
};
use streamswitch::protocol::packet::{self, opcode, status, CommonPacket};
use streamswitch::registry::ClientInfo;
use streamswitch::sink::StreamInfo;
use streamswitch::transport::{Endpoint, PubSocket, RepSocket};
use streamswitch::{ErrorKind, SinkConfig, SinkListener, SourceConfig, StreamSink, StreamSource};

const RPC_TIMEOUT: Duration = Duration::from_secs(5);

static NEXT: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}", prefix, std::process::id(), n)
}

#[derive(Default)]
struct Recorder {
    frames: Mutex<Vec<(MediaFrameInfo, Bytes)>>,
    mismatches: Mutex<Vec<u32>>,
}

impl Recorder {
    fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    fn mismatches(&self) -> Vec<u32> {
        self.mismatches.lock().unwrap().clone()
    }
}

impl SinkListener for Recorder {
    fn on_live_media_frame(&self, frame: &MediaFrameInfo, payload: &Bytes) {
        self.frames.lock().unwrap().push((*frame, payload.clone()));
    }

    fn on_metadata_mismatch(&self, ssrc: u32) {
        self.mismatches.lock().unwrap().push(ssrc);
    }
}

/// Poll `check` until it holds, failing the test after five seconds
async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn video_meta() -> StreamMetadata {
    let mut meta = StreamMetadata::live("test");
    meta.add_sub_stream(MediaType::Video, "H264", MediaParams::None);
    meta
}

fn fast_sink_config() -> SinkConfig {
    SinkConfig::new(ClientInfo::new("test").address("127.0.0.1", 5000).token("t1"))
        .heartbeat_interval(Duration::from_millis(50))
}

#[tokio::test]
async fn test_frames_flow_from_source_to_sink() {
    let name = unique_name("flow");
    let source = StreamSource::new(SourceConfig::new(&name));
    assert_ok!(source.init().await);
    let meta = video_meta();
    let ssrc = meta.ssrc;
    assert_ok!(source.set_stream_meta(meta));
    assert_ok!(source.start());

    let recorder = Arc::new(Recorder::default());
    let sink = StreamSink::with_listener(fast_sink_config(), recorder.clone());
    assert_ok!(sink.init_local(&name));
    let fetched = assert_ok!(sink.update_stream_metadata(RPC_TIMEOUT).await);
    assert_eq!(fetched.ssrc, ssrc);
    assert_eq!(fetched.sub_streams.len(), 1);
    assert_ok!(sink.start());

    let key = MediaFrameInfo::new(0, MediaFrameType::Key, ssrc);
    wait_for("first frame", || async {
        assert_ok!(source.send_live_media_frame(&key, Bytes::from_static(b"key")));
        recorder.frame_count() > 0
    })
    .await;

    let before = recorder.frame_count();
    let data = MediaFrameInfo::new(0, MediaFrameType::Data, ssrc);
    for _ in 0..4 {
        assert_ok!(source.send_live_media_frame(&data, Bytes::from_static(b"data")));
    }
    wait_for("data frames", || async { recorder.frame_count() >= before + 4 }).await;

    let received = sink.receiver_statistic();
    assert_eq!(received.ssrc, ssrc);
    assert_eq!(received.sub_streams[0].lost_frames, 0);

    let sent = assert_ok!(sink.source_statistic(RPC_TIMEOUT).await);
    assert_eq!(sent.ssrc, ssrc);
    assert!(sent.sub_streams[0].data_frames >= received.sub_streams[0].data_frames);
    assert_eq!(sent.sub_streams[0].lost_frames, 0);

    assert_ok!(sink.key_frame(RPC_TIMEOUT).await);
    assert_ok!(sink.uninit().await);
    assert_ok!(source.uninit().await);
}

#[tokio::test]
async fn test_sequence_gap_counts_as_loss() {
    let name = unique_name("gap");
    let mut meta = video_meta();
    meta.ssrc = 42;
    let meta_reply = Bytes::from(meta.to_reply().encode_to_vec());

    let mut api = RepSocket::new();
    assert_ok!(api.bind(&Endpoint::local(&name, API_SOCKET_NAME)).await);
    let mut publisher = PubSocket::new(16);
    assert_ok!(publisher.bind(&Endpoint::local(&name, PUBLISH_SOCKET_NAME)).await);

    let server = tokio::spawn(async move {
        while let Some((peer, parts)) = api.recv().await {
            let Ok((request, _)) = packet::decode(parts) else {
                continue;
            };
            let body = if request.code() == opcode::METADATA {
                meta_reply.clone()
            } else {
                Bytes::new()
            };
            let reply = CommonPacket::reply_to(&request, status::OK, "", body);
            let _ = api.send(peer, packet::encode(&reply, None));
        }
    });

    let recorder = Arc::new(Recorder::default());
    let sink = StreamSink::with_listener(fast_sink_config(), recorder.clone());
    assert_ok!(sink.init_local(&name));
    let fetched = assert_ok!(sink.update_stream_metadata(RPC_TIMEOUT).await);
    assert_eq!(fetched.ssrc, 42);
    assert_eq!(fetched.sub_streams.len(), 1);
    assert_ok!(sink.start());
    wait_for("subscription", || async { publisher.subscriber_count() == 1 }).await;

    for seq in [1, 2, 4] {
        let header = MediaFrameInfo::new(0, MediaFrameType::Data, 42).to_msg(seq);
        let packet = CommonPacket::message(opcode::MEDIA, Bytes::from(header.encode_to_vec()));
        publisher.send(packet::encode_broadcast(
            MEDIA_CHANNEL,
            &packet,
            Some(Bytes::from_static(b"frame")),
        ));
    }
    wait_for("three frames", || async { recorder.frame_count() == 3 }).await;

    let stat = &sink.receiver_statistic().sub_streams[0];
    assert_eq!(stat.data_frames, 3);
    assert_eq!(stat.lost_frames, 1);
    assert_eq!(stat.last_seq, 4);

    assert_ok!(sink.uninit().await);
    server.abort();
}

#[tokio::test]
async fn test_heartbeat_registers_client() {
    let name = unique_name("lease");
    let source = StreamSource::new(SourceConfig::new(&name));
    assert_ok!(source.init().await);
    assert_ok!(source.start());

    let sink = StreamSink::new(fast_sink_config());
    assert_ok!(sink.init_local(&name));
    assert_ok!(sink.start());
    wait_for("client registration", || async { source.client_count() == 1 }).await;

    let (total, clients) = assert_ok!(sink.client_list(0, 10, RPC_TIMEOUT).await);
    assert_eq!(total, 1);
    assert_eq!(clients[0].protocol, "test");
    assert_eq!(clients[0].token, "t1");
    assert_eq!(clients[0].port, 5000);

    let (total, clients) = assert_ok!(sink.client_list(5, 10, RPC_TIMEOUT).await);
    assert_eq!(total, 1);
    assert!(clients.is_empty());

    assert_ok!(sink.uninit().await);
    assert_ok!(source.uninit().await);
}

#[tokio::test]
async fn test_ssrc_change_notifies_once() {
    let name = unique_name("ssrc");
    let source = StreamSource::new(SourceConfig::new(&name));
    assert_ok!(source.init().await);
    let meta = video_meta();
    let old_ssrc = meta.ssrc;
    assert_ok!(source.set_stream_meta(meta));
    assert_ok!(source.start());

    let recorder = Arc::new(Recorder::default());
    let sink = StreamSink::with_listener(fast_sink_config(), recorder.clone());
    assert_ok!(sink.init_local(&name));
    assert_ok!(sink.update_stream_metadata(RPC_TIMEOUT).await);
    assert_ok!(sink.start());

    let frame = MediaFrameInfo::new(0, MediaFrameType::Key, old_ssrc);
    wait_for("first frame", || async {
        assert_ok!(source.send_live_media_frame(&frame, Bytes::from_static(b"a")));
        recorder.frame_count() > 0
    })
    .await;

    let mut restarted = video_meta();
    while restarted.ssrc == old_ssrc {
        restarted.regenerate_ssrc();
    }
    let new_ssrc = restarted.ssrc;
    assert_ok!(source.set_stream_meta(restarted));
    let frame = MediaFrameInfo::new(0, MediaFrameType::Key, new_ssrc);
    for _ in 0..5 {
        assert_ok!(source.send_live_media_frame(&frame, Bytes::from_static(b"b")));
    }
    wait_for("mismatch", || async { !recorder.mismatches().is_empty() }).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(recorder.mismatches(), vec![new_ssrc]);
    assert!(recorder
        .frames
        .lock()
        .unwrap()
        .iter()
        .all(|(frame, _)| frame.ssrc == old_ssrc));

    // after re-fetching the metadata, frames are delivered again
    assert_ok!(sink.stop().await);
    let fetched = assert_ok!(sink.update_stream_metadata(RPC_TIMEOUT).await);
    assert_eq!(fetched.ssrc, new_ssrc);
    assert_eq!(sink.receiver_statistic().sub_streams[0].data_frames, 0);
    assert_ok!(sink.start());
    let before = recorder.frame_count();
    wait_for("frames after refresh", || async {
        assert_ok!(source.send_live_media_frame(&frame, Bytes::from_static(b"c")));
        recorder.frame_count() > before
    })
    .await;

    assert_ok!(sink.uninit().await);
    assert_ok!(source.uninit().await);
}

#[tokio::test]
async fn test_stream_info_reaches_custom_handler() {
    let name = unique_name("info");
    let source = StreamSource::new(
        SourceConfig::new(&name).heartbeat_interval(Duration::from_millis(50)),
    );
    assert_ok!(source.init().await);
    assert_ok!(source.set_stream_meta(video_meta()));
    assert_ok!(source.start());

    let infos = Arc::new(Mutex::new(Vec::new()));
    let seen = infos.clone();
    let sink = StreamSink::new(fast_sink_config());
    assert_ok!(sink.init_local(&name));
    assert_ok!(sink.register_sub_handler(
        opcode::STREAM_INFO,
        STREAM_INFO_CHANNEL,
        move |packet, _| {
            if let Ok(info) = StreamInfo::from_packet(packet) {
                seen.lock().unwrap().push(info);
            }
        }
    ));
    assert_ok!(sink.start());

    wait_for("stream info", || async { !infos.lock().unwrap().is_empty() }).await;
    let info = infos.lock().unwrap()[0].clone();
    assert_eq!(info.stream_name, name);
    assert_eq!(info.source_proto, "test");

    assert_ok!(sink.uninit().await);
    assert_ok!(source.uninit().await);
}

#[tokio::test]
async fn test_call_times_out_then_recovers() {
    let name = unique_name("timeout");
    let mut api = RepSocket::new();
    assert_ok!(api.bind(&Endpoint::local(&name, API_SOCKET_NAME)).await);

    // the first request is never answered
    let server = tokio::spawn(async move {
        let mut swallow = true;
        while let Some((peer, parts)) = api.recv().await {
            if std::mem::take(&mut swallow) {
                continue;
            }
            if let Ok((request, _)) = packet::decode(parts) {
                let reply = CommonPacket::reply_to(&request, status::OK, "", Bytes::new());
                let _ = api.send(peer, packet::encode(&reply, None));
            }
        }
    });

    let sink = StreamSink::new(SinkConfig::default());
    assert_ok!(sink.init_local(&name));

    let err = assert_err!(sink.key_frame(Duration::from_millis(200)).await);
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_ok!(sink.key_frame(RPC_TIMEOUT).await);

    assert_ok!(sink.uninit().await);
    server.abort();
}

#[tokio::test]
async fn test_source_name_in_use() {
    let name = unique_name("busy");
    let first = StreamSource::new(SourceConfig::new(&name));
    assert_ok!(first.init().await);

    let second = StreamSource::new(SourceConfig::new(&name));
    let err = assert_err!(second.init().await);
    assert_eq!(err.kind(), ErrorKind::System);

    assert_ok!(first.uninit().await);
    let third = StreamSource::new(SourceConfig::new(&name));
    assert_ok!(third.init().await);
    assert_ok!(third.uninit().await);
}
