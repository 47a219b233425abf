//! Source engine

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use bytes::Bytes;
use prost::Message;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::config::SourceConfig;
use super::handler::{ApiHandler, Responder, RpcRequest};
use super::listener::SourceListener;
use crate::engine::{advance_tick, poll_timeout, EnginePhase, Lifecycle};
use crate::error::{Error, Result};
use crate::media::{MediaFrameInfo, StreamMetadata};
use crate::protocol::constants::{
    API_SOCKET_NAME, MEDIA_CHANNEL, PUBLISH_SOCKET_NAME, STREAM_INFO_CHANNEL,
};
use crate::protocol::message::{
    ClientHeartbeatRep, ClientHeartbeatReq, ClientListRep, ClientListReq, SourceStreamState,
    StreamInfoMsg,
};
use crate::protocol::packet::{self, opcode, status, CommonPacket};
use crate::registry::{ClientInfo, ClientRegistry, Touch};
use crate::stats::statistic::unix_now;
use crate::stats::{MediaStatisticInfo, StatisticsTable};
use crate::transport::rep::Replier;
use crate::transport::{lock, Endpoint, Multipart, PubSocket, RepSocket};

/// State guarded by the source lock
struct SourceState {
    meta: StreamMetadata,
    stats: StatisticsTable,
    clients: ClientRegistry,
    stream_state: SourceStreamState,
    publisher: Option<PubSocket>,
    cur_bps: u64,
    bytes_since_tick: u64,
    last_frame_time: Duration,
}

struct SourceShared {
    stream_name: String,
    state: Mutex<SourceState>,
    handlers: RwLock<HashMap<i32, ApiHandler>>,
    listener: Option<Arc<dyn SourceListener>>,
}

/// Producing endpoint of a stream
///
/// All methods take `&self`; share the source with `Arc` to feed frames from
/// several threads.
pub struct StreamSource {
    config: SourceConfig,
    shared: Arc<SourceShared>,
    lifecycle: Lifecycle<RepSocket>,
}

impl StreamSource {
    /// Create a source without a listener
    pub fn new(config: SourceConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a source whose key frame and statistic requests are reported
    /// to `listener`
    pub fn with_listener(config: SourceConfig, listener: Arc<dyn SourceListener>) -> Self {
        Self::build(config, Some(listener))
    }

    fn build(config: SourceConfig, listener: Option<Arc<dyn SourceListener>>) -> Self {
        let state = SourceState {
            meta: StreamMetadata::default(),
            stats: StatisticsTable::default(),
            clients: ClientRegistry::new(config.client_lease_secs, config.max_clients),
            stream_state: SourceStreamState::Connecting,
            publisher: None,
            cur_bps: 0,
            bytes_since_tick: 0,
            last_frame_time: Duration::ZERO,
        };
        Self {
            shared: Arc::new(SourceShared {
                stream_name: config.stream_name.clone(),
                state: Mutex::new(state),
                handlers: RwLock::new(HashMap::new()),
                listener,
            }),
            config,
            lifecycle: Lifecycle::new(),
        }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn stream_name(&self) -> &str {
        &self.config.stream_name
    }

    pub fn phase(&self) -> EnginePhase {
        self.lifecycle.phase()
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle.is_initialized()
    }

    pub fn is_started(&self) -> bool {
        self.lifecycle.is_started()
    }

    /// Bind the control and broadcast sockets and install the built-in
    /// handlers.
    ///
    /// Sockets are bound on the stream's local addresses and, when a TCP
    /// port is configured, on `tcp://*:port` (control) and `port + 1`
    /// (broadcast).
    pub async fn init(&self) -> Result<()> {
        self.config.validate()?;
        if self.lifecycle.is_initialized() {
            return Err(Error::Param("source already initialized".into()));
        }

        let name = self.stream_name();
        let mut api = RepSocket::new();
        api.bind(&Endpoint::local(name, API_SOCKET_NAME)).await?;
        let mut publisher = PubSocket::new(self.config.pub_queue_size);
        publisher
            .bind(&Endpoint::local(name, PUBLISH_SOCKET_NAME))
            .await?;

        if let Some(port) = self.config.tcp_port {
            api.bind(&Endpoint::tcp("*", port)).await?;
            publisher.bind(&Endpoint::tcp("*", port + 1)).await?;
        }

        self.lifecycle.init(api)?;
        lock(&self.shared.state).publisher = Some(publisher);
        self.register_builtin_handlers();

        tracing::info!(
            stream = %name,
            tcp_port = ?self.config.tcp_port,
            "Source initialized"
        );
        Ok(())
    }

    /// Spawn the worker task. Requires a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let shared = self.shared.clone();
        let interval = self.config.heartbeat_interval;
        self.lifecycle
            .start(move |api, cancel| run_worker(shared, api, cancel, interval))?;
        tracing::info!(stream = %self.stream_name(), "Source started");
        Ok(())
    }

    /// Stop the worker task and wait for it to exit
    pub async fn stop(&self) -> Result<()> {
        let was_started = self.is_started();
        self.lifecycle.stop().await?;
        if was_started {
            tracing::info!(stream = %self.stream_name(), "Source stopped");
        }
        Ok(())
    }

    /// Stop, then release all sockets and handlers
    pub async fn uninit(&self) -> Result<()> {
        drop(self.lifecycle.uninit().await?);
        lock(&self.shared.state).publisher = None;
        self.unregister_all_api_handlers();
        let _ = std::fs::remove_dir(Endpoint::local_dir(self.stream_name()));
        tracing::info!(stream = %self.stream_name(), "Source uninitialized");
        Ok(())
    }

    /// Install or replace the handler for `code`
    pub fn register_api_handler<F>(&self, code: i32, handler: F)
    where
        F: Fn(RpcRequest, Responder) + Send + Sync + 'static,
    {
        self.shared.register(code, Arc::new(handler));
    }

    pub fn unregister_api_handler(&self, code: i32) {
        write_handlers(&self.shared.handlers).remove(&code);
    }

    pub fn unregister_all_api_handlers(&self) {
        write_handlers(&self.shared.handlers).clear();
    }

    fn register_builtin_handlers(&self) {
        let builtins: [(i32, fn(&SourceShared, RpcRequest, Responder)); 5] = [
            (opcode::METADATA, SourceShared::handle_metadata),
            (opcode::KEY_FRAME, SourceShared::handle_key_frame),
            (opcode::MEDIA_STATISTIC, SourceShared::handle_statistic),
            (opcode::CLIENT_HEARTBEAT, SourceShared::handle_heartbeat),
            (opcode::CLIENT_LIST, SourceShared::handle_client_list),
        ];
        for (code, handler) in builtins {
            let weak = Arc::downgrade(&self.shared);
            self.shared.register(
                code,
                Arc::new(move |request: RpcRequest, responder: Responder| {
                    if let Some(shared) = weak.upgrade() {
                        handler(&shared, request, responder);
                    }
                }),
            );
        }
    }

    /// Replace the stream metadata.
    ///
    /// Statistics are reset when the ssrc or the number of substreams
    /// changes.
    pub fn set_stream_meta(&self, meta: StreamMetadata) -> Result<()> {
        meta.validate()?;
        let mut state = lock(&self.shared.state);
        if meta.ssrc != state.meta.ssrc || meta.sub_streams.len() != state.stats.len() {
            state.stats = StatisticsTable::for_metadata(&meta);
            tracing::debug!(stream = %self.stream_name(), ssrc = meta.ssrc, "Statistics reset");
        }
        state.meta = meta;
        Ok(())
    }

    pub fn stream_meta(&self) -> StreamMetadata {
        lock(&self.shared.state).meta.clone()
    }

    /// Update the stream state; a change is broadcast right away
    pub fn set_stream_state(&self, stream_state: SourceStreamState) {
        let mut state = lock(&self.shared.state);
        if state.stream_state != stream_state {
            tracing::info!(
                stream = %self.stream_name(),
                from = ?state.stream_state,
                to = ?stream_state,
                "Stream state changed"
            );
            state.stream_state = stream_state;
            self.shared.publish_stream_info(&state);
        }
    }

    pub fn stream_state(&self) -> SourceStreamState {
        lock(&self.shared.state).stream_state
    }

    /// Bitrate measured over the last heartbeat interval
    pub fn current_bps(&self) -> u64 {
        lock(&self.shared.state).cur_bps
    }

    /// Local statistics snapshot
    pub fn statistic(&self) -> MediaStatisticInfo {
        let state = lock(&self.shared.state);
        state.stats.snapshot(state.meta.ssrc)
    }

    /// Number of clients holding a lease
    pub fn client_count(&self) -> usize {
        lock(&self.shared.state).clients.len()
    }

    /// Page of registered clients and the total count
    pub fn client_list(&self, start: usize, count: usize) -> (usize, Vec<ClientInfo>) {
        lock(&self.shared.state).clients.list(start, count)
    }

    /// Broadcast one frame.
    ///
    /// Fails with `Param` if the frame's ssrc does not match the current
    /// metadata or its substream does not exist. Key and data frames get the
    /// next sequence number of their substream; parameter and EOF frames
    /// repeat the last one.
    pub fn send_live_media_frame(&self, frame: &MediaFrameInfo, payload: Bytes) -> Result<()> {
        let mut state = lock(&self.shared.state);
        if state.publisher.is_none() {
            return Err(Error::General("source not initialized".into()));
        }
        if frame.ssrc != state.meta.ssrc {
            return Err(Error::Param(format!(
                "ssrc {} does not match metadata ssrc {}",
                frame.ssrc, state.meta.ssrc
            )));
        }

        let size = payload.len();
        let seq = {
            let stat = state.stats.get_mut(frame.sub_stream_index).ok_or_else(|| {
                Error::Param(format!("Sub Stream({}) Not Found", frame.sub_stream_index))
            })?;
            if frame.is_media() {
                stat.record_sent(frame.is_key(), size)
            } else {
                stat.last_seq
            }
        };
        state.bytes_since_tick += size as u64;
        state.last_frame_time = frame.timestamp;

        let header = frame.to_msg(seq);
        let packet = CommonPacket::message(opcode::MEDIA, Bytes::from(header.encode_to_vec()));
        if let Some(publisher) = state.publisher.as_ref() {
            publisher.send(packet::encode_broadcast(MEDIA_CHANNEL, &packet, Some(payload)));
        }
        Ok(())
    }
}

fn write_handlers(
    handlers: &RwLock<HashMap<i32, ApiHandler>>,
) -> std::sync::RwLockWriteGuard<'_, HashMap<i32, ApiHandler>> {
    handlers
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn log_reply(code: i32, result: Result<()>) {
    if let Err(e) = result {
        tracing::debug!(code = code, error = %e, "Failed to send reply");
    }
}

impl SourceShared {
    fn register(&self, code: i32, handler: ApiHandler) {
        write_handlers(&self.handlers).insert(code, handler);
    }

    fn handler(&self, code: i32) -> Option<ApiHandler> {
        self.handlers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&code)
            .cloned()
    }

    /// Route one control request to its handler
    fn dispatch(&self, peer: u64, parts: Multipart, replier: &Replier) {
        let (request, blob) = match packet::decode(parts) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(
                    stream = %self.stream_name,
                    peer = peer,
                    error = %e,
                    "Unparsable request"
                );
                let reply = CommonPacket::orphan_reply(status::BAD_REQUEST, "Request Parse Error");
                log_reply(0, replier.send(peer, packet::encode(&reply, None)).map_err(Error::from));
                return;
            }
        };

        let code = request.code();
        tracing::debug!(stream = %self.stream_name, code = code, seq = request.seq(), "Request");

        let responder = Responder::new(&request, peer, replier.clone());
        match self.handler(code) {
            Some(handler) => handler(
                RpcRequest {
                    packet: request,
                    blob,
                },
                responder,
            ),
            None => {
                let info = format!("Handler for code({}) Not Found", code);
                log_reply(code, responder.error(status::INTERNAL_ERR, &info));
            }
        }
    }

    fn handle_metadata(&self, _request: RpcRequest, responder: Responder) {
        let reply = lock(&self.state).meta.to_reply();
        log_reply(opcode::METADATA, responder.ok(&reply));
    }

    fn handle_key_frame(&self, _request: RpcRequest, responder: Responder) {
        if let Some(listener) = &self.listener {
            listener.on_key_frame();
        }
        log_reply(opcode::KEY_FRAME, responder.ok_empty());
    }

    fn handle_statistic(&self, _request: RpcRequest, responder: Responder) {
        let mut statistic = {
            let state = lock(&self.state);
            state.stats.snapshot(state.meta.ssrc)
        };
        if let Some(listener) = &self.listener {
            listener.on_media_statistic(&mut statistic);
        }
        log_reply(opcode::MEDIA_STATISTIC, responder.ok(&statistic.to_reply()));
    }

    fn handle_heartbeat(&self, request: RpcRequest, responder: Responder) {
        let client = match request.decode_body::<ClientHeartbeatReq>() {
            Ok(body) => ClientInfo::from(body),
            Err(_) => {
                let result =
                    responder.error(status::BAD_REQUEST, "ClientHeartbeatReq body Parse Error");
                log_reply(opcode::CLIENT_HEARTBEAT, result);
                return;
            }
        };

        let now = unix_now();
        let (touched, lease) = {
            let mut state = lock(&self.state);
            let lease = state.clients.lease_secs();
            (state.clients.touch(client.clone(), now), lease)
        };

        let result = match touched {
            Ok(touch) => {
                if touch == Touch::Inserted {
                    tracing::info!(
                        stream = %self.stream_name,
                        client = %client,
                        protocol = %client.protocol,
                        "Client registered"
                    );
                }
                responder.ok(&ClientHeartbeatRep {
                    timestamp: now,
                    lease,
                })
            }
            Err(e) => {
                tracing::warn!(
                    stream = %self.stream_name,
                    client = %client,
                    error = %e,
                    "Client rejected"
                );
                responder.error(status::BAD_REQUEST, &e.to_string())
            }
        };
        log_reply(opcode::CLIENT_HEARTBEAT, result);
    }

    fn handle_client_list(&self, request: RpcRequest, responder: Responder) {
        let query = match request.decode_body::<ClientListReq>() {
            Ok(query) => query,
            Err(_) => {
                let result = responder.error(status::BAD_REQUEST, "ClientListReq body Parse Error");
                log_reply(opcode::CLIENT_LIST, result);
                return;
            }
        };

        let (total, page) = lock(&self.state)
            .clients
            .list(query.start_index as usize, query.client_num as usize);
        let reply = ClientListRep {
            total_num: total as u32,
            start_index: query.start_index,
            client_list: page.iter().map(ClientInfo::to_msg).collect(),
        };
        log_reply(opcode::CLIENT_LIST, responder.ok(&reply));
    }

    /// Heartbeat tick: bitrate, lease eviction and stream info
    fn on_tick(&self, elapsed: Duration) {
        let mut state = lock(&self.state);

        let elapsed_ms = elapsed.as_millis() as u64;
        if elapsed_ms > 0 {
            state.cur_bps = state.bytes_since_tick * 8 * 1000 / elapsed_ms;
            state.bytes_since_tick = 0;
        }

        for client in state.clients.evict(unix_now()) {
            tracing::info!(stream = %self.stream_name, client = %client, "Client lease expired");
        }

        self.publish_stream_info(&state);
    }

    fn publish_stream_info(&self, state: &SourceState) {
        let Some(publisher) = state.publisher.as_ref() else {
            return;
        };
        let info = StreamInfoMsg {
            state: state.stream_state as i32,
            play_type: state.meta.play_type as i32,
            ssrc: state.meta.ssrc,
            source_proto: state.meta.source_proto.clone(),
            cur_bps: state.cur_bps,
            last_frame_sec: state.last_frame_time.as_secs() as i64,
            last_frame_usec: i64::from(state.last_frame_time.subsec_micros()),
            stream_name: self.stream_name.clone(),
            client_num: state.clients.len() as u32,
        };
        let packet = CommonPacket::message(opcode::STREAM_INFO, Bytes::from(info.encode_to_vec()));
        publisher.send(packet::encode_broadcast(STREAM_INFO_CHANNEL, &packet, None));
        tracing::trace!(stream = %self.stream_name, bps = state.cur_bps, "Stream info published");
    }
}

async fn run_worker(
    shared: Arc<SourceShared>,
    mut api: RepSocket,
    cancel: CancellationToken,
    interval: Duration,
) -> RepSocket {
    let replier = api.replier();
    let mut last_tick = Instant::now();
    let mut next_tick = last_tick + interval;

    loop {
        let now = Instant::now();
        if now >= next_tick {
            shared.on_tick(now - last_tick);
            last_tick = now;
            next_tick = advance_tick(next_tick, interval, now);
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            request = api.recv() => match request {
                Some((peer, parts)) => shared.dispatch(peer, parts, &replier),
                None => break,
            },
            () = tokio::time::sleep(poll_timeout(now, next_tick)) => {}
        }
    }

    api
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{RpcClient, SequenceCounter};
    use crate::media::{MediaFrameType, MediaParams, MediaType};
    use crate::protocol::message::{MediaStatisticReply, MetadataReply};
    use crate::transport::SubSocket;
    use crate::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT: AtomicUsize = AtomicUsize::new(0);

    fn unique_name() -> String {
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        format!("src-{}-{}", std::process::id(), n)
    }

    fn video_meta(ssrc: u32) -> StreamMetadata {
        let mut meta = StreamMetadata {
            ssrc,
            ..StreamMetadata::live("test")
        };
        meta.add_sub_stream(MediaType::Video, "H264", MediaParams::None);
        meta
    }

    fn rpc_for(source: &StreamSource) -> RpcClient {
        RpcClient::new(
            Endpoint::local(source.stream_name(), API_SOCKET_NAME),
            Arc::new(SequenceCounter::new()),
        )
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
        let deadline = Instant::now() + TIMEOUT;
        while !check() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[derive(Default)]
    struct Recorder {
        key_frames: AtomicUsize,
    }

    impl SourceListener for Recorder {
        fn on_key_frame(&self) {
            self.key_frames.fetch_add(1, Ordering::SeqCst);
        }

        fn on_media_statistic(&self, statistic: &mut MediaStatisticInfo) {
            statistic.sum_bytes = 1234;
        }
    }

    #[test]
    fn test_send_requires_init() {
        let source = StreamSource::new(SourceConfig::new("unused"));
        let frame = MediaFrameInfo::new(0, MediaFrameType::Key, 0);
        let err = source.send_live_media_frame(&frame, Bytes::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::General);
    }

    #[tokio::test]
    async fn test_send_checks_ssrc_and_index() {
        let source = StreamSource::new(SourceConfig::new(unique_name()));
        source.init().await.unwrap();
        source.set_stream_meta(video_meta(42)).unwrap();

        let foreign = MediaFrameInfo::new(0, MediaFrameType::Key, 7);
        let err = source.send_live_media_frame(&foreign, Bytes::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Param);

        let missing = MediaFrameInfo::new(3, MediaFrameType::Key, 42);
        let err = source.send_live_media_frame(&missing, Bytes::new()).unwrap_err();
        assert!(err.to_string().contains("Sub Stream(3) Not Found"));

        let key = MediaFrameInfo::new(0, MediaFrameType::Key, 42);
        source
            .send_live_media_frame(&key, Bytes::from_static(b"abcd"))
            .unwrap();
        let param = MediaFrameInfo::new(0, MediaFrameType::Param, 42);
        source
            .send_live_media_frame(&param, Bytes::from_static(b"sps"))
            .unwrap();

        let stat = source.statistic();
        assert_eq!(stat.sum_bytes, 4);
        assert_eq!(stat.sub_streams[0].key_frames, 1);
        assert_eq!(stat.sub_streams[0].last_seq, 1);

        source.uninit().await.unwrap();
    }

    #[tokio::test]
    async fn test_ssrc_change_resets_statistics() {
        let source = StreamSource::new(SourceConfig::new(unique_name()));
        source.init().await.unwrap();
        source.set_stream_meta(video_meta(1)).unwrap();

        let frame = MediaFrameInfo::new(0, MediaFrameType::Data, 1);
        source
            .send_live_media_frame(&frame, Bytes::from_static(b"xy"))
            .unwrap();
        source.set_stream_meta(video_meta(1)).unwrap();
        assert_eq!(source.statistic().sum_bytes, 2);

        source.set_stream_meta(video_meta(2)).unwrap();
        assert_eq!(source.statistic().sum_bytes, 0);

        source.uninit().await.unwrap();
    }

    #[tokio::test]
    async fn test_builtin_handlers() {
        let source = StreamSource::new(SourceConfig::new(unique_name()));
        source.init().await.unwrap();
        source.set_stream_meta(video_meta(42)).unwrap();
        source.start().unwrap();
        let rpc = rpc_for(&source);

        let meta: MetadataReply = rpc
            .call(opcode::METADATA, Bytes::new(), None, TIMEOUT)
            .await
            .unwrap()
            .reply
            .decode_body()
            .unwrap();
        assert_eq!(meta.ssrc, 42);
        assert_eq!(meta.sub_streams.len(), 1);

        for port in [1000, 1001, 1002] {
            let client = ClientInfo::new("test").address("10.0.0.1", port);
            let rep: ClientHeartbeatRep = rpc
                .request(opcode::CLIENT_HEARTBEAT, &client.to_msg(), TIMEOUT)
                .await
                .unwrap();
            assert_eq!(rep.lease, 15);
        }
        assert_eq!(source.client_count(), 3);

        let page: ClientListRep = rpc
            .request(
                opcode::CLIENT_LIST,
                &ClientListReq {
                    start_index: 1,
                    client_num: 5,
                },
                TIMEOUT,
            )
            .await
            .unwrap();
        assert_eq!(page.total_num, 3);
        assert_eq!(page.start_index, 1);
        assert_eq!(page.client_list.len(), 2);

        source.uninit().await.unwrap();
    }

    #[tokio::test]
    async fn test_reply_masking() {
        let source = StreamSource::new(SourceConfig::new(unique_name()));
        source.init().await.unwrap();
        source.register_api_handler(opcode::USER_DEFINED_BASE, |_request, _responder| {});
        source.register_api_handler(opcode::USER_DEFINED_BASE + 1, |request, responder| {
            let echo = request.blob.unwrap_or_default();
            let _ = responder.reply(status::OK, "", Bytes::new(), Some(echo));
        });
        source.start().unwrap();
        let rpc = rpc_for(&source);

        let err = rpc
            .call(opcode::USER_DEFINED_BASE + 7, Bytes::new(), None, TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(err.to_string().contains("Not Found"));

        let err = rpc
            .call(opcode::USER_DEFINED_BASE, Bytes::new(), None, TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);

        let result = rpc
            .call(
                opcode::USER_DEFINED_BASE + 1,
                Bytes::new(),
                Some(Bytes::from_static(b"ping")),
                TIMEOUT,
            )
            .await
            .unwrap();
        assert_eq!(result.blob.unwrap(), Bytes::from_static(b"ping"));

        let err = rpc
            .call(opcode::CLIENT_HEARTBEAT, Bytes::from_static(b"\xff"), None, TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Client);

        source.uninit().await.unwrap();
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let source = StreamSource::new(SourceConfig::new(unique_name()));
        assert!(source.start().is_err());

        source.init().await.unwrap();
        assert!(source.init().await.is_err());
        source.start().unwrap();
        source.start().unwrap();
        assert!(source.is_started());

        source.stop().await.unwrap();
        assert_eq!(source.phase(), EnginePhase::Initialized);
        source.start().unwrap();
        source.uninit().await.unwrap();
        assert_eq!(source.phase(), EnginePhase::Uninitialized);
    }

    #[tokio::test]
    async fn test_listener_callbacks() {
        let recorder = Arc::new(Recorder::default());
        let source = StreamSource::with_listener(
            SourceConfig::new(unique_name()),
            recorder.clone(),
        );
        source.init().await.unwrap();
        source.set_stream_meta(video_meta(42)).unwrap();
        source.start().unwrap();
        let rpc = rpc_for(&source);

        rpc.call(opcode::KEY_FRAME, Bytes::new(), None, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(recorder.key_frames.load(Ordering::SeqCst), 1);

        let stat: MediaStatisticReply = rpc
            .call(opcode::MEDIA_STATISTIC, Bytes::new(), None, TIMEOUT)
            .await
            .unwrap()
            .reply
            .decode_body()
            .unwrap();
        assert_eq!(stat.ssrc, 42);
        assert_eq!(stat.sum_bytes, 1234);
        assert_eq!(stat.sub_stream_stats.len(), 1);

        source.uninit().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_change_publishes_info() {
        let source = StreamSource::new(SourceConfig::new(unique_name()));
        source.init().await.unwrap();
        source.set_stream_meta(video_meta(42)).unwrap();

        let mut sub = SubSocket::connect(
            Endpoint::local(source.stream_name(), PUBLISH_SOCKET_NAME),
            vec![Bytes::from_static(STREAM_INFO_CHANNEL.as_bytes())],
            16,
        );
        wait_until("subscriber", || {
            lock(&source.shared.state)
                .publisher
                .as_ref()
                .map_or(0, PubSocket::subscriber_count)
                == 1
        })
        .await;

        // no worker runs, so only the state change itself is broadcast
        source.set_stream_state(SourceStreamState::Ok);
        let parts = tokio::time::timeout(TIMEOUT, sub.recv())
            .await
            .unwrap()
            .unwrap();
        let (channel, packet, _) = packet::decode_broadcast(parts).unwrap();
        assert_eq!(channel, STREAM_INFO_CHANNEL);
        assert_eq!(packet.code(), opcode::STREAM_INFO);
        let info: StreamInfoMsg = packet.decode_body().unwrap();
        assert_eq!(info.state, SourceStreamState::Ok as i32);
        assert_eq!(info.ssrc, 42);
        assert_eq!(info.stream_name, source.stream_name());

        source.set_stream_state(SourceStreamState::Ok);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(sub.try_recv().is_none());

        source.uninit().await.unwrap();
    }

    #[tokio::test]
    async fn test_tick_measures_bitrate() {
        let config =
            SourceConfig::new(unique_name()).heartbeat_interval(Duration::from_millis(50));
        let source = StreamSource::new(config);
        source.init().await.unwrap();
        source.set_stream_meta(video_meta(42)).unwrap();
        source.start().unwrap();
        assert_eq!(source.current_bps(), 0);

        let frame = MediaFrameInfo::new(0, MediaFrameType::Data, 42);
        let deadline = Instant::now() + TIMEOUT;
        while source.current_bps() == 0 {
            assert!(Instant::now() < deadline, "bitrate never measured");
            source
                .send_live_media_frame(&frame, Bytes::from(vec![0u8; 1000]))
                .unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // an idle interval brings the rate back down
        wait_until("idle bitrate", || source.current_bps() == 0).await;

        source.uninit().await.unwrap();
    }

    #[tokio::test]
    async fn test_tick_evicts_expired_clients() {
        let config = SourceConfig::new(unique_name())
            .heartbeat_interval(Duration::from_millis(50))
            .client_lease_secs(1);
        let source = StreamSource::new(config);
        source.init().await.unwrap();
        source.start().unwrap();
        let rpc = rpc_for(&source);

        let client = ClientInfo::new("test").address("10.0.0.1", 1000);
        let rep: ClientHeartbeatRep = rpc
            .request(opcode::CLIENT_HEARTBEAT, &client.to_msg(), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(rep.lease, 1);
        assert_eq!(source.client_count(), 1);

        wait_until("lease expiry", || source.client_count() == 0).await;

        source.uninit().await.unwrap();
    }
}
