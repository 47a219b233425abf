//! Sink engine

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock, RwLockWriteGuard};
use std::time::Duration;

use bytes::Bytes;
use prost::Message;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::config::SinkConfig;
use super::heartbeat::{HeartbeatSchedule, LeaseRenewer};
use super::listener::SinkListener;
use crate::client::{RpcClient, RpcResult, SequenceCounter};
use crate::engine::{advance_tick, poll_timeout, EnginePhase, Lifecycle};
use crate::error::{Error, Result};
use crate::media::{MediaFrameInfo, StreamMetadata};
use crate::protocol::constants::{API_SOCKET_NAME, MEDIA_CHANNEL, PUBLISH_SOCKET_NAME};
use crate::protocol::message::{
    ClientListRep, ClientListReq, MediaFrameMsg, MediaStatisticReply, MetadataReply,
};
use crate::protocol::packet::{self, opcode, CommonPacket};
use crate::registry::ClientInfo;
use crate::source::config::validate_stream_name;
use crate::stats::{MediaStatisticInfo, StatisticsTable};
use crate::transport::{lock, Endpoint, Multipart, SubSocket};

/// Handler for one broadcast opcode: the message and its raw blob
pub type SubHandler = Arc<dyn Fn(&CommonPacket, Option<&Bytes>) + Send + Sync>;

struct SubEntry {
    channel: String,
    handler: SubHandler,
}

struct SinkState {
    meta: StreamMetadata,
    stats: StatisticsTable,
    client_info: ClientInfo,
    /// Ssrc of the last frame seen, to report each foreign ssrc once
    last_frame_ssrc: u32,
}

struct SinkShared {
    state: Mutex<SinkState>,
    handlers: RwLock<HashMap<i32, SubEntry>>,
    listener: Option<Arc<dyn SinkListener>>,
}

/// Addresses of the source this sink talks to
struct Remote {
    rpc: Arc<RpcClient>,
    publish: Endpoint,
}

/// Outcome of matching a frame against the metadata
enum FrameCheck {
    Deliver,
    Mismatch(u32),
    Drop,
}

/// Consuming endpoint of a stream
///
/// Receives broadcast frames on its worker task and queries the source
/// with `async` RPCs, which may run from any task concurrently with the
/// worker.
pub struct StreamSink {
    config: SinkConfig,
    shared: Arc<SinkShared>,
    lifecycle: Lifecycle<LeaseRenewer>,
    seq: Arc<SequenceCounter>,
    remote: Mutex<Option<Remote>>,
}

impl StreamSink {
    pub fn new(config: SinkConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a sink reporting frames and ssrc changes to `listener`
    pub fn with_listener(config: SinkConfig, listener: Arc<dyn SinkListener>) -> Self {
        Self::build(config, Some(listener))
    }

    fn build(config: SinkConfig, listener: Option<Arc<dyn SinkListener>>) -> Self {
        let state = SinkState {
            meta: StreamMetadata::default(),
            stats: StatisticsTable::default(),
            client_info: config.client_info.clone(),
            last_frame_ssrc: 0,
        };
        Self {
            shared: Arc::new(SinkShared {
                state: Mutex::new(state),
                handlers: RwLock::new(HashMap::new()),
                listener,
            }),
            config,
            lifecycle: Lifecycle::new(),
            seq: Arc::new(SequenceCounter::new()),
            remote: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
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

    /// Attach to a source serving control on `tcp://host:port` and
    /// broadcasts on `port + 1`
    pub fn init_remote(&self, host: &str, port: u16) -> Result<()> {
        if host.is_empty() {
            return Err(Error::Param("source host is empty".into()));
        }
        if port == u16::MAX {
            return Err(Error::Param("port leaves no room for the broadcast port".into()));
        }
        self.init_with(Endpoint::tcp(host, port), Endpoint::tcp(host, port + 1))
    }

    /// Attach to the source of stream `stream_name` on this host
    pub fn init_local(&self, stream_name: &str) -> Result<()> {
        validate_stream_name(stream_name)?;
        self.init_with(
            Endpoint::local(stream_name, API_SOCKET_NAME),
            Endpoint::local(stream_name, PUBLISH_SOCKET_NAME),
        )
    }

    fn init_with(&self, api: Endpoint, publish: Endpoint) -> Result<()> {
        self.config.validate()?;
        let schedule =
            HeartbeatSchedule::new(self.config.heartbeat_timeout, self.config.heartbeat_retry);
        self.lifecycle
            .init(LeaseRenewer::new(api.clone(), self.seq.clone(), schedule))?;

        tracing::info!(api = %api, publish = %publish, "Sink initialized");
        *lock(&self.remote) = Some(Remote {
            rpc: Arc::new(RpcClient::new(api, self.seq.clone())),
            publish,
        });

        let weak = Arc::downgrade(&self.shared);
        let media: SubHandler = Arc::new(move |packet: &CommonPacket, blob: Option<&Bytes>| {
            if let Some(shared) = weak.upgrade() {
                shared.on_media_frame(packet, blob);
            }
        });
        write_handlers(&self.shared.handlers).insert(
            opcode::MEDIA,
            SubEntry {
                channel: MEDIA_CHANNEL.to_string(),
                handler: media,
            },
        );
        Ok(())
    }

    /// Subscribe to every channel with a registered handler and spawn the
    /// worker. Requires a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let publish = lock(&self.remote)
            .as_ref()
            .map(|remote| remote.publish.clone())
            .ok_or_else(|| Error::Param("not initialized".into()))?;
        let topics = self.shared.channels();
        let shared = self.shared.clone();
        let hwm = self.config.sub_queue_size;
        let interval = self.config.heartbeat_interval;

        self.lifecycle.start(move |renewer, cancel| {
            let sub = SubSocket::connect(publish, topics, hwm);
            run_worker(shared, renewer, sub, cancel, interval)
        })?;
        tracing::info!("Sink started");
        Ok(())
    }

    /// Stop the worker; no callback fires after this returns
    pub async fn stop(&self) -> Result<()> {
        let was_started = self.is_started();
        self.lifecycle.stop().await?;
        if was_started {
            tracing::info!("Sink stopped");
        }
        Ok(())
    }

    /// Stop, then release all sockets and handlers
    pub async fn uninit(&self) -> Result<()> {
        drop(self.lifecycle.uninit().await?);
        lock(&self.remote).take();
        write_handlers(&self.shared.handlers).clear();
        tracing::info!("Sink uninitialized");
        Ok(())
    }

    /// Route messages with opcode `code` arriving on `channel` to
    /// `handler`. Fails with `Busy` while started.
    pub fn register_sub_handler<F>(&self, code: i32, channel: &str, handler: F) -> Result<()>
    where
        F: Fn(&CommonPacket, Option<&Bytes>) + Send + Sync + 'static,
    {
        self.ensure_stopped()?;
        write_handlers(&self.shared.handlers).insert(
            code,
            SubEntry {
                channel: channel.to_string(),
                handler: Arc::new(handler),
            },
        );
        Ok(())
    }

    pub fn unregister_sub_handler(&self, code: i32) -> Result<()> {
        self.ensure_stopped()?;
        write_handlers(&self.shared.handlers).remove(&code);
        Ok(())
    }

    pub fn unregister_all_sub_handlers(&self) -> Result<()> {
        self.ensure_stopped()?;
        write_handlers(&self.shared.handlers).clear();
        Ok(())
    }

    fn ensure_stopped(&self) -> Result<()> {
        if self.is_started() {
            return Err(Error::Busy("subscription handlers are fixed while started".into()));
        }
        Ok(())
    }

    fn rpc(&self) -> Result<Arc<RpcClient>> {
        lock(&self.remote)
            .as_ref()
            .map(|remote| remote.rpc.clone())
            .ok_or_else(|| Error::General("sink not initialized".into()))
    }

    /// Call a custom opcode on the source
    pub async fn call(
        &self,
        code: i32,
        body: Bytes,
        blob: Option<Bytes>,
        timeout: Duration,
    ) -> Result<RpcResult> {
        self.rpc()?.call(code, body, blob, timeout).await
    }

    /// Fetch the source's metadata and adopt it.
    ///
    /// Local statistics are reset when the ssrc or the number of
    /// substreams changed.
    pub async fn update_stream_metadata(&self, timeout: Duration) -> Result<StreamMetadata> {
        let result = self.call(opcode::METADATA, Bytes::new(), None, timeout).await?;
        let meta = StreamMetadata::from(result.reply.decode_body::<MetadataReply>()?);

        let mut state = lock(&self.shared.state);
        if meta.ssrc != state.meta.ssrc || meta.sub_streams.len() != state.stats.len() {
            state.stats = StatisticsTable::for_metadata(&meta);
            tracing::debug!(
                ssrc = meta.ssrc,
                sub_streams = meta.sub_streams.len(),
                "Statistics reset"
            );
        }
        state.last_frame_ssrc = meta.ssrc;
        state.meta = meta.clone();
        Ok(meta)
    }

    /// Statistics as counted by the source
    pub async fn source_statistic(&self, timeout: Duration) -> Result<MediaStatisticInfo> {
        let result = self
            .call(opcode::MEDIA_STATISTIC, Bytes::new(), None, timeout)
            .await?;
        let reply: MediaStatisticReply = result.reply.decode_body()?;
        Ok(MediaStatisticInfo::from(reply))
    }

    /// Ask the source for a key frame
    pub async fn key_frame(&self, timeout: Duration) -> Result<()> {
        self.call(opcode::KEY_FRAME, Bytes::new(), None, timeout)
            .await
            .map(|_| ())
    }

    /// Up to `count` clients from position `start`, and the total number
    /// of clients registered at the source
    pub async fn client_list(
        &self,
        start: u32,
        count: u32,
        timeout: Duration,
    ) -> Result<(u32, Vec<ClientInfo>)> {
        let query = ClientListReq {
            start_index: start,
            client_num: count,
        };
        let reply: ClientListRep = self
            .rpc()?
            .request(opcode::CLIENT_LIST, &query, timeout)
            .await?;
        let clients = reply.client_list.into_iter().map(ClientInfo::from).collect();
        Ok((reply.total_num, clients))
    }

    /// Statistics of the frames received so far
    pub fn receiver_statistic(&self) -> MediaStatisticInfo {
        let state = lock(&self.shared.state);
        state.stats.snapshot(state.meta.ssrc)
    }

    pub fn stream_meta(&self) -> StreamMetadata {
        lock(&self.shared.state).meta.clone()
    }

    pub fn client_info(&self) -> ClientInfo {
        lock(&self.shared.state).client_info.clone()
    }

    /// Replace the identity sent with the next heartbeat
    pub fn set_client_info(&self, client_info: ClientInfo) {
        lock(&self.shared.state).client_info = client_info;
    }
}

fn write_handlers(
    handlers: &RwLock<HashMap<i32, SubEntry>>,
) -> RwLockWriteGuard<'_, HashMap<i32, SubEntry>> {
    handlers
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl SinkShared {
    /// Distinct channel names of the registered handlers
    fn channels(&self) -> Vec<Bytes> {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        handlers
            .values()
            .map(|entry| entry.channel.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|channel| Bytes::copy_from_slice(channel.as_bytes()))
            .collect()
    }

    fn handler_for(&self, code: i32, channel: &str) -> Option<SubHandler> {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        handlers
            .get(&code)
            .filter(|entry| entry.channel == channel)
            .map(|entry| entry.handler.clone())
    }

    /// Route one broadcast message to its handler
    fn dispatch(&self, parts: Multipart) {
        let (channel, packet, blob) = match packet::decode_broadcast(parts) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(error = %e, "Unparsable broadcast");
                return;
            }
        };
        match self.handler_for(packet.code(), &channel) {
            Some(handler) => handler(&packet, blob.as_ref()),
            None => {
                tracing::trace!(
                    channel = %channel,
                    code = packet.code(),
                    "No handler for broadcast"
                );
            }
        }
    }

    fn check_frame(&self, frame: &MediaFrameInfo, seq: u64, size: usize) -> FrameCheck {
        let mut state = lock(&self.state);
        if frame.ssrc != state.meta.ssrc {
            if frame.ssrc == state.last_frame_ssrc {
                return FrameCheck::Drop;
            }
            state.last_frame_ssrc = frame.ssrc;
            return FrameCheck::Mismatch(frame.ssrc);
        }
        state.last_frame_ssrc = frame.ssrc;

        match state.stats.get_mut(frame.sub_stream_index) {
            Some(stat) => {
                if frame.is_media() {
                    stat.record(frame.is_key(), size, seq);
                }
                FrameCheck::Deliver
            }
            None => FrameCheck::Drop,
        }
    }

    fn on_media_frame(&self, packet: &CommonPacket, blob: Option<&Bytes>) {
        let msg: MediaFrameMsg = match packet.decode_body() {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(error = %e, "Unparsable media frame");
                return;
            }
        };
        let frame = MediaFrameInfo::from_msg(&msg);
        let empty = Bytes::new();
        let payload = blob.unwrap_or(&empty);

        match self.check_frame(&frame, msg.seq, payload.len()) {
            FrameCheck::Deliver => {
                if let Some(listener) = &self.listener {
                    listener.on_live_media_frame(&frame, payload);
                }
            }
            FrameCheck::Mismatch(ssrc) => {
                tracing::warn!(ssrc = ssrc, "Frame ssrc does not match metadata");
                if let Some(listener) = &self.listener {
                    listener.on_metadata_mismatch(ssrc);
                }
            }
            FrameCheck::Drop => {}
        }
    }

    fn client_info(&self) -> ClientInfo {
        lock(&self.state).client_info.clone()
    }
}

async fn run_worker(
    shared: Arc<SinkShared>,
    mut renewer: LeaseRenewer,
    mut sub: SubSocket,
    cancel: CancellationToken,
    interval: Duration,
) -> LeaseRenewer {
    let mut next_tick = Instant::now();

    loop {
        let now = Instant::now();
        if now >= next_tick {
            renewer.tick(now, &shared.client_info());
            next_tick = advance_tick(next_tick, interval, now);
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            message = sub.recv() => match message {
                Some(parts) => shared.dispatch(parts),
                None => {
                    cancel.cancelled().await;
                    break;
                }
            },
            () = tokio::time::sleep(poll_timeout(now, next_tick)) => {}
        }
    }

    renewer
}
