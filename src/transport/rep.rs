//! Reply socket
//!
//! Requests from every connected peer arrive on one queue tagged with the
//! peer's id; a reply is routed back by that id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::endpoint::Endpoint;
use super::error::TransportError;
use super::listener::{Connection, Listener, SocketFiles};
use super::{lock, Multipart};

type Peers = Arc<Mutex<HashMap<u64, mpsc::UnboundedSender<Multipart>>>>;

/// Incoming request queue depth
const REQUEST_QUEUE: usize = 64;

pub struct RepSocket {
    incoming_tx: mpsc::Sender<(u64, Multipart)>,
    incoming: mpsc::Receiver<(u64, Multipart)>,
    peers: Peers,
    replier: Replier,
    next_peer: Arc<AtomicU64>,
    shutdown: CancellationToken,
    files: SocketFiles,
}

impl Default for RepSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl RepSocket {
    pub fn new() -> Self {
        let (incoming_tx, incoming) = mpsc::channel(REQUEST_QUEUE);
        let peers: Peers = Arc::new(Mutex::new(HashMap::new()));
        Self {
            incoming_tx,
            incoming,
            replier: Replier {
                peers: peers.clone(),
            },
            peers,
            next_peer: Arc::new(AtomicU64::new(1)),
            shutdown: CancellationToken::new(),
            files: SocketFiles::default(),
        }
    }

    /// Bind an additional endpoint
    pub async fn bind(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        let listener = Listener::bind(endpoint).await?;
        self.files.track(endpoint);

        let incoming = self.incoming_tx.clone();
        let peers = self.peers.clone();
        let next_peer = self.next_peer.clone();
        let shutdown = self.shutdown.clone();
        listener.serve(self.shutdown.clone(), move |conn, addr| {
            let peer = next_peer.fetch_add(1, Ordering::Relaxed);
            let (reply_tx, reply_rx) = mpsc::unbounded_channel();
            lock(&peers).insert(peer, reply_tx);
            tracing::trace!(peer = peer, addr = %addr, "Requester connected");
            tokio::spawn(serve_peer(
                conn,
                peer,
                incoming.clone(),
                reply_rx,
                peers.clone(),
                shutdown.clone(),
            ));
        });

        tracing::debug!(endpoint = %endpoint, "Reply socket bound");
        Ok(())
    }

    /// Wait for the next request
    pub async fn recv(&mut self) -> Option<(u64, Multipart)> {
        self.incoming.recv().await
    }

    /// Send the reply for a request received from `peer`
    pub fn send(&self, peer: u64, reply: Multipart) -> Result<(), TransportError> {
        self.replier.send(peer, reply)
    }

    /// A handle that can send replies from other tasks
    pub fn replier(&self) -> Replier {
        self.replier.clone()
    }
}

impl Drop for RepSocket {
    fn drop(&mut self) {
        self.shutdown.cancel();
        lock(&self.peers).clear();
    }
}

/// Cloneable reply path of a [`RepSocket`]
#[derive(Clone)]
pub struct Replier {
    peers: Peers,
}

impl Replier {
    pub fn send(&self, peer: u64, reply: Multipart) -> Result<(), TransportError> {
        let peers = lock(&self.peers);
        let tx = peers.get(&peer).ok_or(TransportError::PeerGone(peer))?;
        tx.send(reply).map_err(|_| TransportError::PeerGone(peer))
    }
}

async fn serve_peer(
    mut conn: Connection,
    peer: u64,
    incoming: mpsc::Sender<(u64, Multipart)>,
    mut replies: mpsc::UnboundedReceiver<Multipart>,
    peers: Peers,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            request = conn.next() => match request {
                Some(Ok(request)) => {
                    if incoming.send((peer, request)).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::debug!(
                        peer = peer,
                        error = %e,
                        "Dropping requester after malformed frame"
                    );
                    break;
                }
                None => break,
            },
            reply = replies.recv() => match reply {
                Some(reply) => {
                    if let Err(e) = conn.send(reply).await {
                        tracing::trace!(peer = peer, error = %e, "Reply write failed");
                        break;
                    }
                }
                None => break,
            },
        }
    }

    lock(&peers).remove(&peer);
    tracing::trace!(peer = peer, "Requester disconnected");
}
