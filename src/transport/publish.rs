//! Publish socket
//!
//! Each subscriber announces its topic list as the first message on its
//! connection. A published message goes to every subscriber having a topic
//! that prefixes the message's first frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::endpoint::Endpoint;
use super::error::TransportError;
use super::listener::{Connection, Listener, SocketFiles};
use super::{lock, Multipart};
use crate::protocol::constants::DEFAULT_HWM;

struct Subscriber {
    id: u64,
    topics: Vec<Bytes>,
    tx: mpsc::Sender<Multipart>,
}

impl Subscriber {
    fn wants(&self, topic: &[u8]) -> bool {
        self.topics.iter().any(|t| topic.starts_with(t))
    }
}

/// Fan-out socket
pub struct PubSocket {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_id: Arc<AtomicU64>,
    hwm: usize,
    shutdown: CancellationToken,
    files: SocketFiles,
}

impl Default for PubSocket {
    fn default() -> Self {
        Self::new(DEFAULT_HWM)
    }
}

impl PubSocket {
    /// Create an unbound socket queueing at most `hwm` messages per subscriber
    pub fn new(hwm: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            hwm: hwm.max(1),
            shutdown: CancellationToken::new(),
            files: SocketFiles::default(),
        }
    }

    /// Bind an additional endpoint
    pub async fn bind(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        let listener = Listener::bind(endpoint).await?;
        self.files.track(endpoint);

        let subscribers = self.subscribers.clone();
        let next_id = self.next_id.clone();
        let shutdown = self.shutdown.clone();
        let hwm = self.hwm;
        listener.serve(self.shutdown.clone(), move |conn, peer| {
            let id = next_id.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(subscriber = id, peer = %peer, "Subscriber connected");
            tokio::spawn(serve_subscriber(
                conn,
                id,
                hwm,
                subscribers.clone(),
                shutdown.clone(),
            ));
        });

        tracing::debug!(endpoint = %endpoint, "Publish socket bound");
        Ok(())
    }

    /// Queue `message` for every interested subscriber.
    ///
    /// Never blocks: subscribers whose queue is full miss this message.
    /// Returns the number of subscribers the message was queued for.
    pub fn send(&self, message: Multipart) -> usize {
        let topic = message.first().cloned().unwrap_or_default();
        let subscribers = lock(&self.subscribers);

        let mut delivered = 0;
        for subscriber in subscribers.iter().filter(|s| s.wants(&topic)) {
            match subscriber.tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::trace!(
                        subscriber = subscriber.id,
                        "Subscriber queue full, dropping message"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Number of subscribers that completed their topic announcement
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

impl Drop for PubSocket {
    fn drop(&mut self) {
        self.shutdown.cancel();
        lock(&self.subscribers).clear();
    }
}

async fn serve_subscriber(
    mut conn: Connection,
    id: u64,
    hwm: usize,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    shutdown: CancellationToken,
) {
    let topics = tokio::select! {
        () = shutdown.cancelled() => return,
        first = conn.next() => match first {
            Some(Ok(topics)) => topics,
            _ => return,
        },
    };

    let (tx, mut rx) = mpsc::channel(hwm);
    lock(&subscribers).push(Subscriber { id, topics, tx });

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            outgoing = rx.recv() => match outgoing {
                Some(message) => {
                    if let Err(e) = conn.send(message).await {
                        tracing::trace!(subscriber = id, error = %e, "Subscriber write failed");
                        break;
                    }
                }
                None => break,
            },
            incoming = conn.next() => match incoming {
                // subscribers have nothing more to say after their topics
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }

    lock(&subscribers).retain(|s| s.id != id);
    tracing::trace!(subscriber = id, "Subscriber disconnected");
}
