//! Subscribe socket

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::endpoint::Endpoint;
use super::listener::connect;
use super::Multipart;
use crate::protocol::constants::RECONNECT_INTERVAL;

/// Receiving end of a publish socket.
///
/// Connects in the background and reconnects whenever the publisher goes
/// away. At most `hwm` received messages are buffered; later ones are
/// dropped until the owner catches up.
pub struct SubSocket {
    rx: mpsc::Receiver<Multipart>,
    task: JoinHandle<()>,
}

impl SubSocket {
    /// Start subscribing to `topics` on `endpoint`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(endpoint: Endpoint, topics: Vec<Bytes>, hwm: usize) -> Self {
        let (tx, rx) = mpsc::channel(hwm.max(1));
        let task = tokio::spawn(run_subscriber(endpoint, topics, tx));
        Self { rx, task }
    }

    /// Wait for the next message
    pub async fn recv(&mut self) -> Option<Multipart> {
        self.rx.recv().await
    }

    /// Take the next message if one is queued
    pub fn try_recv(&mut self) -> Option<Multipart> {
        self.rx.try_recv().ok()
    }
}

impl Drop for SubSocket {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_subscriber(endpoint: Endpoint, topics: Vec<Bytes>, tx: mpsc::Sender<Multipart>) {
    loop {
        match connect(&endpoint).await {
            Ok(mut conn) => {
                tracing::trace!(endpoint = %endpoint, "Subscriber connected");
                if conn.send(topics.clone()).await.is_ok() {
                    while let Some(Ok(message)) = conn.next().await {
                        match tx.try_send(message) {
                            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                            Err(mpsc::error::TrySendError::Closed(_)) => return,
                        }
                    }
                }
                tracing::trace!(endpoint = %endpoint, "Subscriber connection lost");
            }
            Err(e) => {
                tracing::trace!(endpoint = %endpoint, error = %e, "Subscriber connect failed");
            }
        }

        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(RECONNECT_INTERVAL).await;
    }
}
