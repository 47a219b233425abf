//! Request socket
//!
//! Strictly alternates `send` and `recv`. The connection is opened lazily by
//! a background task and re-opened after failures; a request lost with a
//! broken connection is never answered, so callers must bound their wait.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::endpoint::Endpoint;
use super::error::TransportError;
use super::listener::{connect, Connection};
use super::Multipart;
use crate::protocol::constants::RECONNECT_INTERVAL;

pub struct ReqSocket {
    endpoint: Endpoint,
    requests: mpsc::Sender<Multipart>,
    replies: mpsc::Receiver<Multipart>,
    pending: bool,
    task: JoinHandle<()>,
}

impl ReqSocket {
    /// Create a socket talking to `endpoint`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(endpoint: Endpoint) -> Self {
        let (request_tx, request_rx) = mpsc::channel(1);
        let (reply_tx, reply_rx) = mpsc::channel(1);
        let task = tokio::spawn(run_requester(endpoint.clone(), request_rx, reply_tx));
        Self {
            endpoint,
            requests: request_tx,
            replies: reply_rx,
            pending: false,
            task,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Whether a request is waiting for its reply
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Send a request; fails if the previous reply was not received yet
    pub fn send(&mut self, request: Multipart) -> Result<(), TransportError> {
        if self.pending {
            return Err(TransportError::InvalidState);
        }
        self.requests
            .try_send(request)
            .map_err(|_| TransportError::Closed)?;
        self.pending = true;
        Ok(())
    }

    /// Wait for the reply to the outstanding request
    pub async fn recv(&mut self) -> Result<Multipart, TransportError> {
        if !self.pending {
            return Err(TransportError::InvalidState);
        }
        let reply = self.replies.recv().await.ok_or(TransportError::Closed)?;
        self.pending = false;
        Ok(reply)
    }

    /// Take the reply if it already arrived
    pub fn try_recv(&mut self) -> Result<Option<Multipart>, TransportError> {
        if !self.pending {
            return Err(TransportError::InvalidState);
        }
        match self.replies.try_recv() {
            Ok(reply) => {
                self.pending = false;
                Ok(Some(reply))
            }
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }
}

impl Drop for ReqSocket {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn connect_with_retry(endpoint: &Endpoint) -> Connection {
    loop {
        match connect(endpoint).await {
            Ok(conn) => return conn,
            Err(e) => {
                tracing::trace!(endpoint = %endpoint, error = %e, "Request socket connect failed");
                tokio::time::sleep(RECONNECT_INTERVAL).await;
            }
        }
    }
}

async fn run_requester(
    endpoint: Endpoint,
    mut requests: mpsc::Receiver<Multipart>,
    replies: mpsc::Sender<Multipart>,
) {
    let mut cached: Option<Connection> = None;

    while let Some(request) = requests.recv().await {
        let mut conn = match cached.take() {
            Some(conn) => conn,
            None => connect_with_retry(&endpoint).await,
        };

        if let Err(e) = conn.send(request).await {
            tracing::trace!(endpoint = %endpoint, error = %e, "Request write failed");
            continue;
        }

        match conn.next().await {
            Some(Ok(reply)) => {
                if replies.send(reply).await.is_err() {
                    return;
                }
                cached = Some(conn);
            }
            Some(Err(e)) => {
                tracing::trace!(endpoint = %endpoint, error = %e, "Malformed reply stream");
            }
            None => {
                tracing::trace!(endpoint = %endpoint, "Connection closed before reply");
            }
        }
    }
}
