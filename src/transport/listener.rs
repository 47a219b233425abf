//! Bound listeners and outgoing connections
//!
//! Binding sockets hand each accepted stream to a callback from a background
//! accept loop; connecting sockets open one stream with [`connect`].

use std::io;
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use super::codec::MultipartCodec;
use super::endpoint::Endpoint;
use super::error::TransportError;
use crate::protocol::constants::RECONNECT_INTERVAL;

/// Byte stream of either transport
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Io for T {}

pub type BoxedIo = Box<dyn Io>;

/// Framed multipart stream
pub type Connection = Framed<BoxedIo, MultipartCodec>;

pub(crate) fn framed(io: BoxedIo) -> Connection {
    Framed::new(io, MultipartCodec::default())
}

/// Open a stream to `endpoint`
pub async fn connect(endpoint: &Endpoint) -> io::Result<Connection> {
    let io: BoxedIo = match endpoint {
        Endpoint::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port)).await?;
            stream.set_nodelay(true)?;
            Box::new(stream)
        }
        Endpoint::Ipc(path) => Box::new(UnixStream::connect(path).await?),
    };
    Ok(framed(io))
}

/// A bound listening socket
pub(crate) enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl Listener {
    /// Bind `endpoint`.
    ///
    /// An IPC path served by a live listener is reported as in use; a stale
    /// socket file left behind by a dead process is replaced.
    pub(crate) async fn bind(endpoint: &Endpoint) -> Result<Self, TransportError> {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                let host = Endpoint::bind_host(host);
                let listener = TcpListener::bind((host, *port)).await.map_err(|e| {
                    if e.kind() == io::ErrorKind::AddrInUse {
                        TransportError::AddrInUse(endpoint.to_string())
                    } else {
                        TransportError::Io(e)
                    }
                })?;
                Ok(Listener::Tcp(listener))
            }
            Endpoint::Ipc(path) => {
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                if path.exists() {
                    if UnixStream::connect(path).await.is_ok() {
                        return Err(TransportError::AddrInUse(endpoint.to_string()));
                    }
                    tracing::debug!(path = %path.display(), "Removing stale socket file");
                    std::fs::remove_file(path)?;
                }
                Ok(Listener::Unix(UnixListener::bind(path)?))
            }
        }
    }

    async fn accept(&self) -> io::Result<(BoxedIo, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                stream.set_nodelay(true)?;
                Ok((Box::new(stream), peer.to_string()))
            }
            Listener::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok((Box::new(stream), "ipc".to_string()))
            }
        }
    }

    /// Run the accept loop until `shutdown` fires
    pub(crate) fn serve<F>(self, shutdown: CancellationToken, mut on_connection: F)
    where
        F: FnMut(Connection, String) + Send + 'static,
    {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    accepted = self.accept() => match accepted {
                        Ok((io, peer)) => on_connection(framed(io), peer),
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(RECONNECT_INTERVAL).await;
                        }
                    },
                }
            }
        });
    }
}

/// Removes bound IPC socket files when dropped
#[derive(Debug, Default)]
pub(crate) struct SocketFiles {
    paths: Vec<PathBuf>,
}

impl SocketFiles {
    pub(crate) fn track(&mut self, endpoint: &Endpoint) {
        if let Some(path) = endpoint.ipc_path() {
            self.paths.push(path.to_path_buf());
        }
    }
}

impl Drop for SocketFiles {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::debug!(path = %path.display(), error = %e, "Failed to remove socket file");
            }
        }
    }
}
