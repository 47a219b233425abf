//! Socket endpoints

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::error::TransportError;
use crate::protocol::constants::STREAM_SOCKET_PREFIX;

/// Address a socket binds or connects to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `tcp://host:port`; a host of `*` binds every interface
    Tcp { host: String, port: u16 },
    /// `ipc://path`, a Unix domain socket
    Ipc(PathBuf),
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn ipc(path: impl Into<PathBuf>) -> Self {
        Endpoint::Ipc(path.into())
    }

    /// Directory holding the local sockets of `stream_name`
    pub fn local_dir(stream_name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(STREAM_SOCKET_PREFIX)
            .join(stream_name)
    }

    /// Local endpoint of socket `socket_name` of stream `stream_name`
    pub fn local(stream_name: &str, socket_name: &str) -> Self {
        Endpoint::Ipc(Self::local_dir(stream_name).join(socket_name))
    }

    /// Host to use when binding
    pub(crate) fn bind_host(host: &str) -> &str {
        if host == "*" {
            "0.0.0.0"
        } else {
            host
        }
    }

    pub fn ipc_path(&self) -> Option<&Path> {
        match self {
            Endpoint::Ipc(path) => Some(path),
            Endpoint::Tcp { .. } => None,
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidEndpoint(s.to_string());

        if let Some(rest) = s.strip_prefix("tcp://") {
            let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
            let host = host.trim_start_matches('[').trim_end_matches(']');
            if host.is_empty() {
                return Err(invalid());
            }
            let port = port.parse::<u16>().map_err(|_| invalid())?;
            Ok(Endpoint::tcp(host, port))
        } else if let Some(path) = s.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(invalid());
            }
            Ok(Endpoint::ipc(path))
        } else {
            Err(invalid())
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => {
                write!(f, "tcp://[{}]:{}", host, port)
            }
            Endpoint::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            Endpoint::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}
