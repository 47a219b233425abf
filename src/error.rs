//! Error types for streamswitch

use thiserror::Error;

use crate::protocol::packet::status;
use crate::transport::TransportError;

/// Result type alias using streamswitch's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an [`Error`], useful when callers only need to branch
/// on the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Param,
    System,
    Timeout,
    Client,
    Server,
    Parse,
    Busy,
    General,
}

/// Main error type for streamswitch operations
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed caller input, no I/O was attempted
    #[error("invalid parameter: {0}")]
    Param(String),

    /// Transport or socket failure
    #[error("system error: {0}")]
    System(String),

    /// No reply arrived before the deadline
    #[error("timeout: {0}")]
    Timeout(String),

    /// The remote side reported a 4xx status
    #[error("client error: {info} (status:{status})")]
    Client { status: i32, info: String },

    /// The remote side reported a 5xx status
    #[error("server error: {info} (status:{status})")]
    Server { status: i32, info: String },

    /// Malformed wire data
    #[error("parse error: {0}")]
    Parse(String),

    /// A concurrent start/stop is in progress
    #[error("busy: {0}")]
    Busy(String),

    /// Anything else
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Get the category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Param(_) => ErrorKind::Param,
            Error::System(_) => ErrorKind::System,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Client { .. } => ErrorKind::Client,
            Error::Server { .. } => ErrorKind::Server,
            Error::Parse(_) => ErrorKind::Parse,
            Error::Busy(_) => ErrorKind::Busy,
            Error::General(_) => ErrorKind::General,
        }
    }

    /// Translate a reply status into an error.
    ///
    /// Returns `None` for a successful status.
    pub fn from_status(status: i32, info: &str) -> Option<Self> {
        match status {
            status::OK => None,
            400..=499 => Some(Error::Client {
                status,
                info: info.to_string(),
            }),
            500..=599 => Some(Error::Server {
                status,
                info: info.to_string(),
            }),
            _ => Some(Error::General(format!("{} (status:{})", info, status))),
        }
    }

    /// Status code carried by a remote error, if any
    pub fn status(&self) -> Option<i32> {
        match self {
            Error::Client { status, .. } | Error::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::System(err.to_string())
    }
}

impl From<prost::DecodeError> for Error {
    fn from(err: prost::DecodeError) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::InvalidEndpoint(_) => Error::Param(err.to_string()),
            _ => Error::System(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(Error::from_status(200, "").is_none());

        let err = Error::from_status(404, "not here").unwrap();
        assert_eq!(err.kind(), ErrorKind::Client);
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("not here"));

        let err = Error::from_status(503, "overloaded").unwrap();
        assert_eq!(err.kind(), ErrorKind::Server);

        let err = Error::from_status(302, "moved").unwrap();
        assert_eq!(err.kind(), ErrorKind::General);
        assert_eq!(err.to_string(), "moved (status:302)");
    }

    #[test]
    fn test_conversions() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(Error::from(io).kind(), ErrorKind::System);

        let bad = TransportError::InvalidEndpoint("nope".into());
        assert_eq!(Error::from(bad).kind(), ErrorKind::Param);

        assert_eq!(Error::from(TransportError::Closed).kind(), ErrorKind::System);
    }
}
