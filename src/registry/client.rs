//! Client identity

use crate::protocol::message::{ClientHeartbeatReq, IpVersion};

/// Identity and liveness of a remote client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_version: IpVersion,
    pub ip: String,
    pub port: i32,
    /// Disambiguates several clients behind one address
    pub token: String,
    /// Media protocol spoken by the client
    pub protocol: String,
    /// Free-form description
    pub text: String,
    /// Seconds since the epoch of the last heartbeat
    pub last_active: i64,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            ip_version: IpVersion::V4,
            ip: "127.0.0.1".to_string(),
            port: 0,
            token: String::new(),
            protocol: "uninit".to_string(),
            text: String::new(),
            last_active: 0,
        }
    }
}

/// Registry key of a client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub ip: String,
    pub port: i32,
    pub token: String,
}

impl ClientInfo {
    /// Create a client description for `protocol`
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            ..Default::default()
        }
    }

    /// Set address and port
    pub fn address(mut self, ip: impl Into<String>, port: i32) -> Self {
        self.ip = ip.into();
        self.ip_version = if self.ip.contains(':') {
            IpVersion::V6
        } else {
            IpVersion::V4
        };
        self.port = port;
        self
    }

    /// Set the client token
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Set the description
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn key(&self) -> ClientKey {
        ClientKey {
            ip: self.ip.clone(),
            port: self.port,
            token: self.token.clone(),
        }
    }

    pub fn to_msg(&self) -> ClientHeartbeatReq {
        ClientHeartbeatReq {
            client_ip_version: self.ip_version as i32,
            client_ip: self.ip.clone(),
            client_port: self.port,
            client_token: self.token.clone(),
            client_protocol: self.protocol.clone(),
            client_text: self.text.clone(),
            last_active_time: self.last_active,
        }
    }
}

impl From<ClientHeartbeatReq> for ClientInfo {
    fn from(msg: ClientHeartbeatReq) -> Self {
        Self {
            ip_version: msg.client_ip_version(),
            ip: msg.client_ip,
            port: msg.client_port,
            token: msg.client_token,
            protocol: msg.client_protocol,
            text: msg.client_text,
            last_active: msg.last_active_time,
        }
    }
}

impl std::fmt::Display for ClientInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)?;
        if !self.token.is_empty() {
            write!(f, "#{}", self.token)?;
        }
        Ok(())
    }
}
