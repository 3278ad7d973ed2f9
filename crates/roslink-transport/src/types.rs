use roslink_core::config::{TextEncoding, TransportConfig, WebSocketConfig};
use roslink_core::error::TransportError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One fully reassembled frame as carried by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WireMessage {
    pub fn len(&self) -> usize {
        match self {
            WireMessage::Text(text) => text.len(),
            WireMessage::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for WireMessage {
    fn from(text: String) -> Self {
        WireMessage::Text(text)
    }
}

impl From<&str> for WireMessage {
    fn from(text: &str) -> Self {
        WireMessage::Text(text.to_string())
    }
}

/// Where a rosbridge server can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// A `ws://` or `wss://` URL.
    WebSocket(String),
    /// A raw TCP endpoint.
    Tcp { host: String, port: u16 },
}

impl Address {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Address::Tcp {
            host: host.into(),
            port,
        }
    }

    fn parse_host_port(s: &str) -> Result<Self, TransportError> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| TransportError::InvalidAddress(format!("missing port in '{}'", s)))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(TransportError::InvalidAddress(format!(
                "missing host in '{}'",
                s
            )));
        }
        let port = port
            .trim_end_matches('/')
            .parse::<u16>()
            .map_err(|e| TransportError::InvalidAddress(format!("bad port in '{}': {}", s, e)))?;
        Ok(Address::tcp(host, port))
    }
}

impl FromStr for Address {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with("ws://") || s.starts_with("wss://") {
            return Ok(Address::WebSocket(s.to_string()));
        }
        if let Some(rest) = s.strip_prefix("tcp://") {
            return Self::parse_host_port(rest);
        }
        if let Some((scheme, _)) = s.split_once("://") {
            return Err(TransportError::UnsupportedScheme(scheme.to_string()));
        }
        Self::parse_host_port(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::WebSocket(url) => f.write_str(url),
            Address::Tcp { host, port } if host.contains(':') => {
                write!(f, "tcp://[{}]:{}", host, port)
            }
            Address::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
        }
    }
}

/// Parameters required to establish a connection.
#[derive(Clone, Debug)]
pub struct ConnectParams {
    pub address: Address,

    /// Applied to the initial connection attempt.
    pub connection_timeout: Duration,

    pub ws_options: WebSocketConfig,

    /// Text encoding for raw TCP connections.
    pub encoding: TextEncoding,
}

impl ConnectParams {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            connection_timeout: Duration::from_secs(20),
            ws_options: WebSocketConfig::default(),
            encoding: TextEncoding::default(),
        }
    }

    /// Parses `address` and applies the transport section of the configuration.
    pub fn from_config(address: &str, config: &TransportConfig) -> Result<Self, TransportError> {
        Ok(Self {
            address: address.parse()?,
            connection_timeout: config.connect_timeout,
            ws_options: config.websocket.clone(),
            encoding: config.tcp.encoding,
        })
    }
}
