use crate::error::CoreError;
use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;
use std::{path::Path, time::Duration};

// Helper for deserializing Duration from milliseconds
pub mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Main configuration structure
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub global: GlobalConfig,
    pub transport: TransportConfig,
    pub session: SessionConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GlobalConfig {
    pub log_level: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// Transport layer configuration
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TransportConfig {
    #[serde(rename = "connect_timeout_ms", with = "duration_ms_serde")]
    pub connect_timeout: Duration,
    pub websocket: WebSocketConfig,
    pub tcp: TcpConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            websocket: Default::default(),
            tcp: Default::default(),
        }
    }
}

// WebSocket specific configuration
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct WebSocketConfig {
    pub max_message_size: Option<usize>,
    pub max_frame_size: Option<usize>,
    pub accept_unmasked_frames: bool,
}

/// Text encoding used on raw TCP connections.
#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    #[default]
    Utf8,
    /// Non-ASCII characters are sent as JSON `\u` escapes.
    Ascii,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct TcpConfig {
    pub encoding: TextEncoding,
}

/// Tuning for the session engine.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound on calls held back while disconnected. The oldest call is
    /// dropped when the bound is exceeded.
    pub max_queued_calls: usize,
    /// Hold later frames back while an earlier compressed frame is still
    /// being decoded.
    pub preserve_frame_order: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_queued_calls: 10_000,
            preserve_frame_order: true,
        }
    }
}

/// Loads configuration from defaults, an optional file and the environment.
///
/// Without an explicit `path`, looks for `roslink.toml` (or `.json`, `.yaml`, ...)
/// in the current directory. Environment variables prefixed with `ROSLINK_`
/// override file values, using `__` between nested keys
/// (e.g. `ROSLINK_TRANSPORT__TCP__ENCODING=ascii`,
/// `ROSLINK_TRANSPORT__CONNECT_TIMEOUT_MS=5000`).
pub fn load_config(path: Option<&Path>) -> Result<Config, CoreError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("roslink").required(false),
    };

    let loaded = ConfigLoader::builder()
        .set_default("global.log_level", "info")?
        .add_source(file)
        .add_source(
            Environment::with_prefix("ROSLINK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    loaded.try_deserialize().map_err(CoreError::ConfigLoad)
}
