//! Logging setup for applications built on roslink.
//!
//! The transports pull in chatty crates (the websocket stack, TLS, codecs and
//! the PNG decoder). Unless `RUST_LOG` says otherwise they are held at `warn`,
//! or lower when the application asks for less than that.

use crate::error::CoreError;
use log::LevelFilter;
use std::str::FromStr;

const CHATTY_CRATES: &[&str] = &[
    "tungstenite",
    "tokio_tungstenite",
    "rustls",
    "tokio_util",
    "mio",
    "image",
    "png",
];

/// Builds the filter used when `RUST_LOG` is unset. Unknown levels fall back
/// to `info`.
pub fn default_filter(log_level_str: &str) -> String {
    let level = LevelFilter::from_str(log_level_str).unwrap_or(LevelFilter::Info);
    let chatty = level.min(LevelFilter::Warn);
    let mut filter = level.as_str().to_ascii_lowercase();
    for module in CHATTY_CRATES {
        filter.push_str(&format!(",{}={}", module, chatty.as_str().to_ascii_lowercase()));
    }
    filter
}

/// Installs `env_logger` as the global logger.
///
/// Fails when a logger is already installed.
#[cfg(feature = "env_logger")]
pub fn setup_logging(log_level_str: &str) -> Result<(), CoreError> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or(default_filter(log_level_str)))
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| CoreError::LoggingSetup(e.to_string()))
}

#[cfg(not(feature = "env_logger"))]
pub fn setup_logging(_log_level_str: &str) -> Result<(), CoreError> {
    log::debug!("env_logger feature not enabled, logging setup skipped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chatty_crates_are_capped_at_warn() {
        let filter = default_filter("debug");
        assert!(filter.starts_with("debug,"));
        assert!(filter.contains(",tokio_util=warn"));
        assert!(filter.contains(",image=warn"));
        assert!(!filter.contains("=debug"));
    }

    #[test]
    fn quieter_levels_apply_everywhere() {
        let filter = default_filter("error");
        assert!(filter.starts_with("error,"));
        assert!(filter.split(',').skip(1).all(|d| d.ends_with("=error")));
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert!(default_filter("chatty").starts_with("info,"));
    }

    #[cfg(feature = "env_logger")]
    #[test]
    fn second_setup_reports_error() {
        let _ = setup_logging("info");
        assert!(matches!(
            setup_logging("info"),
            Err(CoreError::LoggingSetup(_))
        ));
    }
}
