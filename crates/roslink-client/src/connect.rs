//! Session start-up.

use crate::error::ClientError;
use log::{debug, info, warn};
use roslink_core::config::{self, Config};
use roslink_core::logging;
use roslink_protocol_handler::Session;
use roslink_transport::ConnectParams;
use std::time::Duration;

/// Extra wait on top of the transport's own connect timeout, so the transport
/// reports its failure before this wait gives up.
const CONNECT_GRACE: Duration = Duration::from_secs(1);

/// Connects to the rosbridge server at `address` and returns the session once
/// the first `connection` event fired.
///
/// `address` is a `ws://`/`wss://` URL, `tcp://host:port` or a bare
/// `host:port`. When `config` is `None` the configuration is loaded from
/// `roslink.toml` and `ROSLINK_*` environment variables.
///
/// Must be called inside a running actix system.
pub async fn connect(address: &str, config: Option<Config>) -> Result<Session, ClientError> {
    let cfg = match config {
        Some(c) => c,
        None => config::load_config(None)?,
    };

    if let Err(e) = logging::setup_logging(&cfg.global.log_level) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }
    debug!("Loaded configuration: {:?}", cfg);

    let params = ConnectParams::from_config(address, &cfg.transport)
        .map_err(ClientError::InvalidAddress)?;
    let wait = params.connection_timeout + CONNECT_GRACE;

    info!("Connecting to rosbridge at {}", params.address);
    let session = Session::new(cfg.session.clone());
    session.connect(params);

    match tokio::time::timeout(wait, session.wait_for_connection()).await {
        Ok(Ok(())) => {
            info!("Connected to rosbridge at {}", address);
            Ok(session)
        }
        Ok(Err(e)) => {
            warn!("Connection to {} failed: {}", address, e);
            Err(ClientError::Connection(e))
        }
        Err(_) => {
            warn!("Connection to {} did not complete within {:?}", address, wait);
            session.close();
            Err(ClientError::Timeout(wait))
        }
    }
}
