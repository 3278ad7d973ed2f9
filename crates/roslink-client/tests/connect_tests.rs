use roslink_client::{ClientError, Config, connect};
use roslink_core::error::{InternalError, TransportError};
use std::net::TcpListener;
use std::time::Duration;

fn quick_config() -> Config {
    let mut config = Config::default();
    config.transport.connect_timeout = Duration::from_millis(500);
    config
}

#[actix_rt::test]
async fn rejects_unparseable_address() {
    let result = connect("http://localhost:9090", Some(quick_config())).await;
    assert!(matches!(result, Err(ClientError::InvalidAddress(_))));
}

#[actix_rt::test]
async fn refused_tcp_connection_is_reported() {
    // Bind then drop to get a port nobody listens on.
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let result = connect(&format!("127.0.0.1:{}", port), Some(quick_config())).await;
    assert!(matches!(
        result,
        Err(ClientError::Connection(InternalError::Transport(
            TransportError::ConnectionFailed(_) | TransportError::Io(_)
        )))
    ));
}

#[actix_rt::test]
async fn connects_to_a_tcp_server() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = actix_rt::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(socket);
    });

    let session = connect(&format!("tcp://127.0.0.1:{}", port), Some(quick_config()))
        .await
        .unwrap();
    assert!(session.is_connected().await.unwrap());
    session.close();
    server.await.unwrap();
}
