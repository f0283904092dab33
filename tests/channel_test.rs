use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use medlink::{AppError, Destination, FramedChannel, NetworkConfig};

fn test_network_config() -> NetworkConfig {
    NetworkConfig {
        connect_timeout_ms: 2_000,
        read_timeout_ms: 2_000,
        recv_buffer_size: 256,
    }
}

fn destination_for(addr: SocketAddr) -> Destination {
    Destination::new(addr.ip().to_string(), "", addr.port())
}

// Accepts one connection, reads one request, then runs `reply` against the
// write half.
async fn spawn_one_reply_server<F, Fut>(reply: F) -> SocketAddr
where
    F: FnOnce(tokio::net::TcpStream) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 1024];
        let _ = stream.read(&mut buf).await.unwrap();
        reply(stream).await;
    });
    addr
}

#[tokio::test]
async fn short_reply_completes_in_one_read() {
    let addr = spawn_one_reply_server(|mut stream| async move {
        stream.write_all(b"PONG").await.unwrap();
        // keep the connection open, the short chunk alone ends the message
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    })
    .await;

    let mut channel = FramedChannel::new(destination_for(addr), &test_network_config());
    channel.open().await.unwrap();
    let reply = channel.send(b"PING").await.unwrap();
    assert_eq!(&reply[..], b"PONG");
    assert!(channel.is_open());
}

#[tokio::test]
async fn exact_multiple_reply_tolerates_the_empty_terminal_read() {
    // 512 bytes with a 256 byte receive buffer: the framing loop sees two
    // full chunks and then a zero length read once the peer half-closes.
    let addr = spawn_one_reply_server(|mut stream| async move {
        stream.write_all(&[b'x'; 512]).await.unwrap();
        stream.shutdown().await.unwrap();
    })
    .await;

    let mut channel = FramedChannel::new(destination_for(addr), &test_network_config());
    channel.open().await.unwrap();
    let reply = channel.send(b"DUMP").await.unwrap();
    assert_eq!(reply.len(), 512);
    assert!(reply.iter().all(|b| *b == b'x'));
}

#[tokio::test]
async fn send_on_a_closed_channel_is_an_illegal_state() {
    let channel_addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
    let mut channel =
        FramedChannel::new(destination_for(channel_addr), &test_network_config());
    let err = channel.send(b"PING").await.unwrap_err();
    assert!(matches!(err, AppError::IllegalState(_)));
}

#[tokio::test]
async fn read_timeout_surfaces_as_a_connection_error_and_closes_the_socket() {
    let addr = spawn_one_reply_server(|stream| async move {
        // never reply, but keep the socket open
        let _stream = stream;
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    })
    .await;

    let config = NetworkConfig {
        read_timeout_ms: 100,
        ..test_network_config()
    };
    let mut channel = FramedChannel::new(destination_for(addr), &config);
    channel.open().await.unwrap();

    let err = channel.send(b"PING").await.unwrap_err();
    match err {
        AppError::Connection {
            destination,
            message,
            ..
        } => {
            assert_eq!(destination.port, addr.port());
            assert!(message.contains("timed out"));
        }
        other => panic!("expected a connection error, got {other:?}"),
    }
    assert!(!channel.is_open());
}

#[tokio::test]
async fn connect_failure_carries_the_destination() {
    // bind then drop to find a port with no listener
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut channel = FramedChannel::new(destination_for(addr), &test_network_config());
    let err = channel.open().await.unwrap_err();
    match err {
        AppError::Connection { destination, .. } => {
            assert_eq!(destination.host, addr.ip().to_string());
            assert_eq!(destination.port, addr.port());
        }
        other => panic!("expected a connection error, got {other:?}"),
    }
}

#[tokio::test]
async fn oneshot_closes_the_socket_and_splits_lines() {
    let addr = spawn_one_reply_server(|mut stream| async move {
        stream.write_all(b"[Data]\r\n+1,^2").await.unwrap();
    })
    .await;

    let mut channel = FramedChannel::new(destination_for(addr), &test_network_config());
    let lines = channel.oneshot(b"DDR FILER^ADD").await.unwrap();
    assert_eq!(lines, vec!["[Data]".to_string(), "+1,^2".to_string()]);
    assert!(!channel.is_open());
}
