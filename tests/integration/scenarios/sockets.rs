//! Socket integration tests
//!
//! Bundles of real TCP and Unix domain socket listeners

use listener_bundle::net::{Stream, TcpAcceptor};
use listener_bundle::{Address, Bundle, SharedListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn tcp_listener() -> (SharedListener<Stream>, std::net::SocketAddr) {
    let acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
    let addr = acceptor.local_addr();
    (Arc::new(acceptor), addr)
}

async fn read_tag(stream: &mut Stream) -> u8 {
    let mut buf = [0u8; 1];
    stream.read_exact(&mut buf).await.unwrap();
    buf[0]
}

#[tokio::test]
async fn test_tcp_bundle_address_is_main() {
    let (main, main_addr) = tcp_listener().await;
    let (other, _) = tcp_listener().await;
    let bundled = Bundle::new(main, vec![other]);

    assert_eq!(bundled.address(), &Address::Tcp(main_addr));
    assert_eq!(bundled.len(), 2);
}

#[tokio::test]
async fn test_tcp_connections_on_every_port() {
    let (main, main_addr) = tcp_listener().await;
    let (other, other_addr) = tcp_listener().await;
    let bundled = Bundle::new(main, vec![other]);

    let clients = tokio::spawn(async move {
        let mut to_main = TcpStream::connect(main_addr).await.unwrap();
        to_main.write_all(b"m").await.unwrap();
        let mut to_other = TcpStream::connect(other_addr).await.unwrap();
        to_other.write_all(b"o").await.unwrap();
        // Keep both ends open until the server has read
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let mut tags = Vec::new();
    for _ in 0..2 {
        let mut stream = bundled.accept().await.unwrap();
        assert!(stream.peer_address().is_some());
        tags.push(read_tag(&mut stream).await);
    }
    tags.sort_unstable();
    assert_eq!(tags, b"mo".to_vec());

    clients.await.unwrap();
}

#[tokio::test]
async fn test_tcp_close_unblocks_pending_accept() {
    let (main, _) = tcp_listener().await;
    let bundled = Arc::new(Bundle::new(main, Vec::new()));

    let pending = {
        let bundled = Arc::clone(&bundled);
        tokio::spawn(async move { bundled.accept().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    bundled.close().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("accept must return after close")
        .unwrap();
    let err = result.err().expect("accept after close must fail");
    assert!(!err.temporary());
    assert!(err.stopped());
}

#[tokio::test]
async fn test_tcp_closed_before_first_accept() {
    let (main, main_addr) = tcp_listener().await;
    let bundled = Bundle::new(main, Vec::new());
    bundled.close().await.unwrap();

    let err = bundled.accept().await.err().expect("closed bundle must fail");
    assert!(!err.temporary());
    assert_eq!(
        err.listener().map(|l| l.address().clone()),
        Some(Address::Tcp(main_addr))
    );

    // The port is released
    assert!(TcpStream::connect(main_addr).await.is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn test_tcp_and_unix_in_one_bundle() {
    use listener_bundle::net::UnixAcceptor;
    use tokio::net::UnixStream;

    let path = std::env::temp_dir().join(format!("listener_bundle_{}.sock", uuid::Uuid::new_v4()));
    let unix: SharedListener<Stream> = Arc::new(UnixAcceptor::bind(&path).unwrap());
    let (main, main_addr) = tcp_listener().await;
    let bundled = Bundle::new(main, vec![unix]);

    let unix_path = path.clone();
    let clients = tokio::spawn(async move {
        let mut over_tcp = TcpStream::connect(main_addr).await.unwrap();
        over_tcp.write_all(b"t").await.unwrap();
        let mut over_unix = UnixStream::connect(&unix_path).await.unwrap();
        over_unix.write_all(b"u").await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let mut tags = Vec::new();
    for _ in 0..2 {
        let mut stream = bundled.accept().await.unwrap();
        let tag = read_tag(&mut stream).await;
        match &stream {
            Stream::Tcp(_) => assert_eq!(tag, b't'),
            Stream::Unix(_) => assert_eq!(tag, b'u'),
        }
        tags.push(tag);
    }
    tags.sort_unstable();
    assert_eq!(tags, b"tu".to_vec());
    clients.await.unwrap();

    bundled.close().await.unwrap();
    assert!(!path.exists(), "Unix socket file should be removed on close");
}
