
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use harness::{wait_until, EchoBackend, ProxyHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const IDLE: Duration = Duration::from_secs(30);

/// Connect through the relay and prove the pair is live with one echo.
async fn connect_and_echo(addr: SocketAddr, payload: &[u8]) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(payload).await.expect("write");
    let mut buf = vec![0u8; payload.len()];
    timeout(Duration::from_secs(1), stream.read_exact(&mut buf))
        .await
        .expect("echo within deadline")
        .expect("echo read");
    assert_eq!(buf, payload);
    stream
}

#[tokio::test]
async fn admits_up_to_limit_and_rejects_the_next_without_dialing() {
    let backend = EchoBackend::spawn().await.unwrap();
    let relay = ProxyHandle::spawn(backend.addr, 2, IDLE).await.unwrap();

    let _c1 = connect_and_echo(relay.listen_addr, b"one").await;
    let _c2 = connect_and_echo(relay.listen_addr, b"two").await;
    assert_eq!(backend.connection_count(), 2);

    // Third concurrent connection is over capacity: closed immediately.
    let mut c3 = TcpStream::connect(relay.listen_addr).await.unwrap();
    assert!(
        harness::closed_within(&mut c3, Duration::from_secs(1)).await,
        "over-capacity connection should be closed"
    );
    assert!(
        wait_until(
            || relay.stats().connections_rejected.load(Ordering::Relaxed) == 1,
            Duration::from_secs(1)
        )
        .await
    );
    assert_eq!(
        backend.connection_count(),
        2,
        "rejected client must never reach the backend"
    );
}

#[tokio::test]
async fn released_token_is_immediately_reusable() {
    let backend = EchoBackend::spawn().await.unwrap();
    let relay = ProxyHandle::spawn(backend.addr, 1, IDLE).await.unwrap();

    let c1 = connect_and_echo(relay.listen_addr, b"first").await;

    // The single token is held, so a second client is refused.
    let mut blocked = TcpStream::connect(relay.listen_addr).await.unwrap();
    assert!(harness::closed_within(&mut blocked, Duration::from_secs(1)).await);

    drop(c1);
    assert!(
        wait_until(
            || relay.stats().connections_active.load(Ordering::Relaxed) == 0,
            Duration::from_secs(1)
        )
        .await,
        "pair should wind down after the client closes"
    );

    let _c2 = connect_and_echo(relay.listen_addr, b"second").await;
    assert_eq!(
        relay.stats().connections_accepted.load(Ordering::Relaxed),
        2
    );
    assert_eq!(
        relay.stats().connections_rejected.load(Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn token_accounting_stays_exact_across_churn() {
    let backend = EchoBackend::spawn().await.unwrap();
    let relay = ProxyHandle::spawn(backend.addr, 1, IDLE).await.unwrap();

    for i in 0..5u8 {
        let payload = [b'a' + i; 16];
        let stream = connect_and_echo(relay.listen_addr, &payload).await;
        drop(stream);
        assert!(
            wait_until(
                || relay.stats().connections_active.load(Ordering::Relaxed) == 0,
                Duration::from_secs(1)
            )
            .await
        );
    }

    assert_eq!(
        relay.stats().connections_accepted.load(Ordering::Relaxed),
        5
    );
    assert_eq!(relay.stats().connections_closed.load(Ordering::Relaxed), 5);
    assert_eq!(
        relay.stats().connections_rejected.load(Ordering::Relaxed),
        0
    );
}
