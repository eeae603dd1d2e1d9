
use std::sync::atomic::Ordering;
use std::time::Duration;

use harness::{wait_until, EchoBackend, HoldingBackend, ProxyHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const IDLE: Duration = Duration::from_secs(30);

#[tokio::test]
async fn bytes_are_relayed_verbatim_in_order() {
    let backend = EchoBackend::spawn().await.unwrap();
    let relay = ProxyHandle::spawn(backend.addr, 2, IDLE).await.unwrap();

    let mut stream = TcpStream::connect(relay.listen_addr).await.unwrap();

    // Ping-pong chunks of varying size and binary content.
    let mut total = 0u64;
    for round in 0..32u32 {
        let len = 1 + ((round * 977) % 4096) as usize;
        let chunk: Vec<u8> = (0..len)
            .map(|i| ((i as u32).wrapping_mul(31).wrapping_add(round * 7) % 251) as u8)
            .collect();
        stream.write_all(&chunk).await.unwrap();
        total += len as u64;

        let mut echoed = vec![0u8; len];
        timeout(Duration::from_secs(2), stream.read_exact(&mut echoed))
            .await
            .expect("echo within deadline")
            .expect("echo read");
        assert_eq!(echoed, chunk, "round {round} corrupted");
    }

    assert_eq!(backend.bytes_received.load(Ordering::Relaxed), total);
    assert!(
        wait_until(
            || relay.stats().bytes_to_backend.load(Ordering::Relaxed) == total,
            Duration::from_secs(1)
        )
        .await
    );
    assert!(
        wait_until(
            || relay.stats().bytes_from_backend.load(Ordering::Relaxed) == total,
            Duration::from_secs(1)
        )
        .await
    );
}

#[tokio::test]
async fn closing_the_backend_leg_closes_the_client_leg() {
    let backend = HoldingBackend::spawn().await.unwrap();
    let relay = ProxyHandle::spawn(backend.addr, 1, IDLE).await.unwrap();

    let mut client = TcpStream::connect(relay.listen_addr).await.unwrap();
    client.write_all(b"hello").await.unwrap();
    assert!(wait_until(|| backend.connection_count() == 1, Duration::from_secs(1)).await);

    assert!(backend.close_connection(0).await);

    assert!(
        harness::closed_within(&mut client, Duration::from_secs(2)).await,
        "client leg should close once the backend leg dies"
    );
    assert!(
        wait_until(
            || relay.stats().connections_active.load(Ordering::Relaxed) == 0,
            Duration::from_secs(1)
        )
        .await
    );
    assert_eq!(relay.registry.len().await, 0);
}

#[tokio::test]
async fn dial_failure_closes_client_and_releases_the_token() {
    // A port that was just bound and released: nothing listens there.
    let temp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = temp.local_addr().unwrap();
    drop(temp);

    let relay = ProxyHandle::spawn(dead_addr, 1, IDLE).await.unwrap();

    let mut client = TcpStream::connect(relay.listen_addr).await.unwrap();
    assert!(
        harness::closed_within(&mut client, Duration::from_secs(2)).await,
        "client should be dropped when the backend is unreachable"
    );
    assert!(
        wait_until(
            || relay.stats().dial_failures.load(Ordering::Relaxed) == 1,
            Duration::from_secs(1)
        )
        .await
    );
    assert!(
        wait_until(
            || relay.stats().connections_active.load(Ordering::Relaxed) == 0,
            Duration::from_secs(1)
        )
        .await
    );

    // The token freed by the failed dial admits the next client.
    let revived = TcpListener::bind(dead_addr).await.expect("rebind backend port");
    let backend = EchoBackend::from_listener(revived).unwrap();

    let data = harness::try_roundtrip(relay.listen_addr, b"after-failure")
        .await
        .expect("second admission succeeds");
    assert_eq!(data, b"after-failure");
    assert_eq!(backend.connection_count(), 1);
}

#[tokio::test]
async fn capacity_scenario_with_external_backend_leg_close() {
    let backend = HoldingBackend::spawn().await.unwrap();
    let relay = ProxyHandle::spawn(backend.addr, 2, IDLE).await.unwrap();

    let mut c1 = TcpStream::connect(relay.listen_addr).await.unwrap();
    c1.write_all(b"c1").await.unwrap();
    assert!(wait_until(|| backend.connection_count() == 1, Duration::from_secs(1)).await);

    let mut c2 = TcpStream::connect(relay.listen_addr).await.unwrap();
    c2.write_all(b"c2").await.unwrap();
    assert!(wait_until(|| backend.connection_count() == 2, Duration::from_secs(1)).await);

    // Third concurrent client: rejected immediately, never dialed.
    let mut c3 = TcpStream::connect(relay.listen_addr).await.unwrap();
    assert!(harness::closed_within(&mut c3, Duration::from_secs(1)).await);
    assert_eq!(backend.connection_count(), 2);

    // Externally close c1's backend leg; its client leg follows.
    assert!(backend.close_connection(0).await);
    assert!(harness::closed_within(&mut c1, Duration::from_secs(2)).await);
    assert!(
        wait_until(
            || relay.stats().connections_active.load(Ordering::Relaxed) == 1,
            Duration::from_secs(1)
        )
        .await
    );

    // A slot is free again: the fourth client is admitted and dialed.
    let mut c4 = TcpStream::connect(relay.listen_addr).await.unwrap();
    c4.write_all(b"c4").await.unwrap();
    assert!(wait_until(|| backend.connection_count() == 3, Duration::from_secs(1)).await);

    drop(c2);
    drop(c4);
}
