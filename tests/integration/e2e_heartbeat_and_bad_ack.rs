//! End-to-end: spec.md S4 (heartbeat ping keeps an idle connection alive)
//! and S5 (a bad ack byte ends only the offending session).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use keys_protocol::KeyRecord;
use keys_test_utils::{Frame, MockFetcher};
use keyserver::error::SessionError;
use keyserver::registry::ConnectionRegistry;
use keyserver::store::KeysetStore;
use tokio::net::TcpListener;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const ACK_TIMEOUT: Duration = Duration::from_secs(5);

fn store_with(entries: &[(&str, &str, &[&str])]) -> Arc<KeysetStore> {
    let mut db = keys_protocol::AdminDb::default();
    for (name, data, domains) in entries {
        db.keys.insert(
            (*name).to_owned(),
            KeyRecord {
                data: (*data).to_owned(),
                domains: domains.iter().map(|d| (*d).to_owned()).collect(),
                options: vec![],
            },
        );
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.json");
    keys_core::write_db(&path, &db).unwrap();
    // `KeysetStore::load` reads the file once and keeps no open handle, so
    // the tempdir can be dropped as soon as this function returns.
    Arc::new(KeysetStore::load(path, Arc::new(|_| true)).unwrap())
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[tokio::test]
async fn s4_heartbeat_ping_arrives_and_keeps_the_connection_alive() {
    let store = store_with(&[("k1", "ssh-ed25519 AAAAK1 alice", &["alice@*"])]);
    let registry = ConnectionRegistry::new();
    let (listener, addr) = bind().await;

    tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        let _ = keyserver::session::run_session(
            stream,
            peer,
            false,
            store,
            registry,
            HANDSHAKE_TIMEOUT,
            ACK_TIMEOUT,
            1, // 1s heartbeat so the test doesn't wait long
        )
        .await;
    });

    let mut fetcher = MockFetcher::connect(addr, None).await.unwrap();
    assert_eq!(fetcher.heartbeat_interval_secs(), 1);

    let first = fetcher.recv_and_ack().await.unwrap();
    assert!(matches!(first, Frame::Payload(_)), "first push is the initial keyset");

    let second = tokio::time::timeout(Duration::from_secs(3), fetcher.recv_and_ack())
        .await
        .expect("heartbeat ping should arrive within 3s")
        .unwrap();
    assert_eq!(second, Frame::Ping);

    // connection is still alive: a further ping still arrives and acks cleanly.
    let third = tokio::time::timeout(Duration::from_secs(3), fetcher.recv_and_ack())
        .await
        .expect("connection should remain alive after an acked heartbeat")
        .unwrap();
    assert_eq!(third, Frame::Ping);
}

#[tokio::test]
async fn s5_bad_ack_closes_only_the_offending_session() {
    let store = store_with(&[("k1", "ssh-ed25519 AAAAK1 alice", &["alice@*"])]);
    let registry = ConnectionRegistry::new();
    let (listener, addr) = bind().await;

    let store_for_good = Arc::clone(&store);
    let registry_for_good = registry.clone();
    let good_session = tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        keyserver::session::run_session(
            stream,
            peer,
            false,
            store_for_good,
            registry_for_good,
            HANDSHAKE_TIMEOUT,
            ACK_TIMEOUT,
            60,
        )
        .await
    });

    // misbehaving client
    let mut bad = MockFetcher::connect(addr, None).await.unwrap();
    let _ = bad.recv_frame().await.unwrap();
    bad.ack_bad().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), good_session)
        .await
        .expect("session should end promptly after a bad ack")
        .unwrap();
    assert!(matches!(result, Err(SessionError::Protocol { .. })));
}

#[tokio::test]
async fn s5_other_sessions_are_unaffected_by_one_bad_ack() {
    let store = store_with(&[("k1", "ssh-ed25519 AAAAK1 alice", &["alice@*"])]);
    let registry = ConnectionRegistry::new();
    let (listener, addr) = bind().await;

    tokio::spawn(async move {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let store = Arc::clone(&store);
            let registry = registry.clone();
            tokio::spawn(keyserver::session::run_session(
                stream,
                peer,
                false,
                store,
                registry,
                HANDSHAKE_TIMEOUT,
                ACK_TIMEOUT,
                60,
            ));
        }
    });

    let mut bad = MockFetcher::connect(addr, None).await.unwrap();
    let _ = bad.recv_frame().await.unwrap();
    bad.ack_bad().await.unwrap();

    // a second, well-behaved client connects after the first misbehaves and
    // still gets served normally.
    let mut good = MockFetcher::connect(addr, None).await.unwrap();
    let frame = good.recv_and_ack().await.unwrap();
    assert!(matches!(frame, Frame::Payload(_)));
}
