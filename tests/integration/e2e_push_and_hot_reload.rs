//! End-to-end: a real `keyserver` session (C3/C5/C6) pushed over a real
//! loopback TCP socket to a bare protocol client, covering spec.md S1
//! (wildcard only), S2 (host-specific overrides wildcard union), and S3
//! (hot reload with no reconnection).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use keys_protocol::KeyRecord;
use keys_test_utils::MockFetcher;
use keyserver::registry::ConnectionRegistry;
use keyserver::reload::reload_and_wake;
use keyserver::store::KeysetStore;
use tokio::net::TcpListener;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const ACK_TIMEOUT: Duration = Duration::from_secs(5);
const HEARTBEAT_SECS: u16 = 60;

/// Binds an ephemeral loopback listener and spawns `run_session` for every
/// accepted connection, sharing one store and registry -- a minimal stand-in
/// for `keyserver::run`'s accept loop, without the TLS listener or signal
/// plumbing those tests don't exercise.
async fn spawn_server(store: Arc<KeysetStore>, registry: ConnectionRegistry) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let store = Arc::clone(&store);
            let registry = registry.clone();
            tokio::spawn(async move {
                let _ = keyserver::session::run_session(
                    stream,
                    peer,
                    false,
                    store,
                    registry,
                    HANDSHAKE_TIMEOUT,
                    ACK_TIMEOUT,
                    HEARTBEAT_SECS,
                )
                .await;
            });
        }
    });
    addr
}

fn write_admin_db(path: &std::path::Path, entries: &[(&str, &str, &[&str])]) {
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
    keys_core::write_db(path, &db).unwrap();
}

#[tokio::test]
async fn s1_wildcard_only_delivers_to_any_declared_host() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db.json");
    write_admin_db(&db_path, &[("alice_laptop", "ssh-ed25519 AAAAK1 alice", &["alice@*"])]);

    let store = Arc::new(KeysetStore::load(db_path, Arc::new(|_| true)).unwrap());
    let registry = ConnectionRegistry::new();
    let addr = spawn_server(store, registry).await;

    let mut fetcher = MockFetcher::connect(addr, Some("h1")).await.unwrap();
    let frame = fetcher.recv_and_ack().await.unwrap();
    let bytes = match frame {
        keys_test_utils::Frame::Payload(b) => b,
        keys_test_utils::Frame::Ping => panic!("expected the initial push, not a heartbeat"),
    };
    let keyset: keys_protocol::Keyset = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(keyset.len(), 1);
    assert!(keyset["alice"].contains("ssh-ed25519 AAAAK1 alice"));
}

#[tokio::test]
async fn s2_host_specific_domain_extends_wildcard_only_for_that_host() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db.json");
    write_admin_db(
        &db_path,
        &[
            ("alice_wild", "ssh-ed25519 AAAAK1 alice", &["alice@*"]),
            ("alice_h1", "ssh-ed25519 AAAAK2 alice", &["alice@h1"]),
        ],
    );

    let store = Arc::new(KeysetStore::load(db_path, Arc::new(|_| true)).unwrap());
    let registry = ConnectionRegistry::new();
    let addr = spawn_server(store, registry).await;

    let mut h1 = MockFetcher::connect(addr, Some("h1")).await.unwrap();
    let keys_test_utils::Frame::Payload(bytes) = h1.recv_and_ack().await.unwrap() else {
        panic!("expected a push");
    };
    let keyset: keys_protocol::Keyset = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(keyset["alice"].len(), 2);
    assert!(keyset["alice"].contains("ssh-ed25519 AAAAK1 alice"));
    assert!(keyset["alice"].contains("ssh-ed25519 AAAAK2 alice"));

    let mut h2 = MockFetcher::connect(addr, Some("h2")).await.unwrap();
    let keys_test_utils::Frame::Payload(bytes) = h2.recv_and_ack().await.unwrap() else {
        panic!("expected a push");
    };
    let keyset: keys_protocol::Keyset = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(keyset["alice"].len(), 1);
    assert!(keyset["alice"].contains("ssh-ed25519 AAAAK1 alice"));
}

#[tokio::test]
async fn s3_hot_reload_pushes_to_an_already_connected_client_without_reconnecting() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db.json");
    write_admin_db(&db_path, &[("alice_wild", "ssh-ed25519 AAAAK1 alice", &["alice@*"])]);

    let store = Arc::new(KeysetStore::load(db_path.clone(), Arc::new(|_| true)).unwrap());
    let registry = ConnectionRegistry::new();
    let addr = spawn_server(Arc::clone(&store), registry.clone()).await;

    let mut fetcher = MockFetcher::connect(addr, Some("h1")).await.unwrap();
    let first = fetcher.recv_and_ack().await.unwrap();
    assert!(matches!(first, keys_test_utils::Frame::Payload(_)));

    write_admin_db(
        &db_path,
        &[
            ("alice_wild", "ssh-ed25519 AAAAK1 alice", &["alice@*"]),
            ("bob_h1", "ssh-ed25519 AAAAK3 bob", &["bob@h1"]),
        ],
    );
    reload_and_wake(&store, &registry).await;

    let second = tokio::time::timeout(Duration::from_secs(2), fetcher.recv_and_ack())
        .await
        .expect("hot reload should push without a reconnect")
        .unwrap();
    let keys_test_utils::Frame::Payload(bytes) = second else {
        panic!("expected a push containing bob's new key");
    };
    let keyset: keys_protocol::Keyset = serde_json::from_slice(&bytes).unwrap();
    assert!(keyset.contains_key("bob"));
    assert!(keyset["bob"].contains("ssh-ed25519 AAAAK3 bob"));
}
