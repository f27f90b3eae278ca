//! End-to-end: a real `keyserver` session feeding a real `keyfetch`
//! `FetcherSession` into the reconciler (C7 -> C8 over a loopback socket),
//! covering spec.md S6 (stale user removal) and S7 (empty keyset guard).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use keyfetch::reconciler;
use keyfetch::session::FetcherSession;
use keys_protocol::KeyRecord;
use keys_test_utils::TempKeydir;
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
    Arc::new(KeysetStore::load(path, Arc::new(|_| true)).unwrap())
}

async fn spawn_server(store: Arc<KeysetStore>) -> SocketAddr {
    let registry = ConnectionRegistry::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
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
            60,
        )
        .await;
    });
    addr
}

#[tokio::test]
async fn s6_reconcile_removes_stale_users_and_writes_the_new_one() {
    let store = store_with(&[("alice_laptop", "ssh-ed25519 AAAAK1 alice", &["alice@*"])]);
    let addr = spawn_server(store).await;

    let keydir = TempKeydir::new().unwrap();
    keydir.seed("carol", &["old-carol-key"]);

    let tcp = tokio::net::TcpStream::connect(addr).await.unwrap();
    let mut session = FetcherSession::connect(tcp, Some("h1"), false, HANDSHAKE_TIMEOUT)
        .await
        .unwrap();
    let keyset = session.recv_keyset().await.unwrap();

    let report = reconciler::reconcile(keydir.path(), &keyset);
    assert!(report.errors.is_empty());
    assert_eq!(report.removed, vec!["carol".to_owned()]);
    assert!(!keydir.has_file("carol"));
    assert_eq!(keydir.snapshot()["alice"], vec!["ssh-ed25519 AAAAK1 alice"]);
}

#[tokio::test]
async fn s7_empty_keyset_push_leaves_the_keydir_untouched() {
    // No keys in the db at all -> the wildcard blob is the empty object.
    let store = store_with(&[]);
    let addr = spawn_server(store).await;

    let keydir = TempKeydir::new().unwrap();
    keydir.seed("alice", &["existing-key"]);

    let tcp = tokio::net::TcpStream::connect(addr).await.unwrap();
    let mut session = FetcherSession::connect(tcp, None, false, HANDSHAKE_TIMEOUT)
        .await
        .unwrap();
    let keyset = session.recv_keyset().await.unwrap();
    assert!(keyset.is_empty());

    let report = reconciler::reconcile(keydir.path(), &keyset);
    assert!(report.written.is_empty());
    assert!(report.removed.is_empty());
    assert_eq!(keydir.snapshot()["alice"], vec!["existing-key"]);
}
