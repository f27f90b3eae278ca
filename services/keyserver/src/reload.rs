//! Reload trigger (C4): two sources -- `SIGUSR1` and an optional file-mtime
//! poller -- both funnel into the same `reload_and_wake`, so the
//! "publish the new projection, then wake every session" ordering
//! (spec.md §5, §9) is enforced in exactly one place regardless of which
//! source fired.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::registry::ConnectionRegistry;
use crate::spawn_supervised;
use crate::store::KeysetStore;

/// Reloads the store and wakes every live session. The only caller of
/// `ConnectionRegistry::wake_all` in the server, so every reload path --
/// signal or poller -- goes through here.
pub async fn reload_and_wake(store: &KeysetStore, registry: &ConnectionRegistry) {
    store.reload().await;
    registry.wake_all().await;
}

/// Spawns the `SIGUSR1` listener. Runs until the process exits; each signal
/// delivery triggers one `reload_and_wake`. Mirrors the teacher's
/// `signal::unix::signal(SignalKind::terminate())` pattern in
/// `services/server/src/main.rs`, generalized to `user_defined1()`.
pub fn spawn_signal_reload(
    store: Arc<KeysetStore>,
    registry: ConnectionRegistry,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    spawn_supervised("sigusr1 reload", shutdown, async move {
        let mut sigusr1 = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1()) {
            Ok(stream) => stream,
            Err(err) => {
                error!(error = %err, "failed to install SIGUSR1 handler");
                return;
            }
        };
        loop {
            sigusr1.recv().await;
            info!("SIGUSR1 received, reloading keyset store");
            reload_and_wake(&store, &registry).await;
        }
    })
}

/// Spawns the 1s mtime poller: a compatibility path for environments where
/// delivering `SIGUSR1` is inconvenient (spec.md §4.4). Only reloads when
/// the db file's mtime actually changed since the last check, so a quiet
/// db does not pay a reload's cost every second.
pub fn spawn_mtime_poller(
    keydb_path: PathBuf,
    store: Arc<KeysetStore>,
    registry: ConnectionRegistry,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    spawn_supervised("mtime poller", shutdown, async move {
        let mut last_mtime = mtime_of(&keydb_path);
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            let current = mtime_of(&keydb_path);
            if current != last_mtime {
                info!("keydb mtime changed, reloading keyset store");
                reload_and_wake(&store, &registry).await;
                last_mtime = current;
            }
        }
    })
}

fn mtime_of(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keys_protocol::{AdminDb, KeyRecord};
    use std::fs;

    #[tokio::test]
    async fn reload_and_wake_publishes_before_waking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        let mut db = AdminDb::default();
        db.keys.insert(
            "k1".to_owned(),
            KeyRecord {
                data: "ssh-ed25519 AAAA alice".to_owned(),
                domains: vec!["alice@*".to_owned()],
                options: vec![],
            },
        );
        keys_core::write_db(&path, &db).unwrap();

        let store = Arc::new(KeysetStore::load(path.clone(), Arc::new(|_| true)).unwrap());
        let registry = ConnectionRegistry::new();
        let handle = registry.insert().await;
        handle.wait().await; // drain initial arm

        db.keys.insert(
            "k2".to_owned(),
            KeyRecord {
                data: "ssh-ed25519 AAAA bob".to_owned(),
                domains: vec!["bob@*".to_owned()],
                options: vec![],
            },
        );
        keys_core::write_db(&path, &db).unwrap();

        reload_and_wake(&store, &registry).await;

        tokio::time::timeout(Duration::from_millis(50), handle.wait())
            .await
            .expect("wake should fire after reload");
        let blob = String::from_utf8(store.get(None).await).unwrap();
        assert!(blob.contains("bob"), "wake observer must see the new projection");
        let _ = fs::remove_file(&path);
    }
}
