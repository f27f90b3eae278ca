//! Connection registry (C6): the set of live sessions, each carrying a
//! single-slot wake signal. `wake_all` is the second half of "publish new
//! projection before dispatching wakes" (spec.md §5, §9) -- `store.reload()`
//! always happens before the call into this registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

/// Handle for one live session: `insert` returns this, the session keeps it
/// for its lifetime and passes it to `wait`, `remove` drops it out of the
/// registry on teardown (any exit path).
pub struct SessionHandle {
    id: u64,
    notify: Arc<Notify>,
    registry: ConnectionRegistry,
}

impl SessionHandle {
    /// Blocks until the registry wakes this session, or returns immediately
    /// if a wake arrived since the last call (single-slot, level-triggered:
    /// spec.md §4.5's "wake must be drained before each wait" is exactly
    /// `Notify`'s own coalescing semantics -- multiple `notify_one` calls
    /// between two `notified().await`s collapse to one permit).
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// A concurrent set of session wake handles. Cloning shares the underlying
/// map (mirrors the teacher's `Arc<RwLock<HashMap<K, V>>>` registries in
/// `services/server/src/state.rs`, e.g. `BroadcastRegistry`).
#[derive(Clone)]
pub struct ConnectionRegistry {
    sessions: Arc<Mutex<HashMap<u64, Arc<Notify>>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registers a new session. Its wake is armed: the first `wait()` call
    /// returns immediately, so the session's first push is always the
    /// current keyset (spec.md §4.5 "the first iteration sends
    /// immediately").
    pub async fn insert(&self) -> SessionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let notify = Arc::new(Notify::new());
        notify.notify_one();
        self.sessions.lock().await.insert(id, Arc::clone(&notify));
        SessionHandle {
            id,
            notify,
            registry: self.clone(),
        }
    }

    fn remove(&self, id: u64) {
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            sessions.lock().await.remove(&id);
        });
    }

    /// Wakes every currently registered session. Sessions inserted after
    /// this call started may or may not see the wake, but will in any case
    /// observe the projection this wake was dispatched for or a newer one
    /// on their own first iteration -- spec.md §5's only cross-session
    /// ordering guarantee.
    pub async fn wake_all(&self) {
        for notify in self.sessions.lock().await.values() {
            notify.notify_one();
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
