//! `keyserver`: the key-distribution server (C3-C6 of spec.md). Holds the
//! admin database's projection, hot-reloads it on `SIGUSR1` (or mtime
//! poll), and pushes per-host keysets to every connected fetcher over the
//! wire protocol in `keys-protocol`.

pub mod config;
pub mod error;
pub mod registry;
pub mod reload;
pub mod session;
pub mod store;
pub mod tls;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use config::ServerConfig;
pub use error::ServerError;
pub use store::{KeysetStore, Validator};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawns `fut` and, if it panics, logs the panic and cancels `shutdown` --
/// spec.md §5's "uncaught exception in any task ... triggers the shutdown
/// event," mirroring `server.py`'s `uncaught_exception -> finish.set()`.
/// Every task the server spawns (accept loops, sessions, reload triggers)
/// goes through this so a single panicking task fails the whole process
/// fast instead of quietly vanishing.
pub(crate) fn spawn_supervised<F>(
    task_name: &'static str,
    shutdown: CancellationToken,
    fut: F,
) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(fut);
    tokio::spawn(async move {
        if let Err(err) = handle.await {
            error!(task = task_name, error = %err, "task panicked, triggering shutdown");
            shutdown.cancel();
        }
    })
}

/// Runs the server until `shutdown` is cancelled: binds the plaintext
/// listener (and the TLS listener, if enabled), starts the reload
/// trigger(s), and accepts connections until told to stop. New connections
/// are refused once shutdown begins; sessions already accepted drain to
/// their next natural exit (spec.md §5).
pub async fn run(
    config: ServerConfig,
    validate: Validator,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let store = Arc::new(KeysetStore::load(config.keydb.clone(), Arc::clone(&validate))?);
    let registry = registry::ConnectionRegistry::new();

    reload::spawn_signal_reload(Arc::clone(&store), registry.clone(), shutdown.clone());
    if config.reload.poll_mtime {
        reload::spawn_mtime_poller(
            config.keydb.clone(),
            Arc::clone(&store),
            registry.clone(),
            shutdown.clone(),
        );
    }

    let plaintext_listener = TcpListener::bind((config.endpoint.0.as_str(), config.endpoint.1))
        .await
        .map_err(|source| ServerError::Bind {
            addr: format!("{}:{}", config.endpoint.0, config.endpoint.1),
            source,
        })?;
    info!(addr = %plaintext_listener.local_addr().unwrap(), "plaintext listener bound");

    let plaintext_task = spawn_supervised(
        "plaintext accept loop",
        shutdown.clone(),
        accept_plaintext(
            plaintext_listener,
            Arc::clone(&store),
            registry.clone(),
            config.heartbeat_secs,
            shutdown.clone(),
        ),
    );

    let tls_task = if config.ssl.enabled {
        let cert = config
            .ssl
            .cert
            .as_deref()
            .ok_or_else(|| ServerError::Tls("ssl.enabled but ssl.cert is unset".to_owned()))?;
        let key = config
            .ssl
            .key
            .as_deref()
            .ok_or_else(|| ServerError::Tls("ssl.enabled but ssl.key is unset".to_owned()))?;
        let acceptor = tls::build_acceptor(cert, key)?;

        let tls_listener =
            TcpListener::bind((config.ssl.endpoint.0.as_str(), config.ssl.endpoint.1))
                .await
                .map_err(|source| ServerError::Bind {
                    addr: format!("{}:{}", config.ssl.endpoint.0, config.ssl.endpoint.1),
                    source,
                })?;
        info!(addr = %tls_listener.local_addr().unwrap(), "tls listener bound");

        Some(spawn_supervised(
            "tls accept loop",
            shutdown.clone(),
            accept_tls(
                tls_listener,
                acceptor,
                Arc::clone(&store),
                registry.clone(),
                config.heartbeat_secs,
                shutdown.clone(),
            ),
        ))
    } else {
        None
    };

    let _ = plaintext_task.await;
    if let Some(tls_task) = tls_task {
        let _ = tls_task.await;
    }

    Ok(())
}

async fn accept_plaintext(
    listener: TcpListener,
    store: Arc<KeysetStore>,
    registry: registry::ConnectionRegistry,
    heartbeat_secs: u16,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("plaintext accept loop shutting down");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => spawn_session(stream, peer, false, Arc::clone(&store), registry.clone(), heartbeat_secs, shutdown.clone()),
                    Err(err) => warn!(error = %err, "accept failed"),
                }
            }
        }
    }
}

async fn accept_tls(
    listener: TcpListener,
    acceptor: tokio_rustls::TlsAcceptor,
    store: Arc<KeysetStore>,
    registry: registry::ConnectionRegistry,
    heartbeat_secs: u16,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("tls accept loop shutting down");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((tcp, peer)) => {
                        let acceptor = acceptor.clone();
                        let store = Arc::clone(&store);
                        let registry = registry.clone();
                        let shutdown = shutdown.clone();
                        spawn_supervised(
                            "tls handshake",
                            shutdown.clone(),
                            async move {
                                match acceptor.accept(tcp).await {
                                    Ok(tls_stream) => spawn_session(tls_stream, peer, true, store, registry, heartbeat_secs, shutdown),
                                    Err(err) => warn!(%peer, error = %err, "tls handshake failed"),
                                }
                            },
                        );
                    }
                    Err(err) => warn!(error = %err, "accept failed"),
                }
            }
        }
    }
}

fn spawn_session<S>(
    stream: S,
    peer: SocketAddr,
    is_tls: bool,
    store: Arc<KeysetStore>,
    registry: registry::ConnectionRegistry,
    heartbeat_secs: u16,
    shutdown: CancellationToken,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    spawn_supervised("session", shutdown, async move {
        let result = session::run_session(
            stream,
            peer,
            is_tls,
            store,
            registry,
            HANDSHAKE_TIMEOUT,
            ACK_TIMEOUT,
            heartbeat_secs,
        )
        .await;
        match result {
            Ok(()) => info!(%peer, "session closed"),
            Err(err) => error!(%peer, error = %err, "session ended"),
        }
    });
}
