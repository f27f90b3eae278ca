//! The fetcher's outer retry loop (spec.md §4.7's "listener"): dial,
//! handshake, drain keysets into the reconciler, and on any transient
//! error log and retry after 1s. Mirrors
//! `examples/original_source/src/keyserver/fetcher.py`'s `listener()`
//! coroutine, which wraps `client.loop()` in exactly this
//! catch-log-sleep-retry shape.

use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::FetcherError;
use crate::reconciler;
use crate::session::FetcherSession;
use crate::tls::build_connector;

const RETRY_DELAY: Duration = Duration::from_secs(1);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether to return after the first delivered keyset or run until
/// cancelled (spec.md §4.7's fetch-once / stream modes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    FetchOnce,
    Stream,
}

pub struct Dial {
    pub server: String,
    pub port: u16,
    pub use_tls: bool,
    pub hostname: Option<String>,
}

/// Runs the connect-handshake-drain loop until `shutdown` fires or, in
/// `FetchOnce` mode, until the first keyset has been reconciled.
pub async fn run(dial: Dial, keydir: PathBuf, mode: Mode, shutdown: CancellationToken) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }

        tokio::select! {
            () = shutdown.cancelled() => return,
            result = run_one_connection(&dial, &keydir, mode) => {
                match result {
                    Ok(Completed::FetchedOnce) => return,
                    Err(err) => warn!(error = %err, "fetcher session ended, retrying"),
                }
            }
        }

        tokio::select! {
            () = shutdown.cancelled() => return,
            () = sleep(RETRY_DELAY) => {}
        }
    }
}

enum Completed {
    FetchedOnce,
}

async fn run_one_connection(
    dial: &Dial,
    keydir: &std::path::Path,
    mode: Mode,
) -> Result<Completed, FetcherError> {
    let addr = format!("{}:{}", dial.server, dial.port);
    let tcp = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
        .await
        .map_err(|_| FetcherError::HandshakeTimeout)?
        .map_err(|_| FetcherError::ConnectionRefused { addr: addr.clone() })?;

    info!(%addr, tls = dial.use_tls, "connected to key server");

    if dial.use_tls {
        let connector = build_connector();
        let server_name = tokio_rustls::rustls::pki_types::ServerName::try_from(dial.server.clone())
            .map_err(|err| FetcherError::Tls(err.to_string()))?;
        let tls_stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|err| FetcherError::Tls(err.to_string()))?;
        drain(tls_stream, dial.hostname.as_deref(), true, keydir, mode).await
    } else {
        drain(tcp, dial.hostname.as_deref(), false, keydir, mode).await
    }
}

async fn drain<S>(
    stream: S,
    hostname: Option<&str>,
    is_tls: bool,
    keydir: &std::path::Path,
    mode: Mode,
) -> Result<Completed, FetcherError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut session = FetcherSession::connect(stream, hostname, is_tls, HANDSHAKE_TIMEOUT).await?;

    loop {
        let keyset = session.recv_keyset().await?;
        let report = reconciler::reconcile(keydir, &keyset);
        if !report.errors.is_empty() {
            for (user, err) in &report.errors {
                error!(user, error = %err, "reconcile error");
            }
        }
        info!(
            written = report.written.len(),
            removed = report.removed.len(),
            "reconciled keyset"
        );

        if mode == Mode::FetchOnce {
            return Ok(Completed::FetchedOnce);
        }
    }
}
