//! Per-connection server session (C5): handshake, push loop, heartbeat, ack
//! discipline. One task per accepted connection; generic over the stream
//! type so the same state machine drives both plaintext `TcpStream`s and
//! `tokio_rustls` TLS streams.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use keys_protocol::{read_ack, read_hostname, read_protocol_version, write_heartbeat_interval, write_payload, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::info;

use crate::error::SessionError;
use crate::registry::ConnectionRegistry;
use crate::store::KeysetStore;

fn to_session_error(peer: SocketAddr, err: ProtocolError) -> SessionError {
    match err {
        ProtocolError::Io(source) => SessionError::Io { peer, source },
        other => SessionError::Protocol { peer, source: other },
    }
}

/// Drives one session from just-accepted to teardown. Returns `Ok(())` on a
/// clean client disconnect, `Err` on protocol violation, timeout, or I/O
/// error -- the caller logs and drops the connection either way; a
/// misbehaving session never affects any other (spec.md §4.5, §7).
pub async fn run_session<S>(
    mut stream: S,
    peer: SocketAddr,
    is_tls: bool,
    store: Arc<KeysetStore>,
    registry: ConnectionRegistry,
    handshake_timeout: Duration,
    ack_timeout: Duration,
    heartbeat_secs: u16,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Registering before the handshake completes (spec.md §4.6: "inserted
    // at accept ... before handshake begins") means a reload racing the
    // handshake still wakes this session for its very first push.
    let handle = registry.insert().await;

    let hostname = timeout(handshake_timeout, async {
        if is_tls {
            read_protocol_version(&mut stream).await?;
        }
        read_hostname(&mut stream).await
    })
    .await
    .map_err(|_| SessionError::HandshakeTimeout { peer })?
    .map_err(|source| to_session_error(peer, source))?;

    write_heartbeat_interval(&mut stream, heartbeat_secs)
        .await
        .map_err(|source| to_session_error(peer, source))?;

    info!(%peer, hostname = ?hostname, "session established");

    let hb_interval = Duration::from_secs(u64::from(heartbeat_secs));

    loop {
        tokio::select! {
            () = handle.wait() => {
                let blob = store.get(hostname.as_deref()).await;
                write_payload(&mut stream, Some(&blob))
                    .await
                    .map_err(|source| to_session_error(peer, source))?;
            }
            () = tokio::time::sleep(hb_interval) => {
                write_payload(&mut stream, None)
                    .await
                    .map_err(|source| to_session_error(peer, source))?;
            }
        }

        timeout(ack_timeout, read_ack(&mut stream))
            .await
            .map_err(|_| SessionError::AckTimeout { peer })?
            .map_err(|source| to_session_error(peer, source))?;
    }
}
