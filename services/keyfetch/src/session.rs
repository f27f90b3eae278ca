//! Fetcher session (C7): mirror of the server's `session::run_session`
//! (`keyserver`) on the client side. Owns the handshake and the
//! read-parse-dedup-ack loop; produces a stream of genuinely new keysets,
//! silently acking and continuing past heartbeats and duplicate pushes
//! (spec.md §4.7).

use std::time::Duration;

use keys_protocol::{
    parse_keyset, read_heartbeat_interval, read_payload, write_ack, write_hostname,
    write_protocol_version, Keyset,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use crate::error::FetcherError;

/// An established connection, past the handshake, ready to yield keysets.
/// Generic over the transport so the same state machine drives plaintext
/// `TcpStream`s and TLS client streams alike (mirrors `keyserver::session`'s
/// own genericity over `S: AsyncRead + AsyncWrite + Unpin`).
pub struct FetcherSession<S> {
    stream: S,
    heartbeat_interval_secs: u16,
    last_delivered: Option<Keyset>,
}

impl<S> FetcherSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Performs the handshake: writes the (optional, TLS-only) protocol
    /// version byte, the declared hostname, then reads back the server's
    /// heartbeat interval.
    pub async fn connect(
        mut stream: S,
        hostname: Option<&str>,
        is_tls: bool,
        handshake_timeout: Duration,
    ) -> Result<Self, FetcherError> {
        let heartbeat_interval_secs = timeout(handshake_timeout, async {
            if is_tls {
                write_protocol_version(&mut stream).await?;
            }
            write_hostname(&mut stream, hostname).await?;
            read_heartbeat_interval(&mut stream).await
        })
        .await
        .map_err(|_| FetcherError::HandshakeTimeout)??;

        Ok(Self {
            stream,
            heartbeat_interval_secs,
            last_delivered: None,
        })
    }

    pub fn heartbeat_interval_secs(&self) -> u16 {
        self.heartbeat_interval_secs
    }

    /// Reads frames until a keyset arrives that differs from the last one
    /// delivered, acking every frame along the way (heartbeat pings and
    /// duplicate pushes alike) -- spec.md §4.7's `continue` branches never
    /// surface to the caller; only a genuinely new keyset does.
    ///
    /// Deadlines: `2 * hb_interval` for the length prefix (the server may
    /// legitimately go one full heartbeat period without a push), `5s` for
    /// the payload body once a non-zero length has been read.
    pub async fn recv_keyset(&mut self) -> Result<Keyset, FetcherError> {
        let frame_deadline = Duration::from_secs(u64::from(self.heartbeat_interval_secs) * 2);
        loop {
            let payload = timeout(frame_deadline, read_payload(&mut self.stream))
                .await
                .map_err(|_| FetcherError::ReadTimeout)??;

            let Some(bytes) = payload else {
                write_ack(&mut self.stream).await?;
                continue;
            };

            let keyset = parse_keyset(&bytes)?;
            write_ack(&mut self.stream).await?;

            if self.last_delivered.as_ref() == Some(&keyset) {
                continue;
            }
            self.last_delivered = Some(keyset.clone());
            return Ok(keyset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keys_protocol::{read_ack, write_heartbeat_interval, write_payload, Keyset};
    use tokio::io::duplex;

    fn keyset_with(user: &str, key: &str) -> Keyset {
        let mut ks = Keyset::new();
        ks.entry(user.to_owned())
            .or_default()
            .insert(key.to_owned());
        ks
    }

    #[tokio::test]
    async fn handshake_reads_back_heartbeat_interval() {
        let (client_side, mut server_side) = duplex(64 * 1024);
        let connect = tokio::spawn(FetcherSession::connect(
            client_side,
            Some("h1"),
            false,
            Duration::from_secs(5),
        ));

        let hostname = keys_protocol::read_hostname(&mut server_side).await.unwrap();
        assert_eq!(hostname.as_deref(), Some("h1"));
        write_heartbeat_interval(&mut server_side, 42).await.unwrap();

        let session = connect.await.unwrap().unwrap();
        assert_eq!(session.heartbeat_interval_secs(), 42);
    }

    #[tokio::test]
    async fn heartbeat_pings_are_acked_and_invisible_to_caller() {
        let (client_side, mut server_side) = duplex(64 * 1024);
        let connect = tokio::spawn(FetcherSession::connect(
            client_side,
            None,
            false,
            Duration::from_secs(5),
        ));
        let _hostname = keys_protocol::read_hostname(&mut server_side).await.unwrap();
        write_heartbeat_interval(&mut server_side, 60).await.unwrap();
        let mut session = connect.await.unwrap().unwrap();

        let recv = tokio::spawn(async move { (session.recv_keyset().await, session) });

        write_payload(&mut server_side, None).await.unwrap(); // ping
        read_ack(&mut server_side).await.unwrap();

        let ks = keyset_with("alice", "key-a");
        let bytes = keys_protocol::render_keyset(&ks).unwrap();
        write_payload(&mut server_side, Some(&bytes)).await.unwrap();
        read_ack(&mut server_side).await.unwrap();

        let (got, _session) = recv.await.unwrap();
        assert_eq!(got.unwrap(), ks);
    }

    #[tokio::test]
    async fn duplicate_push_is_suppressed() {
        let (client_side, mut server_side) = duplex(64 * 1024);
        let connect = tokio::spawn(FetcherSession::connect(
            client_side,
            None,
            false,
            Duration::from_secs(5),
        ));
        let _hostname = keys_protocol::read_hostname(&mut server_side).await.unwrap();
        write_heartbeat_interval(&mut server_side, 60).await.unwrap();
        let mut session = connect.await.unwrap().unwrap();

        let ks = keyset_with("alice", "key-a");
        let bytes = keys_protocol::render_keyset(&ks).unwrap();

        write_payload(&mut server_side, Some(&bytes)).await.unwrap();
        read_ack(&mut server_side).await.unwrap();
        let first = session.recv_keyset().await.unwrap();
        assert_eq!(first, ks);

        let recv = tokio::spawn(async move { (session.recv_keyset().await, session) });

        // same bytes again -- must be suppressed
        write_payload(&mut server_side, Some(&bytes)).await.unwrap();
        read_ack(&mut server_side).await.unwrap();

        let ks2 = keyset_with("bob", "key-b");
        let bytes2 = keys_protocol::render_keyset(&ks2).unwrap();
        write_payload(&mut server_side, Some(&bytes2)).await.unwrap();
        read_ack(&mut server_side).await.unwrap();

        let (second, _session) = recv.await.unwrap();
        assert_eq!(second.unwrap(), ks2);
    }
}
