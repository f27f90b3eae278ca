// mock_fetcher: a bare-bones wire-protocol client for exercising a live
// `keyserver` session from integration tests, without pulling in the real
// `keyfetch` supervisor/reconciler machinery.
//
// Unlike `FetcherSession` in `services/keyfetch`, this does no dedup and no
// filesystem reconciliation -- it hands back raw frames so tests can assert
// on exactly what the server sent, and lets them choose when (and whether)
// to ack.

use std::net::SocketAddr;

use keys_protocol::{
    read_heartbeat_interval, read_payload, write_ack, write_hostname, ProtocolError,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// One frame received from the server: a heartbeat ping, or a push with a
/// JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Ping,
    Payload(Vec<u8>),
}

/// A minimal client driving the server's wire protocol directly.
pub struct MockFetcher {
    stream: TcpStream,
    heartbeat_interval_secs: u16,
}

impl MockFetcher {
    /// Connects and performs the handshake: sends `hostname` (or none for
    /// the wildcard blob) and reads back the server's heartbeat interval.
    pub async fn connect(addr: SocketAddr, hostname: Option<&str>) -> std::io::Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        write_hostname(&mut stream, hostname).await.map_err(io_err)?;
        let heartbeat_interval_secs = read_heartbeat_interval(&mut stream)
            .await
            .map_err(io_err)?;
        Ok(Self {
            stream,
            heartbeat_interval_secs,
        })
    }

    pub fn heartbeat_interval_secs(&self) -> u16 {
        self.heartbeat_interval_secs
    }

    /// Reads one push frame. Does not ack -- callers choose `ack` or
    /// `ack_bad` afterward so tests can exercise the ack-enforcement
    /// property (spec.md S5).
    pub async fn recv_frame(&mut self) -> Result<Frame, ProtocolError> {
        match read_payload(&mut self.stream).await? {
            None => Ok(Frame::Ping),
            Some(bytes) => Ok(Frame::Payload(bytes)),
        }
    }

    /// Sends a correct ack (`0x00`).
    pub async fn ack(&mut self) -> std::io::Result<()> {
        write_ack(&mut self.stream).await.map_err(io_err)
    }

    /// Sends a deliberately wrong ack byte, to exercise the server's fatal
    /// ack-mismatch path.
    pub async fn ack_bad(&mut self) -> std::io::Result<()> {
        self.stream.write_u8(0x01).await
    }

    /// Convenience: receive one frame and immediately ack it correctly.
    pub async fn recv_and_ack(&mut self) -> Result<Frame, ProtocolError> {
        let frame = self.recv_frame().await?;
        self.ack().await?;
        Ok(frame)
    }
}

fn io_err(e: ProtocolError) -> std::io::Error {
    match e {
        ProtocolError::Io(e) => e,
        other => std::io::Error::other(other),
    }
}
