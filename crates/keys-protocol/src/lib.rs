// keys-protocol: wire framing and message types for the key-distribution
// protocol. No I/O beyond the tokio AsyncRead/AsyncWrite traits — no
// sockets, no TLS, no file access. Kept deliberately small so the server
// and fetcher session state machines can be unit tested against an
// in-memory duplex stream.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Sentinel host key under which the wildcard-only projection is stored.
pub const WILDCARD_HOST: &str = "*";

/// Single NUL byte the client writes after every push or heartbeat.
pub const ACK: u8 = 0x00;

/// Frame-level protocol violations. Distinct from transport I/O errors
/// (`std::io::Error`) so callers can tell "the peer is lying about the
/// protocol" from "the socket died."
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("hostname length {0} exceeds 255 bytes")]
    HostnameTooLong(usize),
    #[error("hostname is not valid UTF-8")]
    HostnameNotUtf8(#[source] std::string::FromUtf8Error),
    #[error("payload of {0} bytes exceeds the 24-bit length limit")]
    PayloadTooLarge(usize),
    #[error("peer sent ack byte 0x{0:02x}, expected 0x00")]
    BadAck(u8),
    #[error("unsupported protocol version byte {0}, expected 0")]
    BadVersion(u8),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed keyset JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A keyset as delivered on the wire: username -> set of key lines.
///
/// `BTreeMap`/`BTreeSet` rather than `HashMap`/`Vec` so that serializing
/// the same logical content always produces byte-identical JSON — this is
/// what makes the fetcher's simple byte-equality dedup (see
/// `FetcherSession`) safe without a secondary structural comparison.
pub type Keyset = BTreeMap<String, BTreeSet<String>>;

/// Render a keyset to its canonical wire representation.
pub fn render_keyset(keyset: &Keyset) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(keyset)?)
}

/// Parse a wire payload back into a keyset.
pub fn parse_keyset(payload: &[u8]) -> Result<Keyset, ProtocolError> {
    Ok(serde_json::from_slice(payload)?)
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// TLS connections carry one extra version byte before the hostname length,
/// so TLS can introduce versioning without breaking plaintext clients
/// mid-migration. The only valid value today is 0.
pub async fn write_protocol_version<W: AsyncWrite + Unpin>(w: &mut W) -> Result<(), ProtocolError> {
    w.write_u8(0).await?;
    Ok(())
}

pub async fn read_protocol_version<R: AsyncRead + Unpin>(r: &mut R) -> Result<(), ProtocolError> {
    let version = r.read_u8().await?;
    if version != 0 {
        return Err(ProtocolError::BadVersion(version));
    }
    Ok(())
}

/// `u8` length prefix then that many UTF-8 bytes. `None` is written/read as
/// a zero-length hostname, which the server interprets as "serve the
/// wildcard blob."
pub async fn write_hostname<W: AsyncWrite + Unpin>(
    w: &mut W,
    hostname: Option<&str>,
) -> Result<(), ProtocolError> {
    let bytes = hostname.unwrap_or("").as_bytes();
    if bytes.len() > 255 {
        return Err(ProtocolError::HostnameTooLong(bytes.len()));
    }
    w.write_u8(bytes.len() as u8).await?;
    w.write_all(bytes).await?;
    Ok(())
}

pub async fn read_hostname<R: AsyncRead + Unpin>(
    r: &mut R,
) -> Result<Option<String>, ProtocolError> {
    let len = r.read_u8().await? as usize;
    if len == 0 {
        return Ok(None);
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await?;
    let hostname = String::from_utf8(buf).map_err(ProtocolError::HostnameNotUtf8)?;
    Ok(Some(hostname))
}

/// `u16` seconds, sent once by the server immediately after the hostname
/// handshake completes.
pub async fn write_heartbeat_interval<W: AsyncWrite + Unpin>(
    w: &mut W,
    secs: u16,
) -> Result<(), ProtocolError> {
    w.write_u16(secs).await?;
    Ok(())
}

pub async fn read_heartbeat_interval<R: AsyncRead + Unpin>(
    r: &mut R,
) -> Result<u16, ProtocolError> {
    Ok(r.read_u16().await?)
}

// ---------------------------------------------------------------------------
// Push frames
// ---------------------------------------------------------------------------

/// Largest payload length representable in the 24-bit length prefix.
pub const MAX_PAYLOAD_LEN: usize = (1 << 24) - 1;

/// `u24` (big-endian, hand-assembled -- tokio has no native 24-bit integer
/// read/write) payload length, followed by that many bytes. `None` writes
/// a zero-length frame: a heartbeat ping with no body.
pub async fn write_payload<W: AsyncWrite + Unpin>(
    w: &mut W,
    payload: Option<&[u8]>,
) -> Result<(), ProtocolError> {
    let bytes = payload.unwrap_or(&[]);
    if bytes.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge(bytes.len()));
    }
    let len = bytes.len() as u32;
    w.write_all(&len.to_be_bytes()[1..]).await?;
    if !bytes.is_empty() {
        w.write_all(bytes).await?;
    }
    Ok(())
}

/// Reads a push frame. `Ok(None)` is a heartbeat ping; `Ok(Some(bytes))` is
/// a payload of `bytes.len()` (always `> 0`).
pub async fn read_payload<R: AsyncRead + Unpin>(
    r: &mut R,
) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut len_buf = [0u8; 3];
    r.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes([0, len_buf[0], len_buf[1], len_buf[2]]) as usize;
    if len == 0 {
        return Ok(None);
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

// ---------------------------------------------------------------------------
// Ack
// ---------------------------------------------------------------------------

pub async fn write_ack<W: AsyncWrite + Unpin>(w: &mut W) -> Result<(), ProtocolError> {
    w.write_u8(ACK).await?;
    Ok(())
}

/// Reads one ack byte; any value other than `0x00` is a fatal protocol
/// error -- the server's only backpressure mechanism: a slow or
/// misbehaving client can never cause multiple generations to queue up
/// server-side.
pub async fn read_ack<R: AsyncRead + Unpin>(r: &mut R) -> Result<(), ProtocolError> {
    let byte = r.read_u8().await?;
    if byte != ACK {
        return Err(ProtocolError::BadAck(byte));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Admin DB wire shape (JSON file, not sent over the socket, but shared
// between keyserver and keyadmin so both agree on the schema).
// ---------------------------------------------------------------------------

/// One domain attached to a key: `user@host`, where `host == "*"` means
/// "every host."
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Host {
    Named(String),
    Wildcard,
}

impl Host {
    pub fn as_str(&self) -> &str {
        match self {
            Host::Named(h) => h,
            Host::Wildcard => WILDCARD_HOST,
        }
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `user@host` domain string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Domain {
    pub user: String,
    pub host: Host,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("domain '{0}' is not of the form user@host")]
pub struct DomainParseError(pub String);

impl std::str::FromStr for Domain {
    type Err = DomainParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user, host) = s
            .split_once('@')
            .ok_or_else(|| DomainParseError(s.to_owned()))?;
        if user.is_empty() || host.is_empty() {
            return Err(DomainParseError(s.to_owned()));
        }
        let host = if host == WILDCARD_HOST {
            Host::Wildcard
        } else {
            Host::Named(host.to_owned())
        };
        Ok(Domain {
            user: user.to_owned(),
            host,
        })
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.user, self.host)
    }
}

/// One key record in the admin database, as stored in the JSON DB file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub data: String,
    pub domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// The administrator database: name -> key record.
///
/// `BTreeMap` for deterministic iteration, matching `Keyset`'s rationale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminDb {
    #[serde(default)]
    pub keys: BTreeMap<String, KeyRecord>,
}
