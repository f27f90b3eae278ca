use keys_protocol::ProtocolError;

/// Errors from a single fetcher session (connect through close). The
/// supervisor (`supervisor::run`) treats every variant here as transient:
/// log and retry after 1s, per spec.md §4.7/§7.
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    #[error("connection refused by {addr}")]
    ConnectionRefused { addr: String },
    #[error("dns resolution failed for {host}: {source}")]
    Dns {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("handshake did not complete within the timeout")]
    HandshakeTimeout,
    #[error("read timed out waiting for the next frame")]
    ReadTimeout,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("tls error: {0}")]
    Tls(String),
}
