use std::net::SocketAddr;

/// Errors that end a single connection's session. Distinct from a server
/// startup failure (`main` exits on those directly) -- a `SessionError`
/// only ever tears down the one session that produced it.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("protocol violation from {peer}: {source}")]
    Protocol {
        peer: SocketAddr,
        #[source]
        source: keys_protocol::ProtocolError,
    },
    #[error("i/o error with {peer}: {source}")]
    Io {
        peer: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("handshake with {peer} did not complete within the timeout")]
    HandshakeTimeout { peer: SocketAddr },
    #[error("ack from {peer} did not arrive within the timeout")]
    AckTimeout { peer: SocketAddr },
}

/// Fatal configuration / startup errors. These end the process, not a
/// single session -- matching spec.md §6's "non-zero on unrecoverable
/// configuration error."
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to read config file {path}: {source}")]
    ReadConfig {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    ParseConfig {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load TLS cert/key: {0}")]
    Tls(String),
    #[error(transparent)]
    Core(#[from] keys_core::CoreError),
}
