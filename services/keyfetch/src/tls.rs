//! TLS connector for the fetcher's client side of the wire protocol
//! (spec.md §4.5, §6). Trusts the public web PKI root set via
//! `webpki-roots` -- the same root source the teacher's
//! `services/forwarder` pulls in transitively through
//! `tokio-tungstenite`'s `rustls-tls-webpki-roots` feature, made a direct
//! dependency here since this crate builds its `rustls::ClientConfig` by
//! hand rather than through a websocket client.

use std::sync::Arc;

use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

/// Builds a `TlsConnector` trusting the Mozilla-curated web root set.
/// No client certificates -- the fetcher authenticates the server only.
pub fn build_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}
