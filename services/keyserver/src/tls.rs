//! TLS acceptor setup for the `ssl.endpoint` listener (spec.md §4.5, §6).
//!
//! Cert/key are loaded once at startup from the paths in `SslConfig` -- no
//! live rotation, matching the Non-goal on certificate provisioning. Uses
//! `tokio-rustls` + `rustls-pemfile`, the same stack already present in the
//! teacher's `services/receiver` and `services/forwarder` dependencies.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig as RustlsServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::error::ServerError;

/// Builds a `TlsAcceptor` from a PEM certificate chain and private key on
/// disk. Modern cipher defaults come from `rustls`'s own `ServerConfig`
/// default provider -- no manual cipher suite selection, per spec.md §6
/// "TLS 1.2+ with modern cipher defaults."
pub fn build_acceptor(cert_path: &str, key_path: &str) -> Result<TlsAcceptor, ServerError> {
    let certs = load_certs(Path::new(cert_path))?;
    let key = load_private_key(Path::new(key_path))?;

    let config = RustlsServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| ServerError::Tls(err.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let file = File::open(path).map_err(|err| ServerError::Tls(format!("opening cert {}: {err}", path.display())))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ServerError::Tls(format!("parsing cert {}: {err}", path.display())))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let file = File::open(path).map_err(|err| ServerError::Tls(format!("opening key {}: {err}", path.display())))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|err| ServerError::Tls(format!("parsing key {}: {err}", path.display())))?
        .ok_or_else(|| ServerError::Tls(format!("no private key found in {}", path.display())))
}
