//! The TLS layer of driver connections.
//!
//! TLS is exposed as a plain on/off flag with default configuration, so
//! this module keeps a single rustls-backed context with the webpki root
//! store and no client certificates. Custom CAs and cert pinning are out
//! of scope.

use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// A TLS error raised while preparing or performing the handshake.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TlsError {
    /// The host part of the address is not a valid TLS server name.
    #[error(transparent)]
    InvalidName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// The handshake itself failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(Arc<std::io::Error>),
}

/// Shared TLS configuration applied to every connection of a pool.
#[derive(Clone)]
pub(crate) struct TlsContext {
    config: Arc<rustls::ClientConfig>,
}

impl TlsContext {
    /// Builds the default context: webpki roots, no client auth.
    pub(crate) fn with_default_roots() -> Self {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        TlsContext {
            config: Arc::new(config),
        }
    }

    /// Wraps an established TCP stream in a TLS session against `host`.
    pub(crate) async fn wrap(
        &self,
        host: &str,
        stream: TcpStream,
    ) -> Result<TlsStream<TcpStream>, TlsError> {
        let server_name = ServerName::try_from(host.to_string())?;
        let connector = TlsConnector::from(Arc::clone(&self.config));
        connector
            .connect(server_name, stream)
            .await
            .map_err(|err| TlsError::Handshake(Arc::new(err)))
    }
}

/// Extracts the TLS server name from a `host:port` address.
///
/// Bare addresses without a port are used whole.
pub(crate) fn server_name_of(address: &str) -> &str {
    match address.rsplit_once(':') {
        Some((host, _port)) => host,
        None => address,
    }
}
