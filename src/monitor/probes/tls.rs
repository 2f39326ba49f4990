use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};
use x509_parser::prelude::{FromDer, X509Certificate};

use super::{host_of, parse_url, ProbeError, TlsExpiryProbe};

/// Reads the `notAfter` of the leaf certificate an https website presents.
pub struct RustlsExpiryProbe {
    connector: TlsConnector,
    timeout: Duration,
}

impl RustlsExpiryProbe {
    /// Builds a probe trusting the platform's native root certificates.
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let native = rustls_native_certs::load_native_certs();
        for e in &native.errors {
            warn!(error = %e, "Failed to load a native root certificate.");
        }
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        debug!(added, ignored, "Loaded native root certificates.");
        Self::with_roots(roots, timeout)
    }

    pub fn with_roots(roots: RootCertStore, timeout: Duration) -> Result<Self, ProbeError> {
        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            timeout,
        })
    }
}

#[async_trait]
impl TlsExpiryProbe for RustlsExpiryProbe {
    async fn probe(&self, url: &str) -> Result<Option<DateTime<Utc>>, ProbeError> {
        let url = parse_url(url)?;
        if url.scheme() != "https" {
            return Ok(None);
        }
        let host = host_of(&url)?;
        let port = url.port_or_known_default().unwrap_or(443);
        let server_name =
            ServerName::try_from(host.clone()).map_err(|e| ProbeError::Tls(e.to_string()))?;

        let stream = timeout(self.timeout, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;
        let tls_stream = timeout(self.timeout, self.connector.connect(server_name, stream))
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;

        let (_, connection) = tls_stream.get_ref();
        match connection.peer_certificates().and_then(|chain| chain.first()) {
            Some(leaf) => certificate_not_after(leaf.as_ref()).map(Some),
            None => Ok(None),
        }
    }
}

/// Extracts the expiry instant from a DER-encoded X.509 certificate.
pub fn certificate_not_after(der: &[u8]) -> Result<DateTime<Utc>, ProbeError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| ProbeError::Certificate(format!("Failed to parse certificate: {e}")))?;
    let timestamp = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(timestamp, 0).ok_or_else(|| {
        ProbeError::Certificate(format!("notAfter out of range: {timestamp}"))
    })
}
