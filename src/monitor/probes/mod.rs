//! Network probes the check pipeline consumes. Each is a trait so the
//! pipeline can be driven without touching the network.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use thiserror::Error;

pub mod http;
pub mod tls;
pub mod whois;

pub use http::ReqwestHttpProbe;
pub use tls::RustlsExpiryProbe;
pub use whois::WhoisExpiryProbe;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("URL has no usable host: {0}")]
    MissingHost(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("Certificate error: {0}")]
    Certificate(String),
    #[error("WHOIS error: {0}")]
    Whois(String),
}

/// Issues a GET and reports the status code, or `NETWORK_FAILURE` when no
/// response arrived.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    async fn probe(&self, url: &str) -> i32;
}

/// Reports when the website's TLS certificate expires. `Ok(None)` means the
/// website serves no certificate.
#[async_trait]
pub trait TlsExpiryProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<Option<DateTime<Utc>>, ProbeError>;
}

/// Reports when the website's domain registration expires.
#[async_trait]
pub trait DomainExpiryProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<DateTime<Utc>, ProbeError>;
}

pub(crate) fn parse_url(url: &str) -> Result<Url, ProbeError> {
    Url::parse(url).map_err(|e| ProbeError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// The URL's host without IPv6 brackets.
pub(crate) fn host_of(url: &Url) -> Result<String, ProbeError> {
    url.host_str()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
        .filter(|host| !host.is_empty())
        .ok_or_else(|| ProbeError::MissingHost(url.to_string()))
}
