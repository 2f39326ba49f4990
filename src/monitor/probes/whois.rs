use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::{host_of, parse_url, DomainExpiryProbe, ProbeError};

const IANA_WHOIS_SERVER: &str = "whois.iana.org";
const WHOIS_PORT: u16 = 43;
/// Upper bound on one WHOIS response; registry answers are a few KiB.
const MAX_RESPONSE_BYTES: u64 = 64 * 1024;

/// Response keys, lowercased, that carry a registration expiry date.
const EXPIRY_KEYS: &[&str] = &[
    "registry expiry date",
    "registrar registration expiration date",
    "expiration date",
    "expiry date",
    "expire date",
    "paid-till",
    "expires",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y.%m.%d %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%d.%m.%Y", "%d-%b-%Y"];

/// Looks up domain expiry over WHOIS: the bootstrap server names the
/// registry's WHOIS server for the TLD, which is then asked about the domain.
pub struct WhoisExpiryProbe {
    bootstrap_server: String,
    port: u16,
    timeout: Duration,
}

impl WhoisExpiryProbe {
    pub fn new(timeout: Duration) -> Self {
        Self::with_bootstrap(IANA_WHOIS_SERVER, WHOIS_PORT, timeout)
    }

    pub fn with_bootstrap(server: &str, port: u16, timeout: Duration) -> Self {
        Self {
            bootstrap_server: server.to_string(),
            port,
            timeout,
        }
    }

    async fn query(&self, server: &str, query: &str) -> Result<String, ProbeError> {
        let exchange = async {
            let mut stream = TcpStream::connect((server, self.port)).await?;
            stream.write_all(format!("{query}\r\n").as_bytes()).await?;
            let mut response = Vec::new();
            (&mut stream)
                .take(MAX_RESPONSE_BYTES)
                .read_to_end(&mut response)
                .await?;
            Ok::<_, std::io::Error>(String::from_utf8_lossy(&response).into_owned())
        };
        let response = timeout(self.timeout, exchange)
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;
        debug!(server, query, bytes = response.len(), "WHOIS query answered.");
        Ok(response)
    }
}

#[async_trait]
impl DomainExpiryProbe for WhoisExpiryProbe {
    async fn probe(&self, url: &str) -> Result<DateTime<Utc>, ProbeError> {
        let domain = registrable_domain(url)?;
        let tld = domain.rsplit('.').next().unwrap_or(domain.as_str());

        let referral = self.query(&self.bootstrap_server, tld).await?;
        let server = referral_server(&referral).unwrap_or_else(|| self.bootstrap_server.clone());

        let response = self.query(&server, &domain).await?;
        parse_expiry(&response)
            .ok_or_else(|| ProbeError::Whois(format!("no expiry date for {domain} from {server}")))
    }
}

/// Reduces a URL's host to the domain that is registered: the last two labels.
pub fn registrable_domain(url: &str) -> Result<String, ProbeError> {
    let parsed = parse_url(url)?;
    let host = host_of(&parsed)?.to_ascii_lowercase();
    if host.parse::<std::net::IpAddr>().is_ok() {
        return Err(ProbeError::Whois(format!("{host} is an IP address, not a domain")));
    }

    let labels: Vec<&str> = host
        .trim_end_matches('.')
        .split('.')
        .filter(|label| !label.is_empty())
        .collect();
    if labels.len() < 2 {
        return Err(ProbeError::Whois(format!("{host} has no registrable domain")));
    }
    Ok(labels[labels.len() - 2..].join("."))
}

fn referral_server(response: &str) -> Option<String> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        ((key == "refer" || key == "whois") && !value.is_empty()).then(|| value.to_string())
    })
}

/// Returns the first expiry date found in a WHOIS response.
pub fn parse_expiry(response: &str) -> Option<DateTime<Utc>> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let key = key.trim().to_ascii_lowercase();
        if EXPIRY_KEYS.contains(&key.as_str()) {
            parse_whois_date(value.trim())
        } else {
            None
        }
    })
}

fn parse_whois_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    // Some registries append a zone name or comment after the date.
    let first_token = value.split_whitespace().next()?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(first_token) {
        return Some(parsed.with_timezone(&Utc));
    }
    DATE_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(first_token, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio::net::TcpListener;

    #[test]
    fn test_registrable_domain() {
        assert_eq!(registrable_domain("https://www.example.com/path").unwrap(), "example.com");
        assert_eq!(registrable_domain("http://api.eu.Example.org:8080").unwrap(), "example.org");
        assert_eq!(registrable_domain("https://example.net").unwrap(), "example.net");
        assert!(registrable_domain("http://127.0.0.1/").is_err());
        assert!(registrable_domain("http://localhost/").is_err());
    }

    #[test]
    fn test_parse_expiry_formats() {
        let expected = Utc.with_ymd_and_hms(2031, 8, 13, 4, 0, 0).unwrap();
        assert_eq!(parse_expiry("Registry Expiry Date: 2031-08-13T04:00:00Z"), Some(expected));
        assert_eq!(
            parse_expiry("Registrar Registration Expiration Date: 2031-08-13T04:00:00.000Z"),
            Some(expected)
        );
        assert_eq!(parse_expiry("Expiration Date: 2031-08-13 04:00:00"), Some(expected));
        assert_eq!(
            parse_expiry("paid-till:     2031-08-13"),
            Some(Utc.with_ymd_and_hms(2031, 8, 13, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_expiry("expires: 2031-08-13 (UTC)"),
            Some(Utc.with_ymd_and_hms(2031, 8, 13, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_expiry_takes_first_date() {
        let response = "Domain Name: EXAMPLE.COM\n\
                        Registry Expiry Date: 2030-01-01T00:00:00Z\n\
                        Registrar Registration Expiration Date: 2032-01-01T00:00:00Z\n";
        assert_eq!(
            parse_expiry(response),
            Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_expiry_missing() {
        assert_eq!(parse_expiry("Domain Name: EXAMPLE.COM\nStatus: ok\n"), None);
        assert_eq!(parse_expiry("Expiration Date: soon"), None);
    }

    #[test]
    fn test_referral_server() {
        let response = "% IANA WHOIS server\n\ndomain:       COM\nrefer:        whois.verisign-grs.com\n";
        assert_eq!(referral_server(response).as_deref(), Some("whois.verisign-grs.com"));
        assert_eq!(referral_server("domain: XYZ\n"), None);
    }

    /// Serves `count` WHOIS queries: TLD queries get a referral back to this
    /// server, domain queries get `domain_response`.
    async fn fake_whois(count: usize, domain_response: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            for _ in 0..count {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 256];
                let n = socket.read(&mut buf).await.unwrap();
                let query = String::from_utf8_lossy(&buf[..n]).trim().to_string();
                let reply = if query.contains('.') {
                    domain_response.to_string()
                } else {
                    "refer: 127.0.0.1\n".to_string()
                };
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });
        port
    }

    #[tokio::test]
    async fn test_probe_follows_referral() {
        let port = fake_whois(2, "Registry Expiry Date: 2031-08-13T04:00:00Z\n").await;
        let probe = WhoisExpiryProbe::with_bootstrap("127.0.0.1", port, Duration::from_secs(5));
        assert_eq!(
            probe.probe("https://www.example.com/").await.unwrap(),
            Utc.with_ymd_and_hms(2031, 8, 13, 4, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_probe_without_expiry_is_error() {
        let port = fake_whois(2, "No match for domain.\n").await;
        let probe = WhoisExpiryProbe::with_bootstrap("127.0.0.1", port, Duration::from_secs(5));
        assert!(matches!(
            probe.probe("https://example.com/").await,
            Err(ProbeError::Whois(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_response_is_truncated() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = socket.read(&mut buf).await;
            let filler = "% padding line\n".repeat(8 * 1024);
            let _ = socket.write_all(filler.as_bytes()).await;
            let _ = socket
                .write_all(b"Registry Expiry Date: 2031-08-13T04:00:00Z\n")
                .await;
        });

        let probe = WhoisExpiryProbe::with_bootstrap("127.0.0.1", port, Duration::from_secs(5));
        let response = probe.query("127.0.0.1", "example.com").await.unwrap();
        assert_eq!(response.len() as u64, MAX_RESPONSE_BYTES);
        assert_eq!(parse_expiry(&response), None);
    }

    #[tokio::test]
    async fn test_probe_unreachable_server_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let probe = WhoisExpiryProbe::with_bootstrap("127.0.0.1", port, Duration::from_secs(5));
        assert!(probe.probe("https://example.com/").await.is_err());
    }
}
