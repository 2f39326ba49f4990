use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{HttpProbe, ProbeError};
use crate::monitor::transition::NETWORK_FAILURE;

/// `HttpProbe` over a shared reqwest client with a fixed request timeout.
pub struct ReqwestHttpProbe {
    client: Client,
}

impl ReqwestHttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("webmonitor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProbe for ReqwestHttpProbe {
    async fn probe(&self, url: &str) -> i32 {
        match self.client.get(url).send().await {
            Ok(response) => i32::from(response.status().as_u16()),
            Err(e) => {
                // Timeouts, refused connections and DNS failures all collapse into one value.
                let kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connect"
                } else {
                    "request"
                };
                debug!(url = %url, kind, error = %e, "HTTP probe got no response.");
                NETWORK_FAILURE
            }
        }
    }
}
