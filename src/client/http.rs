use futures::TryStreamExt;
use reqwest::Client;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::info;

use crate::config::ClientConfig;
use crate::error::{Result, StreamError};
use crate::transport::{Transport, TransportFuture, TransportStream};

/// `Transport` over plain HTTP(S) with reqwest
pub struct HttpTransport {
    client: Client,
    headers: Vec<(String, String)>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        // The body is open-ended, so only connecting and silence between reads
        // are bounded, never the whole response.
        let timeout = std::time::Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| {
                StreamError::InternalError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            headers: config
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }
}

impl Transport for HttpTransport {
    fn connect(&self, url: &str) -> TransportFuture {
        let url = url.to_string();
        let client = self.client.clone();
        let headers = self.headers.clone();

        Box::pin(async move { Self::connect_impl(url, client, headers).await })
    }

    fn name(&self) -> &str {
        "HTTP"
    }
}

impl HttpTransport {
    async fn connect_impl(
        url: String,
        client: Client,
        headers: Vec<(String, String)>,
    ) -> Result<TransportStream> {
        info!("HTTP: Connecting to: {}", url.split('?').next().unwrap_or(&url));

        let mut request = client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StreamError::TransportError(format!("Request failed: {}", e)))?;

        let status = response.status();
        info!("HTTP: Responded with status: {}", status);

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StreamError::UpstreamError(format!(
                "HTTP {}: {}",
                status, error_body
            )));
        }

        Ok(Box::pin(response.bytes_stream().map_err(|e| {
            StreamError::TransportError(format!("Connection error: {}", e))
        })))
    }
}
