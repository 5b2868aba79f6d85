//! HTTP fetcher backed by reqwest.

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use super::{FetchError, FetchRequest, Fetcher, ProviderError, USER_AGENT};

/// Default whole-request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// [`Fetcher`] implementation using a pooled async reqwest client.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with default configuration.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a fetcher with a custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                ProviderError::HttpClient(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<Bytes, FetchError>> {
        async move {
            let mut builder = self.client.get(&request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }

            let response = builder
                .send()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url: request.url.clone(),
                });
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| FetchError::Body(e.to_string()))?;

            debug!(url = %request.url, bytes = bytes.len(), "Fetched");
            Ok(bytes)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds() {
        assert!(HttpFetcher::new().is_ok());
        assert!(HttpFetcher::with_timeout(5).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let fetcher = HttpFetcher::with_timeout(2).unwrap();
        let request = FetchRequest::get("http://127.0.0.1:9/tile.png");
        let result = fetcher.fetch(&request).await;
        assert!(matches!(result, Err(FetchError::Transport(_))));
    }
}
