//! Imagery providers.
//!
//! A provider pairs a [`Projection`] with two collaborators:
//!
//! - a [`RequestBuilder`] turning a fragment into a [`FetchRequest`]
//! - an [`Authenticator`] that fetches metadata/validates credentials and
//!   applies provider bounds to the projection
//!
//! Bytes are retrieved through a [`Fetcher`]; [`HttpFetcher`] is the reqwest
//! implementation and tests substitute mocks.
//!
//! Providers are created by name through the explicit [`ProviderRegistry`].

mod bing;
mod google;
mod http;
mod registry;
mod xyz;

pub use bing::{BingImagery, BingProvider, BING_METADATA_URL};
pub use google::{sign_url, GoogleStaticProvider, GOOGLE_STATIC_MAX_SIZE};
pub use http::HttpFetcher;
pub use registry::{ProviderCredentials, ProviderFactory, ProviderRegistry};
pub use xyz::{XyzProvider, XyzTemplate};

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::fragment::Fragment;
use crate::projection::Projection;

/// User agent sent with every tile request.
pub const USER_AGENT: &str = concat!("slippymap/", env!("CARGO_PKG_VERSION"));

/// Descriptor for one network fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Errors from a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Failed to read response: {0}")]
    Body(String),
}

/// Produces provider-specific fetch descriptors.
pub trait RequestBuilder: Send + Sync {
    /// Returns `None` when the fragment cannot be requested from this
    /// provider (wrong address kind, not authenticated).
    fn create_request(&self, fragment: &Fragment) -> Option<FetchRequest>;
}

/// Retrieves bytes for a descriptor.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<Bytes, FetchError>>;
}

/// Validates credentials and applies provider bounds to a projection.
pub trait Authenticator: Send + Sync {
    /// Returns `true` and initializes the projection on success.
    fn authenticate<'a>(
        &'a self,
        projection: &'a Projection,
        fetcher: &'a dyn Fetcher,
    ) -> BoxFuture<'a, bool>;
}

/// Errors creating a provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("Provider '{provider}' requires {credential}")]
    MissingCredential {
        provider: &'static str,
        credential: &'static str,
    },

    #[error("Invalid credential for '{provider}': {reason}")]
    InvalidCredential {
        provider: &'static str,
        reason: String,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// A ready-to-authenticate provider.
#[derive(Clone)]
pub struct Provider {
    projection: Arc<Projection>,
    requests: Arc<dyn RequestBuilder>,
    authenticator: Arc<dyn Authenticator>,
}

impl Provider {
    pub fn new(
        projection: Arc<Projection>,
        requests: Arc<dyn RequestBuilder>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            projection,
            requests,
            authenticator,
        }
    }

    /// Builds a provider from one value implementing both roles.
    pub fn from_parts<P>(name: &str, parts: P) -> Self
    where
        P: RequestBuilder + Authenticator + 'static,
    {
        let parts = Arc::new(parts);
        Self::new(
            Arc::new(Projection::new(name)),
            parts.clone(),
            parts,
        )
    }

    pub fn name(&self) -> &str {
        self.projection.name()
    }

    pub fn projection(&self) -> &Arc<Projection> {
        &self.projection
    }

    pub fn request_builder(&self) -> Arc<dyn RequestBuilder> {
        Arc::clone(&self.requests)
    }

    /// Authenticates and, on success, initializes the projection.
    pub async fn authenticate(&self, fetcher: &dyn Fetcher) -> bool {
        self.authenticator
            .authenticate(&self.projection, fetcher)
            .await
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("projection", &self.projection)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures::FutureExt;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock fetcher returning a fixed response and counting calls.
    pub struct MockFetcher {
        response: Result<Bytes, FetchError>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        urls: Mutex<Vec<String>>,
    }

    impl MockFetcher {
        pub fn ok(bytes: Vec<u8>) -> Self {
            Self::with_response(Ok(Bytes::from(bytes)))
        }

        pub fn status(status: u16) -> Self {
            Self::with_response(Err(FetchError::Status {
                status,
                url: "mock".to_string(),
            }))
        }

        pub fn with_response(response: Result<Bytes, FetchError>) -> Self {
            Self {
                response,
                delay: None,
                calls: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn urls(&self) -> Vec<String> {
            self.urls.lock().clone()
        }
    }

    impl Fetcher for MockFetcher {
        fn fetch<'a>(
            &'a self,
            request: &'a FetchRequest,
        ) -> BoxFuture<'a, Result<Bytes, FetchError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().push(request.url.clone());
            async move {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                self.response.clone()
            }
            .boxed()
        }
    }

    /// Builds XYZ-style URLs for tiles and refuses static fragments.
    pub struct TemplateBuilder;

    impl RequestBuilder for TemplateBuilder {
        fn create_request(&self, fragment: &Fragment) -> Option<FetchRequest> {
            let tile = fragment.key().tile_coord()?;
            Some(FetchRequest::get(format!(
                "https://tiles.test/{}/{}/{}.png",
                tile.scale, tile.x, tile.y
            )))
        }
    }

    #[tokio::test]
    async fn test_mock_fetcher_success() {
        let mock = MockFetcher::ok(vec![1, 2, 3, 4]);
        let result = mock.fetch(&FetchRequest::get("http://example.com")).await;
        assert_eq!(result.unwrap().as_ref(), &[1, 2, 3, 4]);
        assert_eq!(mock.urls(), vec!["http://example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_fetcher_error() {
        let mock = MockFetcher::status(503);
        let result = mock.fetch(&FetchRequest::get("http://example.com")).await;
        assert!(matches!(result, Err(FetchError::Status { status: 503, .. })));
    }

    #[test]
    fn test_fetch_request_headers() {
        let request = FetchRequest::get("https://a").with_header("User-Agent", USER_AGENT);
        assert_eq!(request.headers.len(), 1);
        assert!(request.headers[0].1.starts_with("slippymap/"));
    }
}
