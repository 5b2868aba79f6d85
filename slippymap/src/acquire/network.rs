//! Network fragment source.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::coalesce::{CoalescerStats, Registration, RequestCoalescer};
use crate::cache::{FragmentSource, LoadMode};
use crate::fragment::{Fragment, FragmentKey, LoadError, LoadOptions};
use crate::provider::{Fetcher, Provider, RequestBuilder};

/// How concurrent misses on one key are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// At most one in-flight fetch per key; other callers share its result.
    #[default]
    Coalesce,
    /// Every miss fetches on its own. The last insert wins.
    Independent,
}

impl FetchPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "coalesce" => Some(Self::Coalesce),
            "independent" => Some(Self::Independent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coalesce => "coalesce",
            Self::Independent => "independent",
        }
    }
}

/// Builds fragments by fetching them from a provider.
pub struct NetworkSource {
    builder: Arc<dyn RequestBuilder>,
    fetcher: Arc<dyn Fetcher>,
    max_latency: Option<Duration>,
    policy: FetchPolicy,
    coalescer: RequestCoalescer,
}

impl NetworkSource {
    pub fn new(builder: Arc<dyn RequestBuilder>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            builder,
            fetcher,
            max_latency: None,
            policy: FetchPolicy::default(),
            coalescer: RequestCoalescer::new(),
        }
    }

    /// Source for a provider's request builder.
    pub fn for_provider(provider: &Provider, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::new(provider.request_builder(), fetcher)
    }

    pub fn with_max_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency = Some(max_latency);
        self
    }

    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> FetchPolicy {
        self.policy
    }

    pub fn coalescer_stats(&self) -> CoalescerStats {
        self.coalescer.stats()
    }

    /// Loads an existing fragment's image, e.g. one returned deferred.
    pub async fn load(
        &self,
        fragment: &Fragment,
        cancel: &CancellationToken,
    ) -> Result<Bytes, LoadError> {
        let mut options = LoadOptions::default().with_cancel(cancel.clone());
        options.max_latency = self.max_latency;
        fragment
            .load_image(self.builder.as_ref(), self.fetcher.as_ref(), &options)
            .await
    }

    async fn fetch_new(&self, key: &FragmentKey, cancel: &CancellationToken) -> Option<Arc<Fragment>> {
        let fragment = Arc::new(Fragment::new(key.clone()));
        self.load(&fragment, cancel).await.ok()?;
        Some(fragment)
    }

    async fn fetch_coalesced(
        &self,
        key: &FragmentKey,
        cancel: &CancellationToken,
    ) -> Option<Arc<Fragment>> {
        match self.coalescer.register(&key.cache_key()) {
            Registration::Leader(flight) => {
                let result = self.fetch_new(key, cancel).await;
                flight.complete(result.clone());
                result
            }
            Registration::Waiter(mut rx) => {
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    received = rx.recv() => match received {
                        Ok(result) => result,
                        Err(_) => {
                            debug!(key = %key, "In-flight fetch ended without a result");
                            None
                        }
                    },
                }
            }
        }
    }
}

impl FragmentSource for NetworkSource {
    fn fetch_fragment<'a>(
        &'a self,
        key: &'a FragmentKey,
        mode: LoadMode,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Option<Arc<Fragment>>> {
        async move {
            match (mode, self.policy) {
                (LoadMode::Deferred, _) => Some(Arc::new(Fragment::new(key.clone()))),
                (LoadMode::Immediate, FetchPolicy::Independent) => self.fetch_new(key, cancel).await,
                (LoadMode::Immediate, FetchPolicy::Coalesce) => {
                    self.fetch_coalesced(key, cancel).await
                }
            }
        }
        .boxed()
    }
}
