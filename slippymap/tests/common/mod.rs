//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use slippymap::provider::{FetchError, FetchRequest, Fetcher};

/// Fetcher returning fixed bytes after an optional delay.
pub struct StubFetcher {
    bytes: Bytes,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new(bytes: &'static [u8]) -> Self {
        Self {
            bytes: Bytes::from_static(bytes),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for StubFetcher {
    fn fetch<'a>(&'a self, _request: &'a FetchRequest) -> BoxFuture<'a, Result<Bytes, FetchError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.bytes.clone())
        }
        .boxed()
    }
}
