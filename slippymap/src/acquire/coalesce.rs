//! Request coalescing for network fetches.
//!
//! When several callers miss the cache for the same key at once, only the
//! first one fetches. Everyone else subscribes to its result:
//!
//! ```text
//! miss A ─┐
//!         │
//! miss B ─┼──► RequestCoalescer ──► one fetch
//!         │         │                   │
//! miss C ─┘         ▼                   │
//!            [A, B, C receive ◄─────────┘
//!             the same fragment]
//! ```
//!
//! The leader holds a [`Flight`] guard. Dropping it without completing
//! (cancellation, panic) closes the channel, so waiters see a failed fetch
//! instead of hanging.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::fragment::Fragment;

type FlightResult = Option<Arc<Fragment>>;

/// Tracks in-flight fetches by cache key.
#[derive(Default)]
pub struct RequestCoalescer {
    in_flight: Mutex<HashMap<String, broadcast::Sender<FlightResult>>>,
    total_requests: AtomicU64,
    coalesced_requests: AtomicU64,
}

/// Statistics for monitoring coalescing effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    pub total_requests: u64,
    /// Requests that waited on an existing fetch.
    pub coalesced_requests: u64,
    pub in_flight: usize,
}

impl CoalescerStats {
    /// Share of requests that were coalesced, 0.0 to 1.0.
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.coalesced_requests as f64 / self.total_requests as f64
        }
    }
}

pub(crate) enum Registration<'a> {
    /// First request for the key; the caller fetches and completes the flight.
    Leader(Flight<'a>),
    /// A fetch is already running; wait on the receiver.
    Waiter(broadcast::Receiver<FlightResult>),
}

/// Leader's handle on an in-flight fetch.
pub(crate) struct Flight<'a> {
    coalescer: &'a RequestCoalescer,
    key: String,
    /// Cleared once the entry is removed; a later leader may own the key.
    armed: bool,
}

impl Flight<'_> {
    /// Broadcasts the result to every waiter and ends the flight.
    pub(crate) fn complete(mut self, result: FlightResult) {
        let sender = self.coalescer.in_flight.lock().remove(&self.key);
        self.armed = false;
        if let Some(tx) = sender {
            let waiters = tx.receiver_count();
            let _ = tx.send(result);
            if waiters > 0 {
                debug!(key = %self.key, waiters, "Broadcast fetch result to coalesced waiters");
            }
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.coalescer.in_flight.lock().remove(&self.key);
        }
    }
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, key: &str) -> Registration<'_> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let mut in_flight = self.in_flight.lock();

        if let Some(tx) = in_flight.get(key) {
            let coalesced = self.coalesced_requests.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(key, coalesced, "Coalescing request onto in-flight fetch");
            return Registration::Waiter(tx.subscribe());
        }

        // one value is ever sent per flight
        let (tx, _) = broadcast::channel(1);
        in_flight.insert(key.to_string(), tx);
        debug!(key, in_flight = in_flight.len(), "Starting new fetch");
        Registration::Leader(Flight {
            coalescer: self,
            key: key.to_string(),
            armed: true,
        })
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
            in_flight: self.in_flight_count(),
        }
    }
}
