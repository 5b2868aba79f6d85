//! Tier index and eviction policy shared by all tiers.
//!
//! - count limit: entries the tier took in earliest go first (insertion
//!   order breaks ties)
//! - byte limit: largest payloads go first
//! - age limit: entries whose last access is older than `now - retention`
//!
//! A zero limit disables that check.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Limits for one tier. Zero means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TierLimits {
    pub max_entries: usize,
    pub max_bytes: u64,
    pub retention: Duration,
}

impl TierLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

/// Bookkeeping for one cached entry.
#[derive(Debug, Clone)]
pub(crate) struct IndexEntry<P> {
    pub payload: P,
    pub size: u64,
    /// When this tier stored the entry, not when the fragment was built.
    pub created: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    seq: u64,
}

/// Key → entry map with byte accounting.
#[derive(Debug)]
pub(crate) struct TierIndex<P> {
    entries: HashMap<String, IndexEntry<P>>,
    total_bytes: u64,
    next_seq: u64,
}

pub(crate) type Removed<P> = Vec<(String, IndexEntry<P>)>;

impl<P> TierIndex<P> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            total_bytes: 0,
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&IndexEntry<P>> {
        self.entries.get(key)
    }

    /// Inserts an entry, returning the one it replaced.
    pub fn insert(
        &mut self,
        key: String,
        payload: P,
        size: u64,
        created: DateTime<Utc>,
        last_accessed: DateTime<Utc>,
    ) -> Option<IndexEntry<P>> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.total_bytes += size;

        let replaced = self.entries.insert(
            key,
            IndexEntry {
                payload,
                size,
                created,
                last_accessed,
                seq,
            },
        );
        if let Some(old) = &replaced {
            self.total_bytes -= old.size;
        }
        replaced
    }

    /// Stamps an entry's last-accessed time.
    pub fn touch(&mut self, key: &str, now: DateTime<Utc>) -> Option<&IndexEntry<P>> {
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed = now;
        Some(entry)
    }

    pub fn remove(&mut self, key: &str) -> Option<IndexEntry<P>> {
        let entry = self.entries.remove(key)?;
        self.total_bytes -= entry.size;
        Some(entry)
    }

    pub fn drain(&mut self) -> Removed<P> {
        self.total_bytes = 0;
        self.entries.drain().collect()
    }

    /// Removes entries until count and byte limits hold.
    pub fn enforce(&mut self, limits: &TierLimits) -> Removed<P> {
        let mut removed = Vec::new();

        if limits.max_entries > 0 && self.entries.len() > limits.max_entries {
            let excess = self.entries.len() - limits.max_entries;
            let mut by_age: Vec<(DateTime<Utc>, u64, String)> = self
                .entries
                .iter()
                .map(|(k, e)| (e.created, e.seq, k.clone()))
                .collect();
            by_age.sort_unstable();

            for (_, _, key) in by_age.into_iter().take(excess) {
                if let Some(entry) = self.remove(&key) {
                    removed.push((key, entry));
                }
            }
        }

        if limits.max_bytes > 0 && self.total_bytes > limits.max_bytes {
            let mut by_size: Vec<(u64, u64, String)> = self
                .entries
                .iter()
                .map(|(k, e)| (e.size, e.seq, k.clone()))
                .collect();
            // largest first, older first among equals
            by_size.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

            for (_, _, key) in by_size {
                if self.total_bytes <= limits.max_bytes {
                    break;
                }
                if let Some(entry) = self.remove(&key) {
                    removed.push((key, entry));
                }
            }
        }

        removed
    }

    /// Removes entries last accessed before `now - retention`.
    pub fn purge_expired(&mut self, now: DateTime<Utc>, retention: Duration) -> Removed<P> {
        if retention.is_zero() {
            return Vec::new();
        }
        let Some(cutoff) = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|r| now.checked_sub_signed(r))
        else {
            return Vec::new();
        };

        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.last_accessed < cutoff)
            .map(|(k, _)| k.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| self.remove(&key).map(|entry| (key, entry)))
            .collect()
    }
}
