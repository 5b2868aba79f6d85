//! Cache entry returned by the chain.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::fragment::{Fragment, FragmentKey};

/// Where a chain lookup found its fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOrigin {
    /// Hit at the given tier level (0 = fastest).
    Tier(usize),
    /// Built by the fragment source after every tier missed.
    Network,
}

/// A fragment plus the level it came from.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    fragment: Arc<Fragment>,
    origin: EntryOrigin,
}

impl CacheEntry {
    pub fn new(fragment: Arc<Fragment>, origin: EntryOrigin) -> Self {
        Self { fragment, origin }
    }

    pub fn fragment(&self) -> &Arc<Fragment> {
        &self.fragment
    }

    pub fn into_fragment(self) -> Arc<Fragment> {
        self.fragment
    }

    pub fn key(&self) -> &FragmentKey {
        self.fragment.key()
    }

    pub fn origin(&self) -> EntryOrigin {
        self.origin
    }

    /// Tier level of a hit, `None` for network entries.
    pub fn level(&self) -> Option<usize> {
        match self.origin {
            EntryOrigin::Tier(level) => Some(level),
            EntryOrigin::Network => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self.origin, EntryOrigin::Tier(_))
    }

    /// Whether the fragment carries image bytes.
    pub fn is_populated(&self) -> bool {
        self.fragment.has_image()
    }

    pub fn size_bytes(&self) -> u64 {
        self.fragment.size_bytes()
    }

    pub fn created_utc(&self) -> DateTime<Utc> {
        self.fragment.created_utc()
    }

    pub fn last_accessed_utc(&self) -> DateTime<Utc> {
        self.fragment.last_accessed_utc()
    }
}
