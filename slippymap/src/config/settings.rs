//! Settings structs for each `[section]` of the config file.

use std::path::PathBuf;
use std::time::Duration;

use super::defaults::*;
use crate::acquire::FetchPolicy;
use crate::cache::TierLimits;
use crate::provider::ProviderCredentials;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigFile {
    pub provider: ProviderSettings,
    pub cache: CacheSettings,
    pub download: DownloadSettings,
}

/// `[provider]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// One of [`VALID_PROVIDERS`].
    pub provider_type: String,
    pub bing_key: Option<String>,
    pub bing_imagery_set: Option<String>,
    pub google_key: Option<String>,
    /// URL-safe base64 signing secret for Google Static Maps.
    pub google_signing_secret: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider_type: DEFAULT_PROVIDER_TYPE.to_string(),
            bing_key: None,
            bing_imagery_set: None,
            google_key: None,
            google_signing_secret: None,
        }
    }
}

impl ProviderSettings {
    pub fn credentials(&self) -> ProviderCredentials {
        ProviderCredentials {
            bing_key: self.bing_key.clone(),
            bing_imagery_set: self.bing_imagery_set.clone(),
            google_key: self.google_key.clone(),
            google_signing_secret: self.google_signing_secret.clone(),
        }
    }
}

/// `[cache]`. Zero limits are unlimited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub directory: PathBuf,
    pub memory_max_entries: usize,
    /// Bytes.
    pub memory_max_size: usize,
    pub disk_max_entries: usize,
    /// Bytes.
    pub disk_max_size: usize,
    pub retention_hours: u64,
    /// Copy lower-tier hits into faster tiers.
    pub promote_on_hit: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: default_cache_dir(),
            memory_max_entries: DEFAULT_MEMORY_MAX_ENTRIES,
            memory_max_size: DEFAULT_MEMORY_MAX_SIZE,
            disk_max_entries: DEFAULT_DISK_MAX_ENTRIES,
            disk_max_size: DEFAULT_DISK_MAX_SIZE,
            retention_hours: DEFAULT_RETENTION_HOURS,
            promote_on_hit: true,
        }
    }
}

impl CacheSettings {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours.saturating_mul(3600))
    }

    pub fn memory_limits(&self) -> TierLimits {
        TierLimits::unlimited()
            .with_max_entries(self.memory_max_entries)
            .with_max_bytes(self.memory_max_size as u64)
            .with_retention(self.retention())
    }

    pub fn disk_limits(&self) -> TierLimits {
        TierLimits::unlimited()
            .with_max_entries(self.disk_max_entries)
            .with_max_bytes(self.disk_max_size as u64)
            .with_retention(self.retention())
    }
}

/// `[download]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Max latency per fetch, in seconds. Zero disables the limit.
    pub timeout: u64,
    pub fetch_policy: FetchPolicy,
    /// Write acquired fragments into every tier.
    pub write_through: bool,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            fetch_policy: FetchPolicy::default(),
            write_through: true,
        }
    }
}

impl DownloadSettings {
    pub fn max_latency(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }
}
