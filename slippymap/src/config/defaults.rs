//! Default configuration values.

use std::path::PathBuf;

use super::file::config_directory;

pub const DEFAULT_PROVIDER_TYPE: &str = "openstreetmap";
pub const DEFAULT_MEMORY_MAX_ENTRIES: usize = 4096;
pub const DEFAULT_MEMORY_MAX_SIZE: usize = 256 * 1024 * 1024;
pub const DEFAULT_DISK_MAX_ENTRIES: usize = 0;
pub const DEFAULT_DISK_MAX_SIZE: usize = 2 * 1024 * 1024 * 1024;
/// Thirty days.
pub const DEFAULT_RETENTION_HOURS: u64 = 720;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Providers accepted by `[provider] type`.
pub const VALID_PROVIDERS: [&str; 4] = ["bing", "google", "openstreetmap", "opentopomap"];

/// Default disk cache directory (platform cache dir, else `~/.slippymap/cache`).
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("slippymap"))
        .unwrap_or_else(|| config_directory().join("cache"))
}
