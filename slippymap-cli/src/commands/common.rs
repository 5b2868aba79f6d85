//! Shared setup for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use slippymap::cache::{CacheChain, CacheTier, FileSystemTier, MemoryTier};
use slippymap::config::ConfigFile;
use slippymap::coord::LatLon;
use slippymap::logging::{default_log_dir, default_log_file, init_logging, LoggingGuard};
use slippymap::provider::{HttpFetcher, Provider, ProviderRegistry};
use slippymap::viewport::ViewportRequest;

use crate::error::CliError;

/// View arguments shared by `tiles` and `fetch`.
#[derive(Debug, Args)]
pub struct ViewArgs {
    /// Center latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Center longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    /// View width in pixels
    #[arg(long, default_value = "512")]
    pub width: u32,

    /// View height in pixels
    #[arg(long, default_value = "512")]
    pub height: u32,

    /// Heading in degrees clockwise from north
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub heading: f64,

    /// Zoom level (clamped to the provider's range)
    #[arg(long, default_value = "15")]
    pub scale: u8,

    /// Provider name (default: [provider] type from config.ini)
    #[arg(long)]
    pub provider: Option<String>,
}

impl ViewArgs {
    pub fn request(&self) -> ViewportRequest {
        ViewportRequest::new(LatLon::new(self.lat, self.lon), self.width, self.height)
            .with_heading(self.heading)
    }
}

/// Loads config.ini from `path`, or the default location.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}

pub fn start_logging() -> Result<LoggingGuard, CliError> {
    init_logging(&default_log_dir(), default_log_file())
        .map_err(|e| CliError::LoggingInit(e.to_string()))
}

pub fn http_fetcher(config: &ConfigFile) -> Result<Arc<HttpFetcher>, CliError> {
    let fetcher = match config.download.timeout {
        0 => HttpFetcher::new()?,
        secs => HttpFetcher::with_timeout(secs)?,
    };
    Ok(Arc::new(fetcher))
}

/// Creates the named (or configured) provider and authenticates it.
pub async fn connect_provider(
    name: Option<&str>,
    config: &ConfigFile,
    fetcher: &HttpFetcher,
) -> Result<Provider, CliError> {
    let name = name.unwrap_or(&config.provider.provider_type);
    let provider = ProviderRegistry::with_defaults().create(name, &config.provider.credentials())?;

    if !provider.authenticate(fetcher).await {
        return Err(CliError::Authentication(provider.name().to_string()));
    }
    Ok(provider)
}

/// Memory tier backed by the configured disk tier.
pub async fn open_cache_chain(config: &ConfigFile) -> Result<Arc<CacheChain>, CliError> {
    let memory = MemoryTier::new(config.cache.memory_limits());
    let disk = FileSystemTier::open(disk_directory(config), config.cache.disk_limits()).await?;

    let chain = CacheChain::new(vec![
        Arc::new(memory) as Arc<dyn CacheTier>,
        Arc::new(disk) as Arc<dyn CacheTier>,
    ])
    .with_promotion(config.cache.promote_on_hit);
    Ok(Arc::new(chain))
}

/// Tile files live in `<directory>/tiles`.
pub fn disk_directory(config: &ConfigFile) -> PathBuf {
    config.cache.directory.join("tiles")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_from_missing_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config(Some(&dir.path().join("none.ini"))).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[tokio::test]
    async fn test_open_cache_chain_creates_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = ConfigFile::default();
        config.cache.directory = dir.path().to_path_buf();

        let chain = open_cache_chain(&config).await.unwrap();
        assert_eq!(chain.len(), 2);
        assert!(disk_directory(&config).is_dir());
    }
}
