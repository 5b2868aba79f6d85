//! CLI error handling with user-friendly messages.

use std::fmt;
use std::process;

use slippymap::cache::CacheError;
use slippymap::config::ConfigFileError;
use slippymap::provider::ProviderError;

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    LoggingInit(String),
    Config(ConfigFileError),
    Provider(ProviderError),
    /// Provider rejected its credentials or metadata could not be fetched.
    Authentication(String),
    Cache(CacheError),
    InvalidArgument(String),
    FileWrite { path: String, error: std::io::Error },
    Runtime(std::io::Error),
}

impl CliError {
    /// Prints the error with any hints and exits with status 1.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Provider(ProviderError::MissingCredential { .. }) => {
                eprintln!();
                eprintln!("Add the credential to the [provider] section of:");
                eprintln!("  {}", slippymap::config::config_file_path().display());
            }
            CliError::Authentication(_) => {
                eprintln!();
                eprintln!("Check that the API key is valid and the network is reachable.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Provider(e) => write!(f, "Provider error: {}", e),
            CliError::Authentication(provider) => {
                write!(f, "Failed to authenticate with provider '{}'", provider)
            }
            CliError::Cache(e) => write!(f, "Cache error: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Provider(e) => Some(e),
            CliError::Cache(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            CliError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<ProviderError> for CliError {
    fn from(e: ProviderError) -> Self {
        CliError::Provider(e)
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        CliError::Cache(e)
    }
}
