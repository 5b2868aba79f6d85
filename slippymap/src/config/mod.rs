//! Configuration file and size helpers.
//!
//! ```
//! use slippymap::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! assert_eq!(config.provider.provider_type, "openstreetmap");
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{CacheSettings, ConfigFile, DownloadSettings, ProviderSettings};
pub use size::{format_size, parse_size, Size, SizeParseError};
