//! INI parsing: `Ini` → `ConfigFile`.
//!
//! The single place where INI key names are mapped to struct fields.

use std::path::PathBuf;

use ini::{Ini, Properties};

use super::defaults::VALID_PROVIDERS;
use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::parse_size;
use crate::acquire::FetchPolicy;

/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    if let Some(section) = ini.section(Some("provider")) {
        if let Some(v) = section.get("type") {
            let v = v.trim().to_lowercase();
            if !VALID_PROVIDERS.contains(&v.as_str()) {
                return Err(invalid(
                    "provider",
                    "type",
                    &v,
                    format!("must be one of: {}", VALID_PROVIDERS.join(", ")),
                ));
            }
            config.provider.provider_type = v;
        }
        config.provider.bing_key = optional(section, "bing_key");
        config.provider.bing_imagery_set = optional(section, "bing_imagery_set");
        config.provider.google_key = optional(section, "google_key");
        config.provider.google_signing_secret = optional(section, "google_signing_secret");
    }

    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = optional(section, "directory") {
            config.cache.directory = expand_tilde(&v);
        }
        if let Some(v) = section.get("memory_max_entries") {
            config.cache.memory_max_entries = parse_number("cache", "memory_max_entries", v)?;
        }
        if let Some(v) = section.get("memory_max_size") {
            config.cache.memory_max_size = parse_size_value("cache", "memory_max_size", v)?;
        }
        if let Some(v) = section.get("disk_max_entries") {
            config.cache.disk_max_entries = parse_number("cache", "disk_max_entries", v)?;
        }
        if let Some(v) = section.get("disk_max_size") {
            config.cache.disk_max_size = parse_size_value("cache", "disk_max_size", v)?;
        }
        if let Some(v) = section.get("retention_hours") {
            config.cache.retention_hours = parse_number("cache", "retention_hours", v)?;
        }
        if let Some(v) = section.get("promote_on_hit") {
            config.cache.promote_on_hit = parse_bool("cache", "promote_on_hit", v)?;
        }
    }

    if let Some(section) = ini.section(Some("download")) {
        if let Some(v) = section.get("timeout") {
            config.download.timeout = v.trim().parse().map_err(|_| {
                invalid("download", "timeout", v, "must be a non-negative integer (seconds)")
            })?;
        }
        if let Some(v) = section.get("fetch_policy") {
            config.download.fetch_policy = FetchPolicy::parse(v).ok_or_else(|| {
                invalid("download", "fetch_policy", v, "must be 'coalesce' or 'independent'")
            })?;
        }
        if let Some(v) = section.get("write_through") {
            config.download.write_through = parse_bool("download", "write_through", v)?;
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: impl Into<String>) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Trimmed value, `None` when absent or empty.
fn optional(section: &Properties, key: &str) -> Option<String> {
    section
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_number<T: std::str::FromStr>(
    section: &str,
    key: &str,
    value: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, "must be a non-negative integer"))
}

fn parse_size_value(section: &str, key: &str, value: &str) -> Result<usize, ConfigFileError> {
    parse_size(value)
        .map_err(|_| invalid(section, key, value, "expected format like '2GB', '500MB', or '1024KB'"))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(invalid(section, key, value, "must be 'true' or 'false'")),
    }
}

/// Expands a leading `~` to the home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
