//! INI serialization: `ConfigFile` → commented INI string.

use super::settings::ConfigFile;
use super::size::format_size;

/// Produces the text written to `config.ini`. Round-trips through
/// [`super::parser::parse_ini`].
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let provider = &config.provider;
    let cache = &config.cache;
    let download = &config.download;

    format!(
        r#"[provider]
; Imagery provider:
;   bing          - Bing Maps (requires bing_key)
;   google        - Google Static Maps (requires google_key)
;   openstreetmap - OpenStreetMap standard tiles
;   opentopomap   - OpenTopoMap topographic tiles
type = {}
bing_key = {}
; Bing imagery set (default: Aerial)
bing_imagery_set = {}
google_key = {}
; URL-safe base64 secret used to sign Google Static Maps requests
google_signing_secret = {}

[cache]
; Directory for the disk tier (one <key>.tile file per fragment)
directory = {}
; Limits: 0 = unlimited. Sizes support KB, MB, GB suffixes.
memory_max_entries = {}
memory_max_size = {}
disk_max_entries = {}
disk_max_size = {}
; Entries not read for this many hours are purged (0 = keep forever)
retention_hours = {}
; Copy disk hits into memory
promote_on_hit = {}

[download]
; Max latency per fetch in seconds (0 = no limit)
timeout = {}
; Concurrent misses on one tile: coalesce (one fetch) or independent
fetch_policy = {}
; Write fetched fragments into every cache tier
write_through = {}
"#,
        provider.provider_type,
        provider.bing_key.as_deref().unwrap_or(""),
        provider.bing_imagery_set.as_deref().unwrap_or(""),
        provider.google_key.as_deref().unwrap_or(""),
        provider.google_signing_secret.as_deref().unwrap_or(""),
        cache.directory.display(),
        cache.memory_max_entries,
        format_size(cache.memory_max_size),
        cache.disk_max_entries,
        format_size(cache.disk_max_size),
        cache.retention_hours,
        cache.promote_on_hit,
        download.timeout,
        download.fetch_policy.as_str(),
        download.write_through,
    )
}
