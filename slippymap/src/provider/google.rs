//! Google Maps Static API provider.
//!
//! Google is used in static mode: each view is one image centred on a
//! position, at most 640×640 pixels.
//!
//! ```text
//! https://maps.googleapis.com/maps/api/staticmap?center={lat},{lon}&zoom={z}&size={w}x{h}&maptype=satellite&key={API_KEY}
//! ```
//!
//! When a signing secret is configured the URL is signed: the path and
//! query are HMAC-SHA1'd with the url-safe base64 decoded secret and the
//! url-safe base64 digest is appended as `signature`.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use futures::future::BoxFuture;
use futures::FutureExt;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tracing::{error, info, warn};
use url::Url;

use super::{Authenticator, FetchRequest, Fetcher, ProviderError, RequestBuilder};
use crate::fragment::{Fragment, FragmentAddress};
use crate::projection::{Projection, ProviderMetadata};

/// Static Maps endpoint.
const GOOGLE_STATIC_URL: &str = "https://maps.googleapis.com/maps/api/staticmap";

/// Largest static image edge, in pixels.
pub const GOOGLE_STATIC_MAX_SIZE: u32 = 640;

const GOOGLE_MAX_SCALE: u8 = 21;

type HmacSha1 = Hmac<Sha1>;

/// Signs a URL with a url-safe base64 secret.
///
/// Returns the URL with `&signature=...` appended.
pub fn sign_url(url: &str, secret: &str) -> Result<String, ProviderError> {
    let parsed = Url::parse(url).map_err(|e| ProviderError::InvalidCredential {
        provider: "google",
        reason: format!("unsignable URL: {}", e),
    })?;
    let key = decode_secret(secret)?;

    let resource = match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    };

    Ok(format!("{}&signature={}", url, signature(&key, &resource)?))
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, ProviderError> {
    URL_SAFE
        .decode(secret.trim())
        .map_err(|e| ProviderError::InvalidCredential {
            provider: "google",
            reason: format!("signing secret is not url-safe base64: {}", e),
        })
}

fn signature(key: &[u8], resource: &str) -> Result<String, ProviderError> {
    let mut mac = HmacSha1::new_from_slice(key).map_err(|e| ProviderError::InvalidCredential {
        provider: "google",
        reason: e.to_string(),
    })?;
    mac.update(resource.as_bytes());
    Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
}

/// Google Maps Static API provider.
pub struct GoogleStaticProvider {
    api_key: String,
    signing_key: Option<Vec<u8>>,
    map_type: String,
}

impl GoogleStaticProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            signing_key: None,
            map_type: "satellite".to_string(),
        }
    }

    /// Enables URL signing. Fails if the secret is not url-safe base64.
    pub fn with_signing_secret(mut self, secret: &str) -> Result<Self, ProviderError> {
        self.signing_key = Some(decode_secret(secret)?);
        Ok(self)
    }

    /// Map type: `satellite`, `roadmap`, `terrain` or `hybrid`.
    pub fn with_map_type(mut self, map_type: impl Into<String>) -> Self {
        self.map_type = map_type.into();
        self
    }

    pub fn metadata() -> ProviderMetadata {
        ProviderMetadata::static_map(
            0,
            GOOGLE_MAX_SCALE,
            GOOGLE_STATIC_MAX_SIZE,
            GOOGLE_STATIC_MAX_SIZE,
        )
    }

    fn build_url(&self, fragment: &Fragment) -> Option<Url> {
        let FragmentAddress::Static(address) = fragment.key().address() else {
            return None;
        };
        let center = address.center();

        Url::parse_with_params(
            GOOGLE_STATIC_URL,
            &[
                ("center", format!("{:.6},{:.6}", center.lat, center.lon)),
                ("zoom", address.scale.to_string()),
                ("size", format!("{}x{}", address.width, address.height)),
                ("maptype", self.map_type.clone()),
                ("key", self.api_key.clone()),
            ],
        )
        .ok()
    }
}

impl RequestBuilder for GoogleStaticProvider {
    fn create_request(&self, fragment: &Fragment) -> Option<FetchRequest> {
        let url = self.build_url(fragment)?;

        let url = match &self.signing_key {
            Some(key) => {
                let resource = format!("{}?{}", url.path(), url.query().unwrap_or_default());
                match signature(key, &resource) {
                    Ok(sig) => format!("{}&signature={}", url, sig),
                    Err(e) => {
                        error!(error = %e, "Failed to sign Google static map URL");
                        return None;
                    }
                }
            }
            None => url.to_string(),
        };

        Some(FetchRequest::get(url))
    }
}

impl Authenticator for GoogleStaticProvider {
    fn authenticate<'a>(
        &'a self,
        projection: &'a Projection,
        _fetcher: &'a dyn Fetcher,
    ) -> BoxFuture<'a, bool> {
        async move {
            if self.api_key.trim().is_empty() {
                warn!("Google static maps requires an API key");
                return false;
            }
            projection.initialize(&Self::metadata());
            info!(signed = self.signing_key.is_some(), "Google static maps ready");
            true
        }
        .boxed()
    }
}
