//! Bing Maps imagery provider.
//!
//! Bing addresses tiles by quadkey. The tile URL template, subdomains and
//! zoom bounds come from the imagery metadata endpoint, which is fetched
//! during authentication:
//!
//! ```text
//! GET https://dev.virtualearth.net/REST/v1/Imagery/Metadata/{set}?output=json&uriScheme=https&key={key}
//! ```
//!
//! The first resource of the first resource set carries the template, e.g.
//! `https://ecn.{subdomain}.tiles.virtualearth.net/tiles/a{quadkey}.jpeg?g=14041`.
//! A response without that resource fails authentication.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{info, warn};

use super::{Authenticator, FetchRequest, Fetcher, RequestBuilder, USER_AGENT};
use crate::coord::DEFAULT_TILE_SIZE;
use crate::fragment::{Fragment, FragmentAddress};
use crate::projection::{Projection, ProviderMetadata};

/// Imagery metadata endpoint.
pub const BING_METADATA_URL: &str = "https://dev.virtualearth.net/REST/v1/Imagery/Metadata";

const DEFAULT_IMAGERY_SET: &str = "Aerial";
const DEFAULT_CULTURE: &str = "en-US";
const DEFAULT_MIN_SCALE: u8 = 1;
const DEFAULT_MAX_SCALE: u8 = 21;

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(rename = "resourceSets", default)]
    resource_sets: Vec<ResourceSet>,
}

#[derive(Debug, Deserialize)]
struct ResourceSet {
    #[serde(default)]
    resources: Vec<ImageryResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageryResource {
    image_url: String,
    #[serde(default)]
    image_url_subdomains: Vec<String>,
    image_width: Option<u32>,
    zoom_min: Option<u8>,
    zoom_max: Option<u8>,
}

/// Tile template and bounds discovered from imagery metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BingImagery {
    pub image_url: String,
    pub subdomains: Vec<String>,
    pub tile_size: u32,
    pub min_scale: u8,
    pub max_scale: u8,
}

impl BingImagery {
    /// Parses an imagery metadata response.
    ///
    /// Returns `None` when the JSON is malformed or the primary resource is
    /// missing.
    pub fn from_metadata(json: &[u8]) -> Option<Self> {
        let response: MetadataResponse = match serde_json::from_slice(json) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Malformed Bing imagery metadata");
                return None;
            }
        };

        let resource = response
            .resource_sets
            .into_iter()
            .next()
            .and_then(|set| set.resources.into_iter().next())?;

        Some(Self {
            image_url: resource.image_url,
            subdomains: resource.image_url_subdomains,
            tile_size: resource.image_width.unwrap_or(DEFAULT_TILE_SIZE),
            min_scale: resource.zoom_min.unwrap_or(DEFAULT_MIN_SCALE),
            max_scale: resource.zoom_max.unwrap_or(DEFAULT_MAX_SCALE),
        })
    }

    pub fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata::tiled(self.min_scale, self.max_scale, self.tile_size)
    }
}

/// Bing Maps provider.
pub struct BingProvider {
    api_key: String,
    imagery_set: String,
    culture: String,
    imagery: RwLock<Option<BingImagery>>,
}

impl BingProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            imagery_set: DEFAULT_IMAGERY_SET.to_string(),
            culture: DEFAULT_CULTURE.to_string(),
            imagery: RwLock::new(None),
        }
    }

    /// Selects the imagery set (`Aerial`, `AerialWithLabels`, `Road`, ...).
    pub fn with_imagery_set(mut self, imagery_set: impl Into<String>) -> Self {
        self.imagery_set = imagery_set.into();
        self
    }

    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = culture.into();
        self
    }

    pub fn metadata_url(&self) -> String {
        format!(
            "{}/{}?output=json&uriScheme=https&include=ImageryProviders&key={}",
            BING_METADATA_URL, self.imagery_set, self.api_key
        )
    }

    /// Imagery discovered by the last successful authentication.
    pub fn imagery(&self) -> Option<BingImagery> {
        self.imagery.read().clone()
    }

    /// Installs imagery metadata directly.
    pub fn set_imagery(&self, imagery: BingImagery) {
        *self.imagery.write() = Some(imagery);
    }
}

impl RequestBuilder for BingProvider {
    fn create_request(&self, fragment: &Fragment) -> Option<FetchRequest> {
        let FragmentAddress::Tile { coord, quadkey } = fragment.key().address() else {
            return None;
        };
        if !quadkey.is_addressable() {
            return None;
        }

        let imagery = self.imagery.read();
        let imagery = imagery.as_ref()?;

        let mut url = imagery
            .image_url
            .replace("{quadkey}", quadkey.padded())
            .replace("{culture}", &self.culture);

        if !imagery.subdomains.is_empty() {
            let index = (coord.x as usize + coord.y as usize) % imagery.subdomains.len();
            url = url.replace("{subdomain}", &imagery.subdomains[index]);
        }

        Some(FetchRequest::get(url).with_header("User-Agent", USER_AGENT))
    }
}

impl Authenticator for BingProvider {
    fn authenticate<'a>(
        &'a self,
        projection: &'a Projection,
        fetcher: &'a dyn Fetcher,
    ) -> BoxFuture<'a, bool> {
        async move {
            if self.api_key.trim().is_empty() {
                warn!("Bing authentication requires an API key");
                return false;
            }

            let request = FetchRequest::get(self.metadata_url());
            let body = match fetcher.fetch(&request).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "Bing metadata request failed");
                    return false;
                }
            };

            let Some(imagery) = BingImagery::from_metadata(&body) else {
                warn!("Bing metadata has no imagery resource");
                return false;
            };

            info!(
                imagery_set = %self.imagery_set,
                subdomains = imagery.subdomains.len(),
                min_scale = imagery.min_scale,
                max_scale = imagery.max_scale,
                "Bing imagery metadata loaded"
            );
            projection.initialize(&imagery.metadata());
            self.set_imagery(imagery);
            true
        }
        .boxed()
    }
}
