//! XYZ template providers (OpenStreetMap, OpenTopoMap).
//!
//! Tiles are addressed by `{z}/{x}/{y}` with an optional `{s}` subdomain
//! rotated across requests. No credentials are needed; the tile usage
//! policies require an identifying `User-Agent`.

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use super::{Authenticator, FetchRequest, Fetcher, RequestBuilder, USER_AGENT};
use crate::coord::DEFAULT_TILE_SIZE;
use crate::fragment::Fragment;
use crate::projection::{Projection, ProviderMetadata};

/// URL template and bounds for an XYZ tile server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XyzTemplate {
    pub url: String,
    pub subdomains: Vec<String>,
    pub min_scale: u8,
    pub max_scale: u8,
}

impl XyzTemplate {
    pub fn openstreetmap() -> Self {
        Self {
            url: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            subdomains: Vec::new(),
            min_scale: 0,
            max_scale: 19,
        }
    }

    pub fn opentopomap() -> Self {
        Self {
            url: "https://{s}.tile.opentopomap.org/{z}/{x}/{y}.png".to_string(),
            subdomains: vec!["a".into(), "b".into(), "c".into()],
            min_scale: 0,
            max_scale: 17,
        }
    }
}

/// Provider for an XYZ tile server.
pub struct XyzProvider {
    template: XyzTemplate,
}

impl XyzProvider {
    pub fn new(template: XyzTemplate) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &XyzTemplate {
        &self.template
    }

    pub fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata::tiled(
            self.template.min_scale,
            self.template.max_scale,
            DEFAULT_TILE_SIZE,
        )
    }
}

impl RequestBuilder for XyzProvider {
    fn create_request(&self, fragment: &Fragment) -> Option<FetchRequest> {
        let tile = fragment.key().tile_coord()?;

        let mut url = self
            .template
            .url
            .replace("{z}", &tile.scale.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string());

        if !self.template.subdomains.is_empty() {
            let index = (tile.x as usize + tile.y as usize) % self.template.subdomains.len();
            url = url.replace("{s}", &self.template.subdomains[index]);
        }

        Some(FetchRequest::get(url).with_header("User-Agent", USER_AGENT))
    }
}

impl Authenticator for XyzProvider {
    fn authenticate<'a>(
        &'a self,
        projection: &'a Projection,
        _fetcher: &'a dyn Fetcher,
    ) -> BoxFuture<'a, bool> {
        async move {
            projection.initialize(&self.metadata());
            debug!(template = %self.template.url, "XYZ provider ready");
            true
        }
        .boxed()
    }
}
