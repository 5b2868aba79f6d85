//! Name-to-factory provider registry.

use std::collections::BTreeMap;

use tracing::debug;

use super::{
    BingProvider, GoogleStaticProvider, Provider, ProviderError, XyzProvider, XyzTemplate,
};

/// Credentials a factory may need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub bing_key: Option<String>,
    pub bing_imagery_set: Option<String>,
    pub google_key: Option<String>,
    pub google_signing_secret: Option<String>,
}

/// Creates a provider from credentials.
pub type ProviderFactory = fn(&ProviderCredentials) -> Result<Provider, ProviderError>;

/// Registry mapping provider names to factories.
///
/// Names double as projection names and cache key prefixes, so they may not
/// contain `-`.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in providers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("bing", create_bing);
        registry.register("google", create_google);
        registry.register("openstreetmap", create_openstreetmap);
        registry.register("opentopomap", create_opentopomap);
        registry
    }

    /// Registers a factory, replacing any previous one for `name`.
    ///
    /// Returns `false` (and registers nothing) for names containing `-`.
    pub fn register(&mut self, name: &str, factory: ProviderFactory) -> bool {
        if name.is_empty() || name.contains('-') {
            return false;
        }
        let name = name.to_lowercase();
        debug!(provider = %name, "Registering provider");
        self.factories.insert(name, factory);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_lowercase())
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Creates the named provider.
    pub fn create(
        &self,
        name: &str,
        credentials: &ProviderCredentials,
    ) -> Result<Provider, ProviderError> {
        let factory = self
            .factories
            .get(&name.to_lowercase())
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))?;
        factory(credentials)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn create_bing(credentials: &ProviderCredentials) -> Result<Provider, ProviderError> {
    let key = non_empty(&credentials.bing_key).ok_or(ProviderError::MissingCredential {
        provider: "bing",
        credential: "an API key (bing_key)",
    })?;

    let mut provider = BingProvider::new(key);
    if let Some(set) = non_empty(&credentials.bing_imagery_set) {
        provider = provider.with_imagery_set(set);
    }
    Ok(Provider::from_parts("bing", provider))
}

fn create_google(credentials: &ProviderCredentials) -> Result<Provider, ProviderError> {
    let key = non_empty(&credentials.google_key).ok_or(ProviderError::MissingCredential {
        provider: "google",
        credential: "an API key (google_key)",
    })?;

    let mut provider = GoogleStaticProvider::new(key);
    if let Some(secret) = non_empty(&credentials.google_signing_secret) {
        provider = provider.with_signing_secret(secret)?;
    }
    Ok(Provider::from_parts("google", provider))
}

fn create_openstreetmap(_: &ProviderCredentials) -> Result<Provider, ProviderError> {
    Ok(Provider::from_parts(
        "openstreetmap",
        XyzProvider::new(XyzTemplate::openstreetmap()),
    ))
}

fn create_opentopomap(_: &ProviderCredentials) -> Result<Provider, ProviderError> {
    Ok(Provider::from_parts(
        "opentopomap",
        XyzProvider::new(XyzTemplate::opentopomap()),
    ))
}
