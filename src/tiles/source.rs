use async_trait::async_trait;

use crate::core::constants::DEFAULT_TILE_URL_TEMPLATE;
use crate::core::geo::TileKey;
use crate::Result;

#[cfg(feature = "http")]
use crate::core::config::ProviderConfig;
#[cfg(feature = "http")]
use crate::Error;
#[cfg(feature = "http")]
use once_cell::sync::Lazy;

/// Trait representing anything that can produce tile URLs for a given key.
pub trait TileSource: Send + Sync {
    /// Build a URL for the requested `key`.
    fn url(&self, key: TileKey) -> String;
}

/// URL template with `{z}`, `{x}`, `{y}`, `{s}` and `{token}` placeholders.
#[derive(Debug, Clone)]
pub struct UrlTemplateSource {
    template: String,
    access_token: String,
    subdomains: Vec<String>,
}

impl UrlTemplateSource {
    pub fn new(template: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            access_token: access_token.into(),
            subdomains: Vec::new(),
        }
    }

    /// Mapbox outdoors raster tiles
    pub fn mapbox_outdoors(access_token: impl Into<String>) -> Self {
        Self::new(DEFAULT_TILE_URL_TEMPLATE, access_token)
    }

    /// The public OpenStreetMap tile servers
    pub fn openstreetmap() -> Self {
        Self::new("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png", "")
            .with_subdomains(["a", "b", "c"])
    }

    pub fn with_subdomains<I, S>(mut self, subdomains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subdomains = subdomains.into_iter().map(Into::into).collect();
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

impl TileSource for UrlTemplateSource {
    fn url(&self, key: TileKey) -> String {
        let mut url = self
            .template
            .replace("{z}", &key.zoom.to_string())
            .replace("{x}", &key.x.to_string())
            .replace("{y}", &key.y.to_string())
            .replace("{token}", &self.access_token);

        if !self.subdomains.is_empty() {
            let idx = ((key.x as u64 + key.y as u64) % self.subdomains.len() as u64) as usize;
            url = url.replace("{s}", &self.subdomains[idx]);
        }
        url
    }
}

/// Remote source of raw tile image bytes.
#[async_trait]
pub trait TileProvider: Send + Sync {
    /// Fetch one tile. Any non-success answer is a `TileFetch` error.
    async fn fetch(&self, key: TileKey) -> Result<Vec<u8>>;
}

/// Shared async HTTP client for tile fetching. Building the client once avoids
/// the cost of TLS and connection pool setup for every tile.
#[cfg(feature = "http")]
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .tcp_keepalive(std::time::Duration::from_secs(30))
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .pool_max_idle_per_host(8)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
});

/// Tile provider that downloads tiles over HTTP(S).
#[cfg(feature = "http")]
pub struct HttpTileProvider<S: TileSource = UrlTemplateSource> {
    source: S,
    user_agent: String,
    timeout: std::time::Duration,
}

#[cfg(feature = "http")]
impl HttpTileProvider<UrlTemplateSource> {
    /// Build a provider from the `provider` section of the configuration
    pub fn from_config(config: &ProviderConfig) -> Self {
        let source = UrlTemplateSource::new(&config.url_template, &config.access_token);
        Self::new(source, &config.user_agent, config.timeout())
    }
}

#[cfg(feature = "http")]
impl<S: TileSource> HttpTileProvider<S> {
    pub fn new(source: S, user_agent: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self {
            source,
            user_agent: user_agent.into(),
            timeout,
        }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl<S: TileSource> TileProvider for HttpTileProvider<S> {
    async fn fetch(&self, key: TileKey) -> Result<Vec<u8>> {
        let fetch_error = |reason: String| Error::TileFetch { key, reason };

        // The URL may carry an access token, so only the key is logged
        log::debug!("fetching tile {}", key);
        let response = HTTP_CLIENT
            .get(self.source.url(key))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| fetch_error(e.without_url().to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_error(format!("HTTP {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.without_url().to_string()))?;
        Ok(bytes.to_vec())
    }
}
