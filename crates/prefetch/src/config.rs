use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PrefetchError;
use crate::policy::{NetworkClass, PrefetchPolicy};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// HTTP options used by the backend when fetching playlists and segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Overall timeout for a single request (zero disables it)
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Extra headers, merged over the defaults
    pub headers: BTreeMap<String, String>,

    /// Extra query parameters appended to every request
    pub params: Vec<(String, String)>,

    /// Maximum idle connections to keep per host
    pub pool_max_idle_per_host: usize,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: BTreeMap::new(),
            params: Vec::new(),
            pool_max_idle_per_host: 10,
        }
    }
}

impl DownloaderConfig {
    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate"),
        );

        default_headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        default_headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static(
                "application/vnd.apple.mpegurl,application/x-mpegurl,*/*;q=0.8",
            ),
        );
        default_headers
    }

    /// Default headers with the configured ones layered on top.
    pub fn header_map(&self) -> Result<HeaderMap, PrefetchError> {
        let mut headers = Self::get_default_headers();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                PrefetchError::configuration(format!("invalid header name `{name}`: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                PrefetchError::configuration(format!("invalid value for header `{name}`: {e}"))
            })?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &DownloaderConfig) -> Result<Client, PrefetchError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .default_headers(config.header_map()?)
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    debug!(user_agent = %config.user_agent, "Building prefetch HTTP client");
    client_builder.build().map_err(PrefetchError::from)
}

/// Settings for the HTTP prefetch backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpBackendConfig {
    pub downloader: DownloaderConfig,
    /// Concurrent segment downloads within a single playlist prefetch
    pub segment_concurrency: usize,
    /// How many levels of nested playlists (master -> media) are followed
    pub max_playlist_depth: usize,
    /// Leading segments cached per media playlist (0 = all of them)
    pub max_segments_per_playlist: usize,
    /// Maximum number of cached bodies
    pub cache_max_entries: u64,
    /// How long a cached body stays valid
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            downloader: DownloaderConfig::default(),
            segment_concurrency: 2,
            max_playlist_depth: 2,
            max_segments_per_playlist: 3,
            cache_max_entries: 512,
            cache_ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// Top-level engine configuration, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub policy: PrefetchPolicy,
    pub http: HttpBackendConfig,
    /// Network class assumed until the first path update arrives
    pub initial_network_class: NetworkClass,
    /// Power state assumed until the first low-power reading arrives
    pub initial_low_power_mode: bool,
}

impl EngineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, PrefetchError> {
        toml::from_str(input).map_err(|e| PrefetchError::configuration(e.to_string()))
    }

    /// Loads the configuration file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, PrefetchError> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            PrefetchError::configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
