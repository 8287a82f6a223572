use std::fmt;

use url::Url;

use crate::error::PrefetchError;
use crate::playlist::is_playlist_url;

/// A URL the controller may prefetch.
///
/// The wrapped URL is normalized (lowercased scheme and host, default port
/// dropped, dot segments resolved, fragment removed) and is the key used for
/// de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrefetchRequest(Url);

impl PrefetchRequest {
    pub fn new(mut url: Url) -> Self {
        url.set_fragment(None);
        Self(url)
    }

    pub fn parse(input: &str) -> Result<Self, PrefetchError> {
        Url::parse(input.trim())
            .map(Self::new)
            .map_err(|e| PrefetchError::invalid_url(input, e.to_string()))
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn into_url(self) -> Url {
        self.0
    }

    /// Remote (http/https) URL pointing at an HLS playlist.
    pub fn is_remote_playlist(&self) -> bool {
        matches!(self.0.scheme(), "http" | "https") && is_playlist_url(&self.0)
    }
}

impl From<Url> for PrefetchRequest {
    fn from(url: Url) -> Self {
        Self::new(url)
    }
}

impl fmt::Display for PrefetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}
