use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum PrefetchError {
    #[error("prefetch cancelled")]
    Cancelled,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("playlist error: {reason}")]
    Playlist { reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("prefetch controller is no longer running")]
    ControllerClosed,
}

impl PrefetchError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn playlist(reason: impl Into<String>) -> Self {
        Self::Playlist {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether the same request could succeed on a later attempt.
    ///
    /// Nothing here retries; the HTTP backend only reports it with failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled
            | Self::InvalidUrl { .. }
            | Self::Configuration { .. }
            | Self::ControllerClosed => false,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Network { .. } | Self::Playlist { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        let err = PrefetchError::http_status(
            StatusCode::BAD_GATEWAY,
            "https://cdn.example.com/a.m3u8",
            "playlist",
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let err = PrefetchError::http_status(
            StatusCode::NOT_FOUND,
            "https://cdn.example.com/a.m3u8",
            "segment",
        );
        assert!(!err.is_retryable());
        assert!(!PrefetchError::Cancelled.is_retryable());
        assert!(!PrefetchError::invalid_url("nope", "relative URL without a base").is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = PrefetchError::http_status(
            StatusCode::FORBIDDEN,
            "https://cdn.example.com/a.m3u8",
            "playlist",
        );
        assert_eq!(
            err.to_string(),
            "request failed with HTTP 403 Forbidden during playlist for https://cdn.example.com/a.m3u8"
        );
    }
}
