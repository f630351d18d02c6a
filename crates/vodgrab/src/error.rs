use reqwest::StatusCode;

use crate::merge::MergeError;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("proxy configuration error: {reason}")]
    ProxyConfiguration { reason: String },

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

    #[error("resource not found: {resource}")]
    NotFound { resource: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("playlist error: {reason}")]
    Playlist { reason: String },

    #[error("no playable variant found in master playlist {url}")]
    NoVariantFound { url: String },

    #[error("no segments found in media playlist {url}")]
    NoSegmentsFound { url: String },

    #[error("merge failed: {source}")]
    Merge {
        #[from]
        source: MergeError,
    },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl DownloadError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn proxy_configuration(reason: impl Into<String>) -> Self {
        Self::ProxyConfiguration {
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

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Whether a segment attempt that failed with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidUrl { .. }
            | Self::ProxyConfiguration { .. }
            | Self::NotFound { .. }
            | Self::Io { .. }
            | Self::Playlist { .. }
            | Self::NoVariantFound { .. }
            | Self::NoSegmentsFound { .. }
            | Self::Merge { .. }
            | Self::Internal { .. } => false,
            Self::HttpStatus { status, .. } => *status != StatusCode::NOT_FOUND,
            Self::Network { source } => !source.is_builder() && !source.is_redirect(),
        }
    }

    /// Whether this error came from talking to the remote host, as opposed to
    /// the content it returned. Drives the direct-connection fallback of
    /// playlist resolution.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::HttpStatus { .. } | Self::NotFound { .. }
        )
    }
}
