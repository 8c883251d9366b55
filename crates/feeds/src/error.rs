//! Error types for upstream fetches.

use thiserror::Error;

/// Errors that can occur while talking to an upstream service.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Explorer error: {0}")]
    Explorer(String),

    #[error("Channel closed")]
    ChannelClosed,
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return FeedError::Timeout(err.without_url().to_string());
        }
        if let Some(status) = err.status() {
            let url = err
                .url()
                .map(|u| crate::throttle::mask_api_key(u.as_str()))
                .unwrap_or_default();
            return FeedError::HttpStatus {
                status: status.as_u16(),
                url,
            };
        }
        if err.is_decode() {
            return FeedError::Decode(err.without_url().to_string());
        }
        FeedError::ConnectionFailed(err.without_url().to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Decode(err.to_string())
    }
}

impl FeedError {
    /// Short stable label for the kind of failure.
    ///
    /// Used to build deduplication keys, so that a 404 and a timeout on the
    /// same endpoint are reported independently.
    pub fn failure_class(&self) -> String {
        match self {
            FeedError::HttpStatus { status, .. } => format!("http-{}", status),
            FeedError::Timeout(_) => "timeout".to_string(),
            FeedError::ConnectionFailed(_) => "connection".to_string(),
            FeedError::Decode(_) => "decode".to_string(),
            FeedError::RateLimitExceeded(_) => "rate-limit".to_string(),
            FeedError::Explorer(_) => "explorer".to_string(),
            FeedError::ChannelClosed => "internal".to_string(),
        }
    }

    /// Returns true if this error is transient and likely to succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            FeedError::Timeout(_)
            | FeedError::ConnectionFailed(_)
            | FeedError::RateLimitExceeded(_) => true,
            FeedError::Decode(_) | FeedError::Explorer(_) | FeedError::ChannelClosed => false,
        }
    }
}
