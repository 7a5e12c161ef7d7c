// src/resolve/types.rs
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::normalize::NormalizedUrl;

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

/// What a provider hands back on success: something we can stream from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaDescriptor {
    pub playable_url: String,
    pub thumbnail_url: Option<String>,
    pub title: Option<String>,
    pub source_provider: &'static str,
}

impl MediaDescriptor {
    /// Returns `None` unless `playable_url` is an absolute http(s) URL.
    pub fn new(
        source_provider: &'static str,
        playable_url: impl Into<String>,
        thumbnail_url: Option<String>,
        title: Option<String>,
    ) -> Option<Self> {
        let playable_url = playable_url.into().trim().to_string();
        let parsed = url::Url::parse(&playable_url).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return None;
        }
        Some(Self {
            playable_url,
            thumbnail_url: non_blank(thumbnail_url),
            title: non_blank(title),
            source_provider,
        })
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    Network(String),
    Status(u16),
    Api(String),
    Malformed(String),
    Tool(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::Network(e) => write!(f, "network error: {e}"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::Api(msg) => write!(f, "api error: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed response: {msg}"),
            Self::Tool(msg) => write!(f, "extractor failed: {msg}"),
        }
    }
}

impl From<reqwest::Error> for FailureReason {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Outcome of one provider invocation. Failures are values, never panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResult {
    Success(MediaDescriptor),
    Empty,
    Failure(FailureReason),
}

impl ProviderResult {
    /// Success when the descriptor is valid, `Empty` otherwise.
    pub fn from_candidate(descriptor: Option<MediaDescriptor>) -> Self {
        descriptor.map_or(Self::Empty, Self::Success)
    }
}

#[async_trait::async_trait]
pub trait MediaProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Upper bound the chain enforces around [`MediaProvider::resolve`].
    fn timeout(&self) -> Duration {
        DEFAULT_PROVIDER_TIMEOUT
    }

    async fn resolve(&self, url: &NormalizedUrl) -> ProviderResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_requires_absolute_http_url() {
        assert!(MediaDescriptor::new("t", "", None, None).is_none());
        assert!(MediaDescriptor::new("t", "/video/media/play/1.mp4", None, None).is_none());
        assert!(MediaDescriptor::new("t", "ftp://host/a.mp4", None, None).is_none());

        let d = MediaDescriptor::new(
            "t",
            " https://cdn.example.com/a.mp4 ",
            Some("  ".into()),
            Some("clip".into()),
        )
        .unwrap();
        assert_eq!(d.playable_url, "https://cdn.example.com/a.mp4");
        assert_eq!(d.thumbnail_url, None);
        assert_eq!(d.title.as_deref(), Some("clip"));
    }
}
