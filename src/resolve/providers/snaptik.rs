// src/resolve/providers/snaptik.rs
//! Scraping API. The endpoint has shipped several JSON layouts over time and
//! sometimes answers with an HTML page instead; all of them are handled here.

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::normalize::NormalizedUrl;
use crate::resolve::types::{
    FailureReason, MediaDescriptor, MediaProvider, ProviderResult, DEFAULT_PROVIDER_TIMEOUT,
};

pub const NAME: &str = "snaptik";

pub struct SnaptikProvider {
    endpoint: String,
    client: Client,
    timeout: Duration,
}

impl SnaptikProvider {
    pub fn new(endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn parse_body(body: &str) -> ProviderResult {
        match serde_json::from_str::<Value>(body) {
            Ok(json) => Self::parse_json(&json),
            Err(_) if looks_like_html(body) => ProviderResult::from_candidate(scrape_html(body)),
            Err(e) => ProviderResult::Failure(FailureReason::Malformed(e.to_string())),
        }
    }

    fn parse_json(json: &Value) -> ProviderResult {
        if let Some(status) = json.get("status").and_then(Value::as_str) {
            if !status.eq_ignore_ascii_case("ok") {
                let msg = json
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or(status);
                return ProviderResult::Failure(FailureReason::Api(msg.to_string()));
            }
        }

        let Some(video) = json.get("video") else {
            return ProviderResult::Empty;
        };

        // {"video": "https://..", "cover": ".."}
        if let Some(play) = video.as_str() {
            let thumb = string_at(json, "cover");
            let title = string_at(json, "title");
            return ProviderResult::from_candidate(MediaDescriptor::new(NAME, play, thumb, title));
        }

        // {"video": {"urls": [..]}} or {"video": {"play": ..}}
        let play = video
            .get("urls")
            .and_then(Value::as_array)
            .and_then(|urls| urls.iter().find_map(Value::as_str))
            .or_else(|| video.get("play").and_then(Value::as_str))
            .unwrap_or_default();
        let thumb = string_at(video, "thumbnail").or_else(|| string_at(video, "cover"));
        let title = string_at(video, "title");
        ProviderResult::from_candidate(MediaDescriptor::new(NAME, play, thumb, title))
    }
}

fn string_at(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start();
    head.starts_with('<')
}

/// First anchor that points at an mp4 or a download endpoint.
fn scrape_html(body: &str) -> Option<MediaDescriptor> {
    static RE_HREF: OnceCell<Regex> = OnceCell::new();
    static RE_IMG: OnceCell<Regex> = OnceCell::new();
    let re_href =
        RE_HREF.get_or_init(|| Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).unwrap());
    let re_img = RE_IMG.get_or_init(|| Regex::new(r#"(?i)<img[^>]+src\s*=\s*["']([^"']+)["']"#).unwrap());

    let play = re_href
        .captures_iter(body)
        .map(|c| html_escape::decode_html_entities(&c[1]).to_string())
        .find(|href| {
            let lower = href.to_ascii_lowercase();
            lower.starts_with("http") && (lower.contains(".mp4") || lower.contains("download"))
        })?;
    let thumb = re_img
        .captures(body)
        .map(|c| html_escape::decode_html_entities(&c[1]).to_string())
        .filter(|src| src.starts_with("http"));

    MediaDescriptor::new(NAME, play, thumb, None)
}

#[async_trait]
impl MediaProvider for SnaptikProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn resolve(&self, url: &NormalizedUrl) -> ProviderResult {
        let resp = match self
            .client
            .get(&self.endpoint)
            .query(&[("url", url.as_str())])
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ProviderResult::Failure(e.into()),
        };

        let status = resp.status();
        if !status.is_success() {
            return ProviderResult::Failure(FailureReason::Status(status.as_u16()));
        }

        match resp.text().await {
            Ok(body) => Self::parse_body(&body),
            Err(e) => ProviderResult::Failure(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playable(r: ProviderResult) -> String {
        match r {
            ProviderResult::Success(d) => d.playable_url,
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn accepts_each_json_layout() {
        let urls = r#"{"video":{"urls":["https://v.snap/1.mp4"],"thumbnail":"https://v.snap/1.jpg"}}"#;
        let play = r#"{"status":"ok","video":{"play":"https://v.snap/2.mp4","title":"t"}}"#;
        let flat = r#"{"video":"https://v.snap/3.mp4","cover":"https://v.snap/3.jpg"}"#;
        assert_eq!(playable(SnaptikProvider::parse_body(urls)), "https://v.snap/1.mp4");
        assert_eq!(playable(SnaptikProvider::parse_body(play)), "https://v.snap/2.mp4");
        assert_eq!(playable(SnaptikProvider::parse_body(flat)), "https://v.snap/3.mp4");
    }

    #[test]
    fn error_status_is_failure_and_missing_video_is_empty() {
        assert!(matches!(
            SnaptikProvider::parse_body(r#"{"status":"error","message":"rate limited"}"#),
            ProviderResult::Failure(FailureReason::Api(m)) if m == "rate limited"
        ));
        assert_eq!(
            SnaptikProvider::parse_body(r#"{"video":{"urls":[]}}"#),
            ProviderResult::Empty
        );
    }

    #[test]
    fn scrapes_download_anchor_from_html() {
        let html = r#"<html><body>
            <img class="thumb" src="https://img.snap/c.jpg">
            <a href="/home">home</a>
            <a href="https://dl.snap/get?id=7&amp;token=abc.mp4" class="btn">Download</a>
        </body></html>"#;
        match SnaptikProvider::parse_body(html) {
            ProviderResult::Success(d) => {
                assert_eq!(d.playable_url, "https://dl.snap/get?id=7&token=abc.mp4");
                assert_eq!(d.thumbnail_url.as_deref(), Some("https://img.snap/c.jpg"));
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(
            SnaptikProvider::parse_body("<html>nothing here</html>"),
            ProviderResult::Empty
        );
    }
}
