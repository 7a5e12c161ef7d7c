// src/resolve/providers/ytdlp.rs
//! Generic extractor fallback: shells out to the `yt-dlp` binary.
//!
//! Slowest and heaviest provider, so it runs last with a longer timeout.
//! The child is spawned with `kill_on_drop`, so a timed-out or cancelled
//! resolution does not leave a stray process behind.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::normalize::NormalizedUrl;
use crate::resolve::types::{FailureReason, MediaDescriptor, MediaProvider, ProviderResult};

pub const NAME: &str = "yt-dlp";

const STDERR_TAIL: usize = 300;

pub struct YtDlpProvider {
    binary: String,
    user_agent: String,
    cookies_path: Option<PathBuf>,
    timeout: Duration,
}

impl YtDlpProvider {
    pub fn new(binary: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            user_agent: user_agent.into(),
            cookies_path: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Cookies are only passed when the file actually exists.
    pub fn with_cookies(mut self, path: Option<PathBuf>) -> Self {
        self.cookies_path = path;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--user-agent".to_string(),
            self.user_agent.clone(),
        ];
        if let Some(path) = self.cookies_path.as_ref().filter(|p| p.exists()) {
            args.push("--cookies".to_string());
            args.push(path.display().to_string());
        }
        args.push(url.to_string());
        args
    }

    fn parse_output(stdout: &[u8]) -> ProviderResult {
        let json: Value = match serde_json::from_slice(stdout) {
            Ok(v) => v,
            Err(e) => {
                return ProviderResult::Failure(FailureReason::Malformed(format!(
                    "invalid JSON: {e}"
                )))
            }
        };

        // Prefer the merged top-level URL, else the first mp4 format.
        let play = json
            .get("url")
            .and_then(Value::as_str)
            .or_else(|| {
                json.get("formats")
                    .and_then(Value::as_array)
                    .and_then(|formats| {
                        formats.iter().find_map(|f| {
                            let is_mp4 = f.get("ext").and_then(Value::as_str) == Some("mp4");
                            is_mp4.then(|| f.get("url").and_then(Value::as_str)).flatten()
                        })
                    })
            })
            .unwrap_or_default();
        let thumb = json
            .get("thumbnail")
            .and_then(Value::as_str)
            .map(str::to_string);
        let title = json.get("title").and_then(Value::as_str).map(str::to_string);

        ProviderResult::from_candidate(MediaDescriptor::new(NAME, play, thumb, title))
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    let start = trimmed
        .char_indices()
        .rev()
        .nth(STDERR_TAIL - 1)
        .map_or(0, |(i, _)| i);
    trimmed[start..].to_string()
}

#[async_trait]
impl MediaProvider for YtDlpProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn resolve(&self, url: &NormalizedUrl) -> ProviderResult {
        let output = Command::new(&self.binary)
            .args(self.build_args(url.as_str()))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(o) => o,
            Err(e) => {
                return ProviderResult::Failure(FailureReason::Tool(format!(
                    "cannot run {}: {e}",
                    self.binary
                )))
            }
        };

        if !output.status.success() {
            let tail = stderr_tail(&output.stderr);
            let msg = if tail.is_empty() {
                format!("exit status {}", output.status)
            } else {
                tail
            };
            return ProviderResult::Failure(FailureReason::Tool(msg));
        }

        Self::parse_output(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_top_level_url_then_first_mp4_format() {
        let top = br#"{"url":"https://v.cdn/top.mp4","title":"a","thumbnail":"https://v.cdn/a.jpg"}"#;
        let formats = br#"{"title":"b","formats":[
            {"ext":"m4a","url":"https://v.cdn/audio.m4a"},
            {"ext":"mp4"},
            {"ext":"mp4","url":"https://v.cdn/video.mp4"}
        ]}"#;

        match YtDlpProvider::parse_output(top) {
            ProviderResult::Success(d) => {
                assert_eq!(d.playable_url, "https://v.cdn/top.mp4");
                assert_eq!(d.title.as_deref(), Some("a"));
            }
            other => panic!("expected success, got {other:?}"),
        }
        match YtDlpProvider::parse_output(formats) {
            ProviderResult::Success(d) => assert_eq!(d.playable_url, "https://v.cdn/video.mp4"),
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(
            YtDlpProvider::parse_output(br#"{"formats":[]}"#),
            ProviderResult::Empty
        );
    }

    #[test]
    fn cookies_flag_only_for_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cookies = dir.path().join("cookies.txt");

        let p = YtDlpProvider::new("yt-dlp", "ua").with_cookies(Some(cookies.clone()));
        assert!(!p.build_args("https://x/@u/video/1").contains(&"--cookies".to_string()));

        std::fs::write(&cookies, "# Netscape HTTP Cookie File\n").unwrap();
        let args = p.build_args("https://x/@u/video/1");
        assert!(args.contains(&"--cookies".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://x/@u/video/1"));
    }

    #[tokio::test]
    async fn missing_binary_is_tool_failure() {
        let p = YtDlpProvider::new("/nonexistent/yt-dlp-binary", "ua");
        let url = crate::normalize::Normalizer::default()
            .normalize("https://www.tiktok.com/@u/video/1")
            .unwrap();
        assert!(matches!(
            p.resolve(&url).await,
            ProviderResult::Failure(FailureReason::Tool(_))
        ));
    }
}
