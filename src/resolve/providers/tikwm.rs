// src/resolve/providers/tikwm.rs
//! Direct metadata API: one form POST returns play URL, cover and title.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::normalize::NormalizedUrl;
use crate::resolve::types::{
    FailureReason, MediaDescriptor, MediaProvider, ProviderResult, DEFAULT_PROVIDER_TIMEOUT,
};

pub const NAME: &str = "tikwm";

#[derive(Debug, Deserialize)]
struct TikwmResponse {
    code: Option<i64>,
    msg: Option<String>,
    data: Option<TikwmData>,
}

#[derive(Debug, Deserialize)]
struct TikwmData {
    play: Option<String>,
    cover: Option<String>,
    title: Option<String>,
}

pub struct TikwmProvider {
    endpoint: String,
    client: Client,
    timeout: Duration,
}

impl TikwmProvider {
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
        let resp: TikwmResponse = match serde_json::from_str(body) {
            Ok(r) => r,
            Err(e) => return ProviderResult::Failure(FailureReason::Malformed(e.to_string())),
        };

        if let Some(code) = resp.code.filter(|c| *c != 0) {
            let msg = resp.msg.unwrap_or_else(|| "unknown".to_string());
            return ProviderResult::Failure(FailureReason::Api(format!("code {code}: {msg}")));
        }

        let candidate = resp.data.and_then(|d| {
            MediaDescriptor::new(NAME, d.play.unwrap_or_default(), d.cover, d.title)
        });
        ProviderResult::from_candidate(candidate)
    }
}

#[async_trait]
impl MediaProvider for TikwmProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn resolve(&self, url: &NormalizedUrl) -> ProviderResult {
        let resp = match self
            .client
            .post(&self.endpoint)
            .form(&[("url", url.as_str())])
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
