// src/resolve/providers/mod.rs
pub mod snaptik;
pub mod tikwm;
pub mod ytdlp;

use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;

use crate::config::app::{ProviderKind, ProvidersConfig};
use crate::resolve::types::MediaProvider;
use crate::resolve::ResolutionChain;

pub use snaptik::SnaptikProvider;
pub use tikwm::TikwmProvider;
pub use ytdlp::YtDlpProvider;

/// Shared HTTP client for API providers and media transfers.
pub fn http_client(user_agent: &str) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .build()
        .context("building reqwest client")
}

/// Build providers in configured priority order.
pub fn build_chain(cfg: &ProvidersConfig, client: &Client) -> ResolutionChain {
    let providers = cfg
        .order
        .iter()
        .map(|kind| -> Arc<dyn MediaProvider> {
            match kind {
                ProviderKind::Tikwm => Arc::new(
                    TikwmProvider::new(cfg.tikwm_endpoint.clone(), client.clone())
                        .with_timeout(cfg.timeout()),
                ),
                ProviderKind::Snaptik => Arc::new(
                    SnaptikProvider::new(cfg.snaptik_endpoint.clone(), client.clone())
                        .with_timeout(cfg.timeout()),
                ),
                ProviderKind::Ytdlp => Arc::new(
                    YtDlpProvider::new(cfg.ytdlp_binary.clone(), cfg.user_agent.clone())
                        .with_cookies(cfg.cookies_path.clone())
                        .with_timeout(cfg.ytdlp_timeout()),
                ),
            }
        })
        .collect();
    ResolutionChain::new(providers)
}
