// src/config/app.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::normalize::NormalizeMode;

pub const ENV_CONFIG_PATH: &str = "CLIP_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

pub const ENV_RETENTION_DIR: &str = "RETENTION_DIR";
pub const ENV_RETENTION_TTL_SECS: &str = "RETENTION_TTL_SECS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "SWEEP_INTERVAL_SECS";
pub const ENV_NORMALIZE_MODE: &str = "NORMALIZE_MODE";
pub const ENV_YTDLP_COOKIES: &str = "YTDLP_COOKIES";

const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_SWEEP_SECS: u64 = 300;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 15;
const DEFAULT_YTDLP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_TRANSFER_SECS: u64 = 120;
const DEFAULT_MAX_BYTES: u64 = 200 * 1024 * 1024;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub retention: RetentionConfig,
    pub normalize: NormalizeConfig,
    pub providers: ProvidersConfig,
    pub retrieval: RetrievalConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub dir: PathBuf,
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("static/downloads"),
            ttl_secs: DEFAULT_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_SECS,
        }
    }
}

impl RetentionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub mode: NormalizeMode,
    /// Overrides the built-in link-family regex.
    pub family_pattern: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Tikwm,
    Snaptik,
    Ytdlp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Priority order; providers not listed are disabled.
    pub order: Vec<ProviderKind>,
    pub tikwm_endpoint: String,
    pub snaptik_endpoint: String,
    pub ytdlp_binary: String,
    pub cookies_path: Option<PathBuf>,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub ytdlp_timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            order: vec![ProviderKind::Tikwm, ProviderKind::Snaptik, ProviderKind::Ytdlp],
            tikwm_endpoint: "https://www.tikwm.com/api/".to_string(),
            snaptik_endpoint: "https://api.snaptik.app/api/v1/fetch".to_string(),
            ytdlp_binary: "yt-dlp".to_string(),
            cookies_path: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            ytdlp_timeout_secs: DEFAULT_YTDLP_TIMEOUT_SECS,
        }
    }
}

impl ProvidersConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn ytdlp_timeout(&self) -> Duration {
        Duration::from_secs(self.ytdlp_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_transfer_secs: u64,
    pub max_bytes: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_transfer_secs: DEFAULT_MAX_TRANSFER_SECS,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl RetrievalConfig {
    pub fn max_transfer(&self) -> Duration {
        Duration::from_secs(self.max_transfer_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg: AppConfig = toml::from_str(&data)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Resolve config using env var + fallbacks, then apply env overrides:
    /// 1) $CLIP_CONFIG_PATH
    /// 2) config/app.toml
    /// 3) defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from_file(DEFAULT_CONFIG_PATH)?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides()?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = env::var(ENV_RETENTION_DIR) {
            if !dir.trim().is_empty() {
                self.retention.dir = PathBuf::from(dir.trim());
            }
        }
        if let Some(v) = parse_secs_env(ENV_RETENTION_TTL_SECS)? {
            self.retention.ttl_secs = v;
        }
        if let Some(v) = parse_secs_env(ENV_SWEEP_INTERVAL_SECS)? {
            self.retention.sweep_interval_secs = v;
        }
        if let Ok(mode) = env::var(ENV_NORMALIZE_MODE) {
            self.normalize.mode = mode
                .parse()
                .map_err(|e: String| anyhow!("{ENV_NORMALIZE_MODE}: {e}"))?;
        }
        if let Ok(cookies) = env::var(ENV_YTDLP_COOKIES) {
            let pb = PathBuf::from(cookies.trim());
            self.providers.cookies_path = (!cookies.trim().is_empty()).then_some(pb);
        }
        Ok(())
    }

    /// Zero durations and limits fall back to defaults.
    fn sanitize(&mut self) {
        if self.retention.ttl_secs == 0 {
            self.retention.ttl_secs = DEFAULT_TTL_SECS;
        }
        if self.retention.sweep_interval_secs == 0 {
            self.retention.sweep_interval_secs = DEFAULT_SWEEP_SECS;
        }
        if self.providers.timeout_secs == 0 {
            self.providers.timeout_secs = DEFAULT_PROVIDER_TIMEOUT_SECS;
        }
        if self.providers.ytdlp_timeout_secs == 0 {
            self.providers.ytdlp_timeout_secs = DEFAULT_YTDLP_TIMEOUT_SECS;
        }
        if self.retrieval.max_transfer_secs == 0 {
            self.retrieval.max_transfer_secs = DEFAULT_MAX_TRANSFER_SECS;
        }
        if self.retrieval.max_bytes == 0 {
            self.retrieval.max_bytes = DEFAULT_MAX_BYTES;
        }
        if self.providers.user_agent.trim().is_empty() {
            self.providers.user_agent = DEFAULT_USER_AGENT.to_string();
        }
        // keep first occurrence of each provider
        let mut seen = Vec::with_capacity(self.providers.order.len());
        self.providers.order.retain(|k| {
            if seen.contains(k) {
                false
            } else {
                seen.push(*k);
                true
            }
        });
    }
}

fn parse_secs_env(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| anyhow!("{name}={raw:?}: {e}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults_and_sanitizes() {
        let toml = r#"
[retention]
ttl_secs = 0
dir = "/tmp/clips"

[providers]
order = ["ytdlp", "tikwm", "ytdlp"]
"#;
        let mut cfg: AppConfig = toml::from_str(toml).unwrap();
        cfg.sanitize();
        assert_eq!(cfg.retention.ttl_secs, DEFAULT_TTL_SECS);
        assert_eq!(cfg.retention.sweep_interval_secs, DEFAULT_SWEEP_SECS);
        assert_eq!(cfg.retention.dir, PathBuf::from("/tmp/clips"));
        assert_eq!(
            cfg.providers.order,
            vec![ProviderKind::Ytdlp, ProviderKind::Tikwm]
        );
        assert_eq!(cfg.normalize.mode, NormalizeMode::PrefixHttps);
    }
}
