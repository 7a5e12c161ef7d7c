// src/normalize.rs
//! URL normalizer: turns raw user input into a link the providers accept.
//!
//! Three policies exist for scheme handling and link-family validation, see
//! [`NormalizeMode`]. Whatever the mode, tracking parameters (everything from
//! the first `?`) and `#fragment`s are dropped.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `/@user/video/<digits>` on any host, or a `vm.`/`vt.` short link.
pub const DEFAULT_FAMILY_PATTERN: &str =
    r"^https?://[^/]+/@[A-Za-z0-9._-]+/video/\d+/?$|^https?://(vm|vt)\.tiktok\.com/[A-Za-z0-9]+/?$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMode {
    /// Scheme required, link family required.
    Strict,
    /// Missing scheme gets `https://`, link family required.
    #[default]
    PrefixHttps,
    /// Missing scheme gets `https://`, any host accepted.
    Permissive,
}

impl NormalizeMode {
    fn prefixes_scheme(self) -> bool {
        !matches!(self, Self::Strict)
    }

    fn checks_family(self) -> bool {
        !matches!(self, Self::Permissive)
    }
}

impl FromStr for NormalizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "strict" => Ok(Self::Strict),
            "prefix_https" | "prefix" => Ok(Self::PrefixHttps),
            "permissive" => Ok(Self::Permissive),
            other => Err(format!("unknown normalize mode: {other}")),
        }
    }
}

impl fmt::Display for NormalizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::PrefixHttps => write!(f, "prefix_https"),
            Self::Permissive => write!(f, "permissive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectedInput {
    #[error("missing video URL")]
    Empty,
    #[error("URL must start with http:// or https://")]
    MissingScheme,
    #[error("malformed URL: {0}")]
    Malformed(String),
    #[error("not a supported video link: {0}")]
    UnsupportedLink(String),
}

/// A link that passed normalization. Only [`Normalizer`] can build one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    mode: NormalizeMode,
    family: Regex,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            mode: NormalizeMode::default(),
            family: default_family().clone(),
        }
    }
}

fn default_family() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(DEFAULT_FAMILY_PATTERN).expect("default family regex"))
}

impl Normalizer {
    pub fn new(mode: NormalizeMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Replace the link-family pattern. Fails on an invalid regex.
    pub fn with_family_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.family = Regex::new(pattern)?;
        Ok(self)
    }

    pub fn mode(&self) -> NormalizeMode {
        self.mode
    }

    pub fn normalize(&self, raw: &str) -> Result<NormalizedUrl, RejectedInput> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RejectedInput::Empty);
        }

        // Drop tracking params and fragments
        let cut = trimmed.find(['?', '#']).unwrap_or(trimmed.len());
        let stripped = trimmed[..cut].trim();
        if stripped.is_empty() {
            return Err(RejectedInput::Empty);
        }

        let with_scheme = if has_http_scheme(stripped) {
            lowercase_origin(stripped)
        } else if self.mode.prefixes_scheme() {
            if stripped.contains("://") {
                return Err(RejectedInput::Malformed(stripped.to_string()));
            }
            lowercase_origin(&format!("https://{stripped}"))
        } else {
            return Err(RejectedInput::MissingScheme);
        };

        let parsed = url::Url::parse(&with_scheme)
            .map_err(|e| RejectedInput::Malformed(format!("{with_scheme}: {e}")))?;
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(RejectedInput::Malformed(with_scheme));
        }

        if self.mode.checks_family() && !self.family.is_match(&with_scheme) {
            return Err(RejectedInput::UnsupportedLink(with_scheme));
        }

        Ok(NormalizedUrl(with_scheme))
    }
}

fn has_http_scheme(s: &str) -> bool {
    let lower = s.get(..8).unwrap_or(s).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Scheme and host are case-insensitive; the path is kept as typed.
fn lowercase_origin(s: &str) -> String {
    let Some(sep) = s.find("://") else {
        return s.to_string();
    };
    let authority_start = sep + 3;
    let end = s[authority_start..]
        .find('/')
        .map_or(s.len(), |i| authority_start + i);
    format!("{}{}", s[..end].to_ascii_lowercase(), &s[end..])
}
