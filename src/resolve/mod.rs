// src/resolve/mod.rs
//! Resolution chain: try providers in priority order until one yields media.
//!
//! Providers run strictly one after another. The first `Success` wins and
//! nothing after it is invoked; `Empty` and `Failure` are recorded and the
//! loop moves on. Only the aggregate [`ChainExhausted`] leaves this module.

pub mod providers;
pub mod types;

use metrics::{counter, describe_counter, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::normalize::NormalizedUrl;
use crate::resolve::types::{FailureReason, MediaDescriptor, MediaProvider, ProviderResult};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "resolve_attempts_total",
            "Provider invocations by provider and outcome."
        );
        describe_counter!(
            "resolve_exhausted_total",
            "Resolutions where every provider came back empty or failed."
        );
    });
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Empty,
    Failed(FailureReason),
}

/// Why one provider did not produce media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderAttempt {
    pub provider: &'static str,
    pub outcome: AttemptOutcome,
}

impl fmt::Display for ProviderAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Empty => write!(f, "{}: no media", self.provider),
            AttemptOutcome::Failed(reason) => write!(f, "{}: {}", self.provider, reason),
        }
    }
}

/// Every provider was tried and none succeeded. One attempt per provider, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainExhausted {
    pub attempts: Vec<ProviderAttempt>,
}

impl fmt::Display for ChainExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return write!(f, "no providers configured");
        }
        write!(f, "all providers failed (")?;
        for (i, a) in self.attempts.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{a}")?;
        }
        write!(f, ")")
    }
}

impl std::error::Error for ChainExhausted {}

#[derive(Clone, Default)]
pub struct ResolutionChain {
    providers: Vec<Arc<dyn MediaProvider>>,
}

impl ResolutionChain {
    pub fn new(providers: Vec<Arc<dyn MediaProvider>>) -> Self {
        Self { providers }
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub async fn resolve(&self, url: &NormalizedUrl) -> Result<MediaDescriptor, ChainExhausted> {
        ensure_metrics_described();

        let mut attempts = Vec::with_capacity(self.providers.len());
        for p in &self.providers {
            let t0 = Instant::now();
            let result = match tokio::time::timeout(p.timeout(), p.resolve(url)).await {
                Ok(r) => r,
                Err(_) => ProviderResult::Failure(FailureReason::Timeout),
            };
            let elapsed_ms = t0.elapsed().as_secs_f64() * 1_000.0;
            histogram!("resolve_provider_ms", "provider" => p.name()).record(elapsed_ms);

            match result {
                ProviderResult::Success(descriptor) => {
                    counter!("resolve_attempts_total", "provider" => p.name(), "outcome" => "success")
                        .increment(1);
                    tracing::info!(provider = p.name(), elapsed_ms, %url, "resolved");
                    return Ok(descriptor);
                }
                ProviderResult::Empty => {
                    counter!("resolve_attempts_total", "provider" => p.name(), "outcome" => "empty")
                        .increment(1);
                    tracing::debug!(provider = p.name(), elapsed_ms, %url, "provider returned no media");
                    attempts.push(ProviderAttempt {
                        provider: p.name(),
                        outcome: AttemptOutcome::Empty,
                    });
                }
                ProviderResult::Failure(reason) => {
                    counter!("resolve_attempts_total", "provider" => p.name(), "outcome" => "failure")
                        .increment(1);
                    tracing::warn!(provider = p.name(), elapsed_ms, %url, %reason, "provider failed");
                    attempts.push(ProviderAttempt {
                        provider: p.name(),
                        outcome: AttemptOutcome::Failed(reason),
                    });
                }
            }
        }

        counter!("resolve_exhausted_total").increment(1);
        Err(ChainExhausted { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_message_lists_attempts_in_order() {
        let e = ChainExhausted {
            attempts: vec![
                ProviderAttempt {
                    provider: "a",
                    outcome: AttemptOutcome::Empty,
                },
                ProviderAttempt {
                    provider: "b",
                    outcome: AttemptOutcome::Failed(FailureReason::Status(503)),
                },
            ],
        };
        assert_eq!(
            e.to_string(),
            "all providers failed (a: no media; b: HTTP status 503)"
        );
        assert_eq!(
            ChainExhausted { attempts: vec![] }.to_string(),
            "no providers configured"
        );
    }
}
