// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and publish the retention TTL as a static gauge.
    /// Fails if another recorder is already installed in this process.
    pub fn init(ttl: Duration) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_gauge!("retention_ttl_secs", "Configured artifact time-to-live.");
        describe_gauge!("retention_artifacts", "Artifacts currently indexed.");
        describe_counter!("retrieval_bytes_total", "Bytes written to retained artifacts.");
        describe_counter!("retrieval_failures_total", "Failed media transfers.");
        describe_histogram!("retrieval_ms", "Media transfer time in milliseconds.");
        describe_histogram!("resolve_provider_ms", "Provider call time in milliseconds.");
        describe_counter!("sweeper_removed_total", "Artifacts evicted by the sweeper.");
        describe_counter!("sweeper_errors_total", "Evictions that failed.");

        gauge!("retention_ttl_secs").set(ttl.as_secs_f64());

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
