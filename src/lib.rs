// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod resolve;
pub mod retention;
pub mod retrieve;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::normalize::{NormalizeMode, NormalizedUrl, Normalizer, RejectedInput};
pub use crate::resolve::types::{FailureReason, MediaDescriptor, MediaProvider, ProviderResult};
pub use crate::resolve::{ChainExhausted, ResolutionChain};
pub use crate::retention::sweeper::{Sweeper, SweeperHandle, SweeperState};
pub use crate::retention::{Artifact, ArtifactId, RetentionStore};
pub use crate::retrieve::{RetrievalError, Retriever};

use axum::Router;
use tracing::info;

/// Build the full service from config: state, router, and a running sweeper.
///
/// Must be called inside a tokio runtime (the sweeper is spawned here).
pub fn build_app(cfg: &AppConfig) -> anyhow::Result<(Router, SweeperHandle)> {
    let (state, report) = AppState::from_config(cfg)?;
    info!(
        dir = %state.store.dir().display(),
        adopted = report.adopted,
        partials_removed = report.partials_removed,
        unmanaged = report.unmanaged,
        "retention dir scanned"
    );
    info!(providers = ?state.chain.provider_names(), mode = %state.normalizer.mode(), "resolution chain ready");

    let sweeper = Sweeper::new(
        state.store.clone(),
        cfg.retention.ttl(),
        cfg.retention.sweep_interval(),
    )
    .spawn();

    let mut app = router(state);
    if cfg.metrics.enabled {
        let m = crate::metrics::Metrics::init(cfg.retention.ttl())?;
        app = app.merge(m.router::<()>());
    }
    Ok((app, sweeper))
}
