// src/api.rs
//! HTTP surface: preview, download, and re-serving retained downloads.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceExt as _;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::normalize::Normalizer;
use crate::resolve::providers::{build_chain, http_client};
use crate::resolve::ResolutionChain;
use crate::retention::{Artifact, ArtifactId, RebuildReport, RetentionStore};
use crate::retrieve::Retriever;

#[derive(Clone)]
pub struct AppState {
    pub normalizer: Arc<Normalizer>,
    pub chain: Arc<ResolutionChain>,
    pub retriever: Arc<Retriever>,
    pub store: Arc<RetentionStore>,
}

impl AppState {
    pub fn new(normalizer: Normalizer, chain: ResolutionChain, retriever: Retriever) -> Self {
        let store = retriever.store().clone();
        Self {
            normalizer: Arc::new(normalizer),
            chain: Arc::new(chain),
            retriever: Arc::new(retriever),
            store,
        }
    }

    /// Wire everything from config; the retention dir is scanned and re-indexed.
    pub fn from_config(cfg: &AppConfig) -> Result<(Self, RebuildReport)> {
        let mut normalizer = Normalizer::new(cfg.normalize.mode);
        if let Some(pattern) = &cfg.normalize.family_pattern {
            normalizer = normalizer
                .with_family_pattern(pattern)
                .context("invalid normalize.family_pattern")?;
        }

        let client = http_client(&cfg.providers.user_agent)?;
        let chain = build_chain(&cfg.providers, &client);

        let (store, report) = RetentionStore::open(&cfg.retention.dir)
            .with_context(|| format!("opening retention dir {}", cfg.retention.dir.display()))?;
        let retriever = Retriever::new(client, Arc::new(store))
            .with_max_transfer(cfg.retrieval.max_transfer())
            .with_max_bytes(cfg.retrieval.max_bytes);

        Ok((Self::new(normalizer, chain, retriever), report))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/preview", post(preview))
        .route("/download", post(download))
        .route("/downloads/{id}", get(serve_download))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct UrlReq {
    #[serde(default)]
    url: String,
}

/// The `url` field of a JSON, urlencoded or multipart body.
/// Any extraction failure is a 400 with the usual error body.
struct UrlInput(String);

impl<S> FromRequest<S> for UrlInput
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(body) = Form::<UrlReq>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            return Ok(Self(body.url));
        }

        if content_type.starts_with("multipart/form-data") {
            let mut form = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            while let Some(field) = form
                .next_field()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?
            {
                if field.name() == Some("url") {
                    let url = field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
                    return Ok(Self(url));
                }
            }
            return Ok(Self(String::new()));
        }

        let Json(body) = Json::<UrlReq>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(body.url))
    }
}

#[derive(Debug, Serialize)]
struct PreviewResp {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<String>,
    url: String,
    provider: &'static str,
}

async fn preview(
    State(state): State<AppState>,
    UrlInput(raw): UrlInput,
) -> Result<Json<PreviewResp>, ApiError> {
    let url = state.normalizer.normalize(&raw)?;
    let media = state.chain.resolve(&url).await?;
    Ok(Json(PreviewResp {
        success: true,
        title: media.title,
        thumbnail: media.thumbnail_url,
        url: media.playable_url,
        provider: media.source_provider,
    }))
}

async fn download(
    State(state): State<AppState>,
    UrlInput(raw): UrlInput,
) -> Result<Response, ApiError> {
    let url = state.normalizer.normalize(&raw)?;
    let media = state.chain.resolve(&url).await?;
    let artifact = state.retriever.retrieve(&media).await?;
    let name = attachment_name(media.title.as_deref());
    serve_artifact(&artifact, &name).await
}

async fn serve_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id: ArtifactId = id
        .trim_end_matches(".mp4")
        .parse()
        .map_err(|_| ApiError::NotFound)?;
    let artifact = state.store.get(&id)?;
    serve_artifact(&artifact, &format!("{id}.mp4")).await
}

async fn serve_artifact(artifact: &Artifact, download_name: &str) -> Result<Response, ApiError> {
    let req = Request::new(Body::empty());
    let resp = ServeFile::new(&artifact.file_path)
        .oneshot(req)
        .await
        .unwrap_or_else(|never| match never {});

    // The sweeper may have evicted it between lookup and open.
    if resp.status() == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound);
    }

    let mut resp = resp.map(Body::new).into_response();
    let disposition = format!("attachment; filename=\"{download_name}\"");
    let headers = resp.headers_mut();
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition).map_err(|e| ApiError::Internal(e.to_string()))?,
    );
    headers.insert(
        "x-artifact-id",
        HeaderValue::from_str(&artifact.id.to_string())
            .map_err(|e| ApiError::Internal(e.to_string()))?,
    );
    Ok(resp)
}

/// ASCII-only, quote-free file name derived from the title.
fn attachment_name(title: Option<&str>) -> String {
    let stem: String = title
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .take(80)
        .collect();
    let stem = stem.trim();
    if stem.is_empty() {
        "video.mp4".to_string()
    } else {
        format!("{stem}.mp4")
    }
}
