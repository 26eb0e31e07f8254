use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use weekpack_core::{now_ts, PackFailure, PackOptions, PackPage, PageRequest};
use weekpack_worker::PackCoordinator;

pub struct AppState {
    pub coordinator: PackCoordinator,
}

/// Body of `POST /scrape`. The `options` bag is loosely typed on the wire
/// and coerced into `PackOptions`; `mode` is accepted for forward
/// compatibility and has no alternative values yet.
#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    pub domain: String,
    pub pages: Vec<PageRequest>,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub options: Value,
}

fn default_mode() -> String {
    "fetch_if_changed".to_string()
}

#[derive(Debug, Serialize)]
pub struct ScrapeResponse {
    pub domain: String,
    pub checked_at: f64,
    pub cache_hit: bool,
    pub unchanged_urls: Vec<String>,
    pub changed_pages: Vec<PackPage>,
    pub errors: Vec<PackFailure>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/scrape", post(scrape))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn scrape(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScrapeRequest>,
) -> Result<Json<ScrapeResponse>, (StatusCode, String)> {
    let options = PackOptions::from_value(&req.options);
    debug!(
        domain = %req.domain,
        mode = %req.mode,
        pages = req.pages.len(),
        force_refresh = options.force_refresh,
        "scrape request"
    );

    let outcome = state
        .coordinator
        .build_or_fetch(&req.domain, &req.pages, &options)
        .await
        .map_err(|e| {
            error!(domain = %req.domain, error = %e, "pack build failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    Ok(Json(ScrapeResponse {
        domain: req.domain,
        checked_at: now_ts(),
        cache_hit: outcome.cache_hit,
        unchanged_urls: outcome.unchanged_urls,
        changed_pages: outcome.pages,
        errors: outcome.errors,
    }))
}
