//! Same-origin relay: forwards `GET {mount}/...` to the upstream statistics
//! service and normalizes every failure into a `{ "error": ... }` envelope.
//!
//! Only paths with at least one segment below the mount are forwarded. The bare
//! mount (`/api`, `/api/`) and anything outside it get a 404 envelope without
//! an upstream call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Path prefix the relay is mounted under, e.g. `/api`.
    pub mount_prefix: String,
    pub upstream_base_url: String,
    /// Freshness window for cached upstream bodies. Zero disables caching.
    pub cache_ttl: Duration,
    pub upstream_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mount_prefix: "/api".to_string(),
            upstream_base_url: String::new(),
            cache_ttl: Duration::from_secs(60),
            upstream_timeout_ms: 10_000,
        }
    }
}

impl RelayConfig {
    pub fn new(upstream_base_url: impl Into<String>) -> Self {
        Self {
            upstream_base_url: upstream_base_url.into(),
            ..Self::default()
        }
    }

    /// Mount without a trailing slash. The root mount is the empty string.
    fn normalized_mount(&self) -> String {
        let trimmed = self.mount_prefix.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream returned HTTP status {0}")]
    UpstreamStatus(u16),
    #[error("upstream body is not valid JSON: {0}")]
    InvalidBody(String),
    #[error("upstream request failed: {0}")]
    Request(String),
    #[error("HTTP client build error: {0}")]
    ClientBuild(String),
    #[error("no relayed resource at {0}")]
    NotRelayed(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotRelayed(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "unreachable",
            Self::Timeout => "timeout",
            Self::UpstreamStatus(_) => "status",
            Self::InvalidBody(_) => "invalid_body",
            Self::Request(_) => "request",
            Self::ClientBuild(_) => "client_build",
            Self::NotRelayed(_) => "not_relayed",
        }
    }

    /// Client-facing message. Upstream detail stays in the logs.
    fn public_message(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "statistics service is unreachable",
            Self::NotRelayed(_) => "no statistics resource at this path",
            _ => "failed to fetch statistics",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.public_message() }))).into_response()
    }
}

struct CachedBody {
    fetched_at: Instant,
    body: Bytes,
}

/// Short-lived cache of successful upstream bodies keyed by upstream URL.
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedBody>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, url: &str) -> Option<Bytes> {
        if self.ttl.is_zero() {
            return None;
        }
        let mut entries = self.entries();
        match entries.get(url) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => Some(entry.body.clone()),
            Some(_) => {
                entries.remove(url);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, url: String, body: Bytes) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries();
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.fetched_at.elapsed() < ttl);
        entries.insert(
            url,
            CachedBody {
                fetched_at: Instant::now(),
                body,
            },
        );
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CachedBody>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
struct RelayAppState {
    mount: String,
    upstream_base_url: String,
    client: reqwest::Client,
    cache: Arc<ResponseCache>,
}

/// Builds the relay router. Any `GET {mount}/{*rest}` is forwarded; every
/// other request is answered with a 404 envelope.
pub fn relay_router(cfg: &RelayConfig) -> Result<Router, RelayError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(cfg.upstream_timeout_ms))
        .build()
        .map_err(|err| RelayError::ClientBuild(err.to_string()))?;

    let mount = cfg.normalized_mount();
    let state = RelayAppState {
        mount: mount.clone(),
        upstream_base_url: cfg.upstream_base_url.trim_end_matches('/').to_string(),
        client,
        cache: Arc::new(ResponseCache::new(cfg.cache_ttl)),
    };

    info!(
        component = "relay",
        event = "relay.configured",
        mount = if mount.is_empty() { "/" } else { mount.as_str() },
        cache_ttl_ms = cfg.cache_ttl.as_millis() as u64,
        upstream_timeout_ms = cfg.upstream_timeout_ms
    );

    Ok(Router::new()
        .route(&format!("{mount}/{{*rest}}"), get(forward))
        .fallback(not_relayed)
        .with_state(state))
}

/// Upstream URL for a request URI: the mount prefix is stripped and the rest,
/// query included, is appended to `upstream_base_url`.
pub fn upstream_url(upstream_base_url: &str, mount: &str, uri: &Uri) -> String {
    let path = uri.path();
    let rest = path.strip_prefix(mount).unwrap_or(path);
    match uri.query() {
        Some(query) => format!("{upstream_base_url}{rest}?{query}"),
        None => format!("{upstream_base_url}{rest}"),
    }
}

async fn forward(State(state): State<RelayAppState>, uri: Uri) -> Result<Response, RelayError> {
    info!(
        component = "relay",
        event = "relay.request",
        path = %uri.path()
    );
    let below_mount = uri.path().strip_prefix(state.mount.as_str()).unwrap_or_default();
    if below_mount.trim_matches('/').is_empty() {
        return Err(not_relayed(uri).await);
    }
    let url = upstream_url(&state.upstream_base_url, &state.mount, &uri);

    if let Some(body) = state.cache.get(&url) {
        debug!(component = "relay", event = "relay.cache.hit", path = %uri.path());
        return Ok(json_response(body));
    }

    match fetch_upstream(&state.client, &url).await {
        Ok(body) => {
            state.cache.insert(url, body.clone());
            Ok(json_response(body))
        }
        Err(err) => {
            warn!(
                component = "relay",
                event = "relay.upstream.error",
                kind = err.kind(),
                status = err.status().as_u16(),
                error = %err
            );
            Err(err)
        }
    }
}

async fn not_relayed(uri: Uri) -> RelayError {
    debug!(component = "relay", event = "relay.not_relayed", path = %uri.path());
    RelayError::NotRelayed(uri.path().to_string())
}

async fn fetch_upstream(client: &reqwest::Client, url: &str) -> Result<Bytes, RelayError> {
    let response = client.get(url).send().await.map_err(classify_send_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(RelayError::UpstreamStatus(status.as_u16()));
    }

    let body = response.bytes().await.map_err(|err| {
        if err.is_timeout() {
            RelayError::Timeout
        } else {
            RelayError::Request(err.to_string())
        }
    })?;

    serde_json::from_slice::<serde_json::Value>(&body)
        .map_err(|err| RelayError::InvalidBody(err.to_string()))?;
    Ok(body)
}

fn classify_send_error(err: reqwest::Error) -> RelayError {
    if err.is_timeout() {
        RelayError::Timeout
    } else if err.is_connect() {
        RelayError::Unreachable(err.to_string())
    } else {
        RelayError::Request(err.to_string())
    }
}

fn json_response(body: Bytes) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}
