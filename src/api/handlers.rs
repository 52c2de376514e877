//! API Handlers
//!
//! Management endpoints under `/__agent` and the fallback proxy that sends
//! every other request through the agent.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Path, Query, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, warn};

use crate::agent::{AgentResponse, OfflineAgent};
use crate::error::{CacheError, Result};
use crate::models::{
    DeleteStoreResponse, FetchQuery, FetchResponse, HealthResponse, LifecycleResponse,
    ReleaseClientResponse, StatsResponse, StoreKeysResponse, StoresResponse,
};
use crate::request::{AgentRequest, RequestMode};

/// Header naming the client a request belongs to.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Response header reporting `hit`, `miss` or `bypass`.
pub const CACHE_STATUS_HEADER: &str = "x-offline-cache";

/// Largest request body forwarded upstream.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Response headers recomputed by the server.
const SKIPPED_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
];

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<OfflineAgent>,
    /// Origin prefixed to proxied paths
    pub site_origin: String,
}

impl AppState {
    pub fn new(agent: Arc<OfflineAgent>, site_origin: impl Into<String>) -> Self {
        Self {
            agent,
            site_origin: site_origin.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Handler for GET /__agent/health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let lifecycle = state.agent.lifecycle();
    Json(HealthResponse::new(lifecycle.version(), lifecycle.state().await))
}

/// Handler for GET /__agent/stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.agent.stats().await))
}

/// Handler for GET /__agent/lifecycle
pub async fn lifecycle_handler(State(state): State<AppState>) -> Json<LifecycleResponse> {
    let lifecycle = state.agent.lifecycle();
    Json(LifecycleResponse {
        version: lifecycle.version().to_string(),
        state: lifecycle.state().await,
        precache_store: lifecycle.precache_store().to_string(),
        precache_entries: lifecycle.manifest().len(),
        clients: lifecycle.clients().list().await,
        activation: lifecycle.activation().await,
    })
}

/// Handler for DELETE /__agent/clients/:id
///
/// Releasing the last client of an older version lets a waiting version
/// activate.
pub async fn release_client_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReleaseClientResponse>> {
    if !state.agent.disconnect_client(&id).await? {
        return Err(CacheError::InvalidRequest(format!("Unknown client: {}", id)));
    }
    let lifecycle_state = state.agent.lifecycle().state().await;
    Ok(Json(ReleaseClientResponse::new(id, lifecycle_state)))
}

/// Handler for GET /__agent/stores
pub async fn list_stores_handler(State(state): State<AppState>) -> Result<Json<StoresResponse>> {
    let stores = state.agent.store_names().await?;
    Ok(Json(StoresResponse { stores }))
}

/// Handler for GET /__agent/stores/:name
///
/// Store names containing `/` must be percent-encoded.
pub async fn store_keys_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StoreKeysResponse>> {
    let keys = state.agent.list_keys(&name).await?;
    Ok(Json(StoreKeysResponse::new(name, keys)))
}

/// Handler for DELETE /__agent/stores/:name
pub async fn delete_store_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeleteStoreResponse>> {
    if !state.agent.delete_store(&name).await? {
        return Err(CacheError::InvalidRequest(format!("Unknown store: {}", name)));
    }
    Ok(Json(DeleteStoreResponse::new(name)))
}

/// Handler for GET /__agent/fetch?url=
pub async fn fetch_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FetchQuery>,
) -> Result<Json<FetchResponse>> {
    if let Some(error_msg) = query.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }
    register_client(&state, &headers).await;

    let agent_response = state.agent.handle(&query.to_request()).await?;
    Ok(Json(FetchResponse::new(query.url, &agent_response)))
}

// == Proxy ==
/// Fallback handler: answers any other request through the agent.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Result<Response> {
    register_client(&state, request.headers()).await;

    let agent_request = to_agent_request(&state.site_origin, request).await?;
    debug!("Proxying {} {}", agent_request.method, agent_request.url);

    let agent_response = state.agent.handle(&agent_request).await?;
    Ok(into_http_response(agent_response))
}

async fn register_client(state: &AppState, headers: &HeaderMap) {
    if let Some(id) = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| !id.is_empty())
    {
        state.agent.connect_client(id).await;
    }
}

/// Builds the intercepted request seen by the agent.
pub async fn to_agent_request(site_origin: &str, request: Request) -> Result<AgentRequest> {
    let (parts, body) = request.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut agent_request = AgentRequest::get(format!("{}{}", site_origin, path))
        .with_method(parts.method.clone())
        .with_mode(request_mode(&parts.method, &parts.headers));

    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            agent_request = agent_request.with_header(name.as_str(), value);
        }
    }

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| CacheError::InvalidRequest(format!("Unreadable request body: {}", e)))?;
    Ok(agent_request.with_body(body))
}

/// Navigation when the browser says so, or for a GET that accepts HTML.
fn request_mode(method: &Method, headers: &HeaderMap) -> RequestMode {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    match header("sec-fetch-mode") {
        Some("navigate") => RequestMode::Navigate,
        Some("cors") => RequestMode::Cors,
        Some("no-cors") => RequestMode::NoCors,
        Some("same-origin") => RequestMode::SameOrigin,
        _ if method == Method::GET
            && header("accept").is_some_and(|accept| accept.contains("text/html")) =>
        {
            RequestMode::Navigate
        }
        _ => RequestMode::SameOrigin,
    }
}

fn into_http_response(agent_response: AgentResponse) -> Response {
    let cached = agent_response.response;
    let status = StatusCode::from_u16(cached.status).unwrap_or_else(|_| {
        // Opaque responses carry status 0
        warn!("Replacing unrepresentable status {} with 502", cached.status);
        StatusCode::BAD_GATEWAY
    });

    let mut response = (status, Body::from(cached.body)).into_response();
    let headers = response.headers_mut();
    for (name, value) in &cached.headers {
        if SKIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert(
        CACHE_STATUS_HEADER,
        HeaderValue::from_static(agent_response.cache_status.as_str()),
    );
    response
}
