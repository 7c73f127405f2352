//! HTTP endpoint: shared state, action dispatch, CORS, and server startup.
//!
//! A single path (`/api`, plus the `/api.php` alias) serves every action.
//! The action comes from the `action` query parameter; identifiers come
//! from the query for reads and from the JSON body for writes.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, Request, State};
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use questlog_proto::api::{
    self, ApiQuery, DataResponse, DeleteRequest, ErrorResponse, ResultResponse, SaveRequest,
    ShortCodeResponse,
};
use questlog_proto::ids::SyncId;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::store::{RecordStore, StoreError};

/// Default maximum request body in bytes (256 KiB).
const DEFAULT_MAX_PAYLOAD_SIZE: usize = 256 * 1024;

/// How long browsers may cache a preflight response (20 days).
const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(1_728_000);

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Shared server state.
pub struct SyncState {
    /// Persistent records.
    pub store: RecordStore,
    max_payload_size: usize,
    allowed_origins: Vec<String>,
}

impl SyncState {
    /// Creates state over an in-memory store with default limits and no
    /// allowed browser origins.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the in-memory database cannot be created.
    pub fn new() -> Result<Self, StoreError> {
        Ok(Self::with_config(
            RecordStore::in_memory()?,
            DEFAULT_MAX_PAYLOAD_SIZE,
            Vec::new(),
        ))
    }

    /// Creates state from an opened store and resolved settings.
    #[must_use]
    pub const fn with_config(
        store: RecordStore,
        max_payload_size: usize,
        allowed_origins: Vec<String>,
    ) -> Self {
        Self {
            store,
            max_payload_size,
            allowed_origins,
        }
    }
}

/// Builds the router for the given state.
pub fn router(state: Arc<SyncState>) -> Router {
    let cors = cors_layer(&state.allowed_origins);
    let limit = state.max_payload_size;
    Router::new()
        .route(api::API_PATH, any(api_handler))
        .route(api::LEGACY_API_PATH, any(api_handler))
        .fallback(invalid_endpoint)
        .layer(DefaultBodyLimit::max(limit))
        .layer(cors)
        .layer(middleware::from_fn(preflight_no_content))
        .with_state(state)
}

/// CORS restricted to `origins`, with credentials. A `*` entry echoes the
/// caller's origin instead, since a literal wildcard cannot carry
/// credentials.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let list: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o.trim_end_matches('/')) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(list)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .max_age(PREFLIGHT_MAX_AGE)
}

/// Preflights answer `204 No Content`.
async fn preflight_no_content(req: Request, next: Next) -> Response {
    let is_options = req.method() == Method::OPTIONS;
    let mut response = next.run(req).await;
    if is_options && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    json_response(status, &ErrorResponse::new(message))
}

fn server_error(e: &StoreError) -> Response {
    tracing::error!(error = %e, "store operation failed");
    error(StatusCode::INTERNAL_SERVER_ERROR, api::ERR_SERVER)
}

async fn invalid_endpoint() -> Response {
    error(StatusCode::NOT_FOUND, api::ERR_INVALID_ENDPOINT)
}

/// Runs a blocking store operation off the async runtime.
async fn with_store<T, F>(state: &Arc<SyncState>, op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&RecordStore) -> Result<T, StoreError> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || op(&state.store))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

async fn api_handler(
    State(state): State<Arc<SyncState>>,
    method: Method,
    query: Result<Query<ApiQuery>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let action = query.action.as_deref().unwrap_or_default();

    if method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    let is_get = method == Method::GET;
    let is_post = method == Method::POST;

    match action {
        "data" if is_get => get_data(&state, query.sync_id.as_deref()).await,
        "shortcode" if is_get => resolve_short_code(&state, query.short_code.as_deref()).await,
        "data" | "delete" if is_post => {
            let body = match body {
                Ok(body) => body,
                Err(rejection) => {
                    tracing::debug!(error = %rejection, "rejected request body");
                    let status = rejection.status();
                    let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
                        api::ERR_PAYLOAD_TOO_LARGE
                    } else {
                        api::ERR_INVALID_INPUT
                    };
                    return error(status, message);
                }
            };
            if action == "data" {
                save_data(&state, &body).await
            } else {
                delete_record(&state, &body).await
            }
        }
        _ => error(StatusCode::NOT_FOUND, api::ERR_INVALID_ENDPOINT),
    }
}

async fn get_data(state: &Arc<SyncState>, sync_id: Option<&str>) -> Response {
    let Some(sync_id) = sync_id.and_then(|s| SyncId::parse(s).ok()) else {
        return error(StatusCode::BAD_REQUEST, api::ERR_INVALID_SYNC_ID);
    };
    let id = sync_id.clone();
    match with_store(state, move |store| store.get(&id)).await {
        Ok(Some(data)) => {
            tracing::debug!(sync_id = %sync_id, "record served");
            json_response(StatusCode::OK, &DataResponse { data })
        }
        Ok(None) => error(StatusCode::NOT_FOUND, api::ERR_NOT_FOUND),
        Err(e) => server_error(&e),
    }
}

async fn resolve_short_code(state: &Arc<SyncState>, code: Option<&str>) -> Response {
    let Some(sync_id) = code.and_then(|s| SyncId::parse(s).ok()) else {
        return error(StatusCode::BAD_REQUEST, api::ERR_INVALID_SHORT_CODE);
    };
    let id = sync_id.clone();
    match with_store(state, move |store| store.exists(&id)).await {
        Ok(true) => json_response(
            StatusCode::OK,
            &ShortCodeResponse {
                sync_id: sync_id.to_string(),
            },
        ),
        Ok(false) => error(StatusCode::NOT_FOUND, api::ERR_NOT_FOUND),
        Err(e) => server_error(&e),
    }
}

async fn save_data(state: &Arc<SyncState>, body: &[u8]) -> Response {
    let Ok(req) = serde_json::from_slice::<SaveRequest>(body) else {
        return error(StatusCode::BAD_REQUEST, api::ERR_INVALID_INPUT);
    };
    let Ok(sync_id) = SyncId::parse(&req.sync_id) else {
        return error(StatusCode::BAD_REQUEST, api::ERR_INVALID_INPUT);
    };
    if req.data.is_null() {
        return error(StatusCode::BAD_REQUEST, api::ERR_INVALID_INPUT);
    }

    let id = sync_id.clone();
    match with_store(state, move |store| store.upsert(&id, &req.data)).await {
        Ok(()) => {
            tracing::info!(sync_id = %sync_id, bytes = body.len(), "record saved");
            json_response(
                StatusCode::OK,
                &ResultResponse {
                    result: api::RESULT_OK.to_string(),
                },
            )
        }
        Err(e) => server_error(&e),
    }
}

async fn delete_record(state: &Arc<SyncState>, body: &[u8]) -> Response {
    let sync_id = serde_json::from_slice::<DeleteRequest>(body)
        .ok()
        .and_then(|req| SyncId::parse(&req.sync_id).ok());
    let Some(sync_id) = sync_id else {
        return error(StatusCode::BAD_REQUEST, api::ERR_INVALID_SYNC_ID);
    };

    let id = sync_id.clone();
    match with_store(state, move |store| store.delete(&id)).await {
        Ok(true) => {
            tracing::info!(sync_id = %sync_id, "record deleted");
            json_response(
                StatusCode::OK,
                &ResultResponse {
                    result: api::RESULT_DELETED.to_string(),
                },
            )
        }
        Ok(false) => error(StatusCode::NOT_FOUND, api::ERR_ALREADY_DELETED),
        Err(e) => server_error(&e),
    }
}

/// Starts the server on `addr` with an in-memory store.
///
/// # Errors
///
/// Returns an error if the store cannot be created or the TCP listener
/// cannot bind.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(SyncState::new()?)).await
}

/// Starts the server with a pre-configured [`SyncState`] and returns the
/// bound address and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<SyncState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "sync server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the server in-process on `127.0.0.1:0` for testing.
#[cfg(test)]
pub async fn start_test_server(
    allowed_origins: Vec<String>,
) -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let state = SyncState::with_config(RecordStore::in_memory().unwrap(), 1024, allowed_origins);
    start_server_with_state("127.0.0.1:0", Arc::new(state))
        .await
        .expect("failed to start test server")
}
