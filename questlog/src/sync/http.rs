//! HTTP client for the `questlog-sync` API.

use std::time::Duration;

use questlog_proto::api::{
    API_PATH, Action, DataResponse, DeleteRequest, ERR_ALREADY_DELETED, ERR_NOT_FOUND,
    ErrorResponse, LEGACY_API_PATH, SaveRequest, ShortCodeResponse,
};
use questlog_proto::ids::SyncId;
use reqwest::{Response, StatusCode};
use serde_json::Value;
use url::Url;

use super::{SyncError, SyncStore};

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// [`SyncStore`] backed by a remote sync server.
#[derive(Debug, Clone)]
pub struct HttpSyncStore {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpSyncStore {
    /// Creates a client for the server at `server_url`.
    ///
    /// The URL may name the server root (`http://host:9100`) or the
    /// endpoint itself (`.../api` or `.../api.php`).
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidUrl`] if the URL cannot be parsed or has no
    /// path, [`SyncError::Transport`] if the HTTP client cannot be built.
    pub fn new(server_url: &str) -> Result<Self, SyncError> {
        let endpoint = endpoint_url(server_url)?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, endpoint })
    }

    /// Resolved endpoint URL.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url(&self, action: Action, params: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("action", action.as_str());
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        url
    }
}

fn endpoint_url(server_url: &str) -> Result<Url, SyncError> {
    let mut url = Url::parse(server_url.trim()).map_err(|e| SyncError::InvalidUrl(e.to_string()))?;
    if url.path().ends_with(API_PATH) || url.path().ends_with(LEGACY_API_PATH) {
        return Ok(url);
    }
    url.path_segments_mut()
        .map_err(|()| SyncError::InvalidUrl(server_url.to_string()))?
        .pop_if_empty()
        .push(API_PATH.trim_start_matches('/'));
    Ok(url)
}

/// Turns a non-success response into [`SyncError::Status`].
async fn status_error(response: Response) -> SyncError {
    let status = response.status().as_u16();
    let message = response
        .json::<ErrorResponse>()
        .await
        .map(|body| body.error)
        .unwrap_or_default();
    SyncError::Status { status, message }
}

/// Whether `err` is a 404 carrying `expected` as its message.
fn is_missing(err: &SyncError, expected: &str) -> bool {
    matches!(err, SyncError::Status { status: 404, message } if message == expected)
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, SyncError> {
    response
        .json::<T>()
        .await
        .map_err(|e| SyncError::Decode(e.to_string()))
}

impl SyncStore for HttpSyncStore {
    async fn fetch(&self, sync_id: &SyncId) -> Result<Option<Value>, SyncError> {
        let url = self.url(Action::Data, &[("sync_id", sync_id.as_str())]);
        let response = self.client.get(url).send().await?;
        if response.status().is_success() {
            let body: DataResponse = decode(response).await?;
            tracing::debug!(sync_id = %sync_id, "fetched record");
            return Ok(Some(body.data));
        }
        let err = status_error(response).await;
        if is_missing(&err, ERR_NOT_FOUND) {
            tracing::debug!(sync_id = %sync_id, "no record on server");
            return Ok(None);
        }
        Err(err)
    }

    async fn save(&self, sync_id: &SyncId, payload: &Value) -> Result<(), SyncError> {
        let body = SaveRequest {
            sync_id: sync_id.to_string(),
            short_code: sync_id.short_code().to_string(),
            data: payload.clone(),
        };
        let response = self
            .client
            .post(self.url(Action::Data, &[]))
            .json(&body)
            .send()
            .await?;
        if response.status().is_success() {
            tracing::debug!(sync_id = %sync_id, "saved record");
            return Ok(());
        }
        Err(status_error(response).await)
    }

    async fn delete(&self, sync_id: &SyncId) -> Result<bool, SyncError> {
        let body = DeleteRequest {
            sync_id: sync_id.to_string(),
        };
        let response = self
            .client
            .post(self.url(Action::Delete, &[]))
            .json(&body)
            .send()
            .await?;
        if response.status().is_success() {
            tracing::debug!(sync_id = %sync_id, "deleted record");
            return Ok(true);
        }
        let err = status_error(response).await;
        if is_missing(&err, ERR_ALREADY_DELETED) {
            return Ok(false);
        }
        Err(err)
    }

    async fn resolve_short_code(&self, code: &str) -> Result<Option<SyncId>, SyncError> {
        let url = self.url(Action::Shortcode, &[("short_code", code.trim())]);
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::OK {
            let body: ShortCodeResponse = decode(response).await?;
            let id = SyncId::parse(&body.sync_id).map_err(|e| SyncError::Decode(e.to_string()))?;
            return Ok(Some(id));
        }
        let err = status_error(response).await;
        if is_missing(&err, ERR_NOT_FOUND) {
            return Ok(None);
        }
        Err(err)
    }
}
