//! HTTP wire types shared by the sync server and client.
//!
//! One endpoint, `/api`, dispatches on the `action` query parameter. Records
//! travel as opaque JSON so that a server never needs to understand the
//! payload schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Path of the sync endpoint.
pub const API_PATH: &str = "/api";

/// Alias kept for clients configured against the old script name.
pub const LEGACY_API_PATH: &str = "/api.php";

pub const ERR_INVALID_SYNC_ID: &str = "invalid sync_id";
pub const ERR_INVALID_SHORT_CODE: &str = "invalid short_code";
pub const ERR_INVALID_INPUT: &str = "invalid input";
pub const ERR_NOT_FOUND: &str = "not found";
pub const ERR_ALREADY_DELETED: &str = "not found or already deleted";
pub const ERR_INVALID_ENDPOINT: &str = "invalid endpoint";
pub const ERR_SERVER: &str = "server error";
pub const ERR_PAYLOAD_TOO_LARGE: &str = "payload too large";

pub const RESULT_OK: &str = "ok";
pub const RESULT_DELETED: &str = "deleted";

/// Value of the `action` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// `GET` reads a record, `POST` upserts it.
    Data,
    /// `GET` resolves a short code to a sync id.
    Shortcode,
    /// `POST` removes a record.
    Delete,
}

impl Action {
    /// Query-string form of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Shortcode => "shortcode",
            Self::Delete => "delete",
        }
    }
}

/// Query parameters accepted by the endpoint. Everything is optional so
/// validation errors can be reported with the right message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiQuery {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub sync_id: Option<String>,
    #[serde(default)]
    pub short_code: Option<String>,
}

/// `POST ?action=data` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub sync_id: String,
    #[serde(default)]
    pub short_code: String,
    #[serde(default)]
    pub data: Value,
}

/// `POST ?action=delete` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub sync_id: String,
}

/// `GET ?action=data` success body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse {
    pub data: Value,
}

/// `GET ?action=shortcode` success body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortCodeResponse {
    pub sync_id: String,
}

/// Success body of the mutating actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultResponse {
    pub result: String,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}
