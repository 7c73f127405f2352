//! Remote record storage for tracker state.
//!
//! Defines the [`SyncStore`] trait the tracker persists through.
//! Implementations:
//! - [`http::HttpSyncStore`] -- talks to a `questlog-sync` server
//! - [`memory::MemorySyncStore`] -- in-process map for tests and offline use
//!
//! Records are opaque JSON at this layer; schema handling happens in the
//! session after a fetch.

pub mod http;
pub mod memory;

use std::future::Future;

use questlog_proto::ids::SyncId;
use serde_json::Value;

/// Errors from a sync store.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The request never completed (DNS, connect, timeout, TLS).
    #[error("sync server unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with an error status.
    #[error("sync server returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// `error` field of the response body, if any.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected response from sync server: {0}")]
    Decode(String),

    /// The configured server URL cannot address the API.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    /// The store is deliberately offline.
    #[error("sync store unavailable")]
    Unavailable,
}

/// Keyed storage of whole tracker records, last write wins.
///
/// Missing records are reported as `None`/`false`, never as errors, so a
/// first launch reads as a brand-new empty record.
pub trait SyncStore: Send + Sync {
    /// Reads the record stored under `sync_id`.
    fn fetch(
        &self,
        sync_id: &SyncId,
    ) -> impl Future<Output = Result<Option<Value>, SyncError>> + Send;

    /// Replaces the record stored under `sync_id`. The id doubles as the
    /// record's short code.
    fn save(
        &self,
        sync_id: &SyncId,
        payload: &Value,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Removes the record. Returns `false` if nothing was stored.
    fn delete(&self, sync_id: &SyncId) -> impl Future<Output = Result<bool, SyncError>> + Send;

    /// Looks up the sync id a short code belongs to.
    fn resolve_short_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<Option<SyncId>, SyncError>> + Send;
}
