//! In-process sync store.
//!
//! Keeps records in a map behind a [`parking_lot::Mutex`]. Clones share the
//! same map, so two trackers built on clones of one store behave like two
//! devices talking to one server. [`MemorySyncStore::set_offline`] makes
//! every call fail, for exercising the retry path.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use questlog_proto::ids::SyncId;
use serde_json::Value;

use super::{SyncError, SyncStore};

#[derive(Debug, Default)]
struct Shared {
    records: Mutex<HashMap<SyncId, Value>>,
    offline: AtomicBool,
}

/// [`SyncStore`] held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySyncStore {
    shared: Arc<Shared>,
}

impl MemorySyncStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When `true`, every operation returns [`SyncError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.shared.offline.store(offline, Ordering::SeqCst);
    }

    /// Stored record, bypassing the offline switch.
    #[must_use]
    pub fn record(&self, sync_id: &SyncId) -> Option<Value> {
        self.shared.records.lock().get(sync_id).cloned()
    }

    /// Seeds a record directly, bypassing the offline switch.
    pub fn insert(&self, sync_id: SyncId, payload: Value) {
        self.shared.records.lock().insert(sync_id, payload);
    }

    /// Number of stored records.
    #[must_use]
    pub fn count(&self) -> usize {
        self.shared.records.lock().len()
    }

    fn check_online(&self) -> Result<(), SyncError> {
        if self.shared.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Unavailable);
        }
        Ok(())
    }
}

impl SyncStore for MemorySyncStore {
    async fn fetch(&self, sync_id: &SyncId) -> Result<Option<Value>, SyncError> {
        self.check_online()?;
        Ok(self.record(sync_id))
    }

    async fn save(&self, sync_id: &SyncId, payload: &Value) -> Result<(), SyncError> {
        self.check_online()?;
        self.insert(sync_id.clone(), payload.clone());
        Ok(())
    }

    async fn delete(&self, sync_id: &SyncId) -> Result<bool, SyncError> {
        self.check_online()?;
        Ok(self.shared.records.lock().remove(sync_id).is_some())
    }

    async fn resolve_short_code(&self, code: &str) -> Result<Option<SyncId>, SyncError> {
        self.check_online()?;
        let Ok(id) = SyncId::parse(code) else {
            return Ok(None);
        };
        Ok(self.shared.records.lock().contains_key(&id).then_some(id))
    }
}
