//! Tracker orchestration: session state plus its remote record.
//!
//! A [`Tracker`] loads the record for the device's sync id, applies due
//! resets, and writes the whole payload back after every accepted change.
//! Local state is changed first; a failed write is reported as
//! [`SaveStatus::Pending`] and never rolls the change back.

use std::sync::Arc;

use questlog_proto::ids::{IdError, SyncId};
use questlog_proto::schedule::ResetSchedule;
use serde_json::Value;

use crate::clock::Clock;
use crate::identity::{IdentityError, IdentityFile};
use crate::session::{DEFAULT_MAX_ENTITIES, Session, SessionError};
use crate::sync::{SyncError, SyncStore};

/// Errors surfaced by tracker operations.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// A change was rejected before anything was modified.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A read or a deliberate delete could not reach the store.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The local sync id file could not be used.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The input is not shaped like a short code.
    #[error("invalid short code: {0}")]
    InvalidShortCode(#[source] IdError),

    /// No record answers to the short code.
    #[error("no record uses short code {0}")]
    UnknownShortCode(String),

    /// The payload could not be serialised for upload.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outcome of writing local state back to the store.
#[derive(Debug)]
pub enum SaveStatus {
    /// The record was written.
    Saved,
    /// The last entity was removed, so the record was deleted and the
    /// device forgot its sync id.
    Deleted,
    /// Nothing to write: no entities and no record yet.
    LocalOnly,
    /// The write failed; local state is kept and [`Tracker::flush`] retries.
    Pending(SyncError),
}

impl SaveStatus {
    /// Whether the store now matches local state.
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        !matches!(self, Self::Pending(_))
    }
}

/// Settings that shape a tracker's session.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// Reset zone, cutover and weekly day.
    pub schedule: ResetSchedule,
    /// Entity cap.
    pub max_entities: usize,
    /// Sync id to use instead of the one in the identity file.
    pub sync_id: Option<SyncId>,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            schedule: ResetSchedule::default(),
            max_entities: DEFAULT_MAX_ENTITIES,
            sync_id: None,
        }
    }
}

/// A session bound to a sync store.
pub struct Tracker<S: SyncStore> {
    store: S,
    clock: Arc<dyn Clock>,
    identity: Option<IdentityFile>,
    sync_id: Option<SyncId>,
    session: Session,
    pending: bool,
}

impl<S: SyncStore> Tracker<S> {
    /// Loads the record for the configured or remembered sync id.
    ///
    /// A missing record starts an empty session. If loading migrated the
    /// record or applied resets, the result is written back straight away.
    ///
    /// # Errors
    ///
    /// [`TrackerError::Sync`] if the store cannot be read; starting empty
    /// instead would overwrite the remote record on the next save.
    /// [`TrackerError::Identity`] if the id file is unreadable.
    pub async fn open(
        store: S,
        clock: Arc<dyn Clock>,
        settings: &TrackerSettings,
        identity: Option<IdentityFile>,
    ) -> Result<Self, TrackerError> {
        let sync_id = match &settings.sync_id {
            Some(id) => Some(id.clone()),
            None => identity.as_ref().map(IdentityFile::load).transpose()?.flatten(),
        };

        let now = clock.now();
        let raw = match &sync_id {
            Some(id) => store.fetch(id).await?,
            None => None,
        };
        let (session, needs_save) = match raw {
            Some(raw) => {
                let (session, outcome) =
                    Session::load(raw, settings.schedule, settings.max_entities, &now);
                (session, outcome.needs_save())
            }
            None => (
                Session::new(settings.schedule, settings.max_entities, &now),
                false,
            ),
        };

        let mut tracker = Self {
            store,
            clock,
            identity,
            sync_id,
            session,
            pending: false,
        };
        if needs_save && !tracker.session.is_empty() {
            let status = tracker.persist().await?;
            tracing::debug!(?status, "wrote back loaded record");
        }
        Ok(tracker)
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub const fn sync_id(&self) -> Option<&SyncId> {
        self.sync_id.as_ref()
    }

    /// Code another device can use to link to this record.
    #[must_use]
    pub fn short_code(&self) -> Option<&str> {
        self.sync_id.as_ref().map(SyncId::short_code)
    }

    /// Whether a previous write failed and has not been retried.
    #[must_use]
    pub const fn has_pending(&self) -> bool {
        self.pending
    }

    /// Applies due resets, then `change`, then writes the result.
    ///
    /// ```rust,no_run
    /// # use questlog::app::Tracker;
    /// # use questlog::sync::memory::MemorySyncStore;
    /// # async fn example(tracker: &mut Tracker<MemorySyncStore>) {
    /// let (index, status) = tracker.apply(|s| s.add_entity("Mari")).await.unwrap();
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// [`TrackerError::Session`] if `change` rejects the edit; only a reset
    /// that fired first is then written. A failed write is not an error,
    /// see [`SaveStatus`].
    pub async fn apply<T>(
        &mut self,
        change: impl FnOnce(&mut Session) -> Result<T, SessionError>,
    ) -> Result<(T, SaveStatus), TrackerError> {
        let decision = self.session.check_resets(&self.clock.now());
        match change(&mut self.session) {
            Ok(value) => {
                let status = self.persist().await?;
                Ok((value, status))
            }
            Err(e) => {
                // The cursor already moved, so the reset would never be due again.
                if decision.any() && !self.session.is_empty() {
                    self.persist().await?;
                }
                Err(e.into())
            }
        }
    }

    /// Applies resets that came due since the last check and writes them.
    ///
    /// # Errors
    ///
    /// See [`Tracker::flush`].
    pub async fn check_resets(&mut self) -> Result<Option<SaveStatus>, TrackerError> {
        let decision = self.session.check_resets(&self.clock.now());
        if !decision.any() || self.session.is_empty() {
            return Ok(None);
        }
        self.persist().await.map(Some)
    }

    /// Retries a failed write.
    ///
    /// # Errors
    ///
    /// [`TrackerError::Identity`] or [`TrackerError::Encode`].
    pub async fn flush(&mut self) -> Result<SaveStatus, TrackerError> {
        self.persist().await
    }

    /// Switches this device to the record behind `code`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::InvalidShortCode`], [`TrackerError::UnknownShortCode`],
    /// or [`TrackerError::Sync`] if the store cannot be reached.
    pub async fn link(&mut self, code: &str) -> Result<SyncId, TrackerError> {
        let code = SyncId::parse(code).map_err(TrackerError::InvalidShortCode)?;
        let Some(id) = self.store.resolve_short_code(code.short_code()).await? else {
            return Err(TrackerError::UnknownShortCode(code.to_string()));
        };
        let raw = self.store.fetch(&id).await?.unwrap_or(Value::Null);

        let (session, outcome) = Session::load(
            raw,
            *self.session.schedule(),
            self.session.max_entities(),
            &self.clock.now(),
        );
        self.session = session;
        self.adopt_id(id.clone())?;
        tracing::info!(sync_id = %id, "linked to existing record");

        if outcome.needs_save() && !self.session.is_empty() {
            self.persist().await?;
        }
        Ok(id)
    }

    /// Deletes the remote record, forgets the sync id and starts over.
    /// Returns whether a record existed.
    ///
    /// # Errors
    ///
    /// [`TrackerError::Sync`] if the delete fails; local state is then
    /// left untouched.
    pub async fn reset_all(&mut self) -> Result<bool, TrackerError> {
        let existed = match &self.sync_id {
            Some(id) => self.store.delete(id).await?,
            None => false,
        };
        self.forget_id()?;
        self.start_over();
        tracing::info!(existed, "reset all data");
        Ok(existed)
    }

    /// Writes local state: upsert while entities exist, delete once the
    /// last one is gone.
    async fn persist(&mut self) -> Result<SaveStatus, TrackerError> {
        let status = if self.session.is_empty() {
            self.persist_empty().await?
        } else {
            let id = self.ensure_sync_id()?;
            let payload = self.session.to_json()?;
            match self.store.save(&id, &payload).await {
                Ok(()) => SaveStatus::Saved,
                Err(e) => {
                    tracing::warn!(sync_id = %id, error = %e, "save failed, keeping local state");
                    SaveStatus::Pending(e)
                }
            }
        };
        self.pending = !status.is_synced();
        Ok(status)
    }

    async fn persist_empty(&mut self) -> Result<SaveStatus, TrackerError> {
        let Some(id) = self.sync_id.clone() else {
            return Ok(SaveStatus::LocalOnly);
        };
        match self.store.delete(&id).await {
            Ok(existed) => {
                tracing::info!(sync_id = %id, existed, "last entity removed, record deleted");
                self.forget_id()?;
                self.start_over();
                Ok(SaveStatus::Deleted)
            }
            Err(e) => {
                tracing::warn!(sync_id = %id, error = %e, "delete failed, keeping local state");
                Ok(SaveStatus::Pending(e))
            }
        }
    }

    fn ensure_sync_id(&mut self) -> Result<SyncId, TrackerError> {
        if let Some(id) = &self.sync_id {
            return Ok(id.clone());
        }
        let id = SyncId::generate();
        self.adopt_id(id.clone())?;
        tracing::info!(sync_id = %id, "created sync id");
        Ok(id)
    }

    fn adopt_id(&mut self, id: SyncId) -> Result<(), TrackerError> {
        if let Some(identity) = &self.identity {
            identity.store(&id)?;
        }
        self.sync_id = Some(id);
        Ok(())
    }

    fn forget_id(&mut self) -> Result<(), TrackerError> {
        if let Some(identity) = &self.identity {
            identity.forget()?;
        }
        self.sync_id = None;
        Ok(())
    }

    /// Fresh default lists and cursor, keeping the session settings.
    fn start_over(&mut self) {
        self.session = Session::new(
            *self.session.schedule(),
            self.session.max_entities(),
            &self.clock.now(),
        );
        self.pending = false;
    }
}
