//! Local persistence of the device's sync id.
//!
//! The id lives in a one-line text file (default
//! `~/.config/questlog/sync_id`). Forgetting it unlinks the device from its
//! record without touching the server.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use questlog_proto::ids::{IdError, SyncId};

/// Errors reading or writing the sync id file.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The file could not be read, written or removed.
    #[error("sync id file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file holds something that is not a sync id.
    #[error("sync id file {path} is invalid: {source}")]
    Invalid { path: PathBuf, source: IdError },
}

/// File holding the current sync id.
#[derive(Debug, Clone)]
pub struct IdentityFile {
    path: PathBuf,
}

impl IdentityFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/questlog/sync_id`, if a config directory is known.
    #[must_use]
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|d| Self::new(d.join("questlog").join("sync_id")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored id. A missing or blank file means none.
    ///
    /// # Errors
    ///
    /// [`IdentityError::Io`] on read failure, [`IdentityError::Invalid`]
    /// if the content is not a sync id.
    pub fn load(&self) -> Result<Option<SyncId>, IdentityError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io(source)),
        };
        if contents.trim().is_empty() {
            return Ok(None);
        }
        SyncId::parse(&contents)
            .map(Some)
            .map_err(|source| IdentityError::Invalid {
                path: self.path.clone(),
                source,
            })
    }

    /// Writes `id`, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// [`IdentityError::Io`] on write failure.
    pub fn store(&self, id: &SyncId) -> Result<(), IdentityError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io(e))?;
        }
        std::fs::write(&self.path, format!("{id}\n")).map_err(|e| self.io(e))
    }

    /// Removes the file. Succeeds if it is already gone.
    ///
    /// # Errors
    ///
    /// [`IdentityError::Io`] on any other removal failure.
    pub fn forget(&self) -> Result<(), IdentityError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(self.io(e)),
            _ => Ok(()),
        }
    }

    fn io(&self, source: std::io::Error) -> IdentityError {
        IdentityError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_load_forget() {
        let dir = tempfile::tempdir().unwrap();
        let file = IdentityFile::new(dir.path().join("nested").join("sync_id"));
        assert!(file.load().unwrap().is_none());

        let id = SyncId::parse("AbCd1234").unwrap();
        file.store(&id).unwrap();
        assert_eq!(file.load().unwrap(), Some(id));

        file.forget().unwrap();
        assert!(file.load().unwrap().is_none());
        file.forget().unwrap();
    }

    #[test]
    fn blank_file_means_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync_id");
        std::fs::write(&path, "\n  \n").unwrap();
        assert!(IdentityFile::new(path).load().unwrap().is_none());
    }

    #[test]
    fn garbage_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync_id");
        std::fs::write(&path, "not-an-id").unwrap();
        assert!(matches!(
            IdentityFile::new(path).load(),
            Err(IdentityError::Invalid { .. })
        ));
    }
}
