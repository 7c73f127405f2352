//! Sync identifiers.
//!
//! A [`SyncId`] addresses one stored record. It is short enough to type on
//! another device, so it doubles as the short code used to link devices.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};

/// Length of every sync identifier.
pub const SYNC_ID_LEN: usize = 8;

/// Errors from parsing a sync identifier.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdError {
    /// Wrong number of characters.
    #[error("sync id must be {SYNC_ID_LEN} characters, got {0}")]
    Length(usize),
    /// A character outside `[A-Za-z0-9]`.
    #[error("sync id contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Opaque 8-character alphanumeric record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SyncId(String);

impl SyncId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        let id: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(SYNC_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Validates and wraps an identifier.
    ///
    /// Surrounding whitespace is ignored; case is significant.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] if the input is not exactly eight ASCII
    /// alphanumerics.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let s = s.trim();
        if let Some(c) = s.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(IdError::InvalidChar(c));
        }
        if s.len() != SYNC_ID_LEN {
            return Err(IdError::Length(s.len()));
        }
        Ok(Self(s.to_string()))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The short code shown to the user for linking another device.
    #[must_use]
    pub fn short_code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SyncId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SyncId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SyncId> for String {
    fn from(id: SyncId) -> Self {
        id.0
    }
}
