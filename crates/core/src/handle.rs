//! Ephemeral handles for advertisements under construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Server-assigned identifier for an advertisement being built.
///
/// Valid from `create` until the advertisement is published (or the session
/// expires). Not content-addressed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EphemeralHandle(Uuid);

impl EphemeralHandle {
    /// Generate a new random handle.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| crate::Error::InvalidHandle(format!("{s:?}: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EphemeralHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EphemeralHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EphemeralHandle({})", self.0)
    }
}

impl fmt::Display for EphemeralHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of an advertisement under construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvertisementState {
    /// Fields known, no handle allocated yet.
    Draft,
    /// Handle allocated; entry chunks may be appended.
    Accumulating,
    /// Finalized under a permanent identifier.
    Published,
}

impl AdvertisementState {
    /// Whether entry chunks may still be appended.
    pub fn accepts_chunks(&self) -> bool {
        matches!(self, Self::Accumulating)
    }

    /// Whether the state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published)
    }

    /// Validate a transition.
    pub fn transition(self, to: Self) -> crate::Result<Self> {
        match (self, to) {
            (Self::Draft, Self::Accumulating)
            | (Self::Accumulating, Self::Accumulating)
            | (Self::Accumulating, Self::Published) => Ok(to),
            _ => Err(crate::Error::InvalidHandle(format!(
                "invalid transition {self:?} -> {to:?}"
            ))),
        }
    }
}
