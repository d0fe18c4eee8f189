//! Identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// User identifier (owned by the account directory).
pub type UserId = u64;

/// Sync path identifier, assigned by the server.
pub type PathId = u64;

/// Common space identifier.
pub type SpaceId = u64;

/// Space root (anchored folder inside a space) identifier.
pub type SpaceRootId = u64;

/// Share identifier.
pub type ShareId = u64;

/// File record identifier.
pub type FileId = u64;

/// Client identifier.
///
/// Generated by the client on first install and kept across reinstalls of
/// the same installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Wraps an existing UUID.
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generates a new random client id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ClientId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for ClientId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_parse_and_display() {
        let id: ClientId = "6f1c2a3e-9a7b-4c1d-8e2f-0a1b2c3d4e5f".parse().unwrap();
        assert_eq!(id.to_string(), "6f1c2a3e-9a7b-4c1d-8e2f-0a1b2c3d4e5f");
        assert!("not-a-uuid".parse::<ClientId>().is_err());
    }

    #[test]
    fn client_id_serializes_as_plain_string() {
        let id = ClientId::random();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
