//! Protocol messages for path management and reconciliation.

use crate::client::{
    AuthRequest, AuthResponse, RegistrationRequest, RegistrationResponse, SyncClientSummary,
};
use crate::error::ProtocolResult;
use crate::settings::{SyncPathPatch, SyncPathSettings};
use crate::types::{ClientId, PathId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A sync path as exchanged with clients: its id plus its settings.
///
/// A client's reconciliation snapshot is a list of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPath {
    /// Server-assigned id.
    pub id: PathId,
    /// Settings.
    #[serde(flatten)]
    pub settings: SyncPathSettings,
}

impl SyncPath {
    /// Creates a sync path.
    pub fn new(id: PathId, settings: SyncPathSettings) -> Self {
        Self { id, settings }
    }
}

/// A partial settings update the client must apply to one of its paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathUpdate {
    /// Target path id.
    pub id: PathId,
    /// Fields to overwrite.
    #[serde(flatten)]
    pub patch: SyncPathPatch,
}

impl PathUpdate {
    /// Creates an update.
    pub fn new(id: PathId, patch: SyncPathPatch) -> Self {
        Self { id, patch }
    }
}

/// Instructions returned by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathInstructions {
    /// Paths the client must create locally.
    pub add: Vec<SyncPath>,
    /// Settings updates the client must apply.
    pub update: Vec<PathUpdate>,
    /// Path ids the client must drop.
    pub delete: Vec<PathId>,
}

impl PathInstructions {
    /// Returns true if the client has nothing to do.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Path creation request.
///
/// `remotePath` is the requested location; the server replaces it and
/// `permissions` with the values it resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePathRequest {
    /// Requested settings.
    #[serde(flatten)]
    pub settings: SyncPathSettings,
}

impl CreatePathRequest {
    /// Creates a request.
    pub fn new(settings: SyncPathSettings) -> Self {
        Self { settings }
    }
}

/// Path creation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePathResponse {
    /// Assigned id.
    pub id: PathId,
    /// Resolved permission string.
    pub permissions: String,
}

/// A request addressed to the sync server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum SyncRequest {
    /// Register a client.
    Register(RegistrationRequest),
    /// Authenticate a registered client.
    Authenticate(AuthRequest),
    /// Unregister the calling client.
    Unregister,
    /// List the caller's clients.
    ListClients,
    /// Delete one of the caller's clients.
    #[serde(rename_all = "camelCase")]
    DeleteClient {
        /// Target client.
        client_id: ClientId,
    },
    /// Create a sync path for the calling client.
    CreatePath(CreatePathRequest),
    /// Delete a sync path.
    #[serde(rename_all = "camelCase")]
    DeletePath {
        /// Path id.
        id: PathId,
        /// Target client, defaults to the caller.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<ClientId>,
    },
    /// Update one sync path.
    #[serde(rename_all = "camelCase")]
    UpdatePath {
        /// Target client.
        client_id: ClientId,
        /// Path id.
        id: PathId,
        /// Fields to change.
        patch: SyncPathPatch,
    },
    /// List sync paths.
    #[serde(rename_all = "camelCase")]
    ListPaths {
        /// Target client, defaults to the caller.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<ClientId>,
    },
    /// Reconcile the caller's full path snapshot.
    Reconcile(Vec<SyncPath>),
}

/// A response from the sync server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum SyncResponse {
    /// Registration succeeded.
    Registered(RegistrationResponse),
    /// Authentication succeeded.
    Authenticated(AuthResponse),
    /// Client list.
    Clients(Vec<SyncClientSummary>),
    /// Path created.
    PathCreated(CreatePathResponse),
    /// Path settings after an update.
    PathUpdated(SyncPathSettings),
    /// Path list.
    Paths(Vec<SyncPath>),
    /// Reconciliation instructions.
    Instructions(PathInstructions),
    /// Operation completed with no payload.
    Done,
}

/// Encodes a message to JSON bytes.
pub fn encode<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// Decodes a message from JSON bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use serde_json::json;

    #[test]
    fn sync_path_flattens_settings() {
        let mut settings = SyncPathSettings::new("docs", "/home/a/docs", "PERSONAL/docs");
        settings.permissions = "rw".into();
        settings.timestamp = 10;
        settings.last_sync = 2;
        let value = serde_json::to_value(SyncPath::new(5, settings)).unwrap();

        assert_eq!(value["id"], json!(5));
        assert_eq!(value["remotePath"], json!("PERSONAL/docs"));
        assert_eq!(value["permissions"], json!("rw"));
        assert_eq!(value["timestamp"], json!(10));
        assert_eq!(value["lastSync"], json!(2));
    }

    #[test]
    fn snapshot_decodes_from_client_json() {
        let snapshot: Vec<SyncPath> = decode(
            br#"[{"id": 7, "timestamp": 10, "remotePath": "SPACES/wrong"}, {"id": 8}]"#,
        )
        .unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].settings.remote_path, "SPACES/wrong");
        assert_eq!(snapshot[1].settings.timestamp, 0);
    }

    #[test]
    fn update_entry_carries_only_patch_fields() {
        let update = PathUpdate::new(7, SyncPathPatch::corrections("SPACES/correct", "r"));
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"id": 7, "remotePath": "SPACES/correct", "permissions": "r"})
        );
    }

    #[test]
    fn instructions_empty() {
        let instructions = PathInstructions::default();
        assert!(instructions.is_empty());
        assert_eq!(
            serde_json::to_value(&instructions).unwrap(),
            json!({"add": [], "update": [], "delete": []})
        );
    }

    #[test]
    fn request_envelope_roundtrip() {
        let request = SyncRequest::DeletePath {
            id: 3,
            client_id: None,
        };
        let bytes = encode(&request).unwrap();
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&bytes).unwrap(),
            json!({"type": "deletePath", "payload": {"id": 3}})
        );
        let decoded: SyncRequest = decode(&bytes).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn decode_rejects_garbage() {
        let result: ProtocolResult<PathInstructions> = decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }
}
