//! Interfaces to the external collaborators of the sync server.
//!
//! The registry and the reconciler never touch storage, permissions or
//! credentials directly. They go through these traits, which a deployment
//! backs with its relational store, permission engine and session issuer.
//!
//! # Implementors
//!
//! - [`crate::memory`] provides in-memory implementations for tests and tools.
//!
//! All traits are `Send + Sync`: gateways are shared behind `Arc` between
//! request handlers and background tasks.

use crate::error::GatewayResult;
use pathsync_protocol::{
    ClientId, ClientInfo, FileId, PathId, SessionCookie, SessionTokens, ShareId, SpaceId,
    SpaceRootId, SyncClientSummary, SyncPath, SyncPathSettings, UserId,
};
use std::path::PathBuf;

/// A user as seen by the sync subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncUser {
    /// User id.
    pub id: UserId,
    /// Login name.
    pub login: String,
    /// Whether the account is active.
    pub active: bool,
    /// Whether the account may use the desktop/CLI sync clients.
    pub can_sync: bool,
    /// Whether the account's storage quota is exceeded.
    pub quota_exceeded: bool,
    /// Whether the account requires a second factor.
    pub two_factor_enabled: bool,
}

impl SyncUser {
    /// Creates an active user allowed to sync.
    pub fn new(id: UserId, login: impl Into<String>) -> Self {
        Self {
            id,
            login: login.into(),
            active: true,
            can_sync: true,
            quota_exceeded: false,
            two_factor_enabled: false,
        }
    }
}

/// A stored client row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncClientRecord {
    /// Client id.
    pub id: ClientId,
    /// Owning user.
    pub owner_id: UserId,
    /// Current bearer secret.
    pub token: String,
    /// Token expiry (Unix seconds).
    pub token_expiration: u64,
    /// Device fingerprint.
    pub info: ClientInfo,
    /// Administrative switch.
    pub enabled: bool,
    /// Address of the latest access.
    pub current_ip: Option<String>,
    /// Address of the access before it.
    pub last_ip: Option<String>,
    /// Latest access (Unix seconds).
    pub current_access: Option<u64>,
    /// Access before it (Unix seconds).
    pub last_access: Option<u64>,
    /// Registration time (Unix seconds).
    pub created_at: u64,
}

impl SyncClientRecord {
    /// Owner-facing view of this client, without its token.
    pub fn summary(&self, paths: usize) -> SyncClientSummary {
        SyncClientSummary {
            id: self.id,
            info: self.info.clone(),
            enabled: self.enabled,
            token_expiration: self.token_expiration,
            current_ip: self.current_ip.clone(),
            last_ip: self.last_ip.clone(),
            current_access: self.current_access,
            last_access: self.last_access,
            created_at: self.created_at,
            paths,
        }
    }
}

/// Where a sync path points inside the storage hierarchy.
///
/// Exactly one storage root is referenced; `file_id` is set when the path
/// targets a subdirectory rather than the root itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathBinding {
    /// The owner's personal space.
    Personal {
        /// Owner.
        owner_id: UserId,
        /// Subdirectory record.
        file_id: Option<FileId>,
    },
    /// A common space, optionally one of its roots.
    Space {
        /// Space.
        space_id: SpaceId,
        /// Root inside the space.
        space_root_id: Option<SpaceRootId>,
        /// Subdirectory record.
        file_id: Option<FileId>,
    },
    /// A share.
    Share {
        /// Share.
        share_id: ShareId,
        /// Subdirectory record.
        file_id: Option<FileId>,
    },
}

/// A stored sync path row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPathRecord {
    /// Path id.
    pub id: PathId,
    /// Owning user.
    pub owner_id: UserId,
    /// Owning client.
    pub client_id: ClientId,
    /// Storage hierarchy binding.
    pub binding: PathBinding,
    /// Settings document.
    pub settings: SyncPathSettings,
}

impl SyncPathRecord {
    /// Wire view of this path.
    pub fn to_sync_path(&self) -> SyncPath {
        SyncPath::new(self.id, self.settings.clone())
    }
}

/// A sync path about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSyncPath {
    /// Owning user.
    pub owner_id: UserId,
    /// Owning client.
    pub client_id: ClientId,
    /// Storage hierarchy binding.
    pub binding: PathBinding,
    /// Settings document.
    pub settings: SyncPathSettings,
}

/// A client row about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSyncClient {
    /// Client id.
    pub id: ClientId,
    /// Owning user.
    pub owner_id: UserId,
    /// Bearer secret.
    pub token: String,
    /// Token expiry (Unix seconds).
    pub token_expiration: u64,
    /// Device fingerprint.
    pub info: ClientInfo,
    /// Address of the registering request.
    pub ip: String,
    /// Registration time (Unix seconds).
    pub created_at: u64,
}

/// Storage area a resolved location belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceLocation {
    /// The caller's personal space.
    Personal,
    /// A common space, optionally one of its roots.
    Space {
        /// Space.
        space_id: SpaceId,
        /// Root inside the space.
        space_root_id: Option<SpaceRootId>,
    },
    /// A concrete share.
    Share {
        /// Share.
        share_id: ShareId,
    },
    /// The list of all shares, not a concrete one.
    SharesList,
}

/// A location resolved by the space oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceEnv {
    /// Storage area.
    pub location: SpaceLocation,
    /// Whether the location is the area's root rather than a subdirectory.
    pub at_root: bool,
    /// Canonical remote path.
    pub remote_path: String,
    /// Effective permission string for the caller.
    pub permissions: String,
    /// Backing directory on the server's disk.
    pub real_path: PathBuf,
}

/// Current remote location and permissions of a stored binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRemote {
    /// Canonical remote path.
    pub remote_path: String,
    /// Effective permission string.
    pub permissions: String,
}

impl ResolvedRemote {
    /// Creates a resolution.
    pub fn new(remote_path: impl Into<String>, permissions: impl Into<String>) -> Self {
        Self {
            remote_path: remote_path.into(),
            permissions: permissions.into(),
        }
    }
}

/// Why the server dropped a sync path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The client held a path the server no longer knows.
    UnknownToServer,
    /// The remote location no longer resolves for the owner.
    RemoteUnavailable,
}

/// Notice sent to the owner when a sync path is removed server side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRemovedNotice {
    /// Owner to alert.
    pub owner_id: UserId,
    /// Client that held the path.
    pub client_id: ClientId,
    /// Path id.
    pub path_id: PathId,
    /// Path display name.
    pub name: String,
    /// Last known remote path.
    pub remote_path: String,
    /// Cause.
    pub reason: RemovalReason,
}

/// Client rows.
pub trait ClientStore: Send + Sync {
    /// Gets the client `client_id` owned by `owner_id`.
    fn get_client(&self, owner_id: UserId, client_id: &ClientId)
        -> GatewayResult<Option<SyncClientRecord>>;

    /// Finds a client by id and current token.
    fn find_by_token(&self, client_id: &ClientId, token: &str)
        -> GatewayResult<Option<SyncClientRecord>>;

    /// Lists the clients of an owner.
    fn list_clients(&self, owner_id: UserId) -> GatewayResult<Vec<SyncClientRecord>>;

    /// Inserts a client row.
    fn create_client(&self, client: NewSyncClient) -> GatewayResult<()>;

    /// Refreshes the fingerprint and shifts the access trail
    /// (current address/time become last, then are overwritten).
    fn update_info(
        &self,
        owner_id: UserId,
        client_id: &ClientId,
        info: &ClientInfo,
        ip: &str,
        at: u64,
    ) -> GatewayResult<()>;

    /// Replaces the token and its expiration.
    fn update_token(
        &self,
        owner_id: UserId,
        client_id: &ClientId,
        token: &str,
        expiration: u64,
    ) -> GatewayResult<()>;

    /// Sets the administrative switch. Returns false if no row matched.
    fn set_enabled(&self, owner_id: UserId, client_id: &ClientId, enabled: bool)
        -> GatewayResult<bool>;

    /// Deletes a client row and its paths. Returns false if no row matched.
    fn delete_client(&self, owner_id: UserId, client_id: &ClientId) -> GatewayResult<bool>;
}

/// Sync path rows.
pub trait PathStore: Send + Sync {
    /// Inserts a path and returns its id.
    fn create_path(&self, path: NewSyncPath) -> GatewayResult<PathId>;

    /// Gets one path of a client.
    fn get_path(&self, client_id: &ClientId, id: PathId) -> GatewayResult<Option<SyncPathRecord>>;

    /// Lists the paths of a client.
    fn list_paths(&self, owner_id: UserId, client_id: &ClientId)
        -> GatewayResult<Vec<SyncPathRecord>>;

    /// Replaces the settings of a path.
    fn update_settings(
        &self,
        client_id: &ClientId,
        id: PathId,
        settings: &SyncPathSettings,
    ) -> GatewayResult<()>;

    /// Deletes a path. Returns false if no row matched.
    fn delete_path(&self, client_id: &ClientId, id: PathId) -> GatewayResult<bool>;
}

/// Cache of path settings, keyed by `(client, path)`.
pub trait SettingsCache: Send + Sync {
    /// Drops the cached settings of a path.
    fn invalidate(&self, client_id: &ClientId, path_id: PathId);
}

/// Space and permission resolution.
pub trait SpaceOracle: Send + Sync {
    /// Resolves a requested remote path for a user.
    ///
    /// Returns `None` if the path does not exist or is not accessible.
    fn resolve_space(&self, user: &SyncUser, remote_path: &str) -> GatewayResult<Option<SpaceEnv>>;

    /// Returns the file record of a resolved subdirectory, creating it if
    /// it is not indexed yet.
    fn ensure_file_id(&self, user: &SyncUser, env: &SpaceEnv) -> GatewayResult<FileId>;

    /// Resolves the current location of a stored binding.
    ///
    /// Returns `None` if the location is no longer accessible.
    fn resolve_binding(
        &self,
        user: &SyncUser,
        binding: &PathBinding,
    ) -> GatewayResult<Option<ResolvedRemote>>;
}

/// Account lookups and credential checks.
pub trait AccountDirectory: Send + Sync {
    /// Checks a login and password. Returns the user if they match.
    fn verify_credentials(&self, login: &str, password: &str) -> GatewayResult<Option<SyncUser>>;

    /// Checks a second factor code for a user.
    fn verify_second_factor(&self, user: &SyncUser, code: &str) -> GatewayResult<bool>;

    /// Loads a user by id.
    fn find_user(&self, user_id: UserId) -> GatewayResult<Option<SyncUser>>;

    /// Records a user access.
    fn record_access(&self, user_id: UserId, ip: &str, at: u64) -> GatewayResult<()>;
}

/// Session credential issuance.
pub trait CredentialIssuer: Send + Sync {
    /// Issues an access/refresh token pair.
    fn issue_tokens(&self, user: &SyncUser) -> GatewayResult<SessionTokens>;

    /// Issues browser session cookies.
    fn issue_cookies(&self, user: &SyncUser) -> GatewayResult<Vec<SessionCookie>>;
}

/// Owner notifications.
pub trait NotificationSink: Send + Sync {
    /// Tells the owner a sync path was removed.
    fn path_removed(&self, notice: &PathRemovedNotice) -> GatewayResult<()>;
}
