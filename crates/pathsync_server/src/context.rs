//! Shared request handling context.

use crate::background::BackgroundTasks;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::gateway::{
    AccountDirectory, ClientStore, CredentialIssuer, NotificationSink, PathStore, SettingsCache,
    SpaceOracle, SyncClientRecord, SyncUser,
};
use crate::tokens::TokenPolicy;
use pathsync_protocol::{ClientId, UserId};
use std::sync::Arc;

/// The external collaborators a server talks to.
#[derive(Clone)]
pub struct Gateways {
    /// Client rows.
    pub clients: Arc<dyn ClientStore>,
    /// Sync path rows.
    pub paths: Arc<dyn PathStore>,
    /// Settings cache.
    pub cache: Arc<dyn SettingsCache>,
    /// Space/permission oracle.
    pub oracle: Arc<dyn SpaceOracle>,
    /// Account directory.
    pub accounts: Arc<dyn AccountDirectory>,
    /// Session credential issuer.
    pub issuer: Arc<dyn CredentialIssuer>,
    /// Owner notifications.
    pub notifier: Arc<dyn NotificationSink>,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// The user behind the session.
    pub user: SyncUser,
    /// The sync client the session was opened from, if any.
    pub client_id: Option<ClientId>,
}

impl Caller {
    /// A caller acting through one of its sync clients.
    pub fn client(user: SyncUser, client_id: ClientId) -> Self {
        Self {
            user,
            client_id: Some(client_id),
        }
    }

    /// A caller acting from a regular session (web UI, admin tools).
    pub fn user(user: SyncUser) -> Self {
        Self {
            user,
            client_id: None,
        }
    }

    /// Returns the caller's client id, or a bad request error.
    pub fn require_client_id(&self) -> ServerResult<ClientId> {
        self.client_id
            .ok_or_else(|| ServerError::BadRequest("client id is missing".into()))
    }
}

/// Context shared by the registry and the reconciler.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// External collaborators.
    pub gateways: Gateways,
    /// Background side effects.
    pub background: BackgroundTasks,
    /// Client token lifetimes.
    pub tokens: TokenPolicy,
}

impl HandlerContext {
    /// Creates a context. Fails if the configuration is inconsistent.
    pub fn new(config: ServerConfig, gateways: Gateways) -> ServerResult<Self> {
        config.validate()?;
        let background = if config.inline_background {
            BackgroundTasks::inline()
        } else {
            let tasks = BackgroundTasks::from_current();
            if tasks.is_inline() {
                tracing::warn!(
                    "no Tokio runtime at server construction, background side effects run on the request thread"
                );
            }
            tasks
        };
        let tokens = TokenPolicy::from_config(&config);
        Ok(Self {
            config,
            gateways,
            background,
            tokens,
        })
    }

    /// Loads a client of `owner_id`, failing with `Forbidden` if the owner
    /// does not own it.
    pub fn owned_client(&self, owner_id: UserId, client_id: &ClientId) -> ServerResult<SyncClientRecord> {
        match self.gateways.clients.get_client(owner_id, client_id) {
            Ok(Some(client)) => Ok(client),
            Ok(None) => Err(ServerError::Forbidden(format!(
                "client {client_id} does not belong to user {owner_id}"
            ))),
            Err(e) => {
                tracing::error!(client_id = %client_id, error = %e, "client lookup failed");
                Err(ServerError::Internal(format!("client lookup failed: {e}")))
            }
        }
    }
}
