//! Sync client registry: registration, authentication, token rotation and
//! revocation.

use crate::context::{Caller, HandlerContext};
use crate::error::{ServerError, ServerResult};
use crate::gateway::{NewSyncClient, SyncClientRecord, SyncUser};
use crate::tokens::{generate_token, unix_now, TokenStatus};
use pathsync_protocol::{
    AuthKind, AuthRequest, AuthResponse, ClientId, ClientInfo, RegistrationRequest,
    RegistrationResponse, SyncClientSummary,
};
use std::sync::Arc;

/// Result of a successful authentication.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    /// Session identity for follow-up calls.
    pub caller: Caller,
    /// Response to send to the client.
    pub response: AuthResponse,
}

/// Owns client identity.
pub struct ClientRegistry {
    context: Arc<HandlerContext>,
}

impl ClientRegistry {
    /// Creates a registry.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Registers a client for the user behind `request.credentials`.
    ///
    /// Registering the same client id twice for the same user returns the
    /// existing token and creates no second row.
    pub fn register(
        &self,
        request: RegistrationRequest,
        source_ip: &str,
    ) -> ServerResult<RegistrationResponse> {
        let accounts = &self.context.gateways.accounts;
        let credentials = &request.credentials;

        let user = accounts
            .verify_credentials(&credentials.login, &credentials.password)
            .map_err(|e| {
                tracing::error!(login = %credentials.login, error = %e, "credential check failed");
                ServerError::Internal(format!("credential check failed: {e}"))
            })?
            .ok_or_else(|| {
                tracing::info!(login = %credentials.login, ip = source_ip, "registration rejected: bad credentials");
                ServerError::Unauthorized("wrong login or password".into())
            })?;

        if user.two_factor_enabled {
            let code = credentials
                .totp_code
                .as_deref()
                .ok_or_else(|| ServerError::Unauthorized("second factor code required".into()))?;
            let accepted = accounts.verify_second_factor(&user, code).map_err(|e| {
                tracing::error!(user_id = user.id, error = %e, "second factor check failed");
                ServerError::Internal(format!("second factor check failed: {e}"))
            })?;
            if !accepted {
                tracing::info!(user_id = user.id, ip = source_ip, "registration rejected: bad second factor");
                return Err(ServerError::Unauthorized("invalid second factor code".into()));
            }
        }

        if !user.active {
            tracing::info!(user_id = user.id, "registration rejected: account inactive");
            return Err(ServerError::Unauthorized("account is not active".into()));
        }
        ensure_may_sync(&user)?;

        let client_token =
            self.get_or_create_client(&user, request.client_id, &request.info, source_ip)?;

        Ok(RegistrationResponse {
            client_id: request.client_id,
            client_token,
        })
    }

    /// Returns the token of `(owner, client_id)`, creating the client row
    /// with a fresh token if it does not exist yet.
    pub fn get_or_create_client(
        &self,
        owner: &SyncUser,
        client_id: ClientId,
        info: &ClientInfo,
        source_ip: &str,
    ) -> ServerResult<String> {
        let clients = &self.context.gateways.clients;

        match clients.get_client(owner.id, &client_id) {
            Ok(Some(existing)) => {
                tracing::debug!(client_id = %client_id, user_id = owner.id, "client already registered");
                return Ok(existing.token);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(client_id = %client_id, error = %e, "client lookup failed");
                return Err(ServerError::Internal(format!("client lookup failed: {e}")));
            }
        }

        let now = unix_now();
        let token = generate_token();
        let new_client = NewSyncClient {
            id: client_id,
            owner_id: owner.id,
            token: token.clone(),
            token_expiration: self.context.tokens.expiration_from(now),
            info: info.clone(),
            ip: source_ip.to_owned(),
            created_at: now,
        };

        clients.create_client(new_client).map_err(|e| {
            tracing::error!(client_id = %client_id, user_id = owner.id, error = %e, "client registration failed");
            ServerError::Internal(format!("client registration failed: {e}"))
        })?;

        tracing::info!(
            client_id = %client_id,
            user_id = owner.id,
            client_type = ?info.client_type,
            node = %info.node,
            "client registered"
        );
        Ok(token)
    }

    /// Authenticates a registered client and opens a session.
    pub fn authenticate(&self, request: AuthRequest, source_ip: &str) -> ServerResult<AuthOutcome> {
        let gateways = &self.context.gateways;
        let now = unix_now();

        let client = gateways
            .clients
            .find_by_token(&request.client_id, &request.token)
            .map_err(|e| {
                tracing::error!(client_id = %request.client_id, error = %e, "client lookup failed");
                ServerError::Internal(format!("client lookup failed: {e}"))
            })?
            .ok_or_else(|| {
                tracing::info!(client_id = %request.client_id, ip = source_ip, "authentication rejected: unknown client");
                ServerError::Forbidden("unknown client or token".into())
            })?;

        if !client.enabled {
            tracing::info!(client_id = %client.id, "authentication rejected: client disabled");
            return Err(ServerError::Forbidden("client is disabled".into()));
        }
        if self.context.tokens.status(client.token_expiration, now) == TokenStatus::Expired {
            tracing::info!(client_id = %client.id, expiration = client.token_expiration, "authentication rejected: token expired");
            return Err(ServerError::Forbidden("client token has expired".into()));
        }

        {
            let clients = Arc::clone(&gateways.clients);
            let (owner_id, client_id) = (client.owner_id, client.id);
            let info = request.info.clone();
            let ip = source_ip.to_owned();
            self.context.background.spawn("update_client_info", move || {
                clients.update_info(owner_id, &client_id, &info, &ip, now)
            });
        }

        let owner = gateways
            .accounts
            .find_user(client.owner_id)
            .map_err(|e| {
                tracing::error!(user_id = client.owner_id, error = %e, "owner lookup failed");
                ServerError::Internal(format!("owner lookup failed: {e}"))
            })?
            .ok_or_else(|| ServerError::Forbidden("client owner no longer exists".into()))?;
        ensure_may_sync(&owner)?;

        {
            let accounts = Arc::clone(&gateways.accounts);
            let user_id = owner.id;
            let ip = source_ip.to_owned();
            self.context
                .background
                .spawn("record_access", move || accounts.record_access(user_id, &ip, now));
        }

        let issued = match request.kind {
            AuthKind::Token => gateways.issuer.issue_tokens(&owner).map(AuthSession::Tokens),
            AuthKind::Cookie => gateways.issuer.issue_cookies(&owner).map(AuthSession::Cookies),
        }
        .map_err(|e| {
            tracing::error!(user_id = owner.id, error = %e, "session issuance failed");
            ServerError::Internal(format!("session issuance failed: {e}"))
        })?;

        let client_token_update = self.renew_token_and_expiration(&client, &owner)?;

        let response = match issued {
            AuthSession::Tokens(tokens) => AuthResponse::tokens(tokens, client_token_update),
            AuthSession::Cookies(cookies) => AuthResponse::cookies(cookies, client_token_update),
        };

        tracing::debug!(client_id = %client.id, user_id = owner.id, kind = ?request.kind, "client authenticated");
        Ok(AuthOutcome {
            caller: Caller::client(owner, client.id),
            response,
        })
    }

    /// Rotates the client token if it is inside the renewal window.
    ///
    /// Returns the new token, or `None` when the current one has more than
    /// the renewal window left. A failed rotation is reported as a bad
    /// request: the client must retry rather than keep a token about to
    /// expire.
    pub fn renew_token_and_expiration(
        &self,
        client: &SyncClientRecord,
        owner: &SyncUser,
    ) -> ServerResult<Option<String>> {
        let now = unix_now();
        if self.context.tokens.status(client.token_expiration, now) == TokenStatus::Valid {
            return Ok(None);
        }

        let token = generate_token();
        let expiration = self.context.tokens.expiration_from(now);
        self.context
            .gateways
            .clients
            .update_token(owner.id, &client.id, &token, expiration)
            .map_err(|e| {
                tracing::error!(client_id = %client.id, error = %e, "token renewal failed");
                ServerError::BadRequest(format!("unable to renew client token: {e}"))
            })?;

        tracing::info!(client_id = %client.id, expiration, "client token renewed");
        Ok(Some(token))
    }

    /// Unregisters the caller's own client.
    pub fn unregister(&self, caller: &Caller) -> ServerResult<()> {
        let client_id = caller.require_client_id()?;
        self.delete_client(&caller.user, &client_id)
    }

    /// Deletes a client of `owner`, together with its paths.
    pub fn delete_client(&self, owner: &SyncUser, client_id: &ClientId) -> ServerResult<()> {
        let gateways = &self.context.gateways;

        let paths = gateways
            .paths
            .list_paths(owner.id, client_id)
            .unwrap_or_else(|e| {
                tracing::warn!(client_id = %client_id, error = %e, "unable to list paths of deleted client");
                Vec::new()
            });

        match gateways.clients.delete_client(owner.id, client_id) {
            Ok(true) => {
                for path in &paths {
                    gateways.cache.invalidate(client_id, path.id);
                }
                tracing::info!(client_id = %client_id, user_id = owner.id, paths = paths.len(), "client deleted");
                Ok(())
            }
            Ok(false) => Err(ServerError::NotFound(format!("client {client_id} not found"))),
            Err(e) => {
                tracing::error!(client_id = %client_id, error = %e, "client deletion failed");
                Err(ServerError::Internal(format!("client deletion failed: {e}")))
            }
        }
    }

    /// Lists the clients of `owner`.
    pub fn list_clients(&self, owner: &SyncUser) -> ServerResult<Vec<SyncClientSummary>> {
        let gateways = &self.context.gateways;
        let clients = gateways.clients.list_clients(owner.id).map_err(|e| {
            tracing::error!(user_id = owner.id, error = %e, "client listing failed");
            ServerError::Internal(format!("client listing failed: {e}"))
        })?;

        clients
            .iter()
            .map(|client| {
                let paths = gateways
                    .paths
                    .list_paths(owner.id, &client.id)
                    .map_err(|e| ServerError::Internal(format!("path listing failed: {e}")))?;
                Ok(client.summary(paths.len()))
            })
            .collect()
    }

    /// Enables or disables a client of `owner`.
    pub fn set_client_enabled(
        &self,
        owner: &SyncUser,
        client_id: &ClientId,
        enabled: bool,
    ) -> ServerResult<()> {
        match self
            .context
            .gateways
            .clients
            .set_enabled(owner.id, client_id, enabled)
        {
            Ok(true) => {
                tracing::info!(client_id = %client_id, enabled, "client switch changed");
                Ok(())
            }
            Ok(false) => Err(ServerError::NotFound(format!("client {client_id} not found"))),
            Err(e) => Err(ServerError::Internal(format!("client update failed: {e}"))),
        }
    }
}

enum AuthSession {
    Tokens(pathsync_protocol::SessionTokens),
    Cookies(Vec<pathsync_protocol::SessionCookie>),
}

fn ensure_may_sync(user: &SyncUser) -> ServerResult<()> {
    if !user.active {
        return Err(ServerError::Forbidden("account is not active".into()));
    }
    if !user.can_sync {
        return Err(ServerError::Forbidden(
            "account is not allowed to use sync clients".into(),
        ));
    }
    Ok(())
}
