//! Sync server facade.

use crate::config::ServerConfig;
use crate::context::{Caller, Gateways, HandlerContext};
use crate::error::{ServerError, ServerResult};
use crate::reconciler::PathReconciler;
use crate::registry::ClientRegistry;
use pathsync_protocol::{SyncRequest, SyncResponse};
use std::sync::Arc;

/// Transport-level facts about a request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Address the request came from.
    pub source_ip: String,
    /// Session identity, if the request carried one.
    pub caller: Option<Caller>,
}

impl RequestContext {
    /// A request without a session.
    pub fn anonymous(source_ip: impl Into<String>) -> Self {
        Self {
            source_ip: source_ip.into(),
            caller: None,
        }
    }

    /// A request made within a session.
    pub fn authenticated(source_ip: impl Into<String>, caller: Caller) -> Self {
        Self {
            source_ip: source_ip.into(),
            caller: Some(caller),
        }
    }

    fn caller(&self) -> ServerResult<&Caller> {
        self.caller
            .as_ref()
            .ok_or_else(|| ServerError::Unauthorized("no session".into()))
    }
}

/// The sync server.
///
/// Owns the client registry and the path reconciler, and dispatches
/// [`SyncRequest`]s to them. An HTTP layer maps transport requests to
/// [`SyncRequest`]s and [`ServerError::status_code`] to responses.
///
/// # Example
///
/// ```
/// use pathsync_server::{MemoryGateways, RequestContext, ServerConfig, SyncServer};
/// use pathsync_protocol::SyncRequest;
///
/// let gateways = MemoryGateways::new();
/// let server = SyncServer::new(ServerConfig::default(), gateways.gateways()).unwrap();
///
/// let err = server
///     .handle(&RequestContext::anonymous("127.0.0.1"), SyncRequest::ListClients)
///     .unwrap_err();
/// assert_eq!(err.status_code(), 401);
/// ```
pub struct SyncServer {
    registry: ClientRegistry,
    reconciler: PathReconciler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a server. Fails if the configuration is inconsistent.
    pub fn new(config: ServerConfig, gateways: Gateways) -> ServerResult<Self> {
        let context = Arc::new(HandlerContext::new(config, gateways)?);
        Ok(Self {
            registry: ClientRegistry::new(Arc::clone(&context)),
            reconciler: PathReconciler::new(Arc::clone(&context)),
            context,
        })
    }

    /// The client registry.
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// The path reconciler.
    pub fn reconciler(&self) -> &PathReconciler {
        &self.reconciler
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Handles one request.
    pub fn handle(&self, ctx: &RequestContext, request: SyncRequest) -> ServerResult<SyncResponse> {
        match request {
            SyncRequest::Register(req) => self
                .registry
                .register(req, &ctx.source_ip)
                .map(SyncResponse::Registered),
            SyncRequest::Authenticate(req) => self
                .registry
                .authenticate(req, &ctx.source_ip)
                .map(|outcome| SyncResponse::Authenticated(outcome.response)),
            SyncRequest::Unregister => {
                self.registry.unregister(ctx.caller()?)?;
                Ok(SyncResponse::Done)
            }
            SyncRequest::ListClients => self
                .registry
                .list_clients(&ctx.caller()?.user)
                .map(SyncResponse::Clients),
            SyncRequest::DeleteClient { client_id } => {
                self.registry
                    .delete_client(&ctx.caller()?.user, &client_id)?;
                Ok(SyncResponse::Done)
            }
            SyncRequest::CreatePath(req) => self
                .reconciler
                .create_path(ctx.caller()?, req)
                .map(SyncResponse::PathCreated),
            SyncRequest::DeletePath { id, client_id } => {
                self.reconciler.delete_path(ctx.caller()?, id, client_id)?;
                Ok(SyncResponse::Done)
            }
            SyncRequest::UpdatePath {
                client_id,
                id,
                patch,
            } => self
                .reconciler
                .update_path(ctx.caller()?, client_id, id, patch)
                .map(SyncResponse::PathUpdated),
            SyncRequest::ListPaths { client_id } => self
                .reconciler
                .list_paths(ctx.caller()?, client_id)
                .map(SyncResponse::Paths),
            SyncRequest::Reconcile(snapshot) => self
                .reconciler
                .update_paths(ctx.caller()?, snapshot)
                .map(SyncResponse::Instructions),
        }
    }

    /// Number of background side effects still running.
    pub fn pending_background(&self) -> usize {
        self.context.background.pending()
    }

    /// Waits for every background side effect spawned so far.
    pub async fn drain_background(&self) {
        self.context.background.drain().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SyncUser;
    use crate::memory::MemoryGateways;
    use pathsync_protocol::{
        AuthKind, AuthRequest, ClientId, ClientInfo, ClientType, Credentials, RegistrationRequest,
    };

    fn info() -> ClientInfo {
        ClientInfo {
            node: "workstation".into(),
            os: "linux".into(),
            os_release: "6.5".into(),
            client_type: ClientType::Cli,
            version: "2.1.0".into(),
        }
    }

    fn server() -> (SyncServer, MemoryGateways) {
        let gateways = MemoryGateways::new();
        gateways.accounts.add_user(SyncUser::new(1, "alice"), "s3cret");
        let config = ServerConfig::default().with_inline_background(true);
        let server = SyncServer::new(config, gateways.gateways()).unwrap();
        (server, gateways)
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ServerConfig::default().with_max_reconcile_paths(0);
        assert!(SyncServer::new(config, MemoryGateways::new().gateways()).is_err());
    }

    #[test]
    fn background_runs_inline_without_runtime() {
        let server =
            SyncServer::new(ServerConfig::default(), MemoryGateways::new().gateways()).unwrap();
        assert!(server.context.background.is_inline());
    }

    #[tokio::test]
    async fn background_uses_the_current_runtime() {
        let server =
            SyncServer::new(ServerConfig::default(), MemoryGateways::new().gateways()).unwrap();
        assert!(!server.context.background.is_inline());

        let inline = SyncServer::new(
            ServerConfig::default().with_inline_background(true),
            MemoryGateways::new().gateways(),
        )
        .unwrap();
        assert!(inline.context.background.is_inline());
    }

    #[test]
    fn protected_requests_need_a_session() {
        let (server, _) = server();
        let ctx = RequestContext::anonymous("10.0.0.1");
        for request in [
            SyncRequest::Unregister,
            SyncRequest::ListClients,
            SyncRequest::ListPaths { client_id: None },
            SyncRequest::Reconcile(Vec::new()),
        ] {
            let err = server.handle(&ctx, request).unwrap_err();
            assert!(matches!(err, ServerError::Unauthorized(_)));
        }
    }

    #[test]
    fn register_authenticate_reconcile_unregister() {
        let (server, gateways) = server();
        let anonymous = RequestContext::anonymous("10.0.0.1");
        let client_id = ClientId::random();

        let registered = server
            .handle(
                &anonymous,
                SyncRequest::Register(RegistrationRequest {
                    credentials: Credentials::new("alice", "s3cret"),
                    client_id,
                    info: info(),
                }),
            )
            .unwrap();
        let SyncResponse::Registered(registration) = registered else {
            panic!("unexpected response: {registered:?}");
        };

        let outcome = server
            .registry()
            .authenticate(
                AuthRequest {
                    kind: AuthKind::Token,
                    client_id,
                    token: registration.client_token,
                    info: info(),
                },
                "10.0.0.1",
            )
            .unwrap();
        assert_eq!(outcome.response.client_token_update(), None);

        let session = RequestContext::authenticated("10.0.0.1", outcome.caller);
        let response = server
            .handle(&session, SyncRequest::Reconcile(Vec::new()))
            .unwrap();
        assert_eq!(response, SyncResponse::Instructions(Default::default()));

        let response = server.handle(&session, SyncRequest::ListClients).unwrap();
        let SyncResponse::Clients(clients) = response else {
            panic!("unexpected response: {response:?}");
        };
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].id, client_id);

        assert_eq!(
            server.handle(&session, SyncRequest::Unregister).unwrap(),
            SyncResponse::Done
        );
        assert_eq!(gateways.store.client_count(), 0);
    }
}
