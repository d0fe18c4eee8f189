//! Integration tests for client registration and authentication.

use pathsync_protocol::{
    AuthKind, AuthRequest, AuthResponse, ClientId, ClientInfo, ClientType, Credentials,
    RegistrationRequest, SyncPathSettings,
};
use pathsync_server::{
    unix_now, Caller, MemoryGateways, NewSyncPath, PathBinding, PathStore, ServerConfig,
    ServerError, SyncServer, SyncUser,
};

const DAY: u64 = 24 * 60 * 60;

fn info(version: &str) -> ClientInfo {
    ClientInfo {
        node: "laptop".into(),
        os: "linux".into(),
        os_release: "6.8".into(),
        client_type: ClientType::Desktop,
        version: version.into(),
    }
}

fn setup() -> (SyncServer, MemoryGateways) {
    let gateways = MemoryGateways::new();
    gateways.accounts.add_user(SyncUser::new(1, "alice"), "s3cret");
    let config = ServerConfig::default().with_inline_background(true);
    let server = SyncServer::new(config, gateways.gateways()).unwrap();
    (server, gateways)
}

fn register(server: &SyncServer, client_id: ClientId) -> Result<String, ServerError> {
    server
        .registry()
        .register(
            RegistrationRequest {
                credentials: Credentials::new("alice", "s3cret"),
                client_id,
                info: info("1.0.0"),
            },
            "10.0.0.1",
        )
        .map(|response| response.client_token)
}

fn auth_request(client_id: ClientId, token: &str) -> AuthRequest {
    AuthRequest {
        kind: AuthKind::Token,
        client_id,
        token: token.into(),
        info: info("1.1.0"),
    }
}

#[test]
fn registration_is_idempotent_per_client() {
    let (server, gateways) = setup();
    let client_id = ClientId::random();

    let first = register(&server, client_id).unwrap();
    let second = register(&server, client_id).unwrap();

    assert_eq!(first, second);
    assert_eq!(gateways.store.client_count(), 1);

    let client = gateways.store.client(1, &client_id).unwrap();
    assert_eq!(client.current_ip.as_deref(), Some("10.0.0.1"));
    assert!(client.token_expiration >= unix_now() + 119 * DAY);
}

#[test]
fn registration_rejects_bad_credentials() {
    let (server, _) = setup();
    let result = server.registry().register(
        RegistrationRequest {
            credentials: Credentials::new("alice", "wrong"),
            client_id: ClientId::random(),
            info: info("1.0.0"),
        },
        "10.0.0.1",
    );
    assert!(matches!(result, Err(ServerError::Unauthorized(_))));
}

#[test]
fn registration_requires_second_factor_when_enabled() {
    let (server, gateways) = setup();
    gateways.accounts.set_second_factor(1, "123456");
    let client_id = ClientId::random();

    let missing = register(&server, client_id);
    assert!(matches!(missing, Err(ServerError::Unauthorized(_))));

    let wrong = server.registry().register(
        RegistrationRequest {
            credentials: Credentials::new("alice", "s3cret").with_totp("000000"),
            client_id,
            info: info("1.0.0"),
        },
        "10.0.0.1",
    );
    assert!(matches!(wrong, Err(ServerError::Unauthorized(_))));

    let accepted = server.registry().register(
        RegistrationRequest {
            credentials: Credentials::new("alice", "s3cret").with_totp("123456"),
            client_id,
            info: info("1.0.0"),
        },
        "10.0.0.1",
    );
    assert!(accepted.is_ok());
}

#[test]
fn registration_checks_account_state() {
    let (server, gateways) = setup();

    let mut user = SyncUser::new(1, "alice");
    user.can_sync = false;
    gateways.accounts.update_user(user.clone());
    assert!(matches!(
        register(&server, ClientId::random()),
        Err(ServerError::Forbidden(_))
    ));

    user.can_sync = true;
    user.active = false;
    gateways.accounts.update_user(user);
    assert!(matches!(
        register(&server, ClientId::random()),
        Err(ServerError::Unauthorized(_))
    ));
}

#[test]
fn registration_persistence_failure_is_internal() {
    let (server, gateways) = setup();
    gateways.store.set_fail_client_writes(true);
    let result = register(&server, ClientId::random());
    assert!(matches!(result, Err(ServerError::Internal(_))));
}

#[test]
fn authentication_with_fresh_token_does_not_rotate() {
    let (server, gateways) = setup();
    let client_id = ClientId::random();
    let token = register(&server, client_id).unwrap();

    let outcome = server
        .registry()
        .authenticate(auth_request(client_id, &token), "10.0.0.2")
        .unwrap();

    assert_eq!(outcome.caller, Caller::client(SyncUser::new(1, "alice"), client_id));
    match &outcome.response {
        AuthResponse::Tokens {
            access_token,
            client_token_update,
            ..
        } => {
            assert_eq!(access_token, "access-1");
            assert!(client_token_update.is_none());
        }
        other => panic!("unexpected response: {other:?}"),
    }

    let client = gateways.store.client(1, &client_id).unwrap();
    assert_eq!(client.info.version, "1.1.0");
    assert_eq!(client.current_ip.as_deref(), Some("10.0.0.2"));
    assert_eq!(client.last_ip.as_deref(), Some("10.0.0.1"));
    assert_eq!(gateways.accounts.accesses().len(), 1);
}

#[test]
fn authentication_with_cookies() {
    let (server, _) = setup();
    let client_id = ClientId::random();
    let token = register(&server, client_id).unwrap();

    let mut request = auth_request(client_id, &token);
    request.kind = AuthKind::Cookie;
    let outcome = server.registry().authenticate(request, "10.0.0.2").unwrap();
    assert!(matches!(
        outcome.response,
        AuthResponse::Cookies { ref cookies, .. } if cookies.len() == 2
    ));
}

#[test]
fn authentication_rotates_token_inside_renewal_window() {
    let (server, gateways) = setup();
    let client_id = ClientId::random();
    let token = register(&server, client_id).unwrap();
    gateways
        .store
        .set_token_expiration(1, &client_id, unix_now() + 30 * DAY);

    let outcome = server
        .registry()
        .authenticate(auth_request(client_id, &token), "10.0.0.2")
        .unwrap();
    let rotated = outcome.response.client_token_update().unwrap().to_owned();
    assert_ne!(rotated, token);

    let client = gateways.store.client(1, &client_id).unwrap();
    assert_eq!(client.token, rotated);
    assert!(client.token_expiration >= unix_now() + 119 * DAY);

    let stale = server
        .registry()
        .authenticate(auth_request(client_id, &token), "10.0.0.2");
    assert!(matches!(stale, Err(ServerError::Forbidden(_))));
    assert!(server
        .registry()
        .authenticate(auth_request(client_id, &rotated), "10.0.0.2")
        .is_ok());
}

#[test]
fn authentication_fails_once_expired() {
    let (server, gateways) = setup();
    let client_id = ClientId::random();
    let token = register(&server, client_id).unwrap();

    for expiration in [unix_now(), unix_now() - DAY] {
        gateways.store.set_token_expiration(1, &client_id, expiration);
        let result = server
            .registry()
            .authenticate(auth_request(client_id, &token), "10.0.0.2");
        assert!(matches!(result, Err(ServerError::Forbidden(_))));
    }
}

#[test]
fn authentication_rejects_unknown_and_disabled_clients() {
    let (server, _) = setup();
    let client_id = ClientId::random();
    let token = register(&server, client_id).unwrap();

    let unknown = server
        .registry()
        .authenticate(auth_request(ClientId::random(), &token), "10.0.0.2");
    assert!(matches!(unknown, Err(ServerError::Forbidden(_))));

    let owner = SyncUser::new(1, "alice");
    server
        .registry()
        .set_client_enabled(&owner, &client_id, false)
        .unwrap();
    let disabled = server
        .registry()
        .authenticate(auth_request(client_id, &token), "10.0.0.2");
    assert!(matches!(disabled, Err(ServerError::Forbidden(_))));
}

#[test]
fn authentication_checks_owner() {
    let (server, gateways) = setup();
    let client_id = ClientId::random();
    let token = register(&server, client_id).unwrap();

    let mut user = SyncUser::new(1, "alice");
    user.active = false;
    gateways.accounts.update_user(user);
    let inactive = server
        .registry()
        .authenticate(auth_request(client_id, &token), "10.0.0.2");
    assert!(matches!(inactive, Err(ServerError::Forbidden(_))));

    gateways.accounts.remove_user(1);
    let missing = server
        .registry()
        .authenticate(auth_request(client_id, &token), "10.0.0.2");
    assert!(matches!(missing, Err(ServerError::Forbidden(_))));
}

#[test]
fn session_issuance_failure_is_internal() {
    let (server, gateways) = setup();
    let client_id = ClientId::random();
    let token = register(&server, client_id).unwrap();
    gateways.issuer.set_fail(true);

    let result = server
        .registry()
        .authenticate(auth_request(client_id, &token), "10.0.0.2");
    assert!(matches!(result, Err(ServerError::Internal(_))));
}

#[test]
fn rotation_failure_is_bad_request_and_access_trail_failure_is_not() {
    let (server, gateways) = setup();
    let client_id = ClientId::random();
    let token = register(&server, client_id).unwrap();

    gateways.store.set_fail_client_writes(true);
    assert!(server
        .registry()
        .authenticate(auth_request(client_id, &token), "10.0.0.2")
        .is_ok());

    gateways
        .store
        .set_token_expiration(1, &client_id, unix_now() + DAY);
    let result = server
        .registry()
        .authenticate(auth_request(client_id, &token), "10.0.0.2");
    assert!(matches!(result, Err(ServerError::BadRequest(_))));
}

#[test]
fn deleting_a_client_removes_its_paths() {
    let (server, gateways) = setup();
    let client_id = ClientId::random();
    register(&server, client_id).unwrap();
    let path_id = gateways
        .store
        .create_path(NewSyncPath {
            owner_id: 1,
            client_id,
            binding: PathBinding::Personal {
                owner_id: 1,
                file_id: None,
            },
            settings: SyncPathSettings::new("docs", "/home/alice/docs", "PERSONAL"),
        })
        .unwrap();

    let owner = SyncUser::new(1, "alice");
    let clients = server.registry().list_clients(&owner).unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].paths, 1);

    server.registry().delete_client(&owner, &client_id).unwrap();
    assert!(gateways.store.path(path_id).is_none());
    assert_eq!(gateways.cache.invalidations(), vec![(client_id, path_id)]);

    let again = server.registry().delete_client(&owner, &client_id);
    assert!(matches!(again, Err(ServerError::NotFound(_))));
}

#[test]
fn unregister_needs_a_client_session() {
    let (server, _) = setup();
    let result = server
        .registry()
        .unregister(&Caller::user(SyncUser::new(1, "alice")));
    assert!(matches!(result, Err(ServerError::BadRequest(_))));
}

#[test]
fn clients_of_other_users_are_invisible() {
    let (server, gateways) = setup();
    gateways.accounts.add_user(SyncUser::new(2, "bob"), "hunter2");
    let client_id = ClientId::random();
    register(&server, client_id).unwrap();

    let bob = SyncUser::new(2, "bob");
    assert!(server.registry().list_clients(&bob).unwrap().is_empty());
    assert!(matches!(
        server.registry().delete_client(&bob, &client_id),
        Err(ServerError::NotFound(_))
    ));
    assert!(matches!(
        server.registry().set_client_enabled(&bob, &client_id, false),
        Err(ServerError::NotFound(_))
    ));
}

#[tokio::test]
async fn access_trail_is_recorded_in_background() {
    let gateways = MemoryGateways::new();
    gateways.accounts.add_user(SyncUser::new(1, "alice"), "s3cret");
    let server = SyncServer::new(ServerConfig::default(), gateways.gateways()).unwrap();
    let client_id = ClientId::random();
    let token = register(&server, client_id).unwrap();

    server
        .registry()
        .authenticate(auth_request(client_id, &token), "10.0.0.9")
        .unwrap();
    server.drain_background().await;

    assert_eq!(server.pending_background(), 0);
    let client = gateways.store.client(1, &client_id).unwrap();
    assert_eq!(client.current_ip.as_deref(), Some("10.0.0.9"));
    assert_eq!(gateways.accounts.accesses()[0].1, "10.0.0.9");
}
