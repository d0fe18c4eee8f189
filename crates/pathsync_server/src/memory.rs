//! In-memory gateways for tests and offline tools.
//!
//! Every type here is thread-safe and can be shared behind `Arc`. The stores
//! expose fail switches and counters so tests can observe writes and inject
//! collaborator failures.

use crate::context::Gateways;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{
    AccountDirectory, ClientStore, CredentialIssuer, NewSyncClient, NewSyncPath, NotificationSink,
    PathBinding, PathRemovedNotice, PathStore, ResolvedRemote, SettingsCache, SpaceEnv,
    SpaceOracle, SyncClientRecord, SyncPathRecord, SyncUser,
};
use parking_lot::{Mutex, RwLock};
use pathsync_protocol::{
    ClientId, ClientInfo, FileId, PathId, SessionCookie, SessionTokens, SyncPathSettings, UserId,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct StoreState {
    clients: HashMap<(UserId, ClientId), SyncClientRecord>,
    paths: BTreeMap<PathId, SyncPathRecord>,
    next_path_id: PathId,
}

/// In-memory client and path rows.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    path_writes: AtomicUsize,
    fail_path_writes: AtomicBool,
    fail_client_writes: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a path row as is, without counting it as a write.
    ///
    /// Useful for seeding a server state with known ids.
    pub fn insert_path(&self, record: SyncPathRecord) {
        let mut state = self.state.write();
        state.next_path_id = state.next_path_id.max(record.id);
        state.paths.insert(record.id, record);
    }

    /// Returns a path row.
    pub fn path(&self, id: PathId) -> Option<SyncPathRecord> {
        self.state.read().paths.get(&id).cloned()
    }

    /// Returns a client row.
    pub fn client(&self, owner_id: UserId, client_id: &ClientId) -> Option<SyncClientRecord> {
        self.state.read().clients.get(&(owner_id, *client_id)).cloned()
    }

    /// Number of client rows.
    pub fn client_count(&self) -> usize {
        self.state.read().clients.len()
    }

    /// Overrides the token expiration of a client.
    pub fn set_token_expiration(&self, owner_id: UserId, client_id: &ClientId, expiration: u64) {
        if let Some(client) = self.state.write().clients.get_mut(&(owner_id, *client_id)) {
            client.token_expiration = expiration;
        }
    }

    /// Number of path create, update and delete calls accepted.
    pub fn path_writes(&self) -> usize {
        self.path_writes.load(Ordering::SeqCst)
    }

    /// Makes every path write fail.
    pub fn set_fail_path_writes(&self, fail: bool) {
        self.fail_path_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every client write fail.
    pub fn set_fail_client_writes(&self, fail: bool) {
        self.fail_client_writes.store(fail, Ordering::SeqCst);
    }

    fn check_path_write(&self) -> GatewayResult<()> {
        if self.fail_path_writes.load(Ordering::SeqCst) {
            return Err(GatewayError::backend("path writes disabled"));
        }
        self.path_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn check_client_write(&self) -> GatewayResult<()> {
        if self.fail_client_writes.load(Ordering::SeqCst) {
            return Err(GatewayError::backend("client writes disabled"));
        }
        Ok(())
    }
}

impl ClientStore for MemoryStore {
    fn get_client(
        &self,
        owner_id: UserId,
        client_id: &ClientId,
    ) -> GatewayResult<Option<SyncClientRecord>> {
        Ok(self.client(owner_id, client_id))
    }

    fn find_by_token(
        &self,
        client_id: &ClientId,
        token: &str,
    ) -> GatewayResult<Option<SyncClientRecord>> {
        Ok(self
            .state
            .read()
            .clients
            .values()
            .find(|c| c.id == *client_id && c.token == token)
            .cloned())
    }

    fn list_clients(&self, owner_id: UserId) -> GatewayResult<Vec<SyncClientRecord>> {
        let mut clients: Vec<_> = self
            .state
            .read()
            .clients
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        clients.sort_by_key(|c| (c.created_at, c.id));
        Ok(clients)
    }

    fn create_client(&self, client: NewSyncClient) -> GatewayResult<()> {
        self.check_client_write()?;
        let mut state = self.state.write();
        let key = (client.owner_id, client.id);
        if state.clients.contains_key(&key) {
            return Err(GatewayError::backend(format!(
                "duplicate client {}",
                client.id
            )));
        }
        state.clients.insert(
            key,
            SyncClientRecord {
                id: client.id,
                owner_id: client.owner_id,
                token: client.token,
                token_expiration: client.token_expiration,
                info: client.info,
                enabled: true,
                current_ip: Some(client.ip),
                last_ip: None,
                current_access: Some(client.created_at),
                last_access: None,
                created_at: client.created_at,
            },
        );
        Ok(())
    }

    fn update_info(
        &self,
        owner_id: UserId,
        client_id: &ClientId,
        info: &ClientInfo,
        ip: &str,
        at: u64,
    ) -> GatewayResult<()> {
        self.check_client_write()?;
        let mut state = self.state.write();
        let client = state
            .clients
            .get_mut(&(owner_id, *client_id))
            .ok_or_else(|| GatewayError::backend(format!("no client {client_id}")))?;
        client.info = info.clone();
        client.last_ip = client.current_ip.replace(ip.to_owned());
        client.last_access = client.current_access.replace(at);
        Ok(())
    }

    fn update_token(
        &self,
        owner_id: UserId,
        client_id: &ClientId,
        token: &str,
        expiration: u64,
    ) -> GatewayResult<()> {
        self.check_client_write()?;
        let mut state = self.state.write();
        let client = state
            .clients
            .get_mut(&(owner_id, *client_id))
            .ok_or_else(|| GatewayError::backend(format!("no client {client_id}")))?;
        token.clone_into(&mut client.token);
        client.token_expiration = expiration;
        Ok(())
    }

    fn set_enabled(
        &self,
        owner_id: UserId,
        client_id: &ClientId,
        enabled: bool,
    ) -> GatewayResult<bool> {
        self.check_client_write()?;
        let mut state = self.state.write();
        match state.clients.get_mut(&(owner_id, *client_id)) {
            Some(client) => {
                client.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_client(&self, owner_id: UserId, client_id: &ClientId) -> GatewayResult<bool> {
        self.check_client_write()?;
        let mut state = self.state.write();
        if state.clients.remove(&(owner_id, *client_id)).is_none() {
            return Ok(false);
        }
        state
            .paths
            .retain(|_, p| !(p.owner_id == owner_id && p.client_id == *client_id));
        Ok(true)
    }
}

impl PathStore for MemoryStore {
    fn create_path(&self, path: NewSyncPath) -> GatewayResult<PathId> {
        self.check_path_write()?;
        let mut state = self.state.write();
        state.next_path_id += 1;
        let id = state.next_path_id;
        state.paths.insert(
            id,
            SyncPathRecord {
                id,
                owner_id: path.owner_id,
                client_id: path.client_id,
                binding: path.binding,
                settings: path.settings,
            },
        );
        Ok(id)
    }

    fn get_path(&self, client_id: &ClientId, id: PathId) -> GatewayResult<Option<SyncPathRecord>> {
        Ok(self
            .state
            .read()
            .paths
            .get(&id)
            .filter(|p| p.client_id == *client_id)
            .cloned())
    }

    fn list_paths(
        &self,
        owner_id: UserId,
        client_id: &ClientId,
    ) -> GatewayResult<Vec<SyncPathRecord>> {
        Ok(self
            .state
            .read()
            .paths
            .values()
            .filter(|p| p.owner_id == owner_id && p.client_id == *client_id)
            .cloned()
            .collect())
    }

    fn update_settings(
        &self,
        client_id: &ClientId,
        id: PathId,
        settings: &SyncPathSettings,
    ) -> GatewayResult<()> {
        self.check_path_write()?;
        let mut state = self.state.write();
        match state.paths.get_mut(&id) {
            Some(path) if path.client_id == *client_id => {
                path.settings = settings.clone();
                Ok(())
            }
            _ => Err(GatewayError::backend(format!("no path {id}"))),
        }
    }

    fn delete_path(&self, client_id: &ClientId, id: PathId) -> GatewayResult<bool> {
        self.check_path_write()?;
        let mut state = self.state.write();
        let owned = state
            .paths
            .get(&id)
            .is_some_and(|p| p.client_id == *client_id);
        if owned {
            state.paths.remove(&id);
        }
        Ok(owned)
    }
}

/// Settings cache that only records invalidations.
#[derive(Default)]
pub struct MemorySettingsCache {
    invalidations: Mutex<Vec<(ClientId, PathId)>>,
}

impl MemorySettingsCache {
    /// Creates a cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every invalidation so far, in order.
    pub fn invalidations(&self) -> Vec<(ClientId, PathId)> {
        self.invalidations.lock().clone()
    }
}

impl SettingsCache for MemorySettingsCache {
    fn invalidate(&self, client_id: &ClientId, path_id: PathId) {
        self.invalidations.lock().push((*client_id, path_id));
    }
}

/// Space oracle backed by explicit tables.
#[derive(Default)]
pub struct MemorySpaceOracle {
    spaces: RwLock<HashMap<String, SpaceEnv>>,
    bindings: RwLock<HashMap<PathBinding, ResolvedRemote>>,
    failing: RwLock<HashSet<PathBinding>>,
    file_ids: Mutex<HashMap<String, FileId>>,
    next_file_id: AtomicU64,
}

impl MemorySpaceOracle {
    /// Creates an oracle that resolves nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `env.remote_path` resolvable.
    pub fn add_space(&self, env: SpaceEnv) {
        self.spaces.write().insert(env.remote_path.clone(), env);
    }

    /// Sets the current resolution of a binding.
    pub fn set_binding(&self, binding: PathBinding, resolved: ResolvedRemote) {
        self.bindings.write().insert(binding, resolved);
    }

    /// Makes a binding unresolvable.
    pub fn remove_binding(&self, binding: &PathBinding) {
        self.bindings.write().remove(binding);
    }

    /// Makes lookups of a binding fail.
    pub fn fail_binding(&self, binding: PathBinding) {
        self.failing.write().insert(binding);
    }

    /// File id assigned to a remote path, if any.
    pub fn file_id(&self, remote_path: &str) -> Option<FileId> {
        self.file_ids.lock().get(remote_path).copied()
    }
}

impl SpaceOracle for MemorySpaceOracle {
    fn resolve_space(&self, _user: &SyncUser, remote_path: &str) -> GatewayResult<Option<SpaceEnv>> {
        let key = remote_path.trim_matches('/');
        Ok(self.spaces.read().get(key).cloned())
    }

    fn ensure_file_id(&self, _user: &SyncUser, env: &SpaceEnv) -> GatewayResult<FileId> {
        let mut file_ids = self.file_ids.lock();
        let id = file_ids
            .entry(env.remote_path.clone())
            .or_insert_with(|| self.next_file_id.fetch_add(1, Ordering::SeqCst) + 1);
        Ok(*id)
    }

    fn resolve_binding(
        &self,
        _user: &SyncUser,
        binding: &PathBinding,
    ) -> GatewayResult<Option<ResolvedRemote>> {
        if self.failing.read().contains(binding) {
            return Err(GatewayError::Unavailable("permission engine offline".into()));
        }
        Ok(self.bindings.read().get(binding).cloned())
    }
}

/// Account directory backed by explicit tables.
#[derive(Default)]
pub struct MemoryAccounts {
    users: RwLock<HashMap<UserId, SyncUser>>,
    passwords: RwLock<HashMap<String, (String, UserId)>>,
    second_factors: RwLock<HashMap<UserId, String>>,
    accesses: Mutex<Vec<(UserId, String, u64)>>,
}

impl MemoryAccounts {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user with a password.
    pub fn add_user(&self, user: SyncUser, password: impl Into<String>) {
        self.passwords
            .write()
            .insert(user.login.clone(), (password.into(), user.id));
        self.users.write().insert(user.id, user);
    }

    /// Replaces a stored user.
    pub fn update_user(&self, user: SyncUser) {
        self.users.write().insert(user.id, user);
    }

    /// Removes a user.
    pub fn remove_user(&self, user_id: UserId) {
        self.users.write().remove(&user_id);
    }

    /// Requires a second factor code for a user.
    pub fn set_second_factor(&self, user_id: UserId, code: impl Into<String>) {
        self.second_factors.write().insert(user_id, code.into());
        if let Some(user) = self.users.write().get_mut(&user_id) {
            user.two_factor_enabled = true;
        }
    }

    /// Recorded accesses as `(user, ip, at)`.
    pub fn accesses(&self) -> Vec<(UserId, String, u64)> {
        self.accesses.lock().clone()
    }
}

impl AccountDirectory for MemoryAccounts {
    fn verify_credentials(&self, login: &str, password: &str) -> GatewayResult<Option<SyncUser>> {
        let user_id = match self.passwords.read().get(login) {
            Some((stored, id)) if stored == password => *id,
            _ => return Ok(None),
        };
        Ok(self.users.read().get(&user_id).cloned())
    }

    fn verify_second_factor(&self, user: &SyncUser, code: &str) -> GatewayResult<bool> {
        Ok(self
            .second_factors
            .read()
            .get(&user.id)
            .is_some_and(|expected| expected == code))
    }

    fn find_user(&self, user_id: UserId) -> GatewayResult<Option<SyncUser>> {
        Ok(self.users.read().get(&user_id).cloned())
    }

    fn record_access(&self, user_id: UserId, ip: &str, at: u64) -> GatewayResult<()> {
        self.accesses.lock().push((user_id, ip.to_owned(), at));
        Ok(())
    }
}

/// Issuer returning predictable credentials.
#[derive(Default)]
pub struct StaticIssuer {
    fail: AtomicBool,
}

impl StaticIssuer {
    /// Creates an issuer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every issuance fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> GatewayResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("token service offline".into()));
        }
        Ok(())
    }
}

impl CredentialIssuer for StaticIssuer {
    fn issue_tokens(&self, user: &SyncUser) -> GatewayResult<SessionTokens> {
        self.check()?;
        Ok(SessionTokens {
            access_token: format!("access-{}", user.id),
            refresh_token: format!("refresh-{}", user.id),
        })
    }

    fn issue_cookies(&self, user: &SyncUser) -> GatewayResult<Vec<SessionCookie>> {
        self.check()?;
        Ok(vec![
            SessionCookie {
                name: "access".into(),
                value: format!("access-{}", user.id),
                max_age: 3600,
                http_only: true,
            },
            SessionCookie {
                name: "refresh".into(),
                value: format!("refresh-{}", user.id),
                max_age: 86_400,
                http_only: true,
            },
        ])
    }
}

/// Notification sink that records what it is sent.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<PathRemovedNotice>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    /// Creates a notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered notices, in order.
    pub fn notices(&self) -> Vec<PathRemovedNotice> {
        self.notices.lock().clone()
    }

    /// Makes every delivery fail.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl NotificationSink for RecordingNotifier {
    fn path_removed(&self, notice: &PathRemovedNotice) -> GatewayResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("mailer offline".into()));
        }
        self.notices.lock().push(notice.clone());
        Ok(())
    }
}

/// A full set of in-memory gateways with typed handles kept for inspection.
#[derive(Clone, Default)]
pub struct MemoryGateways {
    /// Client and path rows.
    pub store: Arc<MemoryStore>,
    /// Settings cache.
    pub cache: Arc<MemorySettingsCache>,
    /// Space oracle.
    pub oracle: Arc<MemorySpaceOracle>,
    /// Account directory.
    pub accounts: Arc<MemoryAccounts>,
    /// Credential issuer.
    pub issuer: Arc<StaticIssuer>,
    /// Notification sink.
    pub notifier: Arc<RecordingNotifier>,
}

impl MemoryGateways {
    /// Creates empty gateways.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Type-erased handles for a server.
    pub fn gateways(&self) -> Gateways {
        Gateways {
            clients: self.store.clone(),
            paths: self.store.clone(),
            cache: self.cache.clone(),
            oracle: self.oracle.clone(),
            accounts: self.accounts.clone(),
            issuer: self.issuer.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathsync_protocol::ClientType;

    fn info() -> ClientInfo {
        ClientInfo {
            node: "laptop".into(),
            os: "linux".into(),
            os_release: "6.1".into(),
            client_type: ClientType::Desktop,
            version: "1.0.0".into(),
        }
    }

    fn new_client(owner_id: UserId, id: ClientId) -> NewSyncClient {
        NewSyncClient {
            id,
            owner_id,
            token: "secret".into(),
            token_expiration: 1_000,
            info: info(),
            ip: "10.0.0.1".into(),
            created_at: 10,
        }
    }

    #[test]
    fn access_trail_shifts() {
        let store = MemoryStore::new();
        let id = ClientId::random();
        store.create_client(new_client(1, id)).unwrap();

        store.update_info(1, &id, &info(), "10.0.0.2", 20).unwrap();
        let client = store.client(1, &id).unwrap();
        assert_eq!(client.current_ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(client.last_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(client.current_access, Some(20));
        assert_eq!(client.last_access, Some(10));
    }

    #[test]
    fn clients_are_scoped_by_owner() {
        let store = MemoryStore::new();
        let id = ClientId::random();
        store.create_client(new_client(1, id)).unwrap();

        assert!(store.get_client(2, &id).unwrap().is_none());
        assert!(!store.delete_client(2, &id).unwrap());
        assert!(store.find_by_token(&id, "secret").unwrap().is_some());
        assert!(store.find_by_token(&id, "other").unwrap().is_none());
    }

    #[test]
    fn deleting_a_client_cascades_to_paths() {
        let store = MemoryStore::new();
        let id = ClientId::random();
        store.create_client(new_client(1, id)).unwrap();
        let path_id = store
            .create_path(NewSyncPath {
                owner_id: 1,
                client_id: id,
                binding: PathBinding::Personal {
                    owner_id: 1,
                    file_id: None,
                },
                settings: SyncPathSettings::new("docs", "/docs", "PERSONAL"),
            })
            .unwrap();

        assert!(store.delete_client(1, &id).unwrap());
        assert!(store.path(path_id).is_none());
    }

    #[test]
    fn failing_path_writes_are_not_counted() {
        let store = MemoryStore::new();
        store.set_fail_path_writes(true);
        assert!(store.delete_path(&ClientId::random(), 1).is_err());
        assert_eq!(store.path_writes(), 0);
    }

    #[test]
    fn file_ids_are_stable_per_remote_path() {
        let oracle = MemorySpaceOracle::new();
        let user = SyncUser::new(1, "alice");
        let env = SpaceEnv {
            location: crate::gateway::SpaceLocation::Personal,
            at_root: false,
            remote_path: "PERSONAL/docs".into(),
            permissions: "rw".into(),
            real_path: std::path::PathBuf::from("/srv/alice/docs"),
        };
        let first = oracle.ensure_file_id(&user, &env).unwrap();
        assert_eq!(oracle.ensure_file_id(&user, &env).unwrap(), first);
        assert_eq!(oracle.file_id("PERSONAL/docs"), Some(first));
    }
}
