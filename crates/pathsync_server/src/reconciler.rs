//! Sync path management and reconciliation.

use crate::context::{Caller, HandlerContext};
use crate::error::{GatewayError, ServerError, ServerResult};
use crate::gateway::{
    NewSyncPath, PathBinding, PathRemovedNotice, SpaceEnv, SpaceLocation, SyncPathRecord, SyncUser,
};
use crate::plan::{plan_path, PathPlan, ServerView};
use crate::tokens::next_logical_timestamp;
use pathsync_protocol::{
    ClientId, CreatePathRequest, CreatePathResponse, FileId, PathId, PathInstructions, SyncPath,
    SyncPathPatch, SyncPathSettings,
};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Owns sync path state and reconciliation.
pub struct PathReconciler {
    context: Arc<HandlerContext>,
}

impl PathReconciler {
    /// Creates a reconciler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Creates a sync path for the caller's client.
    ///
    /// The requested `remotePath` is resolved by the space oracle; the stored
    /// `remotePath` and `permissions` are always the resolved ones.
    pub fn create_path(
        &self,
        caller: &Caller,
        request: CreatePathRequest,
    ) -> ServerResult<CreatePathResponse> {
        let client_id = caller.require_client_id()?;
        let user = &caller.user;
        let gateways = &self.context.gateways;

        if user.quota_exceeded {
            return Err(ServerError::InsufficientStorage(format!(
                "storage quota of user {} is exceeded",
                user.id
            )));
        }

        let requested = request.settings;
        validate_remote_path(&requested.remote_path)?;

        let env = gateways
            .oracle
            .resolve_space(user, &requested.remote_path)
            .map_err(|e| internal("space resolution", e))?
            .ok_or_else(|| {
                ServerError::NotFound(format!("remote path {:?} not found", requested.remote_path))
            })?;
        check_directory(&env.real_path)?;

        match gateways.clients.get_client(user.id, &client_id) {
            Ok(Some(_)) => {}
            Ok(None) => return Err(ServerError::NotFound(format!("client {client_id} not found"))),
            Err(e) => return Err(internal("client lookup", e)),
        }

        let binding = self.get_db_props(user, &env)?;

        let mut settings = requested.with_remote(&env.remote_path, &env.permissions);
        if settings.timestamp == 0 {
            settings.timestamp = next_logical_timestamp(0);
        }

        let id = gateways
            .paths
            .create_path(NewSyncPath {
                owner_id: user.id,
                client_id,
                binding,
                settings,
            })
            .map_err(|e| internal("path creation", e))?;

        tracing::info!(
            path_id = id,
            client_id = %client_id,
            remote_path = %env.remote_path,
            permissions = %env.permissions,
            "sync path created"
        );
        Ok(CreatePathResponse {
            id,
            permissions: env.permissions,
        })
    }

    /// Maps a resolved location to the storage binding of a sync path.
    ///
    /// Subdirectories get a file record, created on first use. The shares
    /// list itself cannot be synchronized, only a concrete share.
    pub fn get_db_props(&self, user: &SyncUser, env: &SpaceEnv) -> ServerResult<PathBinding> {
        let binding = match env.location {
            SpaceLocation::SharesList => {
                return Err(ServerError::BadRequest(
                    "the shares list cannot be synchronized, select a share".into(),
                ))
            }
            SpaceLocation::Personal => PathBinding::Personal {
                owner_id: user.id,
                file_id: self.file_id(user, env)?,
            },
            SpaceLocation::Space {
                space_id,
                space_root_id,
            } => PathBinding::Space {
                space_id,
                space_root_id,
                file_id: self.file_id(user, env)?,
            },
            SpaceLocation::Share { share_id } => PathBinding::Share {
                share_id,
                file_id: self.file_id(user, env)?,
            },
        };
        Ok(binding)
    }

    fn file_id(&self, user: &SyncUser, env: &SpaceEnv) -> ServerResult<Option<FileId>> {
        if env.at_root {
            return Ok(None);
        }
        self.context
            .gateways
            .oracle
            .ensure_file_id(user, env)
            .map(Some)
            .map_err(|e| internal("file record resolution", e))
    }

    /// Deletes a sync path of `client_id`, or of the caller's client.
    pub fn delete_path(
        &self,
        caller: &Caller,
        id: PathId,
        client_id: Option<ClientId>,
    ) -> ServerResult<()> {
        let client_id = self.target_client(caller, client_id)?;
        let gateways = &self.context.gateways;

        let result = gateways.paths.delete_path(&client_id, id);
        gateways.cache.invalidate(&client_id, id);
        match result {
            Ok(true) => {
                tracing::info!(path_id = id, client_id = %client_id, "sync path deleted");
                Ok(())
            }
            Ok(false) => Err(ServerError::NotFound(format!("sync path {id} not found"))),
            Err(e) => {
                tracing::error!(path_id = id, client_id = %client_id, error = %e, "sync path deletion failed");
                Err(ServerError::BadRequest(format!("unable to delete sync path {id}: {e}")))
            }
        }
    }

    /// Applies a settings edit made outside of a client, such as from the
    /// owner's web interface.
    ///
    /// The location fields are server resolved and cannot be edited. The
    /// logical clock is always bumped; `lastSync` only moves forward.
    pub fn update_path(
        &self,
        caller: &Caller,
        client_id: ClientId,
        id: PathId,
        patch: SyncPathPatch,
    ) -> ServerResult<SyncPathSettings> {
        self.context.owned_client(caller.user.id, &client_id)?;
        let gateways = &self.context.gateways;

        let record = gateways
            .paths
            .get_path(&client_id, id)
            .map_err(|e| internal("path lookup", e))?
            .ok_or_else(|| ServerError::NotFound(format!("sync path {id} not found")))?;

        let mut patch = patch;
        patch.remote_path = None;
        patch.permissions = None;
        patch.timestamp = None;
        let last_sync = patch.last_sync.take();

        let mut settings = record.settings.clone();
        settings.apply(&patch);
        if let Some(last_sync) = last_sync {
            settings.last_sync = settings.last_sync.max(last_sync);
        }
        settings.timestamp = next_logical_timestamp(record.settings.timestamp);

        let result = gateways.paths.update_settings(&client_id, id, &settings);
        gateways.cache.invalidate(&client_id, id);
        result.map_err(|e| {
            tracing::error!(path_id = id, client_id = %client_id, error = %e, "sync path update failed");
            internal("path update", e)
        })?;

        tracing::debug!(path_id = id, timestamp = settings.timestamp, "sync path updated");
        Ok(settings)
    }

    /// Reconciles the caller client's full path snapshot with the server.
    ///
    /// Every id is processed on its own: gateway failures for one id are
    /// logged and never fail the pass.
    pub fn update_paths(
        &self,
        caller: &Caller,
        snapshot: Vec<SyncPath>,
    ) -> ServerResult<PathInstructions> {
        let client_id = caller.require_client_id()?;
        let user = &caller.user;
        self.context.owned_client(user.id, &client_id)?;

        let max = self.context.config.max_reconcile_paths;
        if snapshot.len() > max {
            return Err(ServerError::BadRequest(format!(
                "snapshot holds {} paths, at most {max} are accepted",
                snapshot.len()
            )));
        }

        let mut client_paths = BTreeMap::new();
        for path in snapshot {
            let id = path.id;
            if client_paths.insert(id, path.settings).is_some() {
                return Err(ServerError::BadRequest(format!(
                    "sync path {id} appears twice in the snapshot"
                )));
            }
        }

        let gateways = &self.context.gateways;
        let server_paths: BTreeMap<PathId, SyncPathRecord> = gateways
            .paths
            .list_paths(user.id, &client_id)
            .map_err(|e| internal("path listing", e))?
            .into_iter()
            .map(|record| (record.id, record))
            .collect();

        let ids: BTreeSet<PathId> = server_paths
            .keys()
            .chain(client_paths.keys())
            .copied()
            .collect();

        let mut instructions = PathInstructions::default();
        for id in ids {
            let server = server_paths.get(&id);
            let client = client_paths.get(&id);

            let resolved = match server {
                Some(record) => match gateways.oracle.resolve_binding(user, &record.binding) {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        tracing::warn!(path_id = id, error = %e, "space resolution failed, path skipped");
                        continue;
                    }
                },
                None => None,
            };

            let view = server.map(|record| ServerView::new(&record.settings, resolved.as_ref()));
            let plan = plan_path(id, view, client);
            self.execute(user, &client_id, plan, server, client, &mut instructions);
        }

        tracing::info!(
            client_id = %client_id,
            add = instructions.add.len(),
            update = instructions.update.len(),
            delete = instructions.delete.len(),
            "sync paths reconciled"
        );
        Ok(instructions)
    }

    /// Lists the sync paths of `client_id`, or of the caller's client.
    pub fn list_paths(
        &self,
        caller: &Caller,
        client_id: Option<ClientId>,
    ) -> ServerResult<Vec<SyncPath>> {
        let client_id = self.target_client(caller, client_id)?;
        let paths = self
            .context
            .gateways
            .paths
            .list_paths(caller.user.id, &client_id)
            .map_err(|e| internal("path listing", e))?;
        Ok(paths.iter().map(SyncPathRecord::to_sync_path).collect())
    }

    /// Gets one sync path of a client.
    pub fn get_path(&self, caller: &Caller, client_id: ClientId, id: PathId) -> ServerResult<SyncPath> {
        self.context.owned_client(caller.user.id, &client_id)?;
        self.context
            .gateways
            .paths
            .get_path(&client_id, id)
            .map_err(|e| internal("path lookup", e))?
            .map(|record| record.to_sync_path())
            .ok_or_else(|| ServerError::NotFound(format!("sync path {id} not found")))
    }

    fn target_client(&self, caller: &Caller, client_id: Option<ClientId>) -> ServerResult<ClientId> {
        let client_id = match client_id {
            Some(client_id) => client_id,
            None => caller.require_client_id()?,
        };
        self.context.owned_client(caller.user.id, &client_id)?;
        Ok(client_id)
    }

    fn execute(
        &self,
        owner: &SyncUser,
        client_id: &ClientId,
        plan: PathPlan,
        server: Option<&SyncPathRecord>,
        client: Option<&SyncPathSettings>,
        instructions: &mut PathInstructions,
    ) {
        let gateways = &self.context.gateways;
        let id = plan.id;

        if plan.remove {
            let removed = gateways.paths.delete_path(client_id, id);
            gateways.cache.invalidate(client_id, id);
            // The record survives a failed delete: leave the id to the next
            // pass so the removal is reported once.
            if let Err(e) = removed {
                tracing::warn!(path_id = id, error = %e, "unable to delete unavailable sync path, retrying on next pass");
                return;
            }
        }

        if let Some(settings) = &plan.persist {
            if let Err(e) = gateways.paths.update_settings(client_id, id, settings) {
                tracing::warn!(path_id = id, error = %e, "unable to store reconciled settings");
            }
            gateways.cache.invalidate(client_id, id);
        }

        if let Some(reason) = plan.notify {
            let (name, remote_path) = server
                .map(|record| &record.settings)
                .or(client)
                .map(|s| (s.name.clone(), s.remote_path.clone()))
                .unwrap_or_default();
            let notice = PathRemovedNotice {
                owner_id: owner.id,
                client_id: *client_id,
                path_id: id,
                name,
                remote_path,
                reason,
            };
            tracing::info!(path_id = id, client_id = %client_id, ?reason, "sync path removed");
            let notifier = Arc::clone(&gateways.notifier);
            self.context
                .background
                .spawn("notify_path_removed", move || notifier.path_removed(&notice));
        }

        if let Some(update) = plan.update_entry() {
            instructions.update.push(update);
        }
        if let Some(add) = plan.add {
            instructions.add.push(add);
        }
        if plan.delete {
            instructions.delete.push(id);
        }
    }
}

fn internal(operation: &str, error: GatewayError) -> ServerError {
    tracing::error!(operation, error = %error, "gateway call failed");
    ServerError::Internal(format!("{operation} failed: {error}"))
}

/// Rejects empty remote paths and relative segments.
fn validate_remote_path(remote_path: &str) -> ServerResult<()> {
    let trimmed = remote_path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(ServerError::BadRequest("remote path is empty".into()));
    }
    if trimmed
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == ".." || segment.contains('\0'))
    {
        return Err(ServerError::BadRequest(format!(
            "remote path {remote_path:?} is not valid"
        )));
    }
    Ok(())
}

fn check_directory(path: &Path) -> ServerResult<()> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(ServerError::BadRequest(format!(
            "{} is not a directory",
            path.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ServerError::NotFound(format!(
            "{} does not exist",
            path.display()
        ))),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "unable to stat sync directory");
            Err(ServerError::Internal(format!("unable to stat {}: {e}", path.display())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_path_validation() {
        assert!(validate_remote_path("PERSONAL/docs").is_ok());
        assert!(validate_remote_path("/SPACES/team/").is_ok());
        assert!(validate_remote_path("").is_err());
        assert!(validate_remote_path("/").is_err());
        assert!(validate_remote_path("PERSONAL/../other").is_err());
        assert!(validate_remote_path("PERSONAL/./docs").is_err());
        assert!(validate_remote_path("PERSONAL//docs").is_err());
    }

    #[test]
    fn directory_check() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_directory(dir.path()).is_ok());

        let file = dir.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(check_directory(&file), Err(ServerError::BadRequest(_))));

        let missing = dir.path().join("missing");
        assert!(matches!(check_directory(&missing), Err(ServerError::NotFound(_))));
    }
}
