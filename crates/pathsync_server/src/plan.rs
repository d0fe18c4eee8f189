//! Per-path reconciliation decisions.
//!
//! [`plan_path`] compares the server's copy of one sync path, the oracle's
//! current resolution of its remote location, and the client's copy. It
//! returns a [`PathPlan`] describing what the server must write and what the
//! client must be told. It performs no I/O; [`crate::PathReconciler`]
//! executes the plans.
//!
//! Authority follows the logical `timestamp`:
//!
//! | server | client | outcome |
//! |---|---|---|
//! | absent | present | client drops the path, owner is notified |
//! | unresolvable | any | server drops its record, client drops the path, owner is notified |
//! | resolvable | absent | client adds the server copy |
//! | older | newer | server takes the client copy |
//! | newer | older | client takes the full server copy |
//! | equal | equal | `lastSync` and location corrections only |
//!
//! `remotePath` and `permissions` are always the oracle's values; both
//! copies are corrected when they drifted.

use crate::gateway::{RemovalReason, ResolvedRemote};
use pathsync_protocol::{PathId, PathUpdate, SyncPath, SyncPathPatch, SyncPathSettings};

/// The server side of one path: stored settings and current resolution.
#[derive(Debug, Clone, Copy)]
pub struct ServerView<'a> {
    /// Stored settings.
    pub settings: &'a SyncPathSettings,
    /// Oracle resolution of the stored binding, `None` if it no longer
    /// resolves.
    pub resolved: Option<&'a ResolvedRemote>,
}

impl<'a> ServerView<'a> {
    /// Creates a view.
    pub fn new(settings: &'a SyncPathSettings, resolved: Option<&'a ResolvedRemote>) -> Self {
        Self { settings, resolved }
    }
}

/// What reconciliation does for one path id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPlan {
    /// Path id.
    pub id: PathId,
    /// Settings the server must store.
    pub persist: Option<SyncPathSettings>,
    /// Whether the server must delete its record.
    pub remove: bool,
    /// Path the client must create.
    pub add: Option<SyncPath>,
    /// Fields the client must overwrite.
    pub update: Option<SyncPathPatch>,
    /// Whether the client must drop the path.
    pub delete: bool,
    /// Owner notification to send.
    pub notify: Option<RemovalReason>,
}

impl PathPlan {
    fn noop(id: PathId) -> Self {
        Self {
            id,
            persist: None,
            remove: false,
            add: None,
            update: None,
            delete: false,
            notify: None,
        }
    }

    /// Returns true if the plan neither writes nor instructs anything.
    pub fn is_noop(&self) -> bool {
        *self == Self::noop(self.id)
    }

    /// Returns true if the plan writes to the server store.
    pub fn writes(&self) -> bool {
        self.persist.is_some() || self.remove
    }

    /// The update instruction, if any.
    pub fn update_entry(&self) -> Option<PathUpdate> {
        self.update
            .as_ref()
            .map(|patch| PathUpdate::new(self.id, patch.clone()))
    }
}

/// Decides how to reconcile one path id.
pub fn plan_path(
    id: PathId,
    server: Option<ServerView<'_>>,
    client: Option<&SyncPathSettings>,
) -> PathPlan {
    let mut plan = PathPlan::noop(id);

    let Some(server) = server else {
        if client.is_some() {
            plan.delete = true;
            plan.notify = Some(RemovalReason::UnknownToServer);
        }
        return plan;
    };

    let Some(resolved) = server.resolved else {
        plan.remove = true;
        plan.delete = true;
        plan.notify = Some(RemovalReason::RemoteUnavailable);
        return plan;
    };

    let stored = server.settings;
    let (remote_path, permissions) = (resolved.remote_path.as_str(), resolved.permissions.as_str());

    let Some(client) = client else {
        let corrected = stored.clone().with_remote(remote_path, permissions);
        if corrected != *stored {
            plan.persist = Some(corrected.clone());
        }
        plan.add = Some(SyncPath::new(id, corrected));
        return plan;
    };

    let client_drifted = client.remote_drifted(remote_path, permissions);

    if client.timestamp > stored.timestamp {
        let merged = client.clone().with_remote(remote_path, permissions);
        if merged != *stored {
            plan.persist = Some(merged);
        }
        if client_drifted {
            plan.update = Some(SyncPathPatch::corrections(remote_path, permissions));
        }
        return plan;
    }

    let mut merged = stored.clone().with_remote(remote_path, permissions);
    merged.last_sync = client.last_sync;
    if merged != *stored {
        plan.persist = Some(merged.clone());
    }

    if stored.timestamp > client.timestamp || !same_content(&merged, client) {
        plan.update = Some(SyncPathPatch::full(&merged));
    } else if client_drifted {
        plan.update = Some(SyncPathPatch::corrections(remote_path, permissions));
    }
    plan
}

/// Compares everything except the server-resolved location fields.
fn same_content(server: &SyncPathSettings, client: &SyncPathSettings) -> bool {
    let client = client
        .clone()
        .with_remote(&server.remote_path, &server.permissions);
    *server == client
}
