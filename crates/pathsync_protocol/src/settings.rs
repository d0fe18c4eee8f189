//! Typed sync path settings and field-by-field merge.
//!
//! Both sides of a sync path edit its settings independently. Each edit bumps
//! the logical `timestamp`; completing a sync cycle bumps `last_sync`
//! instead. Reconciliation compares these two counters to decide which side
//! is authoritative, so merging is explicit: a [`SyncPathPatch`] names every
//! field it overwrites.

use serde::{Deserialize, Serialize};

/// Transfer direction of a sync path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Local changes are uploaded only.
    Upload,
    /// Remote changes are downloaded only.
    Download,
    /// Changes flow both ways.
    #[default]
    Both,
}

/// How file differences are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMode {
    /// Size and modification time.
    #[default]
    Fast,
    /// Content checksums.
    Secure,
}

/// Which copy wins when a file changed on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictMode {
    /// Most recently modified copy.
    #[default]
    Recent,
    /// Local copy.
    Local,
    /// Remote copy.
    Remote,
}

/// Unit of the automatic sync interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerUnit {
    /// No automatic sync.
    #[default]
    Disabled,
    /// Every `value` minutes.
    Minute,
    /// Every `value` hours.
    Hour,
    /// Every `value` days.
    Day,
}

/// Automatic sync schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncScheduler {
    /// Interval unit.
    pub unit: SchedulerUnit,
    /// Interval length.
    pub value: u32,
}

/// Settings of one sync path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncPathSettings {
    /// Display name.
    pub name: String,
    /// Folder on the client machine.
    pub local_path: String,
    /// Location in the server storage hierarchy (server resolved).
    pub remote_path: String,
    /// Effective permission string (server resolved).
    pub permissions: String,
    /// Transfer direction.
    pub mode: SyncMode,
    /// Whether the path is synchronized at all.
    pub enabled: bool,
    /// Difference detection mode.
    pub diff_mode: DiffMode,
    /// Conflict resolution mode.
    pub conflict_mode: ConflictMode,
    /// Ignore patterns.
    pub filters: Vec<String>,
    /// Automatic schedule.
    pub scheduler: SyncScheduler,
    /// Logical clock, bumped by whichever side edits the settings.
    pub timestamp: u64,
    /// Completed sync cycles counter.
    pub last_sync: u64,
}

impl Default for SyncPathSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            local_path: String::new(),
            remote_path: String::new(),
            permissions: String::new(),
            mode: SyncMode::default(),
            enabled: true,
            diff_mode: DiffMode::default(),
            conflict_mode: ConflictMode::default(),
            filters: Vec::new(),
            scheduler: SyncScheduler::default(),
            timestamp: 0,
            last_sync: 0,
        }
    }
}

impl SyncPathSettings {
    /// Creates settings for a new path.
    pub fn new(
        name: impl Into<String>,
        local_path: impl Into<String>,
        remote_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            ..Self::default()
        }
    }

    /// Merges a patch into these settings, field by field.
    pub fn apply(&mut self, patch: &SyncPathPatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(local_path) = &patch.local_path {
            self.local_path.clone_from(local_path);
        }
        if let Some(remote_path) = &patch.remote_path {
            self.remote_path.clone_from(remote_path);
        }
        if let Some(permissions) = &patch.permissions {
            self.permissions.clone_from(permissions);
        }
        if let Some(mode) = patch.mode {
            self.mode = mode;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(diff_mode) = patch.diff_mode {
            self.diff_mode = diff_mode;
        }
        if let Some(conflict_mode) = patch.conflict_mode {
            self.conflict_mode = conflict_mode;
        }
        if let Some(filters) = &patch.filters {
            self.filters.clone_from(filters);
        }
        if let Some(scheduler) = patch.scheduler {
            self.scheduler = scheduler;
        }
        if let Some(timestamp) = patch.timestamp {
            self.timestamp = timestamp;
        }
        if let Some(last_sync) = patch.last_sync {
            self.last_sync = last_sync;
        }
    }

    /// Returns a copy with the server-resolved location fields.
    pub fn with_remote(mut self, remote_path: &str, permissions: &str) -> Self {
        remote_path.clone_into(&mut self.remote_path);
        permissions.clone_into(&mut self.permissions);
        self
    }

    /// Returns true if the held location fields differ from the resolved ones.
    pub fn remote_drifted(&self, remote_path: &str, permissions: &str) -> bool {
        self.remote_path != remote_path || self.permissions != permissions
    }
}

/// A partial update of [`SyncPathSettings`].
///
/// Absent fields are left untouched by [`SyncPathSettings::apply`] and are
/// omitted on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncPathPatch {
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Folder on the client machine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    /// Location in the server storage hierarchy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<String>,
    /// Effective permission string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    /// Transfer direction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<SyncMode>,
    /// Whether the path is synchronized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Difference detection mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_mode: Option<DiffMode>,
    /// Conflict resolution mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_mode: Option<ConflictMode>,
    /// Ignore patterns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<String>>,
    /// Automatic schedule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SyncScheduler>,
    /// Logical clock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Completed sync cycles counter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<u64>,
}

impl SyncPathPatch {
    /// Creates a patch setting every field of `settings`.
    pub fn full(settings: &SyncPathSettings) -> Self {
        Self {
            name: Some(settings.name.clone()),
            local_path: Some(settings.local_path.clone()),
            remote_path: Some(settings.remote_path.clone()),
            permissions: Some(settings.permissions.clone()),
            mode: Some(settings.mode),
            enabled: Some(settings.enabled),
            diff_mode: Some(settings.diff_mode),
            conflict_mode: Some(settings.conflict_mode),
            filters: Some(settings.filters.clone()),
            scheduler: Some(settings.scheduler),
            timestamp: Some(settings.timestamp),
            last_sync: Some(settings.last_sync),
        }
    }

    /// Creates a corrections-only patch carrying the resolved location.
    pub fn corrections(remote_path: impl Into<String>, permissions: impl Into<String>) -> Self {
        Self {
            remote_path: Some(remote_path.into()),
            permissions: Some(permissions.into()),
            ..Self::default()
        }
    }

    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
