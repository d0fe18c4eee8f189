//! Plan command implementation.

use pathsync_protocol::{PathId, PathInstructions, SyncPath, SyncPathSettings};
use pathsync_server::plan::{plan_path, ServerView};
use pathsync_server::{RemovalReason, ResolvedRemote};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// A server record in a plan fixture.
///
/// ```json
/// {"id": 7, "name": "docs", "remotePath": "SPACES/docs", "timestamp": 20,
///  "resolved": {"remotePath": "SPACES/docs", "permissions": "rw"}}
/// ```
///
/// A missing or null `resolved` means the location no longer resolves.
#[derive(Debug, Deserialize)]
pub struct ServerRecord {
    /// Stored path.
    #[serde(flatten)]
    pub path: SyncPath,
    /// Current resolution of the path's location.
    #[serde(default)]
    pub resolved: Option<Resolution>,
}

/// Resolved location in a plan fixture.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Canonical remote path.
    pub remote_path: String,
    /// Effective permission string.
    pub permissions: String,
}

/// A server-side write the pass would perform.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum PlannedWrite {
    /// Store new settings.
    Store {
        /// Path id.
        id: PathId,
        /// Settings to store.
        settings: SyncPathSettings,
    },
    /// Delete the record.
    Delete {
        /// Path id.
        id: PathId,
    },
}

/// An owner notification the pass would send.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PlannedNotice {
    /// Path id.
    pub id: PathId,
    /// Cause.
    pub reason: &'static str,
}

/// Plan result.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    /// Instructions for the client.
    pub instructions: PathInstructions,
    /// Server-side writes.
    pub writes: Vec<PlannedWrite>,
    /// Owner notifications.
    pub notifications: Vec<PlannedNotice>,
}

/// Runs the plan command.
pub fn run(server: &Path, client: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let records: Vec<ServerRecord> = serde_json::from_slice(&std::fs::read(server)?)
        .map_err(|e| format!("invalid server fixture {}: {e}", server.display()))?;
    let snapshot: Vec<SyncPath> = serde_json::from_slice(&std::fs::read(client)?)
        .map_err(|e| format!("invalid client snapshot {}: {e}", client.display()))?;

    tracing::debug!(
        server = records.len(),
        client = snapshot.len(),
        "planning reconciliation"
    );
    let report = build_report(records, snapshot)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

/// Computes the plan for every id of either side.
pub fn build_report(
    records: Vec<ServerRecord>,
    snapshot: Vec<SyncPath>,
) -> Result<PlanReport, Box<dyn std::error::Error>> {
    let mut server = BTreeMap::new();
    for record in records {
        let id = record.path.id;
        let resolved = record
            .resolved
            .map(|r| ResolvedRemote::new(r.remote_path, r.permissions));
        if server.insert(id, (record.path.settings, resolved)).is_some() {
            return Err(format!("server fixture lists path {id} twice").into());
        }
    }

    let mut client = BTreeMap::new();
    for path in snapshot {
        let id = path.id;
        if client.insert(id, path.settings).is_some() {
            return Err(format!("client snapshot lists path {id} twice").into());
        }
    }

    let ids: BTreeSet<PathId> = server.keys().chain(client.keys()).copied().collect();

    let mut report = PlanReport {
        instructions: PathInstructions::default(),
        writes: Vec::new(),
        notifications: Vec::new(),
    };

    for id in ids {
        let view = server
            .get(&id)
            .map(|(settings, resolved)| ServerView::new(settings, resolved.as_ref()));
        let plan = plan_path(id, view, client.get(&id));

        if plan.remove {
            report.writes.push(PlannedWrite::Delete { id });
        }
        if let Some(update) = plan.update_entry() {
            report.instructions.update.push(update);
        }
        if let Some(settings) = plan.persist {
            report.writes.push(PlannedWrite::Store { id, settings });
        }
        if let Some(reason) = plan.notify {
            report.notifications.push(PlannedNotice {
                id,
                reason: reason_name(reason),
            });
        }
        if let Some(add) = plan.add {
            report.instructions.add.push(add);
        }
        if plan.delete {
            report.instructions.delete.push(id);
        }
    }

    Ok(report)
}

fn reason_name(reason: RemovalReason) -> &'static str {
    match reason {
        RemovalReason::UnknownToServer => "unknown_to_server",
        RemovalReason::RemoteUnavailable => "remote_unavailable",
    }
}

fn print_text_output(report: &PlanReport) {
    let instructions = &report.instructions;
    println!("Reconciliation Plan");
    println!("===================");
    println!();

    if instructions.is_empty() && report.writes.is_empty() {
        println!("Nothing to do.");
        return;
    }

    println!("Client instructions:");
    for path in &instructions.add {
        println!(
            "  add     {:>6}  {} -> {} ({})",
            path.id, path.settings.name, path.settings.remote_path, path.settings.permissions
        );
    }
    for update in &instructions.update {
        let fields = serde_json::to_value(&update.patch)
            .ok()
            .and_then(|v| v.as_object().map(|o| o.keys().cloned().collect::<Vec<_>>()))
            .unwrap_or_default();
        println!("  update  {:>6}  {}", update.id, fields.join(", "));
    }
    for id in &instructions.delete {
        println!("  delete  {:>6}", id);
    }

    println!();
    println!("Server writes:");
    if report.writes.is_empty() {
        println!("  (none)");
    }
    for write in &report.writes {
        match write {
            PlannedWrite::Store { id, settings } => println!(
                "  store   {:>6}  timestamp={} lastSync={}",
                id, settings.timestamp, settings.last_sync
            ),
            PlannedWrite::Delete { id } => println!("  delete  {:>6}", id),
        }
    }

    if !report.notifications.is_empty() {
        println!();
        println!("Owner notifications:");
        for notice in &report.notifications {
            println!("  {:>6}  {}", notice.id, notice.reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(json: &str) -> Vec<ServerRecord> {
        serde_json::from_str(json).unwrap()
    }

    fn snapshot(json: &str) -> Vec<SyncPath> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn fixture_parses_flattened_settings() {
        let parsed = records(
            r#"[{"id": 3, "name": "docs", "timestamp": 4,
                 "resolved": {"remotePath": "PERSONAL/docs", "permissions": "rw"}}]"#,
        );
        assert_eq!(parsed[0].path.id, 3);
        assert_eq!(parsed[0].path.settings.name, "docs");
        assert_eq!(parsed[0].path.settings.timestamp, 4);
        assert_eq!(parsed[0].resolved.as_ref().unwrap().permissions, "rw");
    }

    #[test]
    fn report_covers_every_outcome() {
        let server = records(
            r#"[
                {"id": 1, "remotePath": "SPACES/a", "permissions": "rw", "timestamp": 5,
                 "resolved": {"remotePath": "SPACES/a", "permissions": "r"}},
                {"id": 2, "remotePath": "SPACES/gone", "permissions": "rw", "timestamp": 5}
            ]"#,
        );
        let client = snapshot(r#"[{"id": 3, "name": "orphan"}]"#);

        let report = build_report(server, client).unwrap();
        assert_eq!(report.instructions.add.len(), 1);
        assert_eq!(report.instructions.add[0].settings.permissions, "r");
        assert_eq!(report.instructions.delete, vec![2, 3]);
        assert_eq!(report.writes.len(), 2);
        assert!(report.writes.contains(&PlannedWrite::Delete { id: 2 }));
        assert_eq!(
            report.notifications,
            vec![
                PlannedNotice {
                    id: 2,
                    reason: "remote_unavailable"
                },
                PlannedNotice {
                    id: 3,
                    reason: "unknown_to_server"
                },
            ]
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let client = snapshot(r#"[{"id": 3}, {"id": 3}]"#);
        assert!(build_report(Vec::new(), client).is_err());
    }

    #[test]
    fn run_reads_fixture_files() {
        let dir = tempfile::tempdir().unwrap();
        let server = dir.path().join("server.json");
        let client = dir.path().join("client.json");
        std::fs::write(
            &server,
            r#"[{"id": 12, "remotePath": "SHARES/x", "permissions": "r", "timestamp": 2,
                 "resolved": {"remotePath": "SHARES/x", "permissions": "r"}}]"#,
        )
        .unwrap();
        std::fs::write(
            &client,
            r#"[{"id": 12, "remotePath": "SHARES/x", "permissions": "r", "timestamp": 2}]"#,
        )
        .unwrap();

        assert!(run(&server, &client, "json").is_ok());
        assert!(run(&server, &dir.path().join("missing.json"), "text").is_err());
    }
}
