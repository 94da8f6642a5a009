use crate::backup::{self, BundleDocument};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

fn path_param(req: &Request, key: &str) -> Option<String> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Latest record per PIN, as bundle documents.
fn latest_record_documents(conn: &Connection) -> anyhow::Result<Vec<BundleDocument>> {
    let mut docs: Vec<BundleDocument> = Vec::new();
    for summary in db::list_results(conn)? {
        if docs.iter().any(|d| d.name == summary.pin) {
            continue;
        }
        if let Some(record) = db::latest_result(conn, &summary.pin)? {
            docs.push(BundleDocument {
                name: summary.pin,
                value: serde_json::to_value(&record)?,
            });
        }
    }
    Ok(docs)
}

fn handle_backup_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(out_path) = path_param(req, "outPath") else {
        return err(&req.id, "bad_params", "missing outPath", None);
    };
    let Some(workspace_path) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let documents = match state.db.as_ref() {
        Some(conn) => {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
            match latest_record_documents(conn) {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            }
        }
        None => Vec::new(),
    };

    let out = PathBuf::from(&out_path);
    match backup::export_workspace_bundle(&workspace_path, &out, &documents) {
        Ok(export) => {
            tracing::info!(
                path = %out_path,
                entries = export.entry_count,
                "exported workspace bundle"
            );
            ok(
                &req.id,
                json!({
                    "path": out_path,
                    "bundleFormat": export.bundle_format,
                    "entryCount": export.entry_count,
                    "dbSha256": export.db_sha256
                }),
            )
        }
        Err(e) => err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_path })),
        ),
    }
}

/// Reconnects to the selected workspace after a failed import so results
/// keep being stored there.
fn reopen_current_workspace(state: &mut AppState) {
    let Some(current) = state.workspace.clone() else {
        return;
    };
    match db::open_db(&current) {
        Ok(conn) => state.db = Some(conn),
        Err(e) => {
            tracing::error!(
                path = %current.display(),
                error = %e,
                "failed to reopen workspace"
            );
            state.workspace = None;
        }
    }
}

fn handle_backup_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(in_path) = path_param(req, "inPath") else {
        return err(&req.id, "bad_params", "missing inPath", None);
    };
    let workspace_path = path_param(req, "workspacePath")
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone());
    let Some(workspace_path) = workspace_path else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }

    // The open connection must be closed before its file is replaced.
    state.db = None;

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(path = %in_path, error = %e, "workspace import failed");
            reopen_current_workspace(state);
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": in_path })),
            );
        }
    };

    match db::open_db(&workspace_path) {
        Ok(conn) => {
            state.workspace = Some(workspace_path.clone());
            state.db = Some(conn);
            ok(
                &req.id,
                json!({
                    "workspacePath": workspace_path.to_string_lossy(),
                    "bundleFormatDetected": import.bundle_format_detected,
                    "dbSha256": import.db_sha256
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_backup_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_backup_import_workspace_bundle(state, req)),
        _ => None,
    }
}
