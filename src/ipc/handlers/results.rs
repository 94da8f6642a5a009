use crate::backup;
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::provider::{require_identifier, MarksProvider, PayloadProvider};
use crate::record::{compute_result, ProviderData, ResultRecord};
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

fn pin_param(req: &Request) -> Result<String, HandlerErr> {
    let raw = req.params.get("pin").and_then(|v| v.as_str()).unwrap_or("");
    Ok(require_identifier(raw)?.to_string())
}

fn require_db<'a>(state: &'a AppState) -> Result<&'a Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn record_json(record: &ResultRecord) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(record).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

/// Persists a computed record and merges the storage outcome into the
/// response body.
fn store_and_respond(
    conn: &Connection,
    record: &ResultRecord,
    inputs: &ProviderData,
) -> Result<serde_json::Value, HandlerErr> {
    let stored = db::store_result(conn, record, inputs).map_err(|e| {
        tracing::warn!(pin = %record.pin, error = %e, "failed to store result");
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "results" }))
    })?;
    let mut body = record_json(record)?;
    body["resultId"] = json!(stored.id);
    body["unchanged"] = json!(stored.unchanged);
    body["digest"] = json!(stored.digest);
    Ok(body)
}

fn compute(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let pin = pin_param(req)?;
    let persist = req.params.get("persist").and_then(|v| v.as_bool());
    if persist == Some(true) && state.db.is_none() {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    }

    let inputs = PayloadProvider::new(&req.params).fetch(&pin)?;
    let record = compute_result(&pin, &inputs);
    tracing::debug!(
        pin = %record.pin,
        subjects = record.subject_count(),
        grand_total = record.totals.grand_total,
        "computed result"
    );

    match state.db.as_ref() {
        Some(conn) if persist != Some(false) => store_and_respond(conn, &record, &inputs),
        _ => record_json(&record),
    }
}

fn recompute(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let pin = pin_param(req)?;
    let inputs = db::StoredInputs::new(conn).fetch(&pin)?;
    let record = compute_result(&pin, &inputs);
    store_and_respond(conn, &record, &inputs)
}

fn load_latest(conn: &Connection, pin: &str) -> Result<ResultRecord, HandlerErr> {
    db::latest_result(conn, pin)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?
        .ok_or_else(|| {
            HandlerErr::new("not_found", "no stored result for pin")
                .with_details(json!({ "pin": pin }))
        })
}

fn get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let pin = pin_param(req)?;
    record_json(&load_latest(conn, &pin)?)
}

fn list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let results =
        db::list_results(conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    Ok(json!({ "results": results }))
}

fn delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let pin = pin_param(req)?;
    let removed = db::delete_results(conn, &pin)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    Ok(json!({ "pin": pin, "removed": removed }))
}

fn export_json(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let pin = pin_param(req)?;
    let record = load_latest(conn, &pin)?;

    let out_path = match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(p) if !p.trim().is_empty() => PathBuf::from(p.trim()),
        _ => match state.workspace.as_ref() {
            Some(ws) => ws.join(&state.export_file_name),
            None => return Err(HandlerErr::new("no_workspace", "select a workspace first")),
        },
    };

    backup::export_json(&record, &out_path).map_err(|e| {
        HandlerErr::new("io_failed", e.to_string())
            .with_details(json!({ "path": out_path.to_string_lossy() }))
    })?;
    tracing::info!(pin = %record.pin, path = %out_path.display(), "exported result");
    Ok(json!({ "pin": record.pin, "path": out_path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: fn(&mut AppState, &Request) -> Result<serde_json::Value, HandlerErr> =
        match req.method.as_str() {
            "results.compute" => compute,
            "results.recompute" => recompute,
            "results.get" => get,
            "results.list" => list,
            "results.delete" => delete,
            "results.exportJson" => export_json,
            _ => return None,
        };
    Some(match handler(state, req) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
