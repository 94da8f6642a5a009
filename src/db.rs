use crate::provider::{MarksProvider, ProviderError};
use crate::record::{ProviderData, ResultRecord, SubjectResult};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "resultd.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS results(
            id TEXT PRIMARY KEY,
            pin TEXT NOT NULL,
            name TEXT,
            branch TEXT,
            photo_base64 TEXT,
            grand_total INTEGER NOT NULL,
            record_json TEXT NOT NULL,
            inputs_json TEXT NOT NULL,
            digest TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_pin ON results(pin, created_at)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS result_subjects(
            result_id TEXT NOT NULL,
            grp TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            subject_code INTEGER NOT NULL,
            internal_marks INTEGER NOT NULL,
            external_marks INTEGER NOT NULL,
            total_marks INTEGER NOT NULL,
            grade_points INTEGER NOT NULL,
            credits REAL NOT NULL,
            grade TEXT NOT NULL,
            status TEXT NOT NULL,
            PRIMARY KEY(result_id, grp, sort_order),
            FOREIGN KEY(result_id) REFERENCES results(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_result_subjects_code ON result_subjects(subject_code)",
        [],
    )?;
    Ok(())
}

/// SHA-256 hex digest of the serialized record.
pub fn record_digest(record: &ResultRecord) -> anyhow::Result<String> {
    let bytes = serde_json::to_vec(record).context("failed to serialize record")?;
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResult {
    pub id: String,
    pub digest: String,
    pub unchanged: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub id: String,
    pub pin: String,
    pub name: Option<String>,
    pub grand_total: i64,
    pub subject_count: i64,
    pub created_at: String,
}

fn insert_subject_rows(
    tx: &Connection,
    result_id: &str,
    grp: &str,
    rows: &[SubjectResult],
) -> anyhow::Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO result_subjects(
            result_id, grp, sort_order, subject_code, internal_marks, external_marks,
            total_marks, grade_points, credits, grade, status
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?;
    for (i, row) in rows.iter().enumerate() {
        stmt.execute(rusqlite::params![
            result_id,
            grp,
            i as i64,
            row.subject_code,
            row.internal_marks,
            row.external_marks,
            row.total_marks,
            row.grade_points,
            row.credits,
            row.grade.as_str(),
            row.status.as_str(),
        ])?;
    }
    Ok(())
}

/// Stores a fully computed record with the inputs it was computed from.
/// The record and its subject rows are written in one transaction. Storing
/// the same record twice in a row for a PIN keeps the existing entry.
pub fn store_result(
    conn: &Connection,
    record: &ResultRecord,
    inputs: &ProviderData,
) -> anyhow::Result<StoredResult> {
    let digest = record_digest(record)?;

    let latest: Option<(String, String)> = conn
        .query_row(
            "SELECT id, digest FROM results WHERE pin = ? ORDER BY created_at DESC, rowid DESC LIMIT 1",
            [&record.pin],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    if let Some((id, latest_digest)) = latest {
        if latest_digest == digest {
            return Ok(StoredResult {
                id,
                digest,
                unchanged: true,
            });
        }
    }

    let record_json = serde_json::to_string(record).context("failed to serialize record")?;
    let inputs_json = serde_json::to_string(inputs).context("failed to serialize inputs")?;
    let id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();

    let tx = conn
        .unchecked_transaction()
        .context("failed to begin transaction")?;
    tx.execute(
        "INSERT INTO results(
            id, pin, name, branch, photo_base64, grand_total,
            record_json, inputs_json, digest, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            &id,
            &record.pin,
            &record.name,
            &record.branch,
            &record.photo_base64,
            record.totals.grand_total,
            &record_json,
            &inputs_json,
            &digest,
            &created_at,
        ],
    )
    .context("failed to insert result")?;
    insert_subject_rows(&tx, &id, "unit", &record.unit_results)?;
    insert_subject_rows(&tx, &id, "session", &record.session_results)?;
    tx.commit().context("failed to commit result")?;

    Ok(StoredResult {
        id,
        digest,
        unchanged: false,
    })
}

fn latest_column(conn: &Connection, pin: &str, column: &str) -> anyhow::Result<Option<String>> {
    let sql = format!(
        "SELECT {column} FROM results WHERE pin = ? ORDER BY created_at DESC, rowid DESC LIMIT 1"
    );
    Ok(conn
        .query_row(&sql, [pin.trim().to_uppercase()], |r| r.get(0))
        .optional()?)
}

pub fn latest_result(conn: &Connection, pin: &str) -> anyhow::Result<Option<ResultRecord>> {
    let Some(text) = latest_column(conn, pin, "record_json")? else {
        return Ok(None);
    };
    let record = serde_json::from_str(&text).context("stored record_json is invalid")?;
    Ok(Some(record))
}

pub fn latest_inputs(conn: &Connection, pin: &str) -> anyhow::Result<Option<ProviderData>> {
    let Some(text) = latest_column(conn, pin, "inputs_json")? else {
        return Ok(None);
    };
    let inputs = serde_json::from_str(&text).context("stored inputs_json is invalid")?;
    Ok(Some(inputs))
}

pub fn list_results(conn: &Connection) -> anyhow::Result<Vec<ResultSummary>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.pin, r.name, r.grand_total, r.created_at,
                (SELECT COUNT(*) FROM result_subjects s WHERE s.result_id = r.id)
         FROM results r
         ORDER BY r.created_at DESC, r.rowid DESC",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ResultSummary {
                id: r.get(0)?,
                pin: r.get(1)?,
                name: r.get(2)?,
                grand_total: r.get(3)?,
                created_at: r.get(4)?,
                subject_count: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Deletes every stored record for `pin`; returns how many were removed.
pub fn delete_results(conn: &Connection, pin: &str) -> anyhow::Result<usize> {
    let pin = pin.trim().to_uppercase();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM result_subjects WHERE result_id IN (SELECT id FROM results WHERE pin = ?)",
        [&pin],
    )?;
    let removed = tx.execute("DELETE FROM results WHERE pin = ?", [&pin])?;
    tx.commit()?;
    Ok(removed)
}

/// Replays the inputs last stored for an identifier.
pub struct StoredInputs<'a> {
    conn: &'a Connection,
}

impl<'a> StoredInputs<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl MarksProvider for StoredInputs<'_> {
    fn fetch(&self, identifier: &str) -> Result<ProviderData, ProviderError> {
        let identifier = crate::provider::require_identifier(identifier)?;
        latest_inputs(self.conn, identifier)?
            .ok_or_else(|| ProviderError::NoStoredInputs(identifier.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::compute_result;

    fn mem_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        init_schema(&conn).expect("init schema");
        conn
    }

    fn sample_inputs(first: i64) -> ProviderData {
        ProviderData {
            name: Some("Ravi".to_string()),
            unit_scores: vec![vec![first, 74], vec![40, 41]],
            session_scores: vec![55],
            ..Default::default()
        }
    }

    fn subject_row_count(conn: &Connection, id: &str) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM result_subjects WHERE result_id = ?",
            [id],
            |r| r.get(0),
        )
        .expect("count subject rows")
    }

    #[test]
    fn store_and_read_back() {
        let conn = mem_db();
        let inputs = sample_inputs(70);
        let record = compute_result("2212345", &inputs);

        let stored = store_result(&conn, &record, &inputs).expect("store");
        assert!(!stored.unchanged);
        assert_eq!(stored.digest.len(), 64);
        assert_eq!(subject_row_count(&conn, &stored.id), 3);

        let back = latest_result(&conn, "2212345").expect("query").expect("record");
        assert_eq!(back, record);
        let replay = latest_inputs(&conn, " 2212345 ").expect("query").expect("inputs");
        assert_eq!(replay, inputs);
    }

    #[test]
    fn identical_record_is_not_duplicated() {
        let conn = mem_db();
        let inputs = sample_inputs(70);
        let record = compute_result("2212345", &inputs);

        let first = store_result(&conn, &record, &inputs).expect("store");
        let second = store_result(&conn, &record, &inputs).expect("store again");
        assert!(second.unchanged);
        assert_eq!(first.id, second.id);
        assert_eq!(list_results(&conn).expect("list").len(), 1);

        let changed_inputs = sample_inputs(20);
        let changed = compute_result("2212345", &changed_inputs);
        let third = store_result(&conn, &changed, &changed_inputs).expect("store changed");
        assert!(!third.unchanged);
        assert_ne!(third.id, first.id);

        let summaries = list_results(&conn).expect("list");
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, third.id);
        assert_eq!(summaries[0].subject_count, 3);
        assert_eq!(
            latest_result(&conn, "2212345").expect("query").expect("record"),
            changed
        );
    }

    #[test]
    fn delete_removes_records_and_subjects() {
        let conn = mem_db();
        let inputs = sample_inputs(70);
        let record = compute_result("22ab", &inputs);
        let stored = store_result(&conn, &record, &inputs).expect("store");

        assert_eq!(delete_results(&conn, "22ab").expect("delete"), 1);
        assert_eq!(subject_row_count(&conn, &stored.id), 0);
        assert!(latest_result(&conn, "22AB").expect("query").is_none());
        assert_eq!(delete_results(&conn, "22ab").expect("delete again"), 0);
    }

    #[test]
    fn stored_inputs_provider() {
        let conn = mem_db();
        let provider = StoredInputs::new(&conn);
        assert!(matches!(
            provider.fetch("2212345"),
            Err(ProviderError::NoStoredInputs(_))
        ));

        let inputs = sample_inputs(70);
        let record = compute_result("2212345", &inputs);
        store_result(&conn, &record, &inputs).expect("store");
        assert_eq!(provider.fetch("2212345").expect("fetch"), inputs);
    }
}
