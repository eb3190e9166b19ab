//! Durable record of every row the pipeline could not import.

use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStatus {
    Pending,
    Resolved,
    Ignored,
}

impl FailureStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureStatus::Pending => "pending",
            FailureStatus::Resolved => "resolved",
            FailureStatus::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<FailureStatus> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(FailureStatus::Pending),
            "resolved" => Some(FailureStatus::Resolved),
            "ignored" => Some(FailureStatus::Ignored),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedImportRecord {
    pub id: String,
    pub run_id: Option<String>,
    pub file_name: String,
    pub row_number: u64,
    pub error_reason: String,
    pub raw_data: Value,
    pub status: FailureStatus,
    pub notes: Option<String>,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

const COLUMNS: &str = "id, run_id, file_name, row_number, error_reason, raw_data, status, notes,
    created_at, resolved_at";

fn from_row(r: &Row<'_>) -> rusqlite::Result<FailedImportRecord> {
    let raw: String = r.get(5)?;
    let status: String = r.get(6)?;
    Ok(FailedImportRecord {
        id: r.get(0)?,
        run_id: r.get(1)?,
        file_name: r.get(2)?,
        row_number: r.get::<_, i64>(3)?.max(0) as u64,
        error_reason: r.get(4)?,
        raw_data: serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
        status: FailureStatus::parse(&status).unwrap_or(FailureStatus::Pending),
        notes: r.get(7)?,
        created_at: r.get(8)?,
        resolved_at: r.get(9)?,
    })
}

pub fn insert(
    conn: &Connection,
    run_id: Option<&str>,
    file_name: &str,
    row_number: u64,
    error_reason: &str,
    raw_data: &Value,
) -> rusqlite::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO failed_import_records(id, run_id, file_name, row_number, error_reason, raw_data)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            run_id,
            file_name,
            row_number as i64,
            error_reason,
            raw_data.to_string(),
        ),
    )?;
    Ok(id)
}

pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<FailedImportRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM failed_import_records WHERE id = ?", COLUMNS),
        [id],
        from_row,
    )
    .optional()
}

/// Oldest first; `None` lists every status.
pub fn list(
    conn: &Connection,
    status: Option<FailureStatus>,
) -> rusqlite::Result<Vec<FailedImportRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM failed_import_records
         WHERE (?1 IS NULL OR status = ?1)
         ORDER BY created_at, file_name, row_number, rowid",
        COLUMNS
    ))?;
    let rows = stmt.query_map([status.map(FailureStatus::as_str)], from_row)?;
    rows.collect()
}

/// Returns false when no record has this id.
pub fn set_status(
    conn: &Connection,
    id: &str,
    status: FailureStatus,
    notes: Option<&str>,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE failed_import_records
         SET status = ?1,
             notes = COALESCE(?2, notes),
             resolved_at = CASE WHEN ?1 = 'pending' THEN NULL
                                ELSE strftime('%Y-%m-%dT%H:%M:%SZ','now') END
         WHERE id = ?3",
        (status.as_str(), notes, id),
    )?;
    Ok(changed > 0)
}

/// Writes the records as CSV: bookkeeping columns, then the raw row as JSON.
pub fn export_csv(path: &Path, records: &[FailedImportRecord]) -> anyhow::Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut w = csv::Writer::from_path(path)?;
    w.write_record([
        "id",
        "file_name",
        "row_number",
        "status",
        "error_reason",
        "notes",
        "created_at",
        "raw_data",
    ])?;
    for rec in records {
        let row_number = rec.row_number.to_string();
        let raw_data = rec.raw_data.to_string();
        w.write_record([
            rec.id.as_str(),
            rec.file_name.as_str(),
            row_number.as_str(),
            rec.status.as_str(),
            rec.error_reason.as_str(),
            rec.notes.as_deref().unwrap_or(""),
            rec.created_at.as_str(),
            raw_data.as_str(),
        ])?;
    }
    w.flush()?;
    Ok(records.len())
}
