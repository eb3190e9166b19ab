use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::report::ImportReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRun {
    pub id: String,
    pub file_name: String,
    pub sha256: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub total_rows: i64,
    pub successes: i64,
    pub skips: i64,
    pub errors: i64,
}

const COLUMNS: &str =
    "id, file_name, sha256, started_at, finished_at, total_rows, successes, skips, errors";

fn from_row(r: &Row<'_>) -> rusqlite::Result<ImportRun> {
    Ok(ImportRun {
        id: r.get(0)?,
        file_name: r.get(1)?,
        sha256: r.get(2)?,
        started_at: r.get(3)?,
        finished_at: r.get(4)?,
        total_rows: r.get(5)?,
        successes: r.get(6)?,
        skips: r.get(7)?,
        errors: r.get(8)?,
    })
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn start(conn: &Connection, file_name: &str, bytes: &[u8]) -> rusqlite::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO import_runs(id, file_name, sha256) VALUES(?, ?, ?)",
        (&id, file_name, sha256_hex(bytes)),
    )?;
    Ok(id)
}

pub fn finish(conn: &Connection, run_id: &str, report: &ImportReport) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE import_runs
         SET finished_at = strftime('%Y-%m-%dT%H:%M:%SZ','now'),
             total_rows = ?, successes = ?, skips = ?, errors = ?
         WHERE id = ?",
        (
            report.total_rows as i64,
            report.successes as i64,
            report.skips as i64,
            report.errors as i64,
            run_id,
        ),
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<ImportRun>> {
    conn.query_row(
        &format!("SELECT {} FROM import_runs WHERE id = ?", COLUMNS),
        [id],
        from_row,
    )
    .optional()
}

/// Newest first.
pub fn list(conn: &Connection) -> rusqlite::Result<Vec<ImportRun>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM import_runs ORDER BY started_at DESC, rowid DESC",
        COLUMNS
    ))?;
    let rows = stmt.query_map([], from_row)?;
    rows.collect()
}

/// Earlier runs of byte-identical content.
pub fn previous_runs(conn: &Connection, sha256: &str, except_id: &str) -> rusqlite::Result<usize> {
    conn.query_row(
        "SELECT COUNT(*) FROM import_runs WHERE sha256 = ? AND id <> ?",
        (sha256, except_id),
        |r| r.get::<_, i64>(0),
    )
    .map(|n| n.max(0) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::import::report::{ImportReporter, RowOutcome};

    #[test]
    fn runs_are_fingerprinted_and_finalized() {
        let conn = db::open_in_memory().expect("db");
        let first = start(&conn, "a.csv", b"Inicio\n").expect("start");
        let second = start(&conn, "copy.csv", b"Inicio\n").expect("start");

        let mut reporter = ImportReporter::new("copy.csv");
        reporter.record(RowOutcome::skipped(2, "duplicate"));
        finish(&conn, &second, &reporter.finish()).expect("finish");

        let run = get(&conn, &second).expect("get").expect("run");
        assert_eq!(run.skips, 1);
        assert!(run.finished_at.is_some());
        assert_eq!(run.sha256.len(), 64);
        assert_eq!(previous_runs(&conn, &run.sha256, &second).expect("count"), 1);

        let ids: Vec<String> = list(&conn).expect("list").into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn digest_is_lowercase_hex() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
