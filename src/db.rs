use anyhow::Context;
use rusqlite::Connection;
use std::path::Path;
use tracing::warn;

pub const DB_FILE_NAME: &str = "scholard.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!("failed to create workspace {}", workspace.to_string_lossy())
    })?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS people(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL,
            email TEXT UNIQUE,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_people_name_key ON people(name_key)",
        [],
    )?;
    ensure_people_unique_name_without_email(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS campuses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL UNIQUE,
            code TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS organizations(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL UNIQUE,
            acronym TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scholarship_types(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL UNIQUE,
            slug TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
        )",
        [],
    )?;
    // Workspaces created before types could be retired lack the flag.
    ensure_scholarship_types_is_active(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS initiatives(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL UNIQUE,
            coordinator_id TEXT,
            start_date TEXT,
            end_date TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            FOREIGN KEY(coordinator_id) REFERENCES people(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scholarships(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            type_id TEXT,
            campus_id TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT,
            supervisor_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            value_cents INTEGER NOT NULL DEFAULT 0,
            sponsor_id TEXT,
            initiative_id TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            updated_at TEXT,
            FOREIGN KEY(type_id) REFERENCES scholarship_types(id),
            FOREIGN KEY(campus_id) REFERENCES campuses(id),
            FOREIGN KEY(supervisor_id) REFERENCES people(id),
            FOREIGN KEY(student_id) REFERENCES people(id),
            FOREIGN KEY(sponsor_id) REFERENCES organizations(id),
            FOREIGN KEY(initiative_id) REFERENCES initiatives(id),
            UNIQUE(student_id, start_date, supervisor_id),
            CHECK(student_id <> supervisor_id),
            CHECK(value_cents >= 0),
            CHECK(end_date IS NULL OR end_date >= start_date)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scholarships_student ON scholarships(student_id, start_date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scholarships_campus ON scholarships(campus_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS import_runs(
            id TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            sha256 TEXT NOT NULL,
            started_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            finished_at TEXT,
            total_rows INTEGER NOT NULL DEFAULT 0,
            successes INTEGER NOT NULL DEFAULT 0,
            skips INTEGER NOT NULL DEFAULT 0,
            errors INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_import_runs_sha256 ON import_runs(sha256)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS failed_import_records(
            id TEXT PRIMARY KEY,
            run_id TEXT,
            file_name TEXT NOT NULL,
            row_number INTEGER NOT NULL,
            error_reason TEXT NOT NULL,
            raw_data TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            resolved_at TEXT,
            FOREIGN KEY(run_id) REFERENCES import_runs(id)
        )",
        [],
    )?;
    ensure_failed_import_records_notes(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_failed_import_records_status ON failed_import_records(status)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_failed_import_records_run ON failed_import_records(run_id)",
        [],
    )?;

    Ok(())
}

fn ensure_scholarship_types_is_active(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "scholarship_types", "is_active")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE scholarship_types ADD COLUMN is_active INTEGER NOT NULL DEFAULT 1",
        [],
    )?;
    Ok(())
}

/// People recorded without an email are keyed by name alone, so two importers
/// creating the same new person collide here instead of splitting the record.
fn ensure_people_unique_name_without_email(conn: &Connection) -> anyhow::Result<()> {
    match conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_people_name_key_no_email
         ON people(name_key) WHERE email IS NULL",
        [],
    ) {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => {
            warn!(error = %e, "people without email share a name; name uniqueness not enforced");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn ensure_failed_import_records_notes(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "failed_import_records", "notes")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE failed_import_records ADD COLUMN notes TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// True when `e` is SQLite rejecting a write on a UNIQUE or PRIMARY KEY constraint.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(f, _) => {
            f.code == rusqlite::ErrorCode::ConstraintViolation
                && (f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}
