mod test_support;

use rusqlite::Connection;
use serde_json::json;
use test_support::{request_ok, spawn_sidecar, temp_dir};

#[test]
fn older_workspace_gains_new_columns_on_open() {
    let workspace = temp_dir("scholard-legacy-ws");
    {
        let conn = Connection::open(workspace.join("scholard.sqlite3")).expect("open legacy db");
        conn.execute_batch(
            "CREATE TABLE scholarship_types(
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                name_key TEXT NOT NULL UNIQUE,
                slug TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
             );
             INSERT INTO scholarship_types(id, name, name_key, slug) VALUES('t1', 'PIBIC', 'pibic', 'pibic');
             CREATE TABLE failed_import_records(
                id TEXT PRIMARY KEY,
                run_id TEXT,
                file_name TEXT NOT NULL,
                row_number INTEGER NOT NULL,
                error_reason TEXT NOT NULL,
                raw_data TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
                resolved_at TEXT
             );
             INSERT INTO failed_import_records(id, file_name, row_number, error_reason, raw_data)
                VALUES('f1', 'old.csv', 4, 'Orientado: required field is missing', '{}');",
        )
        .expect("legacy schema");
    }

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let types = request_ok(&mut stdin, &mut reader, "2", "scholarshipTypes.list", json!({}));
    assert_eq!(types["scholarshipTypes"][0]["slug"], "pibic");
    assert_eq!(types["scholarshipTypes"][0]["isActive"], true);

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "failedImports.setStatus",
        json!({ "recordId": "f1", "status": "resolved", "notes": "corrigido" }),
    );
    assert_eq!(updated["record"]["notes"], "corrigido");
    assert_eq!(updated["record"]["rowNumber"], 4);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
