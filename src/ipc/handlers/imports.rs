use serde_json::{json, Value};
use std::path::PathBuf;

use crate::import::failed::{self, FailureStatus};
use crate::import::{history, ImportPipeline};
use crate::ipc::error::ok;
use crate::ipc::helpers::{db_err, get_optional_str, get_required_str, require_db, HandlerErr};
use crate::ipc::types::{AppState, Request};

fn status_param(params: &Value, key: &str) -> Result<Option<FailureStatus>, HandlerErr> {
    match get_optional_str(params, key)? {
        None => Ok(None),
        Some(s) => FailureStatus::parse(&s).map(Some).ok_or_else(|| {
            HandlerErr::bad_params(format!(
                "{} must be one of pending, resolved, ignored",
                key
            ))
        }),
    }
}

fn import_run(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let in_path = PathBuf::from(get_required_str(&req.params, "inPath")?);
    let delimiter = state
        .config
        .import
        .delimiter_byte()
        .map_err(|e| HandlerErr::new("import_failed", e.to_string()))?;
    let report = ImportPipeline::new(conn)
        .with_delimiter(delimiter)
        .with_max_entry_bytes(state.config.import.max_entry_bytes)
        .import_path(&in_path);
    serde_json::to_value(&report).map_err(|e| HandlerErr::new("import_failed", e.to_string()))
}

fn import_runs_list(state: &AppState) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "runs": [] }));
    };
    let runs = history::list(conn).map_err(db_err("db_query_failed"))?;
    Ok(json!({ "runs": runs }))
}

fn failed_list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let status = status_param(&req.params, "status")?;
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "records": [] }));
    };
    let records = failed::list(conn, status).map_err(db_err("db_query_failed"))?;
    Ok(json!({ "records": records }))
}

fn failed_set_status(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let record_id = get_required_str(&req.params, "recordId")?;
    let status = status_param(&req.params, "status")?
        .ok_or_else(|| HandlerErr::bad_params("missing status"))?;
    let notes = get_optional_str(&req.params, "notes")?;
    let found = failed::set_status(conn, &record_id, status, notes.as_deref())
        .map_err(db_err("db_update_failed"))?;
    if !found {
        return Err(HandlerErr::new("not_found", "failed import record not found"));
    }
    let record = failed::get(conn, &record_id).map_err(db_err("db_query_failed"))?;
    Ok(json!({ "record": record }))
}

fn failed_export(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let out_path = PathBuf::from(get_required_str(&req.params, "outPath")?);
    let status = status_param(&req.params, "status")?;
    let records = failed::list(conn, status).map_err(db_err("db_query_failed"))?;
    let written = failed::export_csv(&out_path, &records).map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}"))
            .with_details(json!({ "path": out_path.to_string_lossy() }))
    })?;
    Ok(json!({ "outPath": out_path.to_string_lossy(), "rowsExported": written }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "import.run" => import_run(state, req),
        "importRuns.list" => import_runs_list(state),
        "failedImports.list" => failed_list(state, req),
        "failedImports.setStatus" => failed_set_status(state, req),
        "failedImports.export" => failed_export(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
