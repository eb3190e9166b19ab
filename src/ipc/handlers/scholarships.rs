use chrono::{Local, NaiveDate};
use rusqlite::Connection;
use serde_json::{json, Value};

use crate::domain::{Campus, Initiative, Money, Organization, Person, Scholarship, ScholarshipDraft};
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_err, get_money, get_optional_str, get_required_str, parse_date_param, require_db,
    scholarship_err, HandlerErr,
};
use crate::ipc::types::{AppState, Request};

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn ensure_exists(
    conn: &Connection,
    what: &str,
    id: &str,
    found: fn(&Connection, &str) -> rusqlite::Result<bool>,
) -> Result<(), HandlerErr> {
    if found(conn, id).map_err(db_err("db_query_failed"))? {
        Ok(())
    } else {
        Err(HandlerErr::new("not_found", format!("{} not found", what))
            .with_details(json!({ "id": id })))
    }
}

fn person_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    Person::get(conn, id).map(|p| p.is_some())
}

fn campus_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    Campus::get(conn, id).map(|c| c.is_some())
}

fn organization_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    Organization::get(conn, id).map(|o| o.is_some())
}

fn initiative_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    Initiative::get(conn, id).map(|i| i.is_some())
}

/// References must exist; the scholarship type is checked by domain validation.
fn check_references(conn: &Connection, draft: &ScholarshipDraft) -> Result<(), HandlerErr> {
    ensure_exists(conn, "campus", &draft.campus_id, campus_exists)?;
    ensure_exists(conn, "supervisor", &draft.supervisor_id, person_exists)?;
    ensure_exists(conn, "student", &draft.student_id, person_exists)?;
    if let Some(id) = draft.sponsor_id.as_deref() {
        ensure_exists(conn, "sponsor", id, organization_exists)?;
    }
    if let Some(id) = draft.initiative_id.as_deref() {
        ensure_exists(conn, "initiative", id, initiative_exists)?;
    }
    Ok(())
}

fn draft_from_params(params: &Value) -> Result<ScholarshipDraft, HandlerErr> {
    let start_raw = get_required_str(params, "startDate")?;
    Ok(ScholarshipDraft {
        title: get_required_str(params, "title")?,
        type_id: get_optional_str(params, "typeId")?,
        campus_id: get_required_str(params, "campusId")?,
        start_date: parse_date_param("startDate", &start_raw)?,
        end_date: get_optional_str(params, "endDate")?
            .map(|s| parse_date_param("endDate", &s))
            .transpose()?,
        supervisor_id: get_required_str(params, "supervisorId")?,
        student_id: get_required_str(params, "studentId")?,
        value: get_money(params, "value")?.unwrap_or(Money::ZERO),
        sponsor_id: get_optional_str(params, "sponsorId")?,
        initiative_id: get_optional_str(params, "initiativeId")?,
    })
}

/// Applies only the keys present in `patch`; `null` clears optional fields.
fn apply_patch(draft: &mut ScholarshipDraft, patch: &Value) -> Result<(), HandlerErr> {
    let Some(obj) = patch.as_object() else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    if obj.contains_key("title") {
        draft.title = get_required_str(patch, "title")?;
    }
    if obj.contains_key("typeId") {
        draft.type_id = get_optional_str(patch, "typeId")?;
    }
    if obj.contains_key("campusId") {
        draft.campus_id = get_required_str(patch, "campusId")?;
    }
    if obj.contains_key("startDate") {
        let raw = get_required_str(patch, "startDate")?;
        draft.start_date = parse_date_param("startDate", &raw)?;
    }
    if obj.contains_key("endDate") {
        draft.end_date = get_optional_str(patch, "endDate")?
            .map(|s| parse_date_param("endDate", &s))
            .transpose()?;
    }
    if obj.contains_key("supervisorId") {
        draft.supervisor_id = get_required_str(patch, "supervisorId")?;
    }
    if obj.contains_key("studentId") {
        draft.student_id = get_required_str(patch, "studentId")?;
    }
    if obj.contains_key("value") {
        draft.value = get_money(patch, "value")?.unwrap_or(Money::ZERO);
    }
    if obj.contains_key("sponsorId") {
        draft.sponsor_id = get_optional_str(patch, "sponsorId")?;
    }
    if obj.contains_key("initiativeId") {
        draft.initiative_id = get_optional_str(patch, "initiativeId")?;
    }
    Ok(())
}

fn scholarships_list(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "scholarships": [] }));
    };
    let student_id = get_optional_str(&req.params, "studentId")?;
    let rows = Scholarship::list(conn, student_id.as_deref()).map_err(db_err("db_query_failed"))?;
    Ok(json!({ "scholarships": rows }))
}

fn scholarships_create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let draft = draft_from_params(&req.params)?;
    check_references(conn, &draft)?;
    let created = Scholarship::create(conn, draft, today())
        .map_err(scholarship_err("db_insert_failed"))?;
    Ok(json!({ "scholarship": created }))
}

fn scholarships_update(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "scholarshipId")?;
    let patch = req
        .params
        .get("patch")
        .ok_or_else(|| HandlerErr::bad_params("missing patch"))?;
    let Some(existing) = Scholarship::get(conn, &id).map_err(db_err("db_query_failed"))? else {
        return Err(HandlerErr::new("not_found", "scholarship not found"));
    };
    let mut draft = existing.draft;
    apply_patch(&mut draft, patch)?;
    check_references(conn, &draft)?;
    let updated = Scholarship::update(conn, &id, draft, today())
        .map_err(scholarship_err("db_update_failed"))?;
    Ok(json!({ "scholarship": updated }))
}

fn scholarships_delete(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let id = get_required_str(&req.params, "scholarshipId")?;
    if !Scholarship::delete(conn, &id).map_err(db_err("db_update_failed"))? {
        return Err(HandlerErr::new("not_found", "scholarship not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "scholarships.list" => scholarships_list(state, req),
        "scholarships.create" => scholarships_create(state, req),
        "scholarships.update" => scholarships_update(state, req),
        "scholarships.delete" => scholarships_delete(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
