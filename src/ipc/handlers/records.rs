//! Reference records: people, campuses, organizations, scholarship types, initiatives.

use serde::Serialize;
use serde_json::{json, Value};

use crate::db::is_unique_violation;
use crate::domain::normalize::{non_blank, normalize_email, title_case};
use crate::domain::{Campus, Initiative, Organization, Person, ScholarshipType};
use crate::import::resolvers::CampusResolver;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_err, get_optional_date, get_optional_str, get_required_str, require_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};

fn list_response<T: Serialize>(
    state: &AppState,
    key: &str,
    load: impl FnOnce(&rusqlite::Connection) -> rusqlite::Result<Vec<T>>,
) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ key: [] }));
    };
    let items = load(conn).map_err(db_err("db_query_failed"))?;
    Ok(json!({ key: items }))
}

fn required_name(req: &Request) -> Result<String, HandlerErr> {
    let raw = get_required_str(&req.params, "name")?;
    non_blank(&raw).ok_or_else(|| HandlerErr::bad_params("name must not be empty"))
}

fn duplicate(table: &str, name: &str) -> HandlerErr {
    HandlerErr::new("validation_failed", format!("{} '{}' already exists", table, name))
        .with_details(json!({ "table": table }))
}

fn insert_err<'a>(
    table: &'static str,
    name: &'a str,
) -> impl FnOnce(rusqlite::Error) -> HandlerErr + 'a {
    move |e| {
        if is_unique_violation(&e) {
            duplicate(table, name)
        } else {
            HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": table }))
        }
    }
}

fn people_create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = title_case(&required_name(req)?);
    let email = get_optional_str(&req.params, "email")?.and_then(|e| normalize_email(&e));
    if let Some(email) = email.as_deref() {
        if Person::find_by_email(conn, email)
            .map_err(db_err("db_query_failed"))?
            .is_some()
        {
            return Err(duplicate("people", email));
        }
    }
    let person = Person::insert(conn, &name, email.as_deref()).map_err(insert_err("people", &name))?;
    Ok(json!({ "person": person }))
}

fn campuses_create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = title_case(&required_name(req)?);
    if Campus::find_by_name(conn, &name)
        .map_err(db_err("db_query_failed"))?
        .is_some()
    {
        return Err(duplicate("campuses", &name));
    }
    let campus = CampusResolver
        .create(conn, &name)
        .map_err(insert_err("campuses", &name))?
        .ok_or_else(|| {
            HandlerErr::new("db_insert_failed", "no unique campus code could be derived")
                .with_details(json!({ "table": "campuses" }))
        })?;
    Ok(json!({ "campus": campus }))
}

fn organizations_create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = required_name(req)?;
    let org = Organization::insert(conn, &name).map_err(insert_err("organizations", &name))?;
    Ok(json!({ "organization": org }))
}

fn types_create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = required_name(req)?;
    let t = ScholarshipType::insert(conn, &name).map_err(insert_err("scholarship_types", &name))?;
    Ok(json!({ "scholarshipType": t }))
}

fn types_set_active(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let type_id = get_required_str(&req.params, "typeId")?;
    let active = req
        .params
        .get("active")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params("missing active"))?;
    let found = ScholarshipType::set_active(conn, &type_id, active)
        .map_err(db_err("db_update_failed"))?;
    if !found {
        return Err(HandlerErr::new("not_found", "scholarship type not found"));
    }
    Ok(json!({ "typeId": type_id, "active": active }))
}

fn initiatives_create(state: &AppState, req: &Request) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = required_name(req)?;
    let coordinator_id = get_optional_str(&req.params, "coordinatorId")?;
    if let Some(id) = coordinator_id.as_deref() {
        if Person::get(conn, id).map_err(db_err("db_query_failed"))?.is_none() {
            return Err(HandlerErr::new("not_found", "coordinator not found"));
        }
    }
    let start = get_optional_date(&req.params, "startDate")?;
    let end = get_optional_date(&req.params, "endDate")?;
    if let (Some(s), Some(e)) = (start, end) {
        if e < s {
            return Err(HandlerErr::new("validation_failed", "endDate: is before startDate")
                .with_details(json!({ "errors": [{ "field": "end_date", "message": "is before start_date" }] })));
        }
    }
    let initiative = Initiative::insert(conn, &name, coordinator_id.as_deref(), start, end)
        .map_err(insert_err("initiatives", &name))?;
    Ok(json!({ "initiative": initiative }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "people.list" => list_response(state, "people", Person::list),
        "people.create" => people_create(state, req),
        "campuses.list" => list_response(state, "campuses", Campus::list),
        "campuses.create" => campuses_create(state, req),
        "organizations.list" => list_response(state, "organizations", Organization::list),
        "organizations.create" => organizations_create(state, req),
        "scholarshipTypes.list" => list_response(state, "scholarshipTypes", ScholarshipType::list),
        "scholarshipTypes.create" => types_create(state, req),
        "scholarshipTypes.setActive" => types_set_active(state, req),
        "initiatives.list" => list_response(state, "initiatives", Initiative::list),
        "initiatives.create" => initiatives_create(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
