use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::Value;

use crate::domain::{Money, ScholarshipError};
use crate::import::validator::parse_date;
use crate::ipc::error::err;
use crate::ipc::types::AppState;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr::new("bad_params", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

/// Maps a store error to `code`, keeping the sqlite message.
pub fn db_err(code: &'static str) -> impl Fn(rusqlite::Error) -> HandlerErr {
    move |e| HandlerErr::new(code, e.to_string())
}

/// Rule violations become `validation_failed`; store failures take `store_code`.
pub fn scholarship_err(store_code: &'static str) -> impl Fn(ScholarshipError) -> HandlerErr {
    move |e| match e {
        ScholarshipError::Invalid(v) => HandlerErr::new("validation_failed", v.to_string())
            .with_details(serde_json::json!({ "errors": v.to_json() })),
        ScholarshipError::Store(e) => HandlerErr::new(store_code, e.to_string()),
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Absent and `null` are both `None`; any other non-string is rejected.
pub fn get_optional_str(params: &Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn parse_date_param(key: &str, raw: &str) -> Result<NaiveDate, HandlerErr> {
    parse_date(raw).map_err(|e| HandlerErr::bad_params(format!("{}: {}", key, e)))
}

pub fn get_optional_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, HandlerErr> {
    get_optional_str(params, key)?
        .map(|s| parse_date_param(key, &s))
        .transpose()
}

/// Accepts a JSON number or a string in either `1500.50` or `1.500,50` form.
pub fn get_money(params: &Value, key: &str) -> Result<Option<Money>, HandlerErr> {
    let parsed = match params.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => Money::parse_brl(s),
        Some(Value::Number(n)) => Money::parse_decimal(&n.to_string()),
        Some(_) => return Err(HandlerErr::bad_params(format!("{} must be a number or string", key))),
    };
    parsed
        .map(Some)
        .map_err(|e| HandlerErr::bad_params(format!("{}: {}", key, e)))
}
