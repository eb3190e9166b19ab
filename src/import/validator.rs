use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::Money;
use crate::import::parser::{columns, ScholarshipRow};

/// Accepted date layouts, tried in this order.
pub const DATE_FORMATS: [(&str, &str); 3] = [
    ("%d-%m-%y", "DD-MM-YY"),
    ("%d/%m/%Y", "DD/MM/YYYY"),
    ("%Y-%m-%d", "YYYY-MM-DD"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    let s = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|(fmt, _)| NaiveDate::parse_from_str(s, fmt).ok())
        .ok_or_else(|| {
            let expected: Vec<&str> = DATE_FORMATS.iter().map(|(_, label)| *label).collect();
            format!("invalid date '{}' (expected {})", s, expected.join(", "))
        })
}

/// Blank means zero.
pub fn parse_value(raw: Option<&str>) -> Result<Money, String> {
    match raw {
        None => Ok(Money::ZERO),
        Some(s) => Money::parse_brl(s).map_err(|e| e.to_string()),
    }
}

/// Checks required fields and field formats, collecting every problem.
pub fn validate_row(row: &ScholarshipRow) -> ValidationResult {
    let mut errors = Vec::new();

    let required = [
        (columns::START, &row.start),
        (columns::SUPERVISOR, &row.supervisor),
        (columns::STUDENT, &row.student),
        (columns::CAMPUS, &row.campus),
    ];
    for (column, value) in required {
        if value.is_none() {
            errors.push(format!("{column}: required field is missing"));
        }
    }

    if let Some(start) = row.start.as_deref() {
        if let Err(e) = parse_date(start) {
            errors.push(format!("{}: {}", columns::START, e));
        }
    }
    if let Some(end) = row.end.as_deref() {
        if let Err(e) = parse_date(end) {
            errors.push(format!("{}: {}", columns::END, e));
        }
    }
    if let Err(e) = parse_value(row.value.as_deref()) {
        errors.push(format!("{}: {}", columns::VALUE, e));
    }

    ValidationResult::from_errors(errors)
}
