use chrono::{Months, NaiveDate};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::entities::ScholarshipType;
use super::money::Money;

pub const MAX_YEARS_AHEAD: u32 = 10;
pub const MAX_DURATION_YEARS: u32 = 10;

/// One violated business rule. `Display` is prefixed by the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("title: must not be blank")]
    BlankTitle,
    #[error("student: must not be the same person as the supervisor")]
    StudentIsSupervisor,
    #[error("end_date: {end} is before start_date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    #[error("start_date: {start} is more than {} years in the future", MAX_YEARS_AHEAD)]
    StartTooFarAhead { start: NaiveDate },
    #[error("end_date: {end} is more than {} years after start_date {start}", MAX_DURATION_YEARS)]
    TooLong { start: NaiveDate, end: NaiveDate },
    #[error("value: must not be negative")]
    NegativeValue,
    #[error("scholarship_type: '{name}' is not active")]
    InactiveType { name: String },
    #[error("scholarship_type: no type with id {id}")]
    UnknownType { id: String },
    #[error(
        "start_date: overlaps scholarship '{title}' ({start} to {})",
        .end.map_or_else(|| "open".to_string(), |d| d.to_string())
    )]
    Overlap {
        id: String,
        title: String,
        start: NaiveDate,
        end: Option<NaiveDate>,
    },
}

impl DomainError {
    pub fn field(&self) -> &'static str {
        match self {
            DomainError::BlankTitle => "title",
            DomainError::StudentIsSupervisor => "student",
            DomainError::EndBeforeStart { .. } | DomainError::TooLong { .. } => "end_date",
            DomainError::StartTooFarAhead { .. } | DomainError::Overlap { .. } => "start_date",
            DomainError::NegativeValue => "value",
            DomainError::InactiveType { .. } | DomainError::UnknownType { .. } => {
                "scholarship_type"
            }
        }
    }
}

/// Every rule a candidate broke, in check order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct ValidationErrors(pub Vec<DomainError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[DomainError] {
        &self.0
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.0
                .iter()
                .map(|e| serde_json::json!({ "field": e.field(), "message": e.to_string() }))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScholarshipDraft {
    pub title: String,
    pub type_id: Option<String>,
    pub campus_id: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub supervisor_id: String,
    pub student_id: String,
    pub value: Money,
    pub sponsor_id: Option<String>,
    pub initiative_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scholarship {
    pub id: String,
    #[serde(flatten)]
    pub draft: ScholarshipDraft,
}

/// Another scholarship of the same student whose interval intersects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub id: String,
    pub title: String,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl From<Conflict> for DomainError {
    fn from(c: Conflict) -> Self {
        DomainError::Overlap {
            id: c.id,
            title: c.title,
            start: c.start,
            end: c.end,
        }
    }
}

/// Rules that need no store access.
pub fn check_rules(draft: &ScholarshipDraft, today: NaiveDate) -> Vec<DomainError> {
    let mut errors = Vec::new();
    if draft.title.trim().is_empty() {
        errors.push(DomainError::BlankTitle);
    }
    if draft.student_id == draft.supervisor_id {
        errors.push(DomainError::StudentIsSupervisor);
    }
    if let Some(end) = draft.end_date {
        if end < draft.start_date {
            errors.push(DomainError::EndBeforeStart {
                start: draft.start_date,
                end,
            });
        }
        let limit = draft
            .start_date
            .checked_add_months(Months::new(MAX_DURATION_YEARS * 12));
        if limit.map_or(true, |l| end > l) {
            errors.push(DomainError::TooLong {
                start: draft.start_date,
                end,
            });
        }
    }
    let horizon = today.checked_add_months(Months::new(MAX_YEARS_AHEAD * 12));
    if horizon.map_or(true, |h| draft.start_date > h) {
        errors.push(DomainError::StartTooFarAhead {
            start: draft.start_date,
        });
    }
    if draft.value.is_negative() {
        errors.push(DomainError::NegativeValue);
    }
    errors
}

/// Full model-level validation run before every write.
///
/// `existing_id` is the record being updated (excluded from the overlap
/// search); the active-type rule only applies when creating.
pub fn full_clean(
    conn: &Connection,
    draft: &ScholarshipDraft,
    existing_id: Option<&str>,
    today: NaiveDate,
) -> Result<(), ScholarshipError> {
    let mut errors = check_rules(draft, today);

    if let Some(type_id) = draft.type_id.as_deref() {
        match ScholarshipType::get(conn, type_id)? {
            Some(t) if !t.is_active && existing_id.is_none() => {
                errors.push(DomainError::InactiveType { name: t.name });
            }
            Some(_) => {}
            None => errors.push(DomainError::UnknownType {
                id: type_id.to_string(),
            }),
        }
    }

    if let Some(conflict) = find_overlap(
        conn,
        &draft.student_id,
        draft.start_date,
        draft.end_date,
        existing_id,
    )? {
        errors.push(conflict.into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ScholarshipError::Invalid(ValidationErrors(errors)))
    }
}

#[derive(Debug, Error)]
pub enum ScholarshipError {
    #[error(transparent)]
    Invalid(#[from] ValidationErrors),
    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),
}

/// First scholarship of `student_id` whose interval intersects `[start, end]`.
/// Open-ended intervals extend forever.
pub fn find_overlap(
    conn: &Connection,
    student_id: &str,
    start: NaiveDate,
    end: Option<NaiveDate>,
    exclude_id: Option<&str>,
) -> rusqlite::Result<Option<Conflict>> {
    conn.query_row(
        "SELECT id, title, start_date, end_date
         FROM scholarships
         WHERE student_id = ?1
           AND (?2 IS NULL OR id <> ?2)
           AND start_date <= COALESCE(?4, '9999-12-31')
           AND COALESCE(end_date, '9999-12-31') >= ?3
         ORDER BY start_date
         LIMIT 1",
        (student_id, exclude_id, start, end),
        |r| {
            Ok(Conflict {
                id: r.get(0)?,
                title: r.get(1)?,
                start: r.get(2)?,
                end: r.get(3)?,
            })
        },
    )
    .optional()
}

impl Scholarship {
    const COLUMNS: &'static str = "id, title, type_id, campus_id, start_date, end_date,
        supervisor_id, student_id, value_cents, sponsor_id, initiative_id";

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Scholarship {
            id: r.get(0)?,
            draft: ScholarshipDraft {
                title: r.get(1)?,
                type_id: r.get(2)?,
                campus_id: r.get(3)?,
                start_date: r.get(4)?,
                end_date: r.get(5)?,
                supervisor_id: r.get(6)?,
                student_id: r.get(7)?,
                value: Money::from_cents(r.get(8)?),
                sponsor_id: r.get(9)?,
                initiative_id: r.get(10)?,
            },
        })
    }

    pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<Scholarship>> {
        conn.query_row(
            &format!("SELECT {} FROM scholarships WHERE id = ?", Self::COLUMNS),
            [id],
            Self::from_row,
        )
        .optional()
    }

    /// The record sharing the (student, start_date, supervisor) natural key.
    pub fn find_duplicate(
        conn: &Connection,
        student_id: &str,
        start_date: NaiveDate,
        supervisor_id: &str,
    ) -> rusqlite::Result<Option<Scholarship>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM scholarships
                 WHERE student_id = ? AND start_date = ? AND supervisor_id = ?",
                Self::COLUMNS
            ),
            (student_id, start_date, supervisor_id),
            Self::from_row,
        )
        .optional()
    }

    pub fn list(conn: &Connection, student_id: Option<&str>) -> rusqlite::Result<Vec<Scholarship>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scholarships
             WHERE (?1 IS NULL OR student_id = ?1)
             ORDER BY start_date, title",
            Self::COLUMNS
        ))?;
        let rows = stmt.query_map([student_id], Self::from_row)?;
        rows.collect()
    }

    /// Validates and inserts a new record.
    pub fn create(
        conn: &Connection,
        draft: ScholarshipDraft,
        today: NaiveDate,
    ) -> Result<Scholarship, ScholarshipError> {
        full_clean(conn, &draft, None, today)?;
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO scholarships(id, title, type_id, campus_id, start_date, end_date,
                supervisor_id, student_id, value_cents, sponsor_id, initiative_id)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                &id,
                draft.title.trim(),
                &draft.type_id,
                &draft.campus_id,
                &draft.start_date,
                &draft.end_date,
                &draft.supervisor_id,
                &draft.student_id,
                draft.value.cents(),
                &draft.sponsor_id,
                &draft.initiative_id,
            ],
        )?;
        let mut draft = draft;
        draft.title = draft.title.trim().to_string();
        Ok(Scholarship { id, draft })
    }

    /// Validates and overwrites an existing record.
    pub fn update(
        conn: &Connection,
        id: &str,
        draft: ScholarshipDraft,
        today: NaiveDate,
    ) -> Result<Scholarship, ScholarshipError> {
        full_clean(conn, &draft, Some(id), today)?;
        conn.execute(
            "UPDATE scholarships
             SET title = ?, type_id = ?, campus_id = ?, start_date = ?, end_date = ?,
                 supervisor_id = ?, student_id = ?, value_cents = ?, sponsor_id = ?,
                 initiative_id = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')
             WHERE id = ?",
            rusqlite::params![
                draft.title.trim(),
                &draft.type_id,
                &draft.campus_id,
                &draft.start_date,
                &draft.end_date,
                &draft.supervisor_id,
                &draft.student_id,
                draft.value.cents(),
                &draft.sponsor_id,
                &draft.initiative_id,
                id,
            ],
        )?;
        let mut draft = draft;
        draft.title = draft.title.trim().to_string();
        Ok(Scholarship {
            id: id.to_string(),
            draft,
        })
    }

    pub fn delete(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
        Ok(conn.execute("DELETE FROM scholarships WHERE id = ?", [id])? > 0)
    }
}
