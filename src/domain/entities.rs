use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use super::normalize::{acronym, name_key, slugify};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Campus {
    pub id: String,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub acronym: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScholarshipType {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Initiative {
    pub id: String,
    pub name: String,
    pub coordinator_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl Person {
    const COLUMNS: &'static str = "id, name, email";

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Person {
            id: r.get(0)?,
            name: r.get(1)?,
            email: r.get(2)?,
        })
    }

    pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<Person>> {
        conn.query_row(
            &format!("SELECT {} FROM people WHERE id = ?", Self::COLUMNS),
            [id],
            Self::from_row,
        )
        .optional()
    }

    pub fn find_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<Person>> {
        conn.query_row(
            &format!("SELECT {} FROM people WHERE email = ?", Self::COLUMNS),
            [email],
            Self::from_row,
        )
        .optional()
    }

    /// Oldest person with this name; `without_email` restricts to people with no email yet.
    pub fn find_by_name(
        conn: &Connection,
        name: &str,
        without_email: bool,
    ) -> rusqlite::Result<Option<Person>> {
        let filter = if without_email { " AND email IS NULL" } else { "" };
        conn.query_row(
            &format!(
                "SELECT {} FROM people WHERE name_key = ?{} ORDER BY created_at, rowid LIMIT 1",
                Self::COLUMNS,
                filter
            ),
            [name_key(name)],
            Self::from_row,
        )
        .optional()
    }

    pub fn insert(conn: &Connection, name: &str, email: Option<&str>) -> rusqlite::Result<Person> {
        let person = Person {
            id: new_id(),
            name: name.to_string(),
            email: email.map(str::to_string),
        };
        conn.execute(
            "INSERT INTO people(id, name, name_key, email) VALUES(?, ?, ?, ?)",
            (&person.id, &person.name, name_key(name), &person.email),
        )?;
        Ok(person)
    }

    pub fn set_email(conn: &Connection, id: &str, email: &str) -> rusqlite::Result<()> {
        conn.execute("UPDATE people SET email = ? WHERE id = ?", (email, id))?;
        Ok(())
    }

    pub fn list(conn: &Connection) -> rusqlite::Result<Vec<Person>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM people ORDER BY name_key, rowid",
            Self::COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::from_row)?;
        rows.collect()
    }
}

impl Campus {
    const COLUMNS: &'static str = "id, name, code";

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Campus {
            id: r.get(0)?,
            name: r.get(1)?,
            code: r.get(2)?,
        })
    }

    pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<Campus>> {
        conn.query_row(
            &format!("SELECT {} FROM campuses WHERE id = ?", Self::COLUMNS),
            [id],
            Self::from_row,
        )
        .optional()
    }

    pub fn find_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<Campus>> {
        conn.query_row(
            &format!("SELECT {} FROM campuses WHERE name_key = ?", Self::COLUMNS),
            [name_key(name)],
            Self::from_row,
        )
        .optional()
    }

    pub fn insert(conn: &Connection, name: &str, code: &str) -> rusqlite::Result<Campus> {
        let campus = Campus {
            id: new_id(),
            name: name.to_string(),
            code: code.to_string(),
        };
        conn.execute(
            "INSERT INTO campuses(id, name, name_key, code) VALUES(?, ?, ?, ?)",
            (&campus.id, &campus.name, name_key(name), &campus.code),
        )?;
        Ok(campus)
    }

    pub fn list(conn: &Connection) -> rusqlite::Result<Vec<Campus>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM campuses ORDER BY name_key",
            Self::COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::from_row)?;
        rows.collect()
    }
}

impl Organization {
    const COLUMNS: &'static str = "id, name, acronym";

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Organization {
            id: r.get(0)?,
            name: r.get(1)?,
            acronym: r.get(2)?,
        })
    }

    pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<Organization>> {
        conn.query_row(
            &format!("SELECT {} FROM organizations WHERE id = ?", Self::COLUMNS),
            [id],
            Self::from_row,
        )
        .optional()
    }

    pub fn find_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<Organization>> {
        conn.query_row(
            &format!("SELECT {} FROM organizations WHERE name_key = ?", Self::COLUMNS),
            [name_key(name)],
            Self::from_row,
        )
        .optional()
    }

    pub fn insert(conn: &Connection, name: &str) -> rusqlite::Result<Organization> {
        let org = Organization {
            id: new_id(),
            name: name.to_string(),
            acronym: acronym(name),
        };
        conn.execute(
            "INSERT INTO organizations(id, name, name_key, acronym) VALUES(?, ?, ?, ?)",
            (&org.id, &org.name, name_key(name), &org.acronym),
        )?;
        Ok(org)
    }

    pub fn list(conn: &Connection) -> rusqlite::Result<Vec<Organization>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM organizations ORDER BY name_key",
            Self::COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::from_row)?;
        rows.collect()
    }
}

impl ScholarshipType {
    const COLUMNS: &'static str = "id, name, slug, is_active";

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ScholarshipType {
            id: r.get(0)?,
            name: r.get(1)?,
            slug: r.get(2)?,
            is_active: r.get::<_, i64>(3)? != 0,
        })
    }

    pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<ScholarshipType>> {
        conn.query_row(
            &format!("SELECT {} FROM scholarship_types WHERE id = ?", Self::COLUMNS),
            [id],
            Self::from_row,
        )
        .optional()
    }

    pub fn find_by_name(
        conn: &Connection,
        name: &str,
    ) -> rusqlite::Result<Option<ScholarshipType>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM scholarship_types WHERE name_key = ?",
                Self::COLUMNS
            ),
            [name_key(name)],
            Self::from_row,
        )
        .optional()
    }

    pub fn find_by_slug(conn: &Connection, slug: &str) -> rusqlite::Result<Option<ScholarshipType>> {
        conn.query_row(
            &format!("SELECT {} FROM scholarship_types WHERE slug = ?", Self::COLUMNS),
            [slug],
            Self::from_row,
        )
        .optional()
    }

    pub fn insert(conn: &Connection, name: &str) -> rusqlite::Result<ScholarshipType> {
        let t = ScholarshipType {
            id: new_id(),
            name: name.to_string(),
            slug: slugify(name),
            is_active: true,
        };
        conn.execute(
            "INSERT INTO scholarship_types(id, name, name_key, slug, is_active) VALUES(?, ?, ?, ?, 1)",
            (&t.id, &t.name, name_key(name), &t.slug),
        )?;
        Ok(t)
    }

    /// Returns false when no type has this id.
    pub fn set_active(conn: &Connection, id: &str, active: bool) -> rusqlite::Result<bool> {
        let changed = conn.execute(
            "UPDATE scholarship_types SET is_active = ? WHERE id = ?",
            (i64::from(active), id),
        )?;
        Ok(changed > 0)
    }

    pub fn list(conn: &Connection) -> rusqlite::Result<Vec<ScholarshipType>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scholarship_types ORDER BY name_key",
            Self::COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::from_row)?;
        rows.collect()
    }
}

impl Initiative {
    const COLUMNS: &'static str = "id, name, coordinator_id, start_date, end_date";

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Initiative {
            id: r.get(0)?,
            name: r.get(1)?,
            coordinator_id: r.get(2)?,
            start_date: r.get(3)?,
            end_date: r.get(4)?,
        })
    }

    pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<Initiative>> {
        conn.query_row(
            &format!("SELECT {} FROM initiatives WHERE id = ?", Self::COLUMNS),
            [id],
            Self::from_row,
        )
        .optional()
    }

    pub fn find_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<Initiative>> {
        conn.query_row(
            &format!("SELECT {} FROM initiatives WHERE name_key = ?", Self::COLUMNS),
            [name_key(name)],
            Self::from_row,
        )
        .optional()
    }

    pub fn insert(
        conn: &Connection,
        name: &str,
        coordinator_id: Option<&str>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> rusqlite::Result<Initiative> {
        let initiative = Initiative {
            id: new_id(),
            name: name.to_string(),
            coordinator_id: coordinator_id.map(str::to_string),
            start_date,
            end_date,
        };
        conn.execute(
            "INSERT INTO initiatives(id, name, name_key, coordinator_id, start_date, end_date)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &initiative.id,
                &initiative.name,
                name_key(name),
                &initiative.coordinator_id,
                &initiative.start_date,
                &initiative.end_date,
            ),
        )?;
        Ok(initiative)
    }

    pub fn list(conn: &Connection) -> rusqlite::Result<Vec<Initiative>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM initiatives ORDER BY name_key",
            Self::COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::from_row)?;
        rows.collect()
    }
}
