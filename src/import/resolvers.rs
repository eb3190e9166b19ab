//! Get-or-create lookups for the entities a scholarship row refers to.
//!
//! Creation races with other writers are expected. A uniqueness violation on
//! insert means another writer won; the resolver re-reads and returns the
//! winner. Each call makes at most two insert attempts.

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::db::is_unique_violation;
use crate::domain::normalize::{
    campus_code, long_campus_code, non_blank, normalize_email, slugify, title_case,
};
use crate::domain::{Campus, Initiative, Organization, Person, ScholarshipType};

pub trait Resolver {
    type Key: ?Sized;
    type Entity;

    /// `Ok(None)` when the key is blank or the entity cannot be settled.
    fn get_or_create(
        &self,
        conn: &Connection,
        key: &Self::Key,
    ) -> rusqlite::Result<Option<Self::Entity>>;
}

enum Attempt<T> {
    Created(T),
    Conflict,
}

fn attempt<T>(result: rusqlite::Result<T>) -> rusqlite::Result<Attempt<T>> {
    match result {
        Ok(v) => Ok(Attempt::Created(v)),
        Err(e) if is_unique_violation(&e) => Ok(Attempt::Conflict),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonKey {
    pub name: String,
    pub email: Option<String>,
}

impl PersonKey {
    pub fn new(name: Option<&str>, email: Option<&str>) -> Self {
        PersonKey {
            name: name.unwrap_or_default().to_string(),
            email: email.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PersonResolver;

impl PersonResolver {
    pub(crate) fn insert_or_requery(
        &self,
        conn: &Connection,
        name: &str,
        email: Option<&str>,
    ) -> rusqlite::Result<Option<Person>> {
        match attempt(Person::insert(conn, name, email))? {
            Attempt::Created(p) => Ok(Some(p)),
            Attempt::Conflict => {
                warn!(%name, "person was created concurrently; using the stored record");
                match email {
                    Some(email) => Person::find_by_email(conn, email),
                    None => Person::find_by_name(conn, name, true),
                }
            }
        }
    }
}

impl Resolver for PersonResolver {
    type Key = PersonKey;
    type Entity = Person;

    fn get_or_create(&self, conn: &Connection, key: &PersonKey) -> rusqlite::Result<Option<Person>> {
        let Some(name) = non_blank(&key.name).map(|n| title_case(&n)) else {
            return Ok(None);
        };
        let Some(email) = key.email.as_deref().and_then(normalize_email) else {
            if let Some(p) = Person::find_by_name(conn, &name, false)? {
                return Ok(Some(p));
            }
            return self.insert_or_requery(conn, &name, None);
        };

        if let Some(p) = Person::find_by_email(conn, &email)? {
            return Ok(Some(p));
        }
        // A same-named person recorded without an email is adopted.
        if let Some(p) = Person::find_by_name(conn, &name, true)? {
            return match attempt(Person::set_email(conn, &p.id, &email))? {
                Attempt::Created(()) => Ok(Some(Person {
                    email: Some(email),
                    ..p
                })),
                Attempt::Conflict => Person::find_by_email(conn, &email),
            };
        }
        self.insert_or_requery(conn, &name, Some(&email))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CampusResolver;

impl CampusResolver {
    /// Short code first, then the long code; a name match wins over both.
    pub(crate) fn create(&self, conn: &Connection, name: &str) -> rusqlite::Result<Option<Campus>> {
        for code in [campus_code(name), long_campus_code(name)] {
            match attempt(Campus::insert(conn, name, &code))? {
                Attempt::Created(c) => return Ok(Some(c)),
                Attempt::Conflict => {
                    if let Some(c) = Campus::find_by_name(conn, name)? {
                        warn!(%name, "campus was created concurrently; using the stored record");
                        return Ok(Some(c));
                    }
                    debug!(%name, code = code.as_str(), "campus code already taken");
                }
            }
        }
        warn!(%name, "no campus code could be reserved");
        Ok(None)
    }
}

impl Resolver for CampusResolver {
    type Key = str;
    type Entity = Campus;

    fn get_or_create(&self, conn: &Connection, key: &str) -> rusqlite::Result<Option<Campus>> {
        let Some(name) = non_blank(key).map(|n| title_case(&n)) else {
            return Ok(None);
        };
        if let Some(c) = Campus::find_by_name(conn, &name)? {
            return Ok(Some(c));
        }
        self.create(conn, &name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrganizationResolver;

impl Resolver for OrganizationResolver {
    type Key = str;
    type Entity = Organization;

    fn get_or_create(
        &self,
        conn: &Connection,
        key: &str,
    ) -> rusqlite::Result<Option<Organization>> {
        let Some(name) = non_blank(key) else {
            return Ok(None);
        };
        if let Some(o) = Organization::find_by_name(conn, &name)? {
            return Ok(Some(o));
        }
        self.insert_or_requery(conn, &name)
    }
}

impl OrganizationResolver {
    pub(crate) fn insert_or_requery(
        &self,
        conn: &Connection,
        name: &str,
    ) -> rusqlite::Result<Option<Organization>> {
        match attempt(Organization::insert(conn, name))? {
            Attempt::Created(o) => Ok(Some(o)),
            Attempt::Conflict => {
                warn!(%name, "organization was created concurrently; using the stored record");
                Organization::find_by_name(conn, name)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScholarshipTypeResolver;

impl ScholarshipTypeResolver {
    pub(crate) fn insert_or_requery(
        &self,
        conn: &Connection,
        name: &str,
    ) -> rusqlite::Result<Option<ScholarshipType>> {
        match attempt(ScholarshipType::insert(conn, name))? {
            Attempt::Created(t) => Ok(Some(t)),
            Attempt::Conflict => {
                if let Some(t) = ScholarshipType::find_by_name(conn, name)? {
                    warn!(%name, "scholarship type was created concurrently; using the stored record");
                    return Ok(Some(t));
                }
                // Spelling variants ("Iniciação" / "Iniciacao") share a slug.
                ScholarshipType::find_by_slug(conn, &slugify(name))
            }
        }
    }
}

impl Resolver for ScholarshipTypeResolver {
    type Key = str;
    type Entity = ScholarshipType;

    fn get_or_create(
        &self,
        conn: &Connection,
        key: &str,
    ) -> rusqlite::Result<Option<ScholarshipType>> {
        let Some(name) = non_blank(key) else {
            return Ok(None);
        };
        if let Some(t) = ScholarshipType::find_by_name(conn, &name)? {
            return Ok(Some(t));
        }
        self.insert_or_requery(conn, &name)
    }
}

/// Initiatives are curated by hand; the import only links to existing ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitiativeLookup;

impl InitiativeLookup {
    pub fn lookup(&self, conn: &Connection, name: Option<&str>) -> rusqlite::Result<Option<Initiative>> {
        match name.and_then(non_blank) {
            Some(name) => Initiative::find_by_name(conn, &name),
            None => Ok(None),
        }
    }
}
