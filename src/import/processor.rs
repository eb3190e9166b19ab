//! Per-row import state machine and the file/upload drivers around it.

use chrono::{Local, NaiveDate};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::bulk::{BulkHandler, Extraction};
use super::parser::{columns, CsvParser, ParseError, Row, ScholarshipRow};
use super::report::{BulkImportReport, ImportReport, ImportReporter, RowOutcome};
use super::resolvers::{
    CampusResolver, InitiativeLookup, OrganizationResolver, PersonKey, PersonResolver, Resolver,
    ScholarshipTypeResolver,
};
use super::validator::{parse_date, parse_value, validate_row};
use super::{failed, history};
use crate::config::DEFAULT_MAX_ENTRY_BYTES;
use crate::db::is_unique_violation;
use crate::domain::scholarship::find_overlap;
use crate::domain::{Scholarship, ScholarshipDraft, ScholarshipError, ValidationErrors};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{}", .0.join("; "))]
    RowValidation(Vec<String>),
    #[error("{0}")]
    Resolution(String),
    #[error(transparent)]
    Domain(#[from] ValidationErrors),
    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl From<ScholarshipError> for ImportError {
    fn from(e: ScholarshipError) -> Self {
        match e {
            ScholarshipError::Invalid(v) => ImportError::Domain(v),
            ScholarshipError::Store(e) => ImportError::Store(e),
        }
    }
}

enum Processed {
    Created(Scholarship),
    Duplicate(Scholarship),
}

/// Imports single rows of one file. Every row runs in its own transaction.
pub struct RowProcessor<'c> {
    conn: &'c Connection,
    file_name: String,
    run_id: Option<String>,
    today: NaiveDate,
}

impl<'c> RowProcessor<'c> {
    pub fn new(conn: &'c Connection, file_name: impl Into<String>) -> Self {
        RowProcessor {
            conn,
            file_name: file_name.into(),
            run_id: None,
            today: Local::now().date_naive(),
        }
    }

    /// Reference date for the "too far in the future" rule.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_run_id(mut self, run_id: Option<String>) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn process_row(&self, row: &Row) -> RowOutcome {
        let typed = ScholarshipRow::from_row(row);
        let outcome = match self.try_process(&typed) {
            Ok(Processed::Created(s)) => RowOutcome::success(row.number, s.id),
            Ok(Processed::Duplicate(existing)) => RowOutcome::skipped(
                row.number,
                format!(
                    "duplicate of scholarship '{}' ({})",
                    existing.draft.title, existing.id
                ),
            ),
            Err(e) => {
                let message = e.to_string();
                self.record_failure(row.number, &message, &row.to_json());
                RowOutcome::error(row.number, message)
            }
        };
        debug!(
            file = self.file_name.as_str(),
            line = row.number,
            status = ?outcome.status,
            "row processed"
        );
        outcome
    }

    /// Records a stream failure that ended the file early.
    pub fn process_parse_failure(&self, line: u64, e: &ParseError) -> RowOutcome {
        let message = e.to_string();
        warn!(file = self.file_name.as_str(), line, error = %e, "stopped reading file");
        self.record_failure(line, &message, &json!({}));
        RowOutcome::error(line, message)
    }

    fn try_process(&self, row: &ScholarshipRow) -> Result<Processed, ImportError> {
        let check = validate_row(row);
        if !check.is_valid {
            return Err(ImportError::RowValidation(check.errors));
        }

        // Dropping `tx` without commit rolls back everything below.
        let tx = self.conn.unchecked_transaction()?;

        let field_error = |column: &str, e: String| ImportError::RowValidation(vec![format!("{column}: {e}")]);
        let start_date = parse_date(row.start.as_deref().unwrap_or_default())
            .map_err(|e| field_error(columns::START, e))?;
        let end_date = row
            .end
            .as_deref()
            .map(parse_date)
            .transpose()
            .map_err(|e| field_error(columns::END, e))?;
        let value = parse_value(row.value.as_deref()).map_err(|e| field_error(columns::VALUE, e))?;

        let scholarship_type = match row.program.as_deref() {
            Some(program) => ScholarshipTypeResolver.get_or_create(&tx, program)?,
            None => None,
        };
        let campus_name = row.campus.as_deref().unwrap_or_default();
        let campus = CampusResolver
            .get_or_create(&tx, campus_name)?
            .ok_or_else(|| {
                ImportError::Resolution(format!(
                    "{}: could not resolve campus '{}'",
                    columns::CAMPUS,
                    campus_name
                ))
            })?;
        let supervisor = PersonResolver
            .get_or_create(
                &tx,
                &PersonKey::new(row.supervisor.as_deref(), row.supervisor_email.as_deref()),
            )?
            .ok_or_else(|| {
                ImportError::Resolution(format!("{}: could not resolve person", columns::SUPERVISOR))
            })?;
        let student = PersonResolver
            .get_or_create(
                &tx,
                &PersonKey::new(row.student.as_deref(), row.student_email.as_deref()),
            )?
            .ok_or_else(|| {
                ImportError::Resolution(format!("{}: could not resolve person", columns::STUDENT))
            })?;
        let sponsor = match row.sponsor.as_deref() {
            Some(name) => OrganizationResolver.get_or_create(&tx, name)?,
            None => None,
        };
        let initiative = InitiativeLookup.lookup(&tx, row.project_title.as_deref())?;

        let title = row
            .plan_title
            .clone()
            .or_else(|| row.project_title.clone())
            .unwrap_or_else(|| format!("Bolsa de {}", student.name));

        if let Some(existing) =
            Scholarship::find_duplicate(&tx, &student.id, start_date, &supervisor.id)?
        {
            return Ok(Processed::Duplicate(existing));
        }
        if let Some(conflict) = find_overlap(&tx, &student.id, start_date, end_date, None)? {
            return Err(ValidationErrors(vec![conflict.into()]).into());
        }

        let draft = ScholarshipDraft {
            title,
            type_id: scholarship_type.map(|t| t.id),
            campus_id: campus.id,
            start_date,
            end_date,
            supervisor_id: supervisor.id.clone(),
            student_id: student.id.clone(),
            value,
            sponsor_id: sponsor.map(|o| o.id),
            initiative_id: initiative.map(|i| i.id),
        };
        let created = match Scholarship::create(&tx, draft, self.today) {
            Ok(s) => s,
            Err(ScholarshipError::Store(e)) if is_unique_violation(&e) => {
                return settle_lost_insert(&tx, &student.id, start_date, &supervisor.id, e);
            }
            Err(e) => return Err(e.into()),
        };
        tx.commit()?;
        Ok(Processed::Created(created))
    }

    fn record_failure(&self, line: u64, reason: &str, raw: &Value) {
        if let Err(e) = failed::insert(
            self.conn,
            self.run_id.as_deref(),
            &self.file_name,
            line,
            reason,
            raw,
        ) {
            error!(
                file = self.file_name.as_str(),
                line,
                error = %e,
                "failed to persist failed import record"
            );
        }
    }
}

/// Another writer stored the same natural key between our duplicate check and
/// the insert; its record makes this row a skip.
fn settle_lost_insert(
    conn: &Connection,
    student_id: &str,
    start_date: NaiveDate,
    supervisor_id: &str,
    e: rusqlite::Error,
) -> Result<Processed, ImportError> {
    match Scholarship::find_duplicate(conn, student_id, start_date, supervisor_id)? {
        Some(existing) => {
            warn!(scholarship = existing.id.as_str(), "scholarship was created concurrently");
            Ok(Processed::Duplicate(existing))
        }
        None => Err(ImportError::Store(e)),
    }
}

/// Drives files and uploads through [`RowProcessor`], sequentially.
pub struct ImportPipeline<'c> {
    conn: &'c Connection,
    today: NaiveDate,
    delimiter: Option<u8>,
    max_entry_bytes: u64,
}

impl<'c> ImportPipeline<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        ImportPipeline {
            conn,
            today: Local::now().date_naive(),
            delimiter: None,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_delimiter(mut self, delimiter: Option<u8>) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_max_entry_bytes(mut self, max_entry_bytes: u64) -> Self {
        self.max_entry_bytes = max_entry_bytes;
        self
    }

    fn bulk(&self) -> BulkHandler {
        BulkHandler::new(self.delimiter).with_max_entry_bytes(self.max_entry_bytes)
    }

    pub fn process_file(&self, parser: &CsvParser) -> ImportReport {
        let name = parser.name();
        let run_id = match history::start(self.conn, name, parser.bytes()) {
            Ok(id) => Some(id),
            Err(e) => {
                error!(file = name, error = %e, "failed to record import run");
                None
            }
        };
        if let Some(id) = run_id.as_deref() {
            let digest = history::sha256_hex(parser.bytes());
            if let Ok(n) = history::previous_runs(self.conn, &digest, id) {
                if n > 0 {
                    info!(file = name, previous = n, "identical content was imported before");
                }
            }
        }

        let processor = RowProcessor::new(self.conn, name)
            .with_today(self.today)
            .with_run_id(run_id.clone());
        let mut reporter = ImportReporter::new(name);
        match parser.rows() {
            Ok(mut rows) => {
                while let Some(item) = rows.next() {
                    match item {
                        Ok(row) => reporter.record(processor.process_row(&row)),
                        Err(e) => {
                            reporter.record(processor.process_parse_failure(rows.last_line(), &e));
                            break;
                        }
                    }
                }
            }
            Err(e) => reporter.record(processor.process_parse_failure(1, &e)),
        }
        let report = reporter.finish();

        if let Some(id) = run_id.as_deref() {
            if let Err(e) = history::finish(self.conn, id, &report) {
                error!(file = name, error = %e, "failed to finalize import run");
            }
        }
        info!(
            file = name,
            rows = report.total_rows,
            successes = report.successes,
            skips = report.skips,
            errors = report.errors,
            "file imported"
        );
        report
    }

    pub fn process_extraction(&self, extraction: Extraction) -> BulkImportReport {
        for e in &extraction.errors {
            warn!(error = e.as_str(), "upload problem");
        }
        let reports = extraction
            .files
            .iter()
            .map(|parser| self.process_file(parser))
            .collect();
        BulkImportReport::from_reports(reports, extraction.errors)
    }

    /// A `.csv` file or a `.zip` of them, from disk.
    pub fn import_path(&self, path: &Path) -> BulkImportReport {
        let extraction = self.bulk().from_path(path);
        self.process_extraction(extraction)
    }

    pub fn import_bytes(&self, name: &str, bytes: Vec<u8>) -> BulkImportReport {
        let extraction = self.bulk().extract(name, bytes);
        self.process_extraction(extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::domain::{Initiative, Money, Person, ScholarshipType};
    use crate::import::failed::{self, FailureStatus};
    use crate::import::report::RowStatus;

    const HEADER: &str = "Inicio;Fim;Valor;Orientador;OrientadorEmail;Orientado;OrientadoEmail;CampusExecucao;Programa;AgFinanciadora;TituloPJ;TituloPT";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).expect("date")
    }

    fn pipeline(conn: &Connection) -> ImportPipeline<'_> {
        ImportPipeline::new(conn).with_today(today())
    }

    fn csv(lines: &[&str]) -> CsvParser {
        let mut text = String::from(HEADER);
        for l in lines {
            text.push('\n');
            text.push_str(l);
        }
        text.push('\n');
        CsvParser::from_bytes("bolsas.csv", text.into_bytes())
    }

    #[test]
    fn valid_row_creates_a_linked_scholarship() {
        let conn = db::open_in_memory().expect("db");
        let report = pipeline(&conn).process_file(&csv(&[
            "15-03-24;14/03/2025;R$ 1.500,50;bruno lima;BRUNO@ufx.br;ana souza;;Campus Centro;PIBIC;CNPq;Projeto Solar;Plano Solar",
        ]));
        assert_eq!((report.successes, report.errors), (1, 0), "{}", report.summary());

        let id = report.outcomes[0].scholarship_id.clone().expect("id");
        let s = Scholarship::get(&conn, &id).expect("get").expect("stored");
        assert_eq!(s.draft.title, "Plano Solar");
        assert_eq!(s.draft.start_date, NaiveDate::from_ymd_opt(2024, 3, 15).expect("date"));
        assert_eq!(s.draft.value, Money::from_cents(150_050));
        assert!(s.draft.type_id.is_some());
        assert!(s.draft.sponsor_id.is_some());
        assert_eq!(s.draft.initiative_id, None);

        let supervisor = Person::get(&conn, &s.draft.supervisor_id).expect("get").expect("person");
        assert_eq!(supervisor.name, "Bruno Lima");
        assert_eq!(supervisor.email.as_deref(), Some("bruno@ufx.br"));
    }

    #[test]
    fn title_falls_back_to_project_then_student_name() {
        let conn = db::open_in_memory().expect("db");
        let initiative = Initiative::insert(&conn, "Projeto Solar", None, None, None).expect("initiative");
        let report = pipeline(&conn).process_file(&csv(&[
            "01/02/2024;;;Bruno;;Ana;;Centro;;;Projeto Solar;",
            "01/02/2024;;;Bruno;;Bia;;Centro;;;;",
        ]));
        assert_eq!(report.successes, 2, "{}", report.summary());
        let first = Scholarship::get(&conn, report.outcomes[0].scholarship_id.as_deref().unwrap_or_default())
            .expect("get")
            .expect("first");
        assert_eq!(first.draft.title, "Projeto Solar");
        assert_eq!(first.draft.initiative_id, Some(initiative.id));
        assert_eq!(first.draft.value, Money::ZERO);
        let second = Scholarship::get(&conn, report.outcomes[1].scholarship_id.as_deref().unwrap_or_default())
            .expect("get")
            .expect("second");
        assert_eq!(second.draft.title, "Bolsa de Bia");
    }

    #[test]
    fn invalid_rows_are_recorded_and_processing_continues() {
        let conn = db::open_in_memory().expect("db");
        let report = pipeline(&conn).process_file(&csv(&[
            "99/99/2024;;;Bruno;;Ana;;Centro;;;;",
            "01/02/2024;;;Bruno;;Ana;;Centro;;;;",
        ]));
        assert_eq!(report.outcomes[0].status, RowStatus::Error);
        assert_eq!(report.outcomes[0].row_number, 2);
        assert!(report.outcomes[0].message.starts_with("Inicio: invalid date"));
        assert_eq!(report.outcomes[1].status, RowStatus::Success);

        let failures = failed::list(&conn, Some(FailureStatus::Pending)).expect("list");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].row_number, 2);
        assert_eq!(failures[0].raw_data["Inicio"], "99/99/2024");
        assert!(failures[0].run_id.is_some());
    }

    #[test]
    fn failed_domain_rule_rolls_back_created_entities() {
        let conn = db::open_in_memory().expect("db");
        let report = pipeline(&conn).process_file(&csv(&[
            "01/02/2024;01/01/2024;;Bruno;;Ana;;Centro Novo;Tipo Novo;;;",
        ]));
        assert_eq!(report.errors, 1);
        assert!(report.outcomes[0].message.contains("end_date"), "{}", report.outcomes[0].message);
        assert!(Person::list(&conn).expect("people").is_empty());
        assert!(ScholarshipType::list(&conn).expect("types").is_empty());
    }

    #[test]
    fn same_person_as_student_and_supervisor_is_rejected() {
        let conn = db::open_in_memory().expect("db");
        let report = pipeline(&conn).process_file(&csv(&["01/02/2024;;;Ana Souza;;ANA SOUZA;;Centro;;;;"]));
        assert_eq!(report.errors, 1);
        assert!(report.outcomes[0].message.starts_with("student:"));
    }

    #[test]
    fn inactive_type_blocks_new_rows() {
        let conn = db::open_in_memory().expect("db");
        let t = ScholarshipType::insert(&conn, "Antigo").expect("type");
        ScholarshipType::set_active(&conn, &t.id, false).expect("retire");
        let report = pipeline(&conn).process_file(&csv(&["01/02/2024;;;Bruno;;Ana;;Centro;antigo;;;"]));
        assert_eq!(report.errors, 1);
        assert!(report.outcomes[0].message.contains("not active"));
    }

    #[test]
    fn stream_error_is_reported_once_at_last_known_line() {
        let conn = db::open_in_memory().expect("db");
        let mut bytes = format!("{HEADER}\n01/02/2024;;;Bruno;;Ana;;Centro;;;;\n").into_bytes();
        bytes.extend_from_slice(b"02/02/2024;;;Bruno;;");
        bytes.extend_from_slice(&[0xc3, 0x28]);
        bytes.extend_from_slice(b";;Centro;;;;\n01/03/2024;;;Bruno;;Caio;;Centro;;;;\n");
        let report = pipeline(&conn).process_file(&CsvParser::from_bytes("quebrado.csv", bytes));
        assert_eq!(report.total_rows, 2);
        assert_eq!(report.successes, 1);
        assert_eq!(report.errors, 1);
        assert_eq!(report.outcomes[1].row_number, 2);
        assert_eq!(failed::list(&conn, None).expect("list").len(), 1);
    }

    #[test]
    fn lost_scholarship_insert_becomes_a_skip() {
        let conn = db::open_in_memory().expect("db");
        let report = pipeline(&conn).process_file(&csv(&["01/02/2024;;;Bruno;;Ana;;Centro;;;;Plano Vencedor"]));
        let winner_id = report.outcomes[0].scholarship_id.clone().expect("winner");
        let winner = Scholarship::get(&conn, &winner_id).expect("get").expect("stored");

        let e = conn
            .execute(
                "INSERT INTO scholarships(id, title, campus_id, start_date, supervisor_id, student_id)
                 SELECT 'late', 'Plano Atrasado', campus_id, start_date, supervisor_id, student_id
                 FROM scholarships WHERE id = ?",
                [&winner_id],
            )
            .expect_err("natural key taken");
        assert!(is_unique_violation(&e));

        let settled = settle_lost_insert(
            &conn,
            &winner.draft.student_id,
            winner.draft.start_date,
            &winner.draft.supervisor_id,
            e,
        );
        match settled {
            Ok(Processed::Duplicate(existing)) => assert_eq!(existing.id, winner_id),
            _ => panic!("expected the stored record to win"),
        }
    }

    #[test]
    fn lost_insert_without_a_stored_winner_stays_an_error() {
        let conn = db::open_in_memory().expect("db");
        let settled = settle_lost_insert(
            &conn,
            "nobody",
            today(),
            "nobody-else",
            rusqlite::Error::QueryReturnedNoRows,
        );
        assert!(matches!(settled, Err(ImportError::Store(_))));
    }

    #[test]
    fn headerless_file_is_a_single_error() {
        let conn = db::open_in_memory().expect("db");
        let report = pipeline(&conn).process_file(&CsvParser::from_bytes("vazio.csv", Vec::new()));
        assert_eq!((report.total_rows, report.errors), (1, 1));
        assert_eq!(report.outcomes[0].message, "file has no header row");
    }

    #[test]
    fn import_runs_are_finalized_with_totals() {
        let conn = db::open_in_memory().expect("db");
        pipeline(&conn).process_file(&csv(&["01/02/2024;;;Bruno;;Ana;;Centro;;;;"]));
        let runs = history::list(&conn).expect("runs");
        assert_eq!(runs.len(), 1);
        assert_eq!((runs[0].total_rows, runs[0].successes), (1, 1));
        assert!(runs[0].finished_at.is_some());
    }
}
