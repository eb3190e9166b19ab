//! CSV decoding into header-keyed rows and the typed scholarship record.

use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::normalize::{fold_accents, non_blank};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Column headers of the scholarship spreadsheet.
pub mod columns {
    pub const START: &str = "Inicio";
    pub const END: &str = "Fim";
    pub const VALUE: &str = "Valor";
    pub const SUPERVISOR: &str = "Orientador";
    pub const SUPERVISOR_EMAIL: &str = "OrientadorEmail";
    pub const STUDENT: &str = "Orientado";
    pub const STUDENT_EMAIL: &str = "OrientadoEmail";
    pub const CAMPUS: &str = "CampusExecucao";
    pub const PROGRAM: &str = "Programa";
    pub const SPONSOR: &str = "AgFinanciadora";
    pub const PROJECT_TITLE: &str = "TituloPJ";
    pub const PLAN_TITLE: &str = "TituloPT";
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("file has no header row")]
    MissingHeader,
    #[error("line {line}: content is not valid UTF-8")]
    Decode { line: u64 },
    #[error("line {line}: {message}")]
    Malformed { line: u64, message: String },
}

impl ParseError {
    fn from_csv(e: &csv::Error, fallback_line: u64) -> Self {
        let line = e.position().map(|p| p.line()).unwrap_or(fallback_line);
        match e.kind() {
            csv::ErrorKind::Utf8 { .. } => ParseError::Decode { line },
            _ => ParseError::Malformed {
                line,
                message: e.to_string(),
            },
        }
    }
}

/// Accent-, case- and punctuation-insensitive header key.
pub fn header_key(name: &str) -> String {
    fold_accents(name)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug)]
struct Header {
    name: String,
    key: String,
}

/// One data line keyed by header name. `number` is the physical line in the file.
#[derive(Debug, Clone)]
pub struct Row {
    pub number: u64,
    headers: Arc<[Header]>,
    values: Vec<String>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&str> {
        let key = header_key(column);
        self.headers
            .iter()
            .position(|h| h.key == key)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .zip(self.values.iter())
            .map(|(h, v)| (h.name.as_str(), v.as_str()))
    }

    /// Raw values as a JSON object, for failed-row records.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in self.columns() {
            map.insert(name.to_string(), Value::String(value.to_string()));
        }
        Value::Object(map)
    }
}

/// Holds one file's bytes; every call to [`CsvParser::rows`] starts over.
#[derive(Debug, Clone)]
pub struct CsvParser {
    name: String,
    bytes: Vec<u8>,
    delimiter: Option<u8>,
}

impl CsvParser {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        CsvParser {
            name: name.into(),
            bytes,
            delimiter: None,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Ok(CsvParser::from_bytes(name, bytes))
    }

    /// Forces a delimiter instead of sniffing it from the header line.
    pub fn with_delimiter(mut self, delimiter: Option<u8>) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn content(&self) -> &[u8] {
        self.bytes.strip_prefix(UTF8_BOM).unwrap_or(&self.bytes)
    }

    pub fn rows(&self) -> Result<Rows<'_>, ParseError> {
        let content = self.content();
        let delimiter = self.delimiter.unwrap_or_else(|| sniff_delimiter(content));
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(content);

        let header_record = reader
            .headers()
            .map_err(|e| ParseError::from_csv(&e, 1))?
            .clone();
        let headers: Vec<Header> = header_record
            .iter()
            .map(|h| Header {
                name: h.trim().to_string(),
                key: header_key(h),
            })
            .collect();
        if headers.iter().all(|h| h.key.is_empty()) {
            return Err(ParseError::MissingHeader);
        }

        Ok(Rows {
            headers: headers.into(),
            records: reader.into_records(),
            last_line: 1,
            done: false,
        })
    }
}

fn sniff_delimiter(content: &[u8]) -> u8 {
    let first_line = content.split(|b| *b == b'\n').next().unwrap_or_default();
    let mut in_quotes = false;
    let (mut semicolons, mut commas) = (0usize, 0usize);
    for b in first_line {
        match b {
            b'"' => in_quotes = !in_quotes,
            b';' if !in_quotes => semicolons += 1,
            b',' if !in_quotes => commas += 1,
            _ => {}
        }
    }
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// Lazy row sequence; stops for good after the first stream error.
pub struct Rows<'a> {
    headers: Arc<[Header]>,
    records: csv::StringRecordsIntoIter<&'a [u8]>,
    last_line: u64,
    done: bool,
}

impl Rows<'_> {
    /// Line of the last record read, or of the header before any.
    pub fn last_line(&self) -> u64 {
        self.last_line
    }
}

impl Iterator for Rows<'_> {
    type Item = Result<Row, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.records.next()? {
                Ok(record) => {
                    let number = record
                        .position()
                        .map(|p| p.line())
                        .unwrap_or(self.last_line + 1);
                    self.last_line = number;
                    if record.iter().all(|v| v.trim().is_empty()) {
                        continue;
                    }
                    let mut values: Vec<String> = record.iter().map(str::to_string).collect();
                    values.resize(self.headers.len(), String::new());
                    return Some(Ok(Row {
                        number,
                        headers: Arc::clone(&self.headers),
                        values,
                    }));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(ParseError::from_csv(&e, self.last_line + 1)));
                }
            }
        }
    }
}

/// The known columns of one row, trimmed, with blank cells as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScholarshipRow {
    pub number: u64,
    pub start: Option<String>,
    pub end: Option<String>,
    pub value: Option<String>,
    pub supervisor: Option<String>,
    pub supervisor_email: Option<String>,
    pub student: Option<String>,
    pub student_email: Option<String>,
    pub campus: Option<String>,
    pub program: Option<String>,
    pub sponsor: Option<String>,
    pub project_title: Option<String>,
    pub plan_title: Option<String>,
}

impl ScholarshipRow {
    pub fn from_row(row: &Row) -> Self {
        let field = |column: &str| row.get(column).and_then(non_blank);
        ScholarshipRow {
            number: row.number,
            start: field(columns::START),
            end: field(columns::END),
            value: field(columns::VALUE),
            supervisor: field(columns::SUPERVISOR),
            supervisor_email: field(columns::SUPERVISOR_EMAIL),
            student: field(columns::STUDENT),
            student_email: field(columns::STUDENT_EMAIL),
            campus: field(columns::CAMPUS),
            program: field(columns::PROGRAM),
            sponsor: field(columns::SPONSOR),
            project_title: field(columns::PROJECT_TITLE),
            plan_title: field(columns::PLAN_TITLE),
        }
    }
}
