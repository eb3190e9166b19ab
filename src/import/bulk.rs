//! Turns one uploaded file (a CSV or a ZIP of CSVs) into independent parsers.

use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, warn};
use zip::ZipArchive;

use super::parser::CsvParser;
use crate::config::DEFAULT_MAX_ENTRY_BYTES;

#[derive(Debug, Default)]
pub struct Extraction {
    pub files: Vec<CsvParser>,
    /// Problems that kept the upload (or one archive entry) from being read.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct BulkHandler {
    delimiter: Option<u8>,
    max_entry_bytes: u64,
}

impl Default for BulkHandler {
    fn default() -> Self {
        BulkHandler::new(None)
    }
}

impl BulkHandler {
    pub fn new(delimiter: Option<u8>) -> Self {
        BulkHandler {
            delimiter,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
        }
    }

    /// Caps the uncompressed bytes read from any single archive entry.
    pub fn with_max_entry_bytes(mut self, max_entry_bytes: u64) -> Self {
        self.max_entry_bytes = max_entry_bytes;
        self
    }

    pub fn from_path(&self, path: &Path) -> Extraction {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        match std::fs::read(path) {
            Ok(bytes) => self.extract(&name, bytes),
            Err(e) => Extraction {
                files: Vec::new(),
                errors: vec![format!("{}: {}", path.to_string_lossy(), e)],
            },
        }
    }

    pub fn extract(&self, name: &str, bytes: Vec<u8>) -> Extraction {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".csv") {
            Extraction {
                files: vec![self.parser(name, bytes)],
                errors: Vec::new(),
            }
        } else if lower.ends_with(".zip") {
            self.extract_zip(name, bytes)
        } else {
            Extraction {
                files: Vec::new(),
                errors: vec![format!("{name}: unsupported file type (expected .csv or .zip)")],
            }
        }
    }

    fn parser(&self, name: &str, bytes: Vec<u8>) -> CsvParser {
        CsvParser::from_bytes(name, bytes).with_delimiter(self.delimiter)
    }

    fn extract_zip(&self, name: &str, bytes: Vec<u8>) -> Extraction {
        let mut out = Extraction::default();
        let mut archive = match ZipArchive::new(Cursor::new(bytes)) {
            Ok(a) => a,
            Err(e) => {
                out.errors.push(format!("{name}: invalid zip archive: {e}"));
                return out;
            }
        };

        for i in 0..archive.len() {
            let mut entry = match archive.by_index(i) {
                Ok(entry) => entry,
                Err(e) => {
                    out.errors.push(format!("{name}: entry {i} unreadable: {e}"));
                    continue;
                }
            };
            let entry_name = entry.name().to_string();
            if entry.is_dir() || !is_csv_entry(&entry_name) {
                debug!(archive = name, entry = entry_name.as_str(), "skipping archive entry");
                continue;
            }
            // The declared size is untrusted; `take` bounds what is inflated.
            let mut buf = Vec::new();
            if let Err(e) = (&mut entry)
                .take(self.max_entry_bytes.saturating_add(1))
                .read_to_end(&mut buf)
            {
                warn!(archive = name, entry = entry_name.as_str(), error = %e, "failed to extract entry");
                out.errors.push(format!("{name}: {entry_name}: {e}"));
                continue;
            }
            if buf.len() as u64 > self.max_entry_bytes {
                warn!(
                    archive = name,
                    entry = entry_name.as_str(),
                    limit = self.max_entry_bytes,
                    "archive entry too large"
                );
                out.errors.push(format!(
                    "{name}: {entry_name}: entry exceeds {} bytes",
                    self.max_entry_bytes
                ));
                continue;
            }
            out.files.push(self.parser(&entry_name, buf));
        }

        if out.files.is_empty() && out.errors.is_empty() {
            out.errors.push(format!("{name}: archive contains no CSV files"));
        }
        out
    }
}

/// `.csv` entries, minus macOS metadata and hidden files.
fn is_csv_entry(path: &str) -> bool {
    if path.starts_with("__MACOSX/") || path.contains("/__MACOSX/") {
        return false;
    }
    let base = path.rsplit('/').next().unwrap_or(path);
    !base.starts_with('.') && base.to_ascii_lowercase().ends_with(".csv")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = FileOptions::default();
        for (name, body) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, opts).expect("dir");
            } else {
                zip.start_file(*name, opts).expect("start");
                zip.write_all(body.as_bytes()).expect("write");
            }
        }
        zip.finish().expect("finish").into_inner()
    }

    #[test]
    fn csv_upload_is_a_single_stream() {
        let out = BulkHandler::default().extract("Bolsas.CSV", b"Inicio\n".to_vec());
        assert!(out.errors.is_empty());
        assert_eq!(out.files.len(), 1);
        assert_eq!(out.files[0].name(), "Bolsas.CSV");
    }

    #[test]
    fn zip_keeps_csv_entries_in_archive_order() {
        let bytes = zip_of(&[
            ("2024/", ""),
            ("2024/b.csv", "Inicio\n"),
            ("notes.txt", "hello"),
            ("__MACOSX/2024/._b.csv", "junk"),
            ("2024/._a.csv", "junk"),
            (".hidden.csv", "junk"),
            ("a.CSV", "Inicio\n"),
        ]);
        let out = BulkHandler::default().extract("lote.zip", bytes);
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        let names: Vec<&str> = out.files.iter().map(CsvParser::name).collect();
        assert_eq!(names, vec!["2024/b.csv", "a.CSV"]);
    }

    #[test]
    fn zip_without_csv_reports_a_handler_error() {
        let out = BulkHandler::default().extract("vazio.zip", zip_of(&[("readme.txt", "x")]));
        assert!(out.files.is_empty());
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].contains("no CSV files"));
    }

    #[test]
    fn corrupt_zip_and_unknown_extension_do_not_panic() {
        let corrupt = BulkHandler::default().extract("bad.zip", b"not a zip".to_vec());
        assert!(corrupt.files.is_empty());
        assert!(corrupt.errors[0].contains("invalid zip archive"));

        let unknown = BulkHandler::default().extract("planilha.xlsx", vec![1, 2, 3]);
        assert!(unknown.files.is_empty());
        assert!(unknown.errors[0].contains("unsupported file type"));
    }

    #[test]
    fn oversized_entries_are_refused() {
        let big = format!("Inicio\n{}", "01/01/2024\n".repeat(20));
        let bytes = zip_of(&[("a.csv", "Inicio\n"), ("big.csv", big.as_str())]);
        let out = BulkHandler::default()
            .with_max_entry_bytes(64)
            .extract("lote.zip", bytes);

        let names: Vec<&str> = out.files.iter().map(CsvParser::name).collect();
        assert_eq!(names, vec!["a.csv"]);
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].contains("big.csv"), "{:?}", out.errors);
        assert!(out.errors[0].contains("exceeds 64 bytes"));
    }

    #[test]
    fn forced_delimiter_reaches_every_parser() {
        let bytes = zip_of(&[("a.csv", "Inicio;Fim\n01/01/2024;\n")]);
        let out = BulkHandler::new(Some(b';')).extract("a.zip", bytes);
        let row = out.files[0].rows().expect("header").next().expect("row").expect("ok");
        assert_eq!(row.get("Inicio"), Some("01/01/2024"));
    }
}
