use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Success,
    Skipped,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowOutcome {
    pub row_number: u64,
    pub status: RowStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scholarship_id: Option<String>,
}

impl RowOutcome {
    pub fn success(row_number: u64, scholarship_id: String) -> Self {
        RowOutcome {
            row_number,
            status: RowStatus::Success,
            message: "created".to_string(),
            scholarship_id: Some(scholarship_id),
        }
    }

    pub fn skipped(row_number: u64, message: impl Into<String>) -> Self {
        RowOutcome {
            row_number,
            status: RowStatus::Skipped,
            message: message.into(),
            scholarship_id: None,
        }
    }

    pub fn error(row_number: u64, message: impl Into<String>) -> Self {
        RowOutcome {
            row_number,
            status: RowStatus::Error,
            message: message.into(),
            scholarship_id: None,
        }
    }
}

/// Collects the outcomes of one file.
#[derive(Debug, Default)]
pub struct ImportReporter {
    file_name: String,
    outcomes: Vec<RowOutcome>,
}

impl ImportReporter {
    pub fn new(file_name: impl Into<String>) -> Self {
        ImportReporter {
            file_name: file_name.into(),
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: RowOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn finish(self) -> ImportReport {
        let count = |status: RowStatus| {
            self.outcomes
                .iter()
                .filter(|o| o.status == status)
                .count()
        };
        ImportReport {
            total_rows: self.outcomes.len(),
            successes: count(RowStatus::Success),
            skips: count(RowStatus::Skipped),
            errors: count(RowStatus::Error),
            file_name: self.file_name,
            outcomes: self.outcomes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub file_name: String,
    pub total_rows: usize,
    pub successes: usize,
    pub skips: usize,
    pub errors: usize,
    pub outcomes: Vec<RowOutcome>,
}

impl ImportReport {
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "{}: {} rows, {} created, {} skipped, {} errors",
            self.file_name, self.total_rows, self.successes, self.skips, self.errors
        );
        for o in self.outcomes.iter().filter(|o| o.status == RowStatus::Error) {
            text.push_str(&format!("\n  line {}: {}", o.row_number, o.message));
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkImportReport {
    pub total_files: usize,
    pub successful_files: usize,
    pub failed_files: usize,
    pub total_rows: usize,
    pub total_successes: usize,
    pub total_skips: usize,
    pub total_errors: usize,
    pub reports: Vec<ImportReport>,
    /// Archive-level problems that kept files from being read at all.
    pub handler_errors: Vec<String>,
    pub summary: String,
}

impl BulkImportReport {
    pub fn from_reports(reports: Vec<ImportReport>, handler_errors: Vec<String>) -> Self {
        let failed_files = reports.iter().filter(|r| r.has_errors()).count();
        let mut report = BulkImportReport {
            total_files: reports.len(),
            successful_files: reports.len() - failed_files,
            failed_files,
            total_rows: reports.iter().map(|r| r.total_rows).sum(),
            total_successes: reports.iter().map(|r| r.successes).sum(),
            total_skips: reports.iter().map(|r| r.skips).sum(),
            total_errors: reports.iter().map(|r| r.errors).sum(),
            reports,
            handler_errors,
            summary: String::new(),
        };
        report.summary = report.render_summary();
        report
    }

    fn render_summary(&self) -> String {
        let mut lines = vec![format!(
            "{} files ({} clean, {} with errors): {} rows, {} created, {} skipped, {} errors",
            self.total_files,
            self.successful_files,
            self.failed_files,
            self.total_rows,
            self.total_successes,
            self.total_skips,
            self.total_errors
        )];
        lines.extend(self.handler_errors.iter().map(|e| format!("error: {e}")));
        lines.extend(self.reports.iter().map(ImportReport::summary));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn report(name: &str, outcomes: Vec<RowOutcome>) -> ImportReport {
        let mut r = ImportReporter::new(name);
        for o in outcomes {
            r.record(o);
        }
        r.finish()
    }

    #[test]
    fn reporter_counts_each_status() {
        let r = report(
            "a.csv",
            vec![
                RowOutcome::success(2, "s1".into()),
                RowOutcome::skipped(3, "duplicate"),
                RowOutcome::error(4, "Orientado: required field is missing"),
            ],
        );
        assert_eq!((r.total_rows, r.successes, r.skips, r.errors), (3, 1, 1, 1));
        assert_eq!(
            r.summary(),
            "a.csv: 3 rows, 1 created, 1 skipped, 1 errors\n  line 4: Orientado: required field is missing"
        );
    }

    #[test]
    fn bulk_report_folds_files_and_handler_errors() {
        let clean = report("a.csv", vec![RowOutcome::success(2, "s1".into())]);
        let dirty = report(
            "b.csv",
            vec![RowOutcome::success(2, "s2".into()), RowOutcome::error(3, "bad")],
        );
        let bulk = BulkImportReport::from_reports(vec![clean, dirty], vec!["x.zip: corrupt".into()]);
        assert_eq!(bulk.total_files, 2);
        assert_eq!(bulk.successful_files, 1);
        assert_eq!(bulk.failed_files, 1);
        assert_eq!(bulk.total_rows, 3);
        assert_eq!(bulk.total_successes, 2);
        assert_eq!(bulk.total_errors, 1);
        assert!(bulk.summary.starts_with("2 files (1 clean, 1 with errors)"));
        assert!(bulk.summary.contains("error: x.zip: corrupt"));

        let json = serde_json::to_value(&bulk).expect("json");
        assert_eq!(json["totalFiles"], 2);
        assert_eq!(json["reports"][1]["outcomes"][1]["status"], "error");
    }
}
