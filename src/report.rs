use crate::backend::BackendMode;
use crate::compare::Comparison;
use crate::loader::{LoadReport, TableFailure};
use crate::runner::RunStats;
use serde::Serialize;

/// Everything one invocation did: loads, query runs and the comparison.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub case_id: String,
    pub modes: Vec<BackendMode>,
    pub stop_at_query: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplication_failures: Vec<TableFailure>,
    pub loads: Vec<LoadReport>,
    pub runs: Vec<RunStats>,
    pub comparison: Option<Comparison>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn new(case_id: &str, modes: &[BackendMode], stop_at_query: u32) -> Self {
        Self {
            case_id: case_id.to_string(),
            modes: modes.to_vec(),
            stop_at_query,
            duplication_failures: Vec::new(),
            loads: Vec::new(),
            runs: Vec::new(),
            comparison: None,
            cancelled: false,
        }
    }

    /// No discrepancy between any compared mode and the baseline.
    pub fn success(&self) -> bool {
        self.comparison.as_ref().is_none_or(Comparison::is_success)
    }

    pub fn summary(&self) -> Summary {
        Summary {
            case: self.case_id.clone(),
            modes: self.modes.iter().map(|m| m.name()).collect::<Vec<_>>().join(","),
            baseline: self.comparison.as_ref().map(|c| c.baseline.name().to_string()),
            success: self.success(),
            cancelled: self.cancelled,
            queries: self
                .runs
                .iter()
                .map(|r| QueryCounts {
                    mode: r.mode.name().to_string(),
                    attempted: r.attempted,
                    corpus: r.corpus,
                    failed: r.failed.len(),
                    skipped: r.skipped_empty.len(),
                })
                .collect(),
            discrepancies: self.comparison.as_ref().map(Comparison::discrepancies).unwrap_or_default(),
            not_loaded_tables: self
                .comparison
                .as_ref()
                .map(|c| c.not_loaded_tables.clone())
                .unwrap_or_default(),
        }
    }
}

/// Compact view of a `RunReport` for the terminal.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub case: String,
    pub modes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,
    pub success: bool,
    pub cancelled: bool,
    pub queries: Vec<QueryCounts>,
    pub discrepancies: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub not_loaded_tables: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryCounts {
    pub mode: String,
    pub attempted: usize,
    pub corpus: usize,
    pub failed: usize,
    pub skipped: usize,
}
