use crate::backend::BackendMode;
use crate::error::BenchError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Output files of one mode that differ from the baseline or are missing on either side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscrepancyReport {
    pub baseline: BackendMode,
    pub compared: BackendMode,
    pub files: Vec<String>,
}

/// Baseline-relative comparison of every mode of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub baseline: BackendMode,
    pub reports: Vec<DiscrepancyReport>,
    /// Informational only; never counts as a failure.
    pub not_loaded_tables: Vec<String>,
}

impl Comparison {
    /// Union of the discrepant file names over all compared modes, sorted.
    pub fn discrepancies(&self) -> Vec<String> {
        self.reports
            .iter()
            .flat_map(|r| r.files.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.reports.iter().all(|r| r.files.is_empty())
    }
}

/// MySQL is the reference when it took part in the run, otherwise the first mode.
pub fn select_baseline(modes: &[BackendMode]) -> Option<BackendMode> {
    if modes.contains(&BackendMode::Mysql) {
        Some(BackendMode::Mysql)
    } else {
        modes.first().copied()
    }
}

/// Names of regular files in `dir`; a missing directory has none.
fn file_names(dir: &Path) -> io::Result<BTreeSet<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(e),
    };
    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Files present on one side only, or on both with different bytes, sorted by name.
pub fn compare_dirs(baseline: &Path, candidate: &Path) -> Result<Vec<String>, BenchError> {
    let left = file_names(baseline)?;
    let right = file_names(candidate)?;

    let mut differing = Vec::new();
    for name in left.union(&right) {
        if !left.contains(name) || !right.contains(name) {
            differing.push(name.clone());
            continue;
        }
        let a = fs::read(baseline.join(name))?;
        let b = fs::read(candidate.join(name))?;
        if a != b {
            differing.push(name.clone());
        }
    }
    Ok(differing)
}

/// Diffs the per-mode output trees of a run against the baseline mode.
pub struct ResultComparator {
    outputs_dir: PathBuf,
    not_loaded_tables: Vec<String>,
}

impl ResultComparator {
    pub fn new(outputs_dir: impl Into<PathBuf>, not_loaded_tables: Vec<String>) -> Self {
        Self {
            outputs_dir: outputs_dir.into(),
            not_loaded_tables,
        }
    }

    pub fn mode_dir(&self, mode: BackendMode) -> PathBuf {
        self.outputs_dir.join(mode.name())
    }

    /// Compare every non-baseline mode with the baseline. `None` when `modes` is empty.
    pub fn compare(&self, modes: &[BackendMode]) -> Result<Option<Comparison>, BenchError> {
        let Some(baseline) = select_baseline(modes) else {
            return Ok(None);
        };

        if !self.not_loaded_tables.is_empty() {
            info!("tables/views not loaded: {:?}", self.not_loaded_tables);
        }

        let baseline_dir = self.mode_dir(baseline);
        let mut reports = Vec::new();
        for &mode in modes.iter().filter(|m| **m != baseline) {
            let files = compare_dirs(&baseline_dir, &self.mode_dir(mode))?;
            if files.is_empty() {
                info!("{}/{} results are identical", baseline, mode);
            } else {
                error!("{}/{} differs for {} queries:", baseline, mode, files.len());
                error!(
                    "broken queries list in {}: {:?}",
                    self.mode_dir(mode).display(),
                    files
                );
            }
            reports.push(DiscrepancyReport {
                baseline,
                compared: mode,
                files,
            });
        }

        Ok(Some(Comparison {
            baseline,
            reports,
            not_loaded_tables: self.not_loaded_tables.clone(),
        }))
    }
}
