use crate::backend::process::CommandRunner;
use crate::backend::BackendMode;
use crate::compare::ResultComparator;
use crate::config::AppConfig;
use crate::dataset::TestCase;
use crate::error::BenchError;
use crate::loader::{BackendLoader, DataDuplicator, DataLoadOrchestrator};
use crate::report::RunReport;
use crate::runner::QueryRunner;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};

pub const REPORT_FILE: &str = "report.json";

/// One test case run against a list of backend modes.
pub struct BenchmarkCase<'a, R> {
    config: &'a AppConfig,
    case: TestCase,
    modes: Vec<BackendMode>,
    runner: R,
}

impl<'a, R: CommandRunner + Clone> BenchmarkCase<'a, R> {
    /// Resolve the test case directories. Fails before anything is touched
    /// when the datasets directory or the case is missing.
    pub fn new(config: &'a AppConfig, case_id: &str, modes: Vec<BackendMode>, runner: R) -> Result<Self, BenchError> {
        let testdata_dir = config.testdata_dir.as_ref().ok_or_else(|| BenchError::Config {
            message: "no datasets directory (use --testdata-dir or QBENCH_TESTDATA_DIR)".to_string(),
        })?;
        let case = TestCase::new(case_id, testdata_dir, &config.out_dir)?;
        Ok(Self {
            config,
            case,
            modes,
            runner,
        })
    }

    pub fn case(&self) -> &TestCase {
        &self.case
    }

    pub fn modes(&self) -> &[BackendMode] {
        &self.modes
    }

    pub fn report_path(&self) -> PathBuf {
        self.case.out_dir.join(REPORT_FILE)
    }

    pub fn new_report(&self) -> RunReport {
        RunReport::new(&self.case.case_id, &self.modes, self.config.stop_at_query)
    }

    /// Delete the previous run's output tree and recreate an empty one.
    pub fn cleanup(&self) -> Result<(), BenchError> {
        match fs::remove_dir_all(&self.case.out_dir) {
            Ok(()) => info!("removed previous output {}", self.case.out_dir.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.case.out_dir)?;
        Ok(())
    }

    /// Load (when asked) and query every mode in turn, recording into `report`.
    ///
    /// Results accumulate in `report` as they are produced, so a cancelled
    /// run still leaves the finished modes in it.
    pub async fn execute(&self, load: bool, report: &mut RunReport) -> Result<(), BenchError> {
        self.cleanup()?;

        if load && self.case.dataset.has_duplicated_tables() {
            info!("duplicating data for case {}", self.case.case_id);
            let duplicator = DataDuplicator::new(self.config, &self.case, self.runner.clone());
            report.duplication_failures = duplicator.run().await;
        }

        let queries = QueryRunner::new(self.config, &self.case, self.runner.clone());
        let mut loaded = HashSet::new();

        for &mode in &self.modes {
            let database = self.case.database_name(mode.database_suffix());

            if load && loaded.insert(database.clone()) {
                let loader = BackendLoader::for_mode(
                    mode,
                    self.config,
                    &self.case,
                    database.clone(),
                    self.runner.clone(),
                );
                let load_report = DataLoadOrchestrator::new(&self.case).load_all(&loader).await?;
                if !load_report.is_complete() {
                    warn!("database {} is incompletely loaded", database);
                }
                report.loads.push(load_report);
            }

            let stats = queries.run(mode, &database, self.config.stop_at_query).await?;
            report.runs.push(stats);
        }
        Ok(())
    }

    /// Diff the outputs present on disk; a single mode yields no comparison.
    pub fn compare(&self, report: &mut RunReport) -> Result<(), BenchError> {
        if self.modes.len() < 2 {
            info!("single mode, nothing to compare");
            return Ok(());
        }
        let comparator = ResultComparator::new(
            self.case.outputs_dir(),
            self.case.dataset.not_loaded_tables.clone(),
        );
        report.comparison = comparator.compare(&self.modes)?;
        Ok(())
    }
}
