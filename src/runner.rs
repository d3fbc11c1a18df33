use crate::backend::process::CommandRunner;
use crate::backend::{Backend, BackendAdapter, BackendMode};
use crate::config::AppConfig;
use crate::dataset::TestCase;
use crate::error::BenchError;
use crate::output;
use crate::query_file::{self, QueryFile};
use crate::verbose::Timer;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Placeholder replaced by the target database name in query text.
pub const DBNAME_PLACEHOLDER: &str = "{DBNAME}";

/// Query execution counters for one mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub mode: BackendMode,
    pub database: String,
    /// Query files with a valid sequence id.
    pub corpus: usize,
    pub attempted: usize,
    pub failed: Vec<String>,
    pub skipped_empty: Vec<String>,
}

impl RunStats {
    fn new(mode: BackendMode, database: &str, corpus: usize) -> Self {
        Self {
            mode,
            database: database.to_string(),
            corpus,
            attempted: 0,
            failed: Vec::new(),
            skipped_empty: Vec::new(),
        }
    }
}

/// Runs the query corpus of a test case against one backend mode at a time.
pub struct QueryRunner<'a, R> {
    config: &'a AppConfig,
    case: &'a TestCase,
    runner: R,
}

impl<'a, R: CommandRunner + Clone> QueryRunner<'a, R> {
    pub fn new(config: &'a AppConfig, case: &'a TestCase, runner: R) -> Self {
        Self {
            config,
            case,
            runner,
        }
    }

    pub fn output_dir(&self, mode: BackendMode) -> PathBuf {
        self.case.outputs_dir().join(mode.name())
    }

    /// Async wait budget for one query; 0 selects synchronous execution.
    pub fn async_timeout(&self, mode: BackendMode, pragmas: &query_file::Pragmas) -> u64 {
        if !mode.is_async() || pragmas.no_async() {
            return 0;
        }
        pragmas.async_timeout().unwrap_or(self.config.async_timeout_secs)
    }

    /// Execute every query whose sequence id is at most `stop_at`.
    ///
    /// A failing query is recorded and the run moves on.
    pub async fn run(&self, mode: BackendMode, database: &str, stop_at: u32) -> Result<RunStats, BenchError> {
        let out_dir = self.output_dir(mode);
        fs::create_dir_all(&out_dir)?;

        let files = query_file::list_query_files(&self.case.queries_dir)?;
        let mut stats = RunStats::new(mode, database, files.len());
        let backend = BackendAdapter::for_mode(mode, self.config, database, self.runner.clone());

        info!("running queries against {} ({})", mode, database);
        let timer = Timer::start();

        for file in files.iter().filter(|f| f.sequence_id <= stop_at) {
            self.run_one(&backend, mode, database, file, &out_dir, &mut stats).await;
        }

        info!(
            "{}: {} queries attempted out of {} ({} failed, {}ms)",
            mode,
            stats.attempted,
            stats.corpus,
            stats.failed.len(),
            timer.elapsed_ms()
        );
        Ok(stats)
    }

    async fn run_one(
        &self,
        backend: &BackendAdapter<R>,
        mode: BackendMode,
        database: &str,
        file: &QueryFile,
        out_dir: &Path,
        stats: &mut RunStats,
    ) {
        let content = match file.read() {
            Ok(content) => content,
            Err(err) => {
                error!("cannot read query file {}: {}", file.path.display(), err);
                stats.failed.push(file.file_name.clone());
                return;
            }
        };

        let parsed = query_file::parse_query(&content, mode.is_distributed());
        let query = parsed.text.replace(DBNAME_PLACEHOLDER, database);
        if query.is_empty() {
            warn!("skipping {}: no query text for {}", file.file_name, mode);
            stats.skipped_empty.push(file.file_name.clone());
            return;
        }

        let pragmas = &parsed.pragmas;
        let timeout = self.async_timeout(mode, pragmas);
        let output_file = out_dir.join(file.output_name());
        debug!("{} -> {} (pragmas: {:?})", file.file_name, output_file.display(), pragmas);
        info!("running {}: {}", file.file_name, query);

        stats.attempted += 1;
        if let Err(err) = backend
            .execute(&query, &output_file, !pragmas.no_header(), timeout, None)
            .await
        {
            error!("query {} failed on {}: {}", file.file_name, mode, err);
            stats.failed.push(file.file_name.clone());
            return;
        }

        if pragmas.sort_result()
            && let Err(err) = output::sort_output_file(&output_file)
        {
            warn!("cannot sort {}: {}", output_file.display(), err);
        }
    }
}
