pub mod duplicator;
pub mod mysql;
pub mod qserv;

use crate::backend::process::{CommandRunner, CommandSpec};
use crate::backend::BackendMode;
use crate::config::AppConfig;
use crate::dataset::{TableDescriptor, TestCase};
use crate::error::BenchError;
use crate::masking;
use crate::verbose::Timer;
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

pub use duplicator::DataDuplicator;
pub use mysql::MysqlLoader;
pub use qserv::QservLoader;

/// Per-backend database preparation and table loading.
pub trait Loader {
    fn database(&self) -> &str;

    /// Drop and recreate the target database so a failed earlier load never blocks this one.
    fn prepare_database(&self) -> impl Future<Output = Result<(), BenchError>>;

    fn create_load_table(&self, table: &TableDescriptor) -> impl Future<Output = Result<(), BenchError>>;

    /// Backend-specific work after every table is loaded.
    fn finalize(&self) -> impl Future<Output = Result<(), BenchError>>;
}

/// A table whose preparation or load failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableFailure {
    pub table: String,
    pub error: String,
}

/// Outcome of loading one database.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub database: String,
    pub loaded: Vec<String>,
    pub failed: Vec<TableFailure>,
    pub not_loaded: Vec<String>,
    pub unresolved: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalize_error: Option<String>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.unresolved.is_empty() && self.finalize_error.is_none()
    }
}

/// Sequences database preparation and table loads in declared order.
pub struct DataLoadOrchestrator<'a> {
    case: &'a TestCase,
}

impl<'a> DataLoadOrchestrator<'a> {
    pub fn new(case: &'a TestCase) -> Self {
        Self { case }
    }

    /// Prepare the database, load every table of the load order, then finalize.
    ///
    /// Only a catalog failure during preparation aborts; table failures are
    /// recorded and loading moves on to the next table.
    pub async fn load_all<L: Loader>(&self, loader: &L) -> Result<LoadReport, BenchError> {
        let dataset = &self.case.dataset;
        let mut report = LoadReport {
            database: loader.database().to_string(),
            not_loaded: dataset.not_loaded_tables.clone(),
            unresolved: dataset.unresolved_tables.clone(),
            ..LoadReport::default()
        };

        info!("loading data from {} into {}", dataset.data_dir.display(), loader.database());
        let timer = Timer::start();

        if let Err(err) = loader.prepare_database().await {
            if err.is_fatal() {
                return Err(err);
            }
            error!("cannot prepare database {}: {}", loader.database(), err);
            report.failed = dataset
                .tables
                .iter()
                .map(|t| TableFailure {
                    table: t.name.clone(),
                    error: format!("database not prepared: {err}"),
                })
                .collect();
            return Ok(report);
        }

        for table in &dataset.tables {
            match loader.create_load_table(table).await {
                Ok(()) => report.loaded.push(table.name.clone()),
                Err(err) => {
                    error!("cannot load table {}: {}", table.name, err);
                    report.failed.push(TableFailure {
                        table: table.name.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        if let Err(err) = loader.finalize().await {
            error!("cannot finalize database {}: {}", loader.database(), err);
            report.finalize_error = Some(err.to_string());
        }

        if !report.not_loaded.is_empty() {
            info!("tables/views not loaded: {:?}", report.not_loaded);
        }
        info!(
            "database {} loaded ({}ms, {} tables, {} failed)",
            loader.database(),
            timer.elapsed_ms(),
            report.loaded.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

/// Loader selected for one backend mode.
pub enum BackendLoader<'a, R> {
    Mysql(MysqlLoader<'a, R>),
    Qserv(QservLoader<'a, R>),
}

impl<'a, R: CommandRunner + Clone> BackendLoader<'a, R> {
    pub fn for_mode(
        mode: BackendMode,
        config: &'a AppConfig,
        case: &'a TestCase,
        database: String,
        runner: R,
    ) -> Self {
        if mode.is_distributed() {
            BackendLoader::Qserv(QservLoader::new(config, case, database, runner))
        } else {
            BackendLoader::Mysql(MysqlLoader::new(config, case, database, runner))
        }
    }
}

impl<R: CommandRunner + Clone> Loader for BackendLoader<'_, R> {
    fn database(&self) -> &str {
        match self {
            BackendLoader::Mysql(l) => l.database(),
            BackendLoader::Qserv(l) => l.database(),
        }
    }

    async fn prepare_database(&self) -> Result<(), BenchError> {
        match self {
            BackendLoader::Mysql(l) => l.prepare_database().await,
            BackendLoader::Qserv(l) => l.prepare_database().await,
        }
    }

    async fn create_load_table(&self, table: &TableDescriptor) -> Result<(), BenchError> {
        match self {
            BackendLoader::Mysql(l) => l.create_load_table(table).await,
            BackendLoader::Qserv(l) => l.create_load_table(table).await,
        }
    }

    async fn finalize(&self) -> Result<(), BenchError> {
        match self {
            BackendLoader::Mysql(l) => l.finalize().await,
            BackendLoader::Qserv(l) => l.finalize().await,
        }
    }
}

/// Loader options shared by the MySQL and Qserv loads of `table`.
pub(crate) fn common_options(config: &AppConfig, case: &TestCase, table: &TableDescriptor) -> Vec<String> {
    let mut opts = Vec::new();
    if config.verbose {
        opts.push("--verbose-all".to_string());
        opts.push("-vvv".to_string());
    } else {
        opts.push("-v".to_string());
    }

    opts.push(format!("--config={}", case.dataset.common_config().display()));
    if config.qserv.multi_node {
        opts.push(format!("--user={}", config.proxy.user));
    } else {
        opts.push(format!("--user={}", config.mysqld.user));
        if let Some(password) = &config.mysqld.password {
            use secrecy::ExposeSecret;
            opts.push(format!("--password={}", password.expose_secret()));
        }
    }
    opts.push(format!("--socket={}", config.mysqld.socket.display()));
    opts.push("--delete-tables".to_string());

    if table.duplicated {
        opts.push(format!("--config={}", case.dataset.table_config(&table.name).display()));
    } else {
        // the loader unzips input data there
        opts.push(format!("--chunks-dir={}", loader_work_dir(config, &table.name).display()));
    }
    opts
}

/// Trailing loader arguments: database, table, schema file and data file if any.
pub(crate) fn common_args(case: &TestCase, database: &str, table: &TableDescriptor) -> Vec<String> {
    let mut args = vec![
        database.to_string(),
        table.name.clone(),
        table.schema_file.display().to_string(),
    ];
    if let Some(data_file) = data_file(case, table) {
        args.push(data_file.display().to_string());
    }
    args
}

/// Data file fed to the loader; duplicated tables use the concatenated chunk file.
pub fn data_file(case: &TestCase, table: &TableDescriptor) -> Option<PathBuf> {
    if table.duplicated {
        Some(duplicator::merged_chunk_file(case, &table.name))
    } else {
        table.data_file.clone()
    }
}

fn loader_work_dir(config: &AppConfig, table: &str) -> PathBuf {
    config.qserv.tmp_dir.join("qserv_data_loader").join(table)
}

/// Run an external tool, failing the current table on non-zero exit.
pub(crate) async fn run_tool<R: CommandRunner>(
    runner: &R,
    spec: &CommandSpec,
    table: &str,
    show_secrets: bool,
) -> Result<(), BenchError> {
    debug!(
        "running {}",
        masking::redact_command_line(&spec.program, &spec.args, show_secrets)
    );
    let out = runner.run(spec).await.map_err(|e| BenchError::Load {
        table: table.to_string(),
        message: e.to_string(),
    })?;
    if !out.stdout.is_empty() {
        debug!("{} stdout: {}", spec.program, out.stdout_text().trim());
    }
    if !out.success() {
        let err = out.check(&spec.program).err().map(|e| e.to_string()).unwrap_or_default();
        return Err(BenchError::Load {
            table: table.to_string(),
            message: err,
        });
    }
    if !out.stderr.is_empty() {
        warn!("{} stderr: {}", spec.program, out.stderr_text());
    }
    Ok(())
}
