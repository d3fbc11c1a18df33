use crate::backend::mysql::MysqlClient;
use crate::backend::process::{CommandRunner, CommandSpec};
use crate::backend::Connection;
use crate::config::AppConfig;
use crate::dataset::{TableDescriptor, TestCase};
use crate::error::BenchError;
use crate::loader::{common_args, common_options, run_tool, Loader};
use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Worker table listing the databases exported to Qserv workers.
const WORKER_DBS_TABLE: &str = "qservw_worker.Dbs";

/// Partitions and loads tables into Qserv and keeps its catalog in step.
pub struct QservLoader<'a, R> {
    config: &'a AppConfig,
    case: &'a TestCase,
    database: String,
    socket: MysqlClient<R>,
    proxy: MysqlClient<R>,
    runner: R,
}

impl<'a, R: CommandRunner + Clone> QservLoader<'a, R> {
    pub fn new(config: &'a AppConfig, case: &'a TestCase, database: String, runner: R) -> Self {
        let socket = MysqlClient::new(Connection::LocalSocket, config, None, runner.clone());
        let proxy = MysqlClient::new(Connection::Proxy, config, None, runner.clone());
        Self {
            config,
            case,
            database,
            socket,
            proxy,
            runner,
        }
    }

    /// Empty-chunks list the director tables share.
    pub fn empty_chunks_file(&self) -> PathBuf {
        self.config
            .qserv
            .run_dir
            .join("var")
            .join("lib")
            .join("qserv")
            .join(format!("empty_{}.txt", self.database))
    }

    pub fn loader_command(&self, table: &TableDescriptor) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.config.tools.loader)
            .args(common_options(self.config, self.case, table))
            .arg("--css-remove");

        if table.duplicated {
            spec = spec.arg("--skip-partition").arg(format!(
                "--chunks-dir={}",
                self.case.chunks_dir(&table.name).display()
            ));
        }

        // duplicated tables already carry their table config
        let table_cfg = self.case.dataset.table_config(&table.name);
        if !table.duplicated && table_cfg.exists() {
            spec = spec.arg(format!("--config={}", table_cfg.display()));
        }

        if table.director {
            spec = spec.arg(format!("--empty-chunks={}", self.empty_chunks_file().display()));
        }

        spec.args(common_args(self.case, &self.database, table))
    }

    fn admin_command(&self, statement: String) -> CommandSpec {
        let level = if self.config.verbose { "DEBUG" } else { "INFO" };
        CommandSpec::new(&self.config.tools.admin)
            .arg("-c")
            .arg(format!("localhost:{}", self.config.qserv.css_port))
            .arg("-v")
            .arg(level)
            .stdin(statement)
    }

    /// Whether the CSS catalog lists this database, one name per output line.
    async fn css_database_exists(&self) -> Result<bool, BenchError> {
        let spec = self.admin_command("SHOW DATABASES;".to_string());
        let out = self.runner.run(&spec).await.and_then(|o| o.check(&spec.program));
        let out = out.map_err(|e| BenchError::Catalog {
            message: format!("cannot list CSS databases: {e}"),
        })?;
        Ok(out
            .stdout_text()
            .lines()
            .any(|line| line.trim() == self.database))
    }

    /// Remove this database from the CSS catalog if present.
    pub async fn drop_css_database(&self) -> Result<(), BenchError> {
        if !self.css_database_exists().await? {
            debug!("CSS database {} absent, nothing to drop", self.database);
            return Ok(());
        }
        let spec = self.admin_command(format!("DROP DATABASE {};", self.database));
        self.runner
            .run(&spec)
            .await
            .and_then(|o| o.check(&spec.program))
            .map_err(|e| BenchError::Catalog {
                message: format!("cannot drop CSS database {}: {}", self.database, e),
            })?;
        info!("dropped CSS database: {}", self.database);
        Ok(())
    }

    /// Export the database to workers unless it is already listed.
    async fn register_worker_database(&self) -> Result<(), BenchError> {
        let select = format!("SELECT db FROM {WORKER_DBS_TABLE} WHERE db='{}';", self.database);
        let rows = self.socket.query(&select, false).await?;
        let count = rows.stdout_text().lines().filter(|l| !l.trim().is_empty()).count();
        match count {
            0 => {
                let insert = format!("INSERT INTO {WORKER_DBS_TABLE} VALUES('{}');", self.database);
                self.socket.query(&insert, false).await?;
                info!("registered {} in {}", self.database, WORKER_DBS_TABLE);
                Ok(())
            }
            1 => Ok(()),
            _ => Err(BenchError::Load {
                table: WORKER_DBS_TABLE.to_string(),
                message: format!("duplicated value '{}'", self.database),
            }),
        }
    }

    fn touch_empty_chunks_file(&self) {
        let path = self.empty_chunks_file();
        if let Err(e) = OpenOptions::new().create(true).append(true).open(&path) {
            warn!("cannot create empty chunks file {}: {}", path.display(), e);
        }
    }
}

impl<R: CommandRunner + Clone> Loader for QservLoader<'_, R> {
    fn database(&self) -> &str {
        &self.database
    }

    async fn prepare_database(&self) -> Result<(), BenchError> {
        info!("drop and create MySQL database for Qserv: {}", self.database);
        let sql = format!(
            "DROP DATABASE IF EXISTS {db}; CREATE DATABASE {db}; GRANT ALL ON {db}.* TO '{user}'@'localhost';",
            db = self.database,
            user = self.config.proxy.user
        );
        self.socket.query(&sql, false).await?;

        info!("drop CSS database for Qserv");
        self.drop_css_database().await
    }

    async fn create_load_table(&self, table: &TableDescriptor) -> Result<(), BenchError> {
        info!("partition data, create and load table {}", table.name);
        let spec = self.loader_command(table);
        run_tool(&self.runner, &spec, &table.name, self.config.show_secrets).await?;
        self.touch_empty_chunks_file();
        info!("partitioned data loaded for table {}", table.name);
        Ok(())
    }

    async fn finalize(&self) -> Result<(), BenchError> {
        self.register_worker_database().await?;
        let flush = format!("FLUSH QSERV_CHUNKS_CACHE FOR {}", self.database);
        self.proxy.query(&flush, false).await?;
        debug!("chunk cache reset for {}", self.database);
        Ok(())
    }
}
