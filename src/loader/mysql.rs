use crate::backend::mysql::MysqlClient;
use crate::backend::process::{CommandRunner, CommandSpec};
use crate::backend::Connection;
use crate::config::AppConfig;
use crate::dataset::{TableDescriptor, TestCase};
use crate::error::BenchError;
use crate::loader::{common_args, common_options, run_tool, Loader};
use tracing::info;

/// Loads tables into the plain MySQL server, without partitioning.
pub struct MysqlLoader<'a, R> {
    config: &'a AppConfig,
    case: &'a TestCase,
    database: String,
    socket: MysqlClient<R>,
    runner: R,
}

impl<'a, R: CommandRunner + Clone> MysqlLoader<'a, R> {
    pub fn new(config: &'a AppConfig, case: &'a TestCase, database: String, runner: R) -> Self {
        let socket = MysqlClient::new(Connection::LocalSocket, config, None, runner.clone());
        Self {
            config,
            case,
            database,
            socket,
            runner,
        }
    }

    pub fn loader_command(&self, table: &TableDescriptor) -> CommandSpec {
        CommandSpec::new(&self.config.tools.loader)
            .args(common_options(self.config, self.case, table))
            .args(["--no-css", "--skip-partition", "--one-table"])
            .args(common_args(self.case, &self.database, table))
    }
}

impl<R: CommandRunner + Clone> Loader for MysqlLoader<'_, R> {
    fn database(&self) -> &str {
        &self.database
    }

    async fn prepare_database(&self) -> Result<(), BenchError> {
        info!("drop and create MySQL database: {}", self.database);
        let sql = format!(
            "DROP DATABASE IF EXISTS {db}; CREATE DATABASE {db};",
            db = self.database
        );
        self.socket.query(&sql, false).await?;
        Ok(())
    }

    async fn create_load_table(&self, table: &TableDescriptor) -> Result<(), BenchError> {
        info!("create, load table {}", table.name);
        let spec = self.loader_command(table);
        run_tool(&self.runner, &spec, &table.name, self.config.show_secrets).await?;
        info!("data loaded for table {}", table.name);
        Ok(())
    }

    async fn finalize(&self) -> Result<(), BenchError> {
        Ok(())
    }
}
