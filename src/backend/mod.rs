pub mod detached;
pub mod mysql;
pub mod process;

use crate::config::AppConfig;
use crate::error::BenchError;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;

pub use detached::DetachedClient;
pub use mysql::MysqlClient;
pub use process::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};

/// A SQL-serving target under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendMode {
    /// Single-node MySQL reached through its local socket.
    Mysql,
    /// Qserv reached synchronously through the MySQL-protocol proxy.
    Qserv,
    /// Qserv through the proxy using SUBMIT and status polling.
    QservAsync,
}

/// How the SQL client reaches its server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    LocalSocket,
    Proxy,
}

impl BackendMode {
    pub const ALL: [BackendMode; 3] = [BackendMode::Mysql, BackendMode::Qserv, BackendMode::QservAsync];

    pub fn name(self) -> &'static str {
        match self {
            BackendMode::Mysql => "mysql",
            BackendMode::Qserv => "qserv",
            BackendMode::QservAsync => "qserv-async",
        }
    }

    /// Whether queries target the distributed engine (`-- withQserv` lines apply).
    pub fn is_distributed(self) -> bool {
        matches!(self, BackendMode::Qserv | BackendMode::QservAsync)
    }

    pub fn is_async(self) -> bool {
        self == BackendMode::QservAsync
    }

    pub fn connection(self) -> Connection {
        match self {
            BackendMode::Mysql => Connection::LocalSocket,
            BackendMode::Qserv | BackendMode::QservAsync => Connection::Proxy,
        }
    }

    /// Both Qserv modes query the same loaded database.
    pub fn database_suffix(self) -> &'static str {
        if self.is_distributed() { "qserv" } else { "mysql" }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendMode {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendMode::ALL
            .into_iter()
            .find(|mode| mode.name() == s)
            .ok_or_else(|| BenchError::Config {
                message: format!(
                    "unknown mode: '{}' (expected 'mysql', 'qserv', 'qserv-async' or 'all')",
                    s
                ),
            })
    }
}

/// Trait for query execution against one backend.
pub trait Backend {
    /// Run `query`, writing result rows to `output` and client errors to
    /// `error_output` when given. `async_timeout_secs > 0` engages the
    /// detached protocol on backends that support it.
    fn execute(
        &self,
        query: &str,
        output: &Path,
        column_names: bool,
        async_timeout_secs: u64,
        error_output: Option<&Path>,
    ) -> impl Future<Output = Result<(), BenchError>>;
}

/// Backend selected for one (mode, database) pair.
pub enum BackendAdapter<R> {
    Direct(MysqlClient<R>),
    Detached(DetachedClient<R>),
}

impl<R: CommandRunner> BackendAdapter<R> {
    pub fn for_mode(mode: BackendMode, config: &AppConfig, database: &str, runner: R) -> Self {
        let client = MysqlClient::new(mode.connection(), config, Some(database), runner);
        if mode.is_async() {
            BackendAdapter::Detached(DetachedClient::new(client, config.poll_interval))
        } else {
            BackendAdapter::Direct(client)
        }
    }
}

impl<R: CommandRunner> Backend for BackendAdapter<R> {
    async fn execute(
        &self,
        query: &str,
        output: &Path,
        column_names: bool,
        async_timeout_secs: u64,
        error_output: Option<&Path>,
    ) -> Result<(), BenchError> {
        match self {
            // The synchronous client has no detached protocol.
            BackendAdapter::Direct(client) => {
                client.execute(query, output, column_names, 0, error_output).await
            }
            BackendAdapter::Detached(client) => {
                client
                    .execute(query, output, column_names, async_timeout_secs, error_output)
                    .await
            }
        }
    }
}
