use crate::backend::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::backend::{Backend, Connection};
use crate::config::AppConfig;
use crate::error::BenchError;
use crate::masking;
use crate::output;
use secrecy::ExposeSecret;
use std::path::Path;
use tracing::debug;

/// Flag asking the client to omit the column-name header line.
pub const SKIP_COLUMN_NAMES: &str = "--skip-column-names";

/// The `mysql` command-line client bound to one server and database.
pub struct MysqlClient<R> {
    program: String,
    base_args: Vec<String>,
    runner: R,
    show_secrets: bool,
}

impl<R: CommandRunner> MysqlClient<R> {
    pub fn new(
        connection: Connection,
        config: &AppConfig,
        database: Option<&str>,
        runner: R,
    ) -> Self {
        let mut base_args = Vec::new();
        match connection {
            Connection::LocalSocket => {
                base_args.push(format!("--socket={}", config.mysqld.socket.display()));
                base_args.push(format!("--user={}", config.mysqld.user));
                if let Some(password) = &config.mysqld.password {
                    base_args.push(format!("--password={}", password.expose_secret()));
                }
            }
            Connection::Proxy => {
                base_args.push(format!("--host={}", config.proxy.host));
                base_args.push(format!("--port={}", config.proxy.port));
                base_args.push(format!("--user={}", config.proxy.user));
            }
        }
        base_args.push("--batch".to_string());
        if let Some(db) = database {
            base_args.push(db.to_string());
        }

        Self {
            program: config.tools.client.clone(),
            base_args,
            runner,
            show_secrets: config.show_secrets,
        }
    }

    /// Build the client command line for one statement.
    pub fn command(&self, query: &str, column_names: bool) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.program).args(self.base_args.iter().cloned());
        if !column_names {
            spec = spec.arg(SKIP_COLUMN_NAMES);
        }
        spec.arg("-e").arg(query)
    }

    /// Run one statement and return its captured output, failing on non-zero exit.
    pub async fn query(&self, query: &str, column_names: bool) -> Result<CommandOutput, BenchError> {
        let spec = self.command(query, column_names);
        debug!(
            "running {}",
            masking::redact_command_line(&spec.program, &spec.args, self.show_secrets)
        );
        self.runner.run(&spec).await?.check(&self.program)
    }
}

impl<R: CommandRunner> Backend for MysqlClient<R> {
    async fn execute(
        &self,
        query: &str,
        output: &Path,
        column_names: bool,
        _async_timeout_secs: u64,
        error_output: Option<&Path>,
    ) -> Result<(), BenchError> {
        let spec = self.command(query, column_names);
        debug!(
            "running {}",
            masking::redact_command_line(&spec.program, &spec.args, self.show_secrets)
        );
        let captured = self.runner.run(&spec).await?;

        if let Some(err_path) = error_output {
            output::write_output(err_path, &captured.stderr)?;
        } else if captured.success() && !captured.stderr.is_empty() {
            debug!("{} stderr: {}", self.program, captured.stderr_text());
        }

        let captured = captured.check(&self.program)?;
        output::write_output(output, &captured.stdout)?;
        Ok(())
    }
}
