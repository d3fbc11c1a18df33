//! Detached (asynchronous) query protocol of the Qserv proxy.
//!
//! A query is submitted with `SUBMIT <query>`, which returns a query id
//! immediately. The id is then polled in the process list until its state
//! reads `COMPLETED`, and the materialized result is fetched through the
//! `qserv_result()` table function.

use crate::backend::mysql::MysqlClient;
use crate::backend::process::CommandRunner;
use crate::backend::Backend;
use crate::error::BenchError;
use crate::verbose::Timer;
use std::path::Path;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Terminal state reported by the process list for a finished query.
pub const COMPLETED_STATE: &str = "COMPLETED";

pub struct DetachedClient<R> {
    client: MysqlClient<R>,
    poll_interval: Duration,
}

/// Parse the query id from a `SUBMIT` response: the first whitespace-delimited token.
pub fn parse_query_id(stdout: &str) -> Result<u64, BenchError> {
    let token = stdout.split_whitespace().next().ok_or_else(|| BenchError::Submission {
        message: "empty response to SUBMIT".to_string(),
    })?;
    token.parse::<u64>().map_err(|e| BenchError::Submission {
        message: format!("cannot read query id from SUBMIT response '{}': {}", stdout.trim(), e),
    })
}

pub fn status_query(query_id: u64) -> String {
    format!("SELECT STATE FROM INFORMATION_SCHEMA.PROCESSLIST WHERE ID = {query_id}")
}

pub fn result_query(query_id: u64) -> String {
    format!("SELECT * FROM qserv_result({query_id})")
}

impl<R: CommandRunner> DetachedClient<R> {
    pub fn new(client: MysqlClient<R>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Submit `query` for detached execution and return its id.
    pub async fn submit(&self, query: &str) -> Result<u64, BenchError> {
        let submitted = self.client.query(&format!("SUBMIT {query}"), false).await?;
        let query_id = parse_query_id(&submitted.stdout_text())?;
        debug!("submitted query id = {}", query_id);
        Ok(query_id)
    }

    /// Poll the state of `query_id` until it completes or `timeout_secs` elapse.
    ///
    /// The status is always checked at least once, and a check made exactly
    /// at the deadline still counts. A budget past the clock's range never
    /// expires. Returns the number of status checks.
    pub async fn wait_for_completion(&self, query_id: u64, timeout_secs: u64) -> Result<u32, BenchError> {
        let deadline = Instant::now().checked_add(Duration::from_secs(timeout_secs));
        let status = status_query(query_id);
        let mut polls = 0u32;

        loop {
            polls += 1;
            let out = self.client.query(&status, false).await?;
            let state = out.stdout_text();
            let state = state.trim();
            debug!("query {} state = {:?} (poll {})", query_id, state, polls);
            if state == COMPLETED_STATE {
                return Ok(polls);
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(BenchError::AsyncTimeout {
                    query_id,
                    seconds: timeout_secs,
                });
            }
            sleep(self.poll_interval).await;
        }
    }
}

impl<R: CommandRunner> Backend for DetachedClient<R> {
    async fn execute(
        &self,
        query: &str,
        output: &Path,
        column_names: bool,
        async_timeout_secs: u64,
        error_output: Option<&Path>,
    ) -> Result<(), BenchError> {
        if async_timeout_secs == 0 {
            return self.client.execute(query, output, column_names, 0, error_output).await;
        }

        let timer = Timer::start();
        let query_id = self.submit(query).await?;
        let polls = self.wait_for_completion(query_id, async_timeout_secs).await?;
        info!(
            "detached query {} completed ({}ms, {} polls)",
            query_id,
            timer.elapsed_ms(),
            polls
        );

        self.client
            .execute(&result_query(query_id), output, column_names, 0, error_output)
            .await
    }
}
