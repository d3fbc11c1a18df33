use crate::support::{ok, query_of, ScriptedRunner, Sequence};
use qbench::backend::detached::{parse_query_id, result_query, status_query};
use qbench::backend::{Backend, Connection, DetachedClient, MysqlClient};
use qbench::config::AppConfig;
use qbench::error::BenchError;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

fn detached_client(runner: ScriptedRunner, poll_interval: Duration) -> DetachedClient<ScriptedRunner> {
    let config = AppConfig::default();
    let client = MysqlClient::new(Connection::Proxy, &config, Some("qservTest_case01_qserv"), runner);
    DetachedClient::new(client, poll_interval)
}

/// Proxy answering SUBMIT with id 42, the given status sequence, and a two-row result.
fn proxy(statuses: &[&str]) -> ScriptedRunner {
    let statuses = Arc::new(Sequence::new(statuses));
    ScriptedRunner::new(move |spec| match query_of(spec) {
        Some(q) if q.starts_with("SUBMIT ") => ok("42\tsubmitted\n"),
        Some(q) if q == status_query(42) => ok(&format!("{}\n", statuses.next())),
        Some(q) if q == result_query(42) => ok("id\n1\n2\n"),
        _ => ok(""),
    })
}

#[test]
fn query_id_is_first_token() {
    assert_eq!(parse_query_id("42 submitted").unwrap(), 42);
    assert_eq!(parse_query_id("  7\n").unwrap(), 7);
}

#[test]
fn query_id_parse_failures_are_submission_errors() {
    assert!(matches!(parse_query_id(""), Err(BenchError::Submission { .. })));
    assert!(matches!(parse_query_id("ERROR 1064"), Err(BenchError::Submission { .. })));
}

#[tokio::test(start_paused = true)]
async fn completes_on_third_poll_with_one_fetch() {
    let runner = proxy(&["RUNNING", "RUNNING", "COMPLETED"]);
    let client = detached_client(runner.clone(), Duration::from_secs(1));
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("0001.txt");

    client.execute("SELECT id FROM Object", &output, true, 600, None).await.unwrap();

    let queries = runner.queries();
    assert_eq!(queries[0], "SUBMIT SELECT id FROM Object");
    assert_eq!(queries.iter().filter(|q| **q == status_query(42)).count(), 3);
    assert_eq!(queries.iter().filter(|q| **q == result_query(42)).count(), 1);
    assert_eq!(queries.last().unwrap(), &result_query(42));
    assert_eq!(fs::read_to_string(&output).unwrap(), "id\n1\n2\n");
}

#[tokio::test(start_paused = true)]
async fn wait_reports_poll_count() {
    let client = detached_client(proxy(&["EXECUTING", "COMPLETED"]), Duration::from_secs(1));
    let id = client.submit("SELECT 1").await.unwrap();
    assert_eq!(id, 42);
    assert_eq!(client.wait_for_completion(id, 10).await.unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn never_completing_query_times_out() {
    let runner = proxy(&["RUNNING"]);
    let client = detached_client(runner.clone(), Duration::from_secs(1));
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("0001.txt");

    let err = client.execute("SELECT 1", &output, true, 2, None).await.unwrap_err();

    match err {
        BenchError::AsyncTimeout { query_id, seconds } => {
            assert_eq!(query_id, 42);
            assert_eq!(seconds, 2);
        }
        other => panic!("expected AsyncTimeout, got {other}"),
    }
    let polls = runner.queries().iter().filter(|q| **q == status_query(42)).count();
    assert!((2..=3).contains(&polls), "polls = {polls}");
    assert!(!runner.queries().contains(&result_query(42)));
    assert!(!output.exists());
}

#[tokio::test(start_paused = true)]
async fn timeout_beyond_clock_range_waits_for_completion() {
    let client = detached_client(proxy(&["RUNNING", "RUNNING", "COMPLETED"]), Duration::from_secs(1));
    let id = client.submit("SELECT 1").await.unwrap();
    assert_eq!(client.wait_for_completion(id, u64::MAX).await.unwrap(), 3);
}

#[tokio::test]
async fn zero_timeout_runs_synchronously() {
    let runner = ScriptedRunner::new(|_| ok("1\n"));
    let client = detached_client(runner.clone(), Duration::from_secs(1));
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("0001.txt");

    client.execute("SELECT 1", &output, true, 0, None).await.unwrap();

    assert_eq!(runner.queries(), ["SELECT 1"]);
    assert_eq!(fs::read_to_string(&output).unwrap(), "1\n");
}

#[tokio::test]
async fn unreadable_submit_response_fails_without_polling() {
    let runner = ScriptedRunner::new(|_| ok("not-a-number\n"));
    let client = detached_client(runner.clone(), Duration::from_secs(1));
    let dir = tempfile::tempdir().unwrap();

    let err = client
        .execute("SELECT 1", &dir.path().join("0001.txt"), true, 60, None)
        .await
        .unwrap_err();

    assert!(matches!(err, BenchError::Submission { .. }));
    assert_eq!(runner.calls().len(), 1);
}
