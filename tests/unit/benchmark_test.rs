use crate::support::{database_of, fail, ok, query_of, test_config, CaseFixture, ScriptedRunner};
use qbench::backend::mysql::SKIP_COLUMN_NAMES;
use qbench::backend::{BackendMode, CommandSpec};
use qbench::benchmark::BenchmarkCase;
use qbench::query_file::parse_query;
use qbench::runner::QueryRunner;
use std::fs;

const MODES: [BackendMode; 2] = [BackendMode::Mysql, BackendMode::Qserv];

fn three_query_case(root: &std::path::Path) {
    CaseFixture::new(root, "01", "tables:\n  load-order: [Object]\n")
        .table("Object")
        .query("0001_count.sql", "SELECT COUNT(*) FROM Object;")
        .query("0002_ids.sql", "-- pragma noheader sortresult\nSELECT id FROM Object;")
        .query("0003_all.sql", "SELECT * FROM Object;");
}

fn skips_header(spec: &CommandSpec) -> bool {
    spec.args.iter().any(|a| a == SKIP_COLUMN_NAMES)
}

/// Both backends answer every statement identically.
fn same_answers() -> ScriptedRunner {
    ScriptedRunner::new(|spec| match query_of(spec) {
        Some(q) if q.starts_with("SUBMIT ") => ok("7\n"),
        Some(q) if q.starts_with("SELECT STATE") => ok("COMPLETED\n"),
        Some(q) if q.starts_with("SELECT db") => ok(""),
        Some(q) if q.starts_with("SELECT id") && skips_header(spec) => ok("2\n1\n"),
        Some(q) if q.starts_with("SELECT id") => ok("id\n2\n1\n"),
        Some(_) => ok("n\n2\n"),
        None => ok(""),
    })
}

#[tokio::test]
async fn two_modes_stop_at_two_identical_outputs() {
    let root = tempfile::tempdir().unwrap();
    three_query_case(root.path());
    let mut config = test_config(root.path());
    config.stop_at_query = 2;

    let runner = same_answers();

    let bench = BenchmarkCase::new(&config, "01", MODES.to_vec(), runner.clone()).unwrap();
    let mut report = bench.new_report();
    bench.execute(false, &mut report).await.unwrap();
    bench.compare(&mut report).unwrap();

    let calls = runner.calls();
    let ids: Vec<_> = calls
        .iter()
        .filter(|c| query_of(c).is_some_and(|q| q.starts_with("SELECT id")))
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.iter().all(|c| skips_header(c)));
    assert!(
        calls
            .iter()
            .filter(|c| query_of(c).is_some_and(|q| q.contains("COUNT")))
            .all(|c| !skips_header(c))
    );
    assert!(!runner.queries().iter().any(|q| q.starts_with("SELECT *")));

    for mode in MODES {
        let dir = bench.case().outputs_dir().join(mode.name());
        let mut names: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["0001_count.txt", "0002_ids.txt"]);
        assert_eq!(fs::read_to_string(dir.join("0002_ids.txt")).unwrap(), "1\n2\n");
    }

    assert_eq!(report.runs.len(), 2);
    assert!(report.runs.iter().all(|r| r.attempted == 2 && r.corpus == 3));
    let comparison = report.comparison.as_ref().unwrap();
    assert!(comparison.discrepancies().is_empty());
    assert!(report.success());
}

#[tokio::test]
async fn differing_backend_is_reported() {
    let root = tempfile::tempdir().unwrap();
    three_query_case(root.path());
    let config = test_config(root.path());
    let runner = ScriptedRunner::new(|spec| match (database_of(spec), query_of(spec)) {
        (Some("qservTest_case01_qserv"), Some(q)) if q.contains("COUNT") => ok("n\n3\n"),
        _ => ok("n\n2\n"),
    });

    let bench = BenchmarkCase::new(&config, "01", MODES.to_vec(), runner).unwrap();
    let mut report = bench.new_report();
    bench.execute(false, &mut report).await.unwrap();
    bench.compare(&mut report).unwrap();

    assert_eq!(report.comparison.as_ref().unwrap().discrepancies(), ["0001_count.txt"]);
    assert!(!report.success());
}

#[tokio::test]
async fn failed_query_is_missing_from_outputs() {
    let root = tempfile::tempdir().unwrap();
    three_query_case(root.path());
    let config = test_config(root.path());
    let runner = ScriptedRunner::new(|spec| match (database_of(spec), query_of(spec)) {
        (Some("qservTest_case01_qserv"), Some(q)) if q.starts_with("SELECT *") => fail("ERROR 4110"),
        _ => ok("x\n"),
    });

    let bench = BenchmarkCase::new(&config, "01", MODES.to_vec(), runner).unwrap();
    let mut report = bench.new_report();
    bench.execute(false, &mut report).await.unwrap();
    bench.compare(&mut report).unwrap();

    let qserv = report.runs.iter().find(|r| r.mode == BackendMode::Qserv).unwrap();
    assert_eq!(qserv.failed, ["0003_all.sql"]);
    assert_eq!(qserv.attempted, 3);
    assert!(!bench.case().outputs_dir().join("qserv/0003_all.txt").exists());
    assert_eq!(report.comparison.as_ref().unwrap().discrepancies(), ["0003_all.txt"]);
}

#[tokio::test]
async fn loading_runs_once_per_database() {
    let root = tempfile::tempdir().unwrap();
    three_query_case(root.path());
    let config = test_config(root.path());
    let runner = same_answers();
    let modes = vec![BackendMode::Mysql, BackendMode::Qserv, BackendMode::QservAsync];

    let bench = BenchmarkCase::new(&config, "01", modes, runner.clone()).unwrap();
    let mut report = bench.new_report();
    bench.execute(true, &mut report).await.unwrap();

    let databases: Vec<_> = report.loads.iter().map(|l| l.database.as_str()).collect();
    assert_eq!(databases, ["qservTest_case01_mysql", "qservTest_case01_qserv"]);
    assert!(report.loads.iter().all(|l| l.loaded == ["Object"] && l.is_complete()));
    assert!(report.runs.iter().all(|r| r.failed.is_empty()));
    let loader_calls = runner
        .calls()
        .iter()
        .filter(|c| c.program == config.tools.loader)
        .count();
    assert_eq!(loader_calls, 2);
}

#[tokio::test]
async fn cleanup_removes_previous_outputs() {
    let root = tempfile::tempdir().unwrap();
    three_query_case(root.path());
    let mut config = test_config(root.path());
    config.stop_at_query = 1;

    let bench = BenchmarkCase::new(&config, "01", vec![BackendMode::Mysql], same_answers()).unwrap();
    let stale = bench.case().outputs_dir().join("mysql").join("0099_old.txt");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "old").unwrap();

    let mut report = bench.new_report();
    bench.execute(false, &mut report).await.unwrap();
    bench.compare(&mut report).unwrap();

    assert!(!stale.exists());
    assert!(report.comparison.is_none());
    assert!(report.success());
}

#[tokio::test]
async fn dbname_placeholder_and_empty_queries() {
    let root = tempfile::tempdir().unwrap();
    CaseFixture::new(root.path(), "01", "{}\n")
        .table("Object")
        .query("0001_meta.sql", "SELECT COUNT(*) FROM {DBNAME}.Object;")
        .query("0002_qserv_only.sql", "-- withQserv SELECT * FROM Object_1234;");
    let config = test_config(root.path());
    let runner = ScriptedRunner::new(|_| ok("1\n"));

    let bench = BenchmarkCase::new(&config, "01", vec![BackendMode::Mysql], runner.clone()).unwrap();
    let mut report = bench.new_report();
    bench.execute(false, &mut report).await.unwrap();

    assert_eq!(runner.queries(), ["SELECT COUNT(*) FROM qservTest_case01_mysql.Object;"]);
    let stats = &report.runs[0];
    assert_eq!(stats.attempted, 1);
    assert_eq!(stats.skipped_empty, ["0002_qserv_only.sql"]);
}

#[tokio::test(start_paused = true)]
async fn async_mode_honours_query_pragmas() {
    let root = tempfile::tempdir().unwrap();
    CaseFixture::new(root.path(), "01", "{}\n")
        .table("Object")
        .query("0001_sync.sql", "-- pragma no_async\nSELECT COUNT(*) FROM Object;")
        .query("0002_detached.sql", "SELECT id FROM Object;")
        .query("0003_unbounded.sql", "-- pragma async_timeout=18446744073709551615\nSELECT 1;");
    let config = test_config(root.path());
    let runner = same_answers();

    let bench = BenchmarkCase::new(&config, "01", vec![BackendMode::QservAsync], runner.clone()).unwrap();
    let mut report = bench.new_report();
    bench.execute(false, &mut report).await.unwrap();

    let queries = runner.queries();
    assert!(queries.contains(&"SELECT COUNT(*) FROM Object;".to_string()));
    let submitted: Vec<_> = queries.iter().filter(|q| q.starts_with("SUBMIT ")).collect();
    assert_eq!(submitted, ["SUBMIT SELECT id FROM Object;", "SUBMIT SELECT 1;"]);
    let stats = &report.runs[0];
    assert_eq!(stats.attempted, 3);
    assert!(stats.failed.is_empty(), "{:?}", stats.failed);
}

#[test]
fn async_timeout_selection() {
    let root = tempfile::tempdir().unwrap();
    three_query_case(root.path());
    let mut config = test_config(root.path());
    config.async_timeout_secs = 600;
    let bench = BenchmarkCase::new(&config, "01", MODES.to_vec(), same_answers()).unwrap();
    let runner = QueryRunner::new(&config, bench.case(), same_answers());

    let plain = parse_query("SELECT 1;", true).pragmas;
    let custom = parse_query("-- pragma async_timeout=30\nSELECT 1;", true).pragmas;
    let sync = parse_query("-- pragma no_async async_timeout=30\nSELECT 1;", true).pragmas;

    assert_eq!(runner.async_timeout(BackendMode::QservAsync, &plain), 600);
    assert_eq!(runner.async_timeout(BackendMode::QservAsync, &custom), 30);
    assert_eq!(runner.async_timeout(BackendMode::QservAsync, &sync), 0);
    assert_eq!(runner.async_timeout(BackendMode::Qserv, &custom), 0);
}

#[test]
fn missing_testdata_dir_is_config_error() {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    config.testdata_dir = None;
    let err = BenchmarkCase::new(&config, "01", MODES.to_vec(), same_answers()).err().unwrap();
    assert!(err.is_fatal());
}
