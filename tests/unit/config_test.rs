use qbench::backend::BackendMode;
use qbench::cli::CaseArgs;
use qbench::config::{load_from_case_args, resolve_modes, DEFAULT_STOP_AT_QUERY};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

// --- Env var test infrastructure ---

/// Static mutex to serialize tests that touch process env vars.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// RAII guard that sets env vars on creation and removes them on Drop.
/// Holds the ENV_MUTEX lock for its lifetime.
struct EnvGuard {
    keys: Vec<String>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl EnvGuard {
    fn new(vars: &[(&str, &str)]) -> Self {
        let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        for (key, val) in vars {
            // SAFETY: env var access is serialized by ENV_MUTEX
            unsafe { std::env::set_var(key, val); }
        }
        EnvGuard {
            keys: vars.iter().map(|(k, _)| k.to_string()).collect(),
            _lock: lock,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in &self.keys {
            // SAFETY: env var access is serialized by ENV_MUTEX
            unsafe { std::env::remove_var(key); }
        }
    }
}

fn make_case_args(overrides: impl FnOnce(&mut CaseArgs)) -> CaseArgs {
    let mut args = CaseArgs {
        case_no: "01".to_string(),
        mode: Vec::new(),
        stop_at_query: None,
        load: false,
        out_dir: None,
        testdata_dir: None,
    };
    overrides(&mut args);
    args
}

fn write_temp_toml(content: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    (dir, path)
}

#[test]
fn test_defaults_from_empty_config() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = write_temp_toml("");
    let config = load_from_case_args(&make_case_args(|_| {}), false, false, Some(&path)).unwrap();

    assert_eq!(config.stop_at_query, DEFAULT_STOP_AT_QUERY);
    assert_eq!(config.async_timeout_secs, 600);
    assert_eq!(config.poll_interval, Duration::from_secs(1));
    assert_eq!(config.proxy.port, 4040);
    assert_eq!(config.proxy.user, "qsmaster");
    assert_eq!(config.qserv.css_port, 12181);
    assert_eq!(config.tools.client, "mysql");
    assert!(config.testdata_dir.is_none());
    assert!(config.mysqld.password.is_none());
    assert!(!config.verbose);
}

#[test]
fn test_toml_sections_are_applied() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = write_temp_toml(
        r#"
[defaults]
out_dir = "/data/out"
testdata_dir = "/data/testdata"
stop_at_query = 1200
async_timeout = 30
poll_interval_ms = 250
verbose = true

[mysqld]
socket = "/run/mysql.sock"
user = "qsmaster"
password = "toml-pass"

[proxy]
host = "proxy.example"
port = 14040

[qserv]
run_dir = "/qserv/run2"
css_port = 2181
multi_node = true

[tools]
client = "/usr/bin/mysql"
loader = "/opt/qserv/bin/qserv-data-loader.py"
"#,
    );
    let config = load_from_case_args(&make_case_args(|_| {}), false, false, Some(&path)).unwrap();

    assert_eq!(config.out_dir, PathBuf::from("/data/out"));
    assert_eq!(config.testdata_dir, Some(PathBuf::from("/data/testdata")));
    assert_eq!(config.stop_at_query, 1200);
    assert_eq!(config.async_timeout_secs, 30);
    assert_eq!(config.poll_interval, Duration::from_millis(250));
    assert!(config.verbose);
    assert_eq!(config.mysqld.socket, PathBuf::from("/run/mysql.sock"));
    assert_eq!(config.mysqld.user, "qsmaster");
    assert_eq!(config.mysqld.password.as_ref().unwrap().expose_secret(), "toml-pass");
    assert_eq!(config.proxy.host, "proxy.example");
    assert_eq!(config.proxy.port, 14040);
    assert_eq!(config.proxy.user, "qsmaster");
    assert_eq!(config.qserv.css_port, 2181);
    assert!(config.qserv.multi_node);
    assert_eq!(config.tools.client, "/usr/bin/mysql");
    assert_eq!(config.tools.admin, "qserv-admin.py");
}

#[test]
fn test_cli_overrides_toml() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = write_temp_toml("[defaults]\nout_dir = \"/data/out\"\nstop_at_query = 1200\n");
    let args = make_case_args(|a| {
        a.out_dir = Some(PathBuf::from("/tmp/elsewhere"));
        a.stop_at_query = Some(5);
        a.testdata_dir = Some(PathBuf::from("/tmp/testdata"));
    });
    let config = load_from_case_args(&args, true, true, Some(&path)).unwrap();

    assert_eq!(config.out_dir, PathBuf::from("/tmp/elsewhere"));
    assert_eq!(config.stop_at_query, 5);
    assert_eq!(config.testdata_dir, Some(PathBuf::from("/tmp/testdata")));
    assert!(config.verbose);
    assert!(config.show_secrets);
}

#[test]
fn test_config_file_not_found_errors() {
    let _guard = EnvGuard::new(&[]);
    let bad_path = PathBuf::from("/nonexistent/qbench.toml");
    let err = load_from_case_args(&make_case_args(|_| {}), false, false, Some(&bad_path)).unwrap_err();
    assert!(err.to_string().contains("config file not found"));
    assert!(err.is_fatal());
}

#[test]
fn test_invalid_toml_errors() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = write_temp_toml("[defaults\nstop_at_query = ");
    let err = load_from_case_args(&make_case_args(|_| {}), false, false, Some(&path)).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));
}

#[test]
fn test_zero_poll_interval_rejected() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = write_temp_toml("[defaults]\npoll_interval_ms = 0\n");
    let err = load_from_case_args(&make_case_args(|_| {}), false, false, Some(&path)).unwrap_err();
    assert!(err.to_string().contains("poll_interval_ms"));
}

#[test]
fn test_password_env_indirection() {
    let _guard = EnvGuard::new(&[("QBENCH_TEST_MYSQL_PW", "from-indirect")]);
    let (_dir, path) = write_temp_toml("[mysqld]\npassword_env = \"QBENCH_TEST_MYSQL_PW\"\n");
    let config = load_from_case_args(&make_case_args(|_| {}), false, false, Some(&path)).unwrap();
    assert_eq!(config.mysqld.password.unwrap().expose_secret(), "from-indirect");
}

#[test]
fn test_password_fallback_env() {
    let _guard = EnvGuard::new(&[("QBENCH_MYSQLD_PASSWORD", "from-env")]);
    let (_dir, path) = write_temp_toml("");
    let config = load_from_case_args(&make_case_args(|_| {}), false, false, Some(&path)).unwrap();
    assert_eq!(config.mysqld.password.unwrap().expose_secret(), "from-env");
}

#[test]
fn test_direct_password_beats_env() {
    let _guard = EnvGuard::new(&[("QBENCH_MYSQLD_PASSWORD", "from-env")]);
    let (_dir, path) = write_temp_toml("[mysqld]\npassword = \"direct\"\n");
    let config = load_from_case_args(&make_case_args(|_| {}), false, false, Some(&path)).unwrap();
    assert_eq!(config.mysqld.password.unwrap().expose_secret(), "direct");
}

#[test]
fn test_describe_masks_password() {
    let _guard = EnvGuard::new(&[]);
    let (_dir, path) = write_temp_toml("[mysqld]\npassword = \"hunter2\"\n");
    let config = load_from_case_args(&make_case_args(|_| {}), false, false, Some(&path)).unwrap();
    let described = config.describe();
    assert!(described.contains("password=[REDACTED]"));
    assert!(!described.contains("hunter2"));

    let shown = load_from_case_args(&make_case_args(|_| {}), false, true, Some(&path)).unwrap();
    assert!(shown.describe().contains("password=hunter2"));
}

#[test]
fn test_modes_default_to_mysql_and_qserv() {
    assert_eq!(resolve_modes(&[]).unwrap(), [BackendMode::Mysql, BackendMode::Qserv]);
    assert_eq!(
        resolve_modes(&["all".to_string()]).unwrap(),
        [BackendMode::Mysql, BackendMode::Qserv]
    );
}

#[test]
fn test_modes_keep_order_and_drop_duplicates() {
    let values = ["qserv-async", "mysql", "qserv-async", "all"].map(String::from);
    assert_eq!(
        resolve_modes(&values).unwrap(),
        [BackendMode::QservAsync, BackendMode::Mysql, BackendMode::Qserv]
    );
}

#[test]
fn test_unknown_mode_errors() {
    let err = resolve_modes(&["oracle".to_string()]).unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("unknown mode"));
}
