use crate::backend::BackendMode;
use crate::cli::CaseArgs;
use crate::error::BenchError;
use crate::masking;
use directories::ProjectDirs;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Highest query sequence id run when no stop point is configured.
pub const DEFAULT_STOP_AT_QUERY: u32 = 7999;
pub const DEFAULT_ASYNC_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub mysqld: MysqldConfig,
    pub proxy: ProxyConfig,
    pub qserv: QservConfig,
    pub tools: ToolPaths,
    pub out_dir: PathBuf,
    pub testdata_dir: Option<PathBuf>,
    pub stop_at_query: u32,
    pub async_timeout_secs: u64,
    pub poll_interval: Duration,
    pub verbose: bool,
    pub show_secrets: bool,
}

/// Connection parameters for the single-node MySQL server.
#[derive(Debug)]
pub struct MysqldConfig {
    pub socket: PathBuf,
    pub user: String,
    pub password: Option<SecretString>,
}

/// Connection parameters for the Qserv MySQL-protocol proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct QservConfig {
    pub run_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub css_port: u16,
    pub multi_node: bool,
}

/// External executables driven as subprocesses.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub client: String,
    pub loader: String,
    pub admin: String,
    pub duplicator: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mysqld: MysqldConfig {
                socket: PathBuf::from("/qserv/run/var/lib/mysql/mysql.sock"),
                user: "root".to_string(),
                password: None,
            },
            proxy: ProxyConfig {
                host: "127.0.0.1".to_string(),
                port: 4040,
                user: "qsmaster".to_string(),
            },
            qserv: QservConfig {
                run_dir: PathBuf::from("/qserv/run"),
                tmp_dir: std::env::temp_dir().join("qserv"),
                css_port: 12181,
                multi_node: false,
            },
            tools: ToolPaths {
                client: "mysql".to_string(),
                loader: "qserv-data-loader.py".to_string(),
                admin: "qserv-admin.py".to_string(),
                duplicator: "qserv-data-duplicator.py".to_string(),
            },
            out_dir: std::env::temp_dir().join("qserv"),
            testdata_dir: None,
            stop_at_query: DEFAULT_STOP_AT_QUERY,
            async_timeout_secs: DEFAULT_ASYNC_TIMEOUT_SECS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            verbose: false,
            show_secrets: false,
        }
    }
}

impl AppConfig {
    /// One-line description of the connection settings, password masked
    /// unless `show_secrets` is set.
    pub fn describe(&self) -> String {
        format!(
            "mysqld socket={} user={} password={} proxy={}:{} user={} css_port={} out_dir={}",
            self.mysqld.socket.display(),
            self.mysqld.user,
            masking::format_optional_secret(self.mysqld.password.as_ref(), self.show_secrets),
            self.proxy.host,
            self.proxy.port,
            self.proxy.user,
            self.qserv.css_port,
            self.out_dir.display()
        )
    }
}

// --- TOML config file structs ---

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    defaults: TomlDefaults,
    #[serde(default)]
    mysqld: TomlMysqld,
    #[serde(default)]
    proxy: TomlProxy,
    #[serde(default)]
    qserv: TomlQserv,
    #[serde(default)]
    tools: TomlTools,
}

#[derive(Debug, Deserialize, Default)]
struct TomlDefaults {
    out_dir: Option<PathBuf>,
    testdata_dir: Option<PathBuf>,
    stop_at_query: Option<u32>,
    async_timeout: Option<u64>,
    poll_interval_ms: Option<u64>,
    verbose: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlMysqld {
    socket: Option<PathBuf>,
    user: Option<String>,
    password: Option<String>,
    password_env: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlProxy {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlQserv {
    run_dir: Option<PathBuf>,
    tmp_dir: Option<PathBuf>,
    css_port: Option<u16>,
    multi_node: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlTools {
    client: Option<String>,
    loader: Option<String>,
    admin: Option<String>,
    duplicator: Option<String>,
}

/// Config path resolution result: explicit vs auto-resolved path.
struct ResolvedConfigPath {
    path: PathBuf,
    /// true if user explicitly specified via --config or QBENCH_CONFIG
    explicit: bool,
}

/// Resolve the config file path: --config flag > env var > platform default.
fn resolve_config_path(cli_config: Option<&PathBuf>) -> Option<ResolvedConfigPath> {
    if let Some(path) = cli_config {
        return Some(ResolvedConfigPath { path: path.clone(), explicit: true });
    }
    if let Ok(path) = std::env::var("QBENCH_CONFIG") {
        return Some(ResolvedConfigPath { path: PathBuf::from(path), explicit: true });
    }
    ProjectDirs::from("", "", "qbench").map(|dirs| ResolvedConfigPath {
        path: dirs.config_dir().join("config.toml"),
        explicit: false,
    })
}

/// Load and parse the TOML config file (if it exists).
fn load_toml_config(resolved: Option<&ResolvedConfigPath>) -> Result<TomlConfig, BenchError> {
    let resolved = match resolved {
        Some(r) => r,
        None => return Ok(TomlConfig::default()),
    };

    if !resolved.path.exists() {
        if resolved.explicit {
            return Err(BenchError::Config {
                message: format!("config file not found: {}", resolved.path.display()),
            });
        }
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&resolved.path).map_err(|e| BenchError::Config {
        message: format!("cannot read config file {}: {}", resolved.path.display(), e),
    })?;

    toml::from_str(&content).map_err(|e| BenchError::Config {
        message: format!("invalid config file {}: {}", resolved.path.display(), e),
    })
}

/// Resolve a password from direct value, env indirection, or env var.
fn resolve_secret(
    direct: Option<&str>,
    env_key: Option<&str>,
    fallback_env: &str,
) -> Option<SecretString> {
    if let Some(val) = direct
        && !val.is_empty()
    {
        return Some(SecretString::from(val.to_string()));
    }
    if let Some(key) = env_key
        && let Ok(val) = std::env::var(key)
        && !val.is_empty()
    {
        return Some(SecretString::from(val));
    }
    if let Ok(val) = std::env::var(fallback_env)
        && !val.is_empty()
    {
        return Some(SecretString::from(val));
    }
    None
}

/// Build AppConfig from run/compare CLI args.
pub fn load_from_case_args(
    args: &CaseArgs,
    verbose: bool,
    show_secrets: bool,
    config_path: Option<&PathBuf>,
) -> Result<AppConfig, BenchError> {
    let resolved_path = resolve_config_path(config_path);
    let toml_config = load_toml_config(resolved_path.as_ref())?;
    let base = AppConfig::default();

    let TomlConfig {
        defaults,
        mysqld,
        proxy,
        qserv,
        tools,
    } = toml_config;

    let password = resolve_secret(
        mysqld.password.as_deref(),
        mysqld.password_env.as_deref(),
        "QBENCH_MYSQLD_PASSWORD",
    );

    let poll_interval_ms = defaults.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
    if poll_interval_ms == 0 {
        return Err(BenchError::Config {
            message: "poll_interval_ms must be greater than zero".to_string(),
        });
    }

    // out_dir: CLI > TOML > temp dir
    let out_dir = args
        .out_dir
        .clone()
        .or(defaults.out_dir)
        .unwrap_or(base.out_dir);

    let testdata_dir = args.testdata_dir.clone().or(defaults.testdata_dir);

    let stop_at_query = args
        .stop_at_query
        .or(defaults.stop_at_query)
        .unwrap_or(DEFAULT_STOP_AT_QUERY);

    let verbose = verbose || defaults.verbose.unwrap_or(false);

    Ok(AppConfig {
        mysqld: MysqldConfig {
            socket: mysqld.socket.unwrap_or(base.mysqld.socket),
            user: mysqld.user.unwrap_or(base.mysqld.user),
            password,
        },
        proxy: ProxyConfig {
            host: proxy.host.unwrap_or(base.proxy.host),
            port: proxy.port.unwrap_or(base.proxy.port),
            user: proxy.user.unwrap_or(base.proxy.user),
        },
        qserv: QservConfig {
            run_dir: qserv.run_dir.unwrap_or(base.qserv.run_dir),
            tmp_dir: qserv.tmp_dir.unwrap_or(base.qserv.tmp_dir),
            css_port: qserv.css_port.unwrap_or(base.qserv.css_port),
            multi_node: qserv.multi_node.unwrap_or(base.qserv.multi_node),
        },
        tools: ToolPaths {
            client: tools.client.unwrap_or(base.tools.client),
            loader: tools.loader.unwrap_or(base.tools.loader),
            admin: tools.admin.unwrap_or(base.tools.admin),
            duplicator: tools.duplicator.unwrap_or(base.tools.duplicator),
        },
        out_dir,
        testdata_dir,
        stop_at_query,
        async_timeout_secs: defaults.async_timeout.unwrap_or(DEFAULT_ASYNC_TIMEOUT_SECS),
        poll_interval: Duration::from_millis(poll_interval_ms),
        verbose,
        show_secrets,
    })
}

/// Expand the `--mode` values into backend modes. `all` means mysql and qserv.
pub fn resolve_modes(values: &[String]) -> Result<Vec<BackendMode>, BenchError> {
    if values.is_empty() {
        return Ok(vec![BackendMode::Mysql, BackendMode::Qserv]);
    }
    let mut modes = Vec::new();
    for value in values {
        let expanded = if value == "all" {
            vec![BackendMode::Mysql, BackendMode::Qserv]
        } else {
            vec![value.parse::<BackendMode>()?]
        };
        for mode in expanded {
            if !modes.contains(&mode) {
                modes.push(mode);
            }
        }
    }
    Ok(modes)
}
