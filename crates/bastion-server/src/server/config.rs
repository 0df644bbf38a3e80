use bastion_id::{Snowflake, SnowflakeId};
use bastion_store::{DatabaseConfig, Driver};
use clap::{Arg, CommandFactory, FromArgMatches, Parser};
use core::time::Duration;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::server::error::{Error, Result};

/// Runtime configuration for the `bastion-server` binary.
///
/// Every value can be passed as a flag or through the environment variable
/// named next to it. [`EnvConfigProvider`] also reads those variables from
/// `.env` and `.env.<RUN_MODE>`.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "bastion-server",
    version,
    about = "Serves one HTTP or gRPC application with audit-aware persistence"
)]
pub struct CliArgs {
    /// Name of the active profile; selects `.env.<RUN_MODE>`.
    #[arg(long, env = "RUN_MODE", default_value_t = String::from("dev"))]
    pub run_mode: String,

    /// Node partition embedded in every generated ID. Must be unique per
    /// running instance.
    #[arg(long, env = "NODE_ID", default_value_t = 0)]
    pub node_id: u64,

    #[arg(long, env = "DB_DRIVER", default_value_t = String::from("sqlite"))]
    pub db_driver: String,

    #[arg(long, env = "DB_HOST", default_value_t = String::from("localhost"))]
    pub db_host: String,

    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    pub db_port: u16,

    #[arg(long, env = "DB_USER", default_value_t = String::new())]
    pub db_user: String,

    #[arg(long, env = "DB_PASSWORD", default_value_t = String::new(), hide_env_values = true)]
    pub db_password: String,

    /// Database name, or the file path / `:memory:` for SQLite.
    #[arg(long, env = "DB_NAME", default_value_t = String::from(":memory:"))]
    pub db_name: String,

    /// Driver options, e.g. `sslmode=disable`.
    #[arg(long, env = "DB_OPTIONS", default_value_t = String::new())]
    pub db_options: String,

    #[arg(long, env = "DB_TABLE_PREFIX", default_value_t = String::new())]
    pub db_table_prefix: String,

    #[arg(long, env = "DB_MAX_IDLE_CONNS", default_value_t = 1)]
    pub db_max_idle_conns: u32,

    #[arg(long, env = "DB_MAX_OPEN_CONNS", default_value_t = 10)]
    pub db_max_open_conns: u32,

    /// Log every statement.
    #[arg(long, env = "DB_DEBUG", default_value_t = false)]
    pub db_debug: bool,

    /// `HTTP` or `GRPC`.
    #[arg(long, env = "WEBAPP_TYPE", default_value_t = String::from("HTTP"))]
    pub webapp_type: String,

    /// Address advertised to service discovery.
    #[arg(long, env = "WEBAPP_ADDRESS", default_value_t = String::from("127.0.0.1"))]
    pub webapp_address: String,

    /// Interface the listener binds to.
    #[arg(long, env = "WEBAPP_LISTEN_HOST", default_value_t = String::from("0.0.0.0"))]
    pub webapp_listen_host: String,

    #[arg(long, env = "WEBAPP_PORT", default_value_t = 8080)]
    pub webapp_port: u16,

    /// Seconds allowed to read a whole request; `0` disables the limit.
    #[arg(long, env = "WEBAPP_READ_TIMEOUT_SECS", default_value_t = 0)]
    pub webapp_read_timeout_secs: u64,

    #[arg(long, env = "WEBAPP_READ_HEADER_TIMEOUT_SECS", default_value_t = 10)]
    pub webapp_read_header_timeout_secs: u64,

    /// Seconds allowed to produce a response; `0` disables the limit.
    #[arg(long, env = "WEBAPP_WRITE_TIMEOUT_SECS", default_value_t = 0)]
    pub webapp_write_timeout_secs: u64,

    /// Keep-alive idle seconds; `0` disables keep-alive.
    #[arg(long, env = "WEBAPP_IDLE_TIMEOUT_SECS", default_value_t = 60)]
    pub webapp_idle_timeout_secs: u64,

    #[arg(long, env = "WEBAPP_MAX_HEADER_BYTES", default_value_t = 1 << 20)]
    pub webapp_max_header_bytes: usize,

    #[arg(long, env = "WEBAPP_MAX_BODY_BYTES", default_value_t = 2 << 20)]
    pub webapp_max_body_bytes: usize,

    /// Prefix under which application routes are mounted.
    #[arg(long, env = "WEBAPP_BASE_PATH", default_value_t = String::from("/"))]
    pub webapp_base_path: String,

    #[arg(long, env = "TLS_ENABLED", default_value_t = false)]
    pub tls_enabled: bool,

    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<PathBuf>,

    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<PathBuf>,

    /// CA bundle used to verify client certificates.
    #[arg(long, env = "TLS_CA_PATH")]
    pub tls_ca_path: Option<PathBuf>,

    /// `consul` or `eureka`.
    #[arg(long, env = "DISCOVERY_BACKEND", default_value_t = String::from("consul"))]
    pub discovery_backend: String,

    #[arg(long, env = "DISCOVERY_ADDRESS", default_value_t = String::from("127.0.0.1"))]
    pub discovery_address: String,

    #[arg(long, env = "DISCOVERY_PORT", default_value_t = 8500)]
    pub discovery_port: u16,

    #[arg(long, env = "DISCOVERY_AUTO_REGISTER", default_value_t = false)]
    pub discovery_auto_register: bool,

    #[arg(long, env = "PROJECT_NAME", default_value_t = String::from("bastion"))]
    pub project_name: String,

    #[arg(long, env = "PROJECT_VERSION", default_value_t = String::from(env!("CARGO_PKG_VERSION")))]
    pub project_version: String,

    /// Comma separated tags advertised with the instance.
    #[arg(long, env = "PROJECT_TAGS", value_delimiter = ',')]
    pub project_tags: Vec<String>,

    #[arg(long, env = "DEREGISTER_AFTER_CRITICAL_SECS", default_value_t = 60)]
    pub deregister_after_critical_secs: u64,

    #[arg(long, env = "HEALTH_CHECK_INTERVAL_SECS", default_value_t = 10)]
    pub health_check_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebAppConfig {
    /// Raw protocol tag, resolved when the server is built.
    pub protocol: String,
    pub address: String,
    pub listen_host: String,
    pub port: u16,
    pub read_timeout: Duration,
    pub read_header_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
    pub base_path: String,
}

impl WebAppConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ca_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Raw backend tag, resolved when the registrar is built.
    pub backend: String,
    pub address: String,
    pub port: u16,
    pub auto_register: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub name: String,
    pub version: String,
    pub tags: Vec<String>,
    pub deregister_after_critical: Duration,
    pub health_check_interval: Duration,
}

/// Immutable configuration snapshot. Replaced wholesale on reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub run_mode: String,
    pub node_id: u64,
    pub database: DatabaseConfig,
    pub webapp: WebAppConfig,
    pub tls: TlsConfig,
    pub discovery: DiscoveryConfig,
    pub project: ProjectConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            run_mode: String::from("dev"),
            node_id: 0,
            database: DatabaseConfig::default(),
            webapp: WebAppConfig {
                protocol: String::from("HTTP"),
                address: String::from("127.0.0.1"),
                listen_host: String::from("0.0.0.0"),
                port: 8080,
                read_timeout: Duration::ZERO,
                read_header_timeout: Duration::from_secs(10),
                write_timeout: Duration::ZERO,
                idle_timeout: Duration::from_secs(60),
                max_header_bytes: 1 << 20,
                max_body_bytes: 2 << 20,
                base_path: String::from("/"),
            },
            tls: TlsConfig::default(),
            discovery: DiscoveryConfig {
                backend: String::from("consul"),
                address: String::from("127.0.0.1"),
                port: 8500,
                auto_register: false,
            },
            project: ProjectConfig {
                name: String::from("bastion"),
                version: String::from(env!("CARGO_PKG_VERSION")),
                tags: Vec::new(),
                deregister_after_critical: Duration::from_secs(60),
                health_check_interval: Duration::from_secs(10),
            },
        }
    }
}

impl TryFrom<CliArgs> for RuntimeConfig {
    type Error = Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let max_node_id = SnowflakeId::max_node_id();
        if args.node_id > max_node_id {
            return Err(Error::Config(format!(
                "NODE_ID ({}) exceeds the node partition (max = {max_node_id})",
                args.node_id
            )));
        }

        let driver: Driver = args.db_driver.parse()?;

        if args.db_max_open_conns == 0 {
            return Err(Error::Config("DB_MAX_OPEN_CONNS must be greater than 0".into()));
        }
        if args.db_max_idle_conns > args.db_max_open_conns {
            return Err(Error::Config(format!(
                "DB_MAX_IDLE_CONNS ({}) exceeds DB_MAX_OPEN_CONNS ({})",
                args.db_max_idle_conns, args.db_max_open_conns
            )));
        }

        if args.project_name.trim().is_empty() {
            return Err(Error::Config("PROJECT_NAME must not be empty".into()));
        }

        if args.tls_enabled {
            for (name, path) in [
                ("TLS_CERT_PATH", &args.tls_cert_path),
                ("TLS_KEY_PATH", &args.tls_key_path),
                ("TLS_CA_PATH", &args.tls_ca_path),
            ] {
                if path.is_none() {
                    return Err(Error::Config(format!("{name} is required when TLS is enabled")));
                }
            }
        }

        let tags = args
            .project_tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(Self {
            run_mode: args.run_mode,
            node_id: args.node_id,
            database: DatabaseConfig {
                driver,
                host: args.db_host,
                port: args.db_port,
                user: args.db_user,
                password: args.db_password,
                name: args.db_name,
                options: args.db_options,
                table_prefix: args.db_table_prefix,
                max_idle_conns: args.db_max_idle_conns,
                max_open_conns: args.db_max_open_conns,
                debug: args.db_debug,
            },
            webapp: WebAppConfig {
                protocol: args.webapp_type,
                address: args.webapp_address,
                listen_host: args.webapp_listen_host,
                port: args.webapp_port,
                read_timeout: Duration::from_secs(args.webapp_read_timeout_secs),
                read_header_timeout: Duration::from_secs(args.webapp_read_header_timeout_secs),
                write_timeout: Duration::from_secs(args.webapp_write_timeout_secs),
                idle_timeout: Duration::from_secs(args.webapp_idle_timeout_secs),
                max_header_bytes: args.webapp_max_header_bytes,
                max_body_bytes: args.webapp_max_body_bytes,
                base_path: args.webapp_base_path,
            },
            tls: TlsConfig {
                enabled: args.tls_enabled,
                cert_path: args.tls_cert_path.unwrap_or_default(),
                key_path: args.tls_key_path.unwrap_or_default(),
                ca_path: args.tls_ca_path.unwrap_or_default(),
            },
            discovery: DiscoveryConfig {
                backend: args.discovery_backend,
                address: args.discovery_address,
                port: args.discovery_port,
                auto_register: args.discovery_auto_register,
            },
            project: ProjectConfig {
                name: args.project_name,
                version: args.project_version,
                tags,
                deregister_after_critical: Duration::from_secs(args.deregister_after_critical_secs),
                health_check_interval: Duration::from_secs(args.health_check_interval_secs),
            },
        })
    }
}

/// Where configuration snapshots come from.
///
/// `run_mode` overrides the configured profile; reloads pass the new one.
pub trait ConfigProvider: Send + Sync {
    fn load(&self, run_mode: Option<&str>) -> Result<RuntimeConfig>;
}

/// Reads flags, the process environment and the `.env` files of a directory.
///
/// Precedence, highest first: flags, process environment, `.env.<RUN_MODE>`,
/// `.env`, built-in defaults. The files are re-read on every load and never
/// written into the process environment, so a reload with another run mode
/// picks up that profile's values.
#[derive(Debug, Clone)]
pub struct EnvConfigProvider {
    args: Vec<OsString>,
    dir: PathBuf,
}

impl EnvConfigProvider {
    /// Uses the process arguments.
    pub fn from_env() -> Self {
        Self::from_args(std::env::args_os())
    }

    pub fn from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            dir: PathBuf::from("."),
        }
    }

    /// Looks for the `.env` files in `dir` instead of the working directory.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Parses the arguments with `files` standing in for unset variables.
    fn parse(&self, files: &HashMap<String, String>) -> Result<CliArgs> {
        let fallbacks: Vec<_> = CliArgs::command()
            .get_arguments()
            .filter_map(|arg| {
                let name = arg.get_env()?.to_str()?;
                if std::env::var_os(name).is_some() {
                    return None;
                }
                let value = files.get(name)?;
                Some((arg.get_id().clone(), value.clone()))
            })
            .collect();

        let mut command = CliArgs::command();
        for (id, value) in fallbacks {
            command = command.mut_arg(id, |arg| file_default(arg, value));
        }
        let matches = command
            .try_get_matches_from(&self.args)
            .map_err(|err| Error::Config(err.to_string()))?;
        CliArgs::from_arg_matches(&matches).map_err(|err| Error::Config(err.to_string()))
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn load(&self, run_mode: Option<&str>) -> Result<RuntimeConfig> {
        let mut files = HashMap::new();
        read_env_file(&self.dir.join(".env"), &mut files)?;
        let mode = match run_mode {
            Some(mode) => mode.to_string(),
            None => self.parse(&files)?.run_mode,
        };
        read_env_file(&self.dir.join(format!(".env.{mode}")), &mut files)?;

        let mut args = self.parse(&files)?;
        args.run_mode = mode;
        RuntimeConfig::try_from(args)
    }
}

/// Merges the pairs of the dotenv file at `path` into `into`. A missing file
/// adds nothing.
fn read_env_file(path: &Path, into: &mut HashMap<String, String>) -> Result<()> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(err) if err.not_found() => return Ok(()),
        Err(err) => return Err(Error::Config(format!("{}: {err}", path.display()))),
    };
    for item in iter {
        let (key, value) =
            item.map_err(|err| Error::Config(format!("{}: {err}", path.display())))?;
        into.insert(key, value);
    }
    Ok(())
}

/// Installs a file value as the default of `arg`, below flags and env.
fn file_default(arg: Arg, value: String) -> Arg {
    if !arg.get_action().takes_values() {
        let on = matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        );
        return arg.default_value(if on { "true" } else { "false" });
    }
    match arg.get_value_delimiter() {
        Some(delimiter) => {
            let values: Vec<String> = value.split(delimiter).map(str::to_string).collect();
            arg.default_values(values)
        }
        None => arg.default_value(value),
    }
}

/// Serves a fixed snapshot, with the run mode swapped in on reload.
#[derive(Debug, Clone)]
pub struct StaticConfigProvider {
    config: RuntimeConfig,
}

impl StaticConfigProvider {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn load(&self, run_mode: Option<&str>) -> Result<RuntimeConfig> {
        let mut config = self.config.clone();
        if let Some(mode) = run_mode {
            config.run_mode = mode.to_string();
        }
        Ok(config)
    }
}
