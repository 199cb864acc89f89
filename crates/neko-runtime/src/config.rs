// Runtime configuration loaded from environment variables and config files.
// Decision: Pool sizes default to hardware sizing; env vars only override
// Decision: Database settings come from the config collaborator, read once on first use

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::error::ConfigError;
use crate::sizing::{HostParallelism, WorkloadClass, MAX_WORKERS};

/// Default global shutdown deadline
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Name of the config entry holding database settings
pub const DATABASE_CONFIG: &str = "database";

// ============================================================================
// Runtime configuration
// ============================================================================

/// HTTP client settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub user_agent: String,
    /// Whole-request timeout
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("neko/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Configuration for an [`ExecutionContext`](crate::ExecutionContext)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// CPU pool size override (None = 2 × logical cores)
    pub cpu_workers: Option<usize>,
    /// I/O pool size override (None = 5 × schedulable cores)
    pub io_workers: Option<usize>,
    /// Global deadline for coordinated shutdown
    pub shutdown_timeout: Duration,
    /// Directory holding `<name>.yaml` config files
    pub config_dir: PathBuf,
    pub http: HttpConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cpu_workers: None,
            io_workers: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            config_dir: PathBuf::from("config"),
            http: HttpConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// - `NEKO_CPU_WORKERS` / `NEKO_IO_WORKERS`: pool size overrides
    /// - `NEKO_SHUTDOWN_TIMEOUT_SECS`: shutdown deadline (default: 10)
    /// - `NEKO_CONFIG_DIR`: config file directory (default: `config`)
    /// - `NEKO_HTTP_USER_AGENT`, `NEKO_HTTP_TIMEOUT_SECS`: HTTP client settings
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let defaults = Self::default();

        let mut http = HttpConfig::default();
        if let Some(agent) = lookup("NEKO_HTTP_USER_AGENT").filter(|s| !s.is_empty()) {
            http.user_agent = agent;
        }
        if let Some(secs) = parse("NEKO_HTTP_TIMEOUT_SECS") {
            http.timeout = Duration::from_secs(secs);
        }

        Self {
            cpu_workers: parse("NEKO_CPU_WORKERS").map(clamp_workers),
            io_workers: parse("NEKO_IO_WORKERS").map(clamp_workers),
            shutdown_timeout: parse("NEKO_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            config_dir: lookup("NEKO_CONFIG_DIR")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.config_dir),
            http,
        }
    }

    /// Set the CPU pool size
    pub fn with_cpu_workers(mut self, workers: usize) -> Self {
        self.cpu_workers = Some(workers.clamp(1, MAX_WORKERS));
        self
    }

    /// Set the I/O pool size
    pub fn with_io_workers(mut self, workers: usize) -> Self {
        self.io_workers = Some(workers.clamp(1, MAX_WORKERS));
        self
    }

    /// Set the shutdown deadline
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the config file directory
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    /// Set HTTP client settings
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Resolved worker count for `class`
    pub fn workers_for(&self, class: WorkloadClass, host: &HostParallelism) -> usize {
        let configured = match class {
            WorkloadClass::CpuBound => self.cpu_workers,
            WorkloadClass::IoBound => self.io_workers,
        };
        configured
            .unwrap_or_else(|| host.size(class))
            .clamp(1, MAX_WORKERS)
    }
}

fn clamp_workers(requested: u64) -> usize {
    usize::try_from(requested)
        .unwrap_or(MAX_WORKERS)
        .clamp(1, MAX_WORKERS)
}

// ============================================================================
// Config collaborator
// ============================================================================

/// Source of named configuration mappings
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetch the mapping stored under `name`
    async fn get_config(&self, name: &str) -> Result<serde_yaml::Value, ConfigError>;
}

/// Reads `<dir>/<name>.yaml`
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    dir: PathBuf,
}

impl FileConfigSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.yaml"))
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn get_config(&self, name: &str) -> Result<serde_yaml::Value, ConfigError> {
        let path = self.path_for(name);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound {
                    name: name.to_string(),
                    path,
                })
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            name: name.to_string(),
            source,
        })
    }
}

/// In-memory config entries
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    entries: HashMap<String, serde_yaml::Value>,
}

impl StaticConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, name: impl Into<String>, value: serde_yaml::Value) -> Self {
        self.entries.insert(name.into(), value);
        self
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn get_config(&self, name: &str) -> Result<serde_yaml::Value, ConfigError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound {
                name: name.to_string(),
                path: PathBuf::from(format!("<memory>/{name}")),
            })
    }
}

// ============================================================================
// Database configuration
// ============================================================================

fn default_min_size() -> u32 {
    1
}

fn default_max_size() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

/// PostgreSQL pool settings
///
/// Either `dsn` or the individual connection fields may be given; fields
/// set alongside a `dsn` override it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub dsn: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default = "default_min_size")]
    pub min_size: u32,
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    /// Pool-level bound on waiting for a connection
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

impl DatabaseConfig {
    /// Read and validate the `database` entry from `source`
    pub async fn load(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let value = source.get_config(DATABASE_CONFIG).await?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_yaml::Value) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_value(value).map_err(|source| ConfigError::Parse {
            name: DATABASE_CONFIG.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dsn.is_none() && self.host.is_none() {
            return Err(ConfigError::Invalid(
                "database config needs either `dsn` or `host`".to_string(),
            ));
        }
        if self.max_size == 0 {
            return Err(ConfigError::Invalid("max_size must be at least 1".to_string()));
        }
        if self.min_size > self.max_size {
            return Err(ConfigError::Invalid(format!(
                "min_size ({}) exceeds max_size ({})",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }

    /// Connection options for a single connection
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        let mut options = match &self.dsn {
            Some(dsn) => PgConnectOptions::from_str(dsn)
                .map_err(|e| ConfigError::Invalid(format!("bad dsn: {e}")))?,
            None => PgConnectOptions::new(),
        };

        if let Some(host) = &self.host {
            options = options.host(host);
        }
        if let Some(port) = self.port {
            options = options.port(port);
        }
        if let Some(user) = &self.user {
            options = options.username(user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        if let Some(database) = &self.database {
            options = options.database(database);
        }
        Ok(options)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Pool sizing and timeouts
    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .min_connections(self.min_size)
            .max_connections(self.max_size)
            .acquire_timeout(self.acquire_timeout())
            .idle_timeout(self.idle_timeout_secs.map(Duration::from_secs))
    }
}
