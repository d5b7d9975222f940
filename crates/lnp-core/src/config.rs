//! Configuration loader for the LNP resolver.
//!
//! The config file is a sectioned key/value (INI-style) file with sections
//! `daemon`, `db`, `sip`, and `metrics`. Resolution order for the file path:
//!
//!   1. `$LNP_RESOLVER_CONFIG` (explicit override)
//!   2. a path passed by the caller (conventionally the single positional
//!      CLI argument)
//!   3. `/etc/yeti/lnp_resolver.cfg`
//!
//! After the file loads, a handful of `LNP_*` environment variables override
//! the fields most commonly tuned per-deployment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// `host:port` endpoints to bind, comma-separated in the file.
    pub listen: Vec<String>,
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: vec!["0.0.0.0:3307".to_string()],
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub name: String,
    pub schema: String,
    pub conn_timeout_ms: u64,
    pub check_interval_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "yeti".to_string(),
            pass: String::new(),
            name: "yeti".to_string(),
            schema: "switch".to_string(),
            conn_timeout_ms: 4000,
            check_interval_secs: 60,
        }
    }
}

impl DbConfig {
    /// A libpq-style connection string, as handed to a connection pool.
    pub fn conn_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.pass, self.host, self.port, self.name
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SipConfig {
    pub contact_user: String,
    pub from_uri: String,
    pub from_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub host: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResolverConfig {
    pub daemon: DaemonConfig,
    pub db: DbConfig,
    pub sip: SipConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, ini::Error),
    #[error("missing required key [{0}] {1}")]
    MissingKey(&'static str, &'static str),
}

impl ResolverConfig {
    /// Default config path, used when neither the env var nor an explicit
    /// path is provided.
    pub const DEFAULT_PATH: &'static str = "/etc/yeti/lnp_resolver.cfg";

    /// Resolve the config file path: env var, else the given override
    /// (typically the CLI's single positional argument), else the default.
    pub fn resolve_path(cli_arg: Option<&str>) -> PathBuf {
        if let Ok(v) = std::env::var("LNP_RESOLVER_CONFIG") {
            return PathBuf::from(v);
        }
        if let Some(p) = cli_arg {
            return PathBuf::from(p);
        }
        PathBuf::from(Self::DEFAULT_PATH)
    }

    /// Load, parse, and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let ini = ini::Ini::load_from_str(&text)
            .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;

        let mut config = ResolverConfig::default();

        if let Some(section) = ini.section(Some("daemon")) {
            if let Some(listen) = section.get("listen") {
                config.daemon.listen = listen
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            if let Some(level) = section.get("log_level") {
                config.daemon.log_level = level.to_string();
            }
        }

        if let Some(section) = ini.section(Some("db")) {
            if let Some(v) = section.get("host") {
                config.db.host = v.to_string();
            }
            if let Some(v) = section.get("port").and_then(|v| v.parse().ok()) {
                config.db.port = v;
            }
            if let Some(v) = section.get("user").or_else(|| section.get("username")) {
                config.db.user = v.to_string();
            }
            if let Some(v) = section.get("pass").or_else(|| section.get("password")) {
                config.db.pass = v.to_string();
            }
            if let Some(v) = section.get("name").or_else(|| section.get("database")) {
                config.db.name = v.to_string();
            }
            if let Some(v) = section.get("schema") {
                config.db.schema = v.to_string();
            }
            if let Some(v) = section.get("conn_timeout").and_then(|v| v.parse().ok()) {
                config.db.conn_timeout_ms = v;
            }
            if let Some(v) = section.get("check_interval").and_then(|v| v.parse().ok()) {
                config.db.check_interval_secs = v;
            }
        }

        if let Some(section) = ini.section(Some("sip")) {
            if let Some(v) = section.get("contact_user") {
                config.sip.contact_user = v.to_string();
            }
            if let Some(v) = section.get("from_uri") {
                config.sip.from_uri = v.to_string();
            }
            if let Some(v) = section.get("from_name") {
                config.sip.from_name = v.to_string();
            }
        }

        if let Some(section) = ini.section(Some("prometheus")).or_else(|| ini.section(Some("metrics"))) {
            if let Some(v) = section.get("host") {
                config.metrics.host = v.to_string();
            }
            if let Some(v) = section.get("port").and_then(|v| v.parse().ok()) {
                config.metrics.port = v;
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LNP_LISTEN") {
            self.daemon.listen = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = std::env::var("LNP_LOG_LEVEL") {
            self.daemon.log_level = v;
        }
        if let Ok(v) = std::env::var("LNP_DB_HOST") {
            self.db.host = v;
        }
    }
}
