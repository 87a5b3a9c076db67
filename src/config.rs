use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

use crate::application::{RetryPolicy, TransferSettings};
use crate::storage::StoreOptions;

pub const DEFAULT_CONFIG_PATH: &str = "tally.toml";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:tally.db".into(),
            max_connections: 5,
            busy_timeout_ms: 250,
            acquire_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TransferConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 10,
            max_backoff_ms: 500,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence.
    pub filter: Option<String>,
    pub format: LogFormat,
}

/// Resolve and load the configuration file.
///
/// An explicit path (flag or `TALLY_CONFIG`) must exist; the default
/// `./tally.toml` is optional. Environment overrides are applied last.
pub fn load(explicit: Option<&Path>) -> Result<AppConfig> {
    let from_env = std::env::var_os("TALLY_CONFIG").map(PathBuf::from);
    let mut cfg = match explicit.map(Path::to_path_buf).or(from_env) {
        Some(path) => load_from_file(&path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            load_from_file(Path::new(DEFAULT_CONFIG_PATH))?
        }
        None => AppConfig::default(),
    };
    cfg.apply_env_overrides(|name| std::env::var(name).ok())?;
    cfg.normalize_and_validate()?;
    Ok(cfg)
}

pub fn load_from_file(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
}

pub fn parse(content: &str) -> Result<AppConfig> {
    Ok(toml::from_str(content)?)
}

impl AppConfig {
    /// Apply `TALLY_*` overrides, reading variables through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("TALLY_DATABASE_URL").or_else(|| lookup("DATABASE_URL")) {
            self.database.url = url;
        }
        if let Some(host) = lookup("TALLY_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("TALLY_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("TALLY_PORT is not a valid port: {port:?}"))?;
        }
        Ok(())
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.normalize()?;
        self.database.validate()?;
        self.transfer.validate()?;
        self.check_retry_budget()?;
        Ok(())
    }

    /// Every attempt may wait out the busy timeout and the longest backoff.
    /// All attempts together must fit in the transfer timeout.
    fn check_retry_budget(&self) -> Result<()> {
        let per_attempt = self
            .database
            .busy_timeout_ms
            .saturating_add(self.transfer.max_backoff_ms);
        let budget = u64::from(self.transfer.max_attempts).saturating_mul(per_attempt);
        if budget >= self.transfer.timeout_ms {
            bail!(
                "transfer.max_attempts * (database.busy_timeout_ms + transfer.max_backoff_ms) \
                 = {budget}ms must be below transfer.timeout_ms = {}ms",
                self.transfer.timeout_ms
            );
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            busy_timeout: Duration::from_millis(self.database.busy_timeout_ms),
            acquire_timeout: Duration::from_secs(self.database.acquire_timeout_secs),
        }
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            retry: RetryPolicy {
                max_attempts: self.transfer.max_attempts,
                initial_backoff: Duration::from_millis(self.transfer.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.transfer.max_backoff_ms),
            },
            default_timeout: Duration::from_millis(self.transfer.timeout_ms),
        }
    }
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "127.0.0.1".to_string();
        }
        if self.port == 0 {
            bail!("server.port must be in 1..=65535");
        }
        Ok(())
    }
}

impl DatabaseConfig {
    fn validate(&self) -> Result<()> {
        if !self.url.trim().to_lowercase().starts_with("sqlite:") {
            return Err(anyhow!(
                "database.url must be a sqlite: url, got {:?}",
                self.url
            ));
        }
        if self.max_connections == 0 {
            bail!("database.max_connections must be >= 1");
        }
        if self.acquire_timeout_secs == 0 {
            bail!("database.acquire_timeout_secs must be positive");
        }
        Ok(())
    }
}

impl TransferConfig {
    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            bail!("transfer.max_attempts must be >= 1");
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            bail!("transfer.max_backoff_ms must be >= initial_backoff_ms");
        }
        if self.timeout_ms == 0 {
            bail!("transfer.timeout_ms must be positive");
        }
        Ok(())
    }
}
