use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::actors::{RegistryConfig, DEFAULT_COUNTER_FIELDS};

/// Durable store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// SQLite database under the data directory.
    Sqlite,
    /// Process memory; state is lost on restart.
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub store: StoreBackend,
    pub data_dir: PathBuf,
    pub idle_timeout: Option<Duration>,
    pub mailbox_capacity: usize,
    pub presence_timeout: Duration,
    pub counter_fields: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let listen_addr = var("ENGAGE_LISTEN_ADDR", "127.0.0.1:8787")
            .parse()
            .context("invalid ENGAGE_LISTEN_ADDR")?;

        let log_level = var("ENGAGE_LOG_LEVEL", "info");

        let store = match var("ENGAGE_STORE", "sqlite").to_lowercase().as_str() {
            "sqlite" => StoreBackend::Sqlite,
            "memory" => StoreBackend::Memory,
            other => bail!("invalid ENGAGE_STORE: {other} (expected sqlite or memory)"),
        };

        let data_dir = PathBuf::from(var("ENGAGE_DATA_DIR", "./data"));

        let idle_secs: u64 = var("ENGAGE_ACTOR_IDLE_TIMEOUT_SECS", "300")
            .parse()
            .context("invalid ENGAGE_ACTOR_IDLE_TIMEOUT_SECS")?;
        let idle_timeout = (idle_secs > 0).then(|| Duration::from_secs(idle_secs));

        let mailbox_capacity: usize = var("ENGAGE_MAILBOX_CAPACITY", "256")
            .parse()
            .context("invalid ENGAGE_MAILBOX_CAPACITY")?;
        if mailbox_capacity == 0 {
            bail!("ENGAGE_MAILBOX_CAPACITY must be at least 1");
        }

        let presence_timeout_ms: u64 = var("ENGAGE_PRESENCE_TIMEOUT_MS", "30000")
            .parse()
            .context("invalid ENGAGE_PRESENCE_TIMEOUT_MS")?;

        let counter_fields = match lookup("ENGAGE_COUNTER_FIELDS") {
            Some(fields) => fields
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_COUNTER_FIELDS.iter().map(|f| f.to_string()).collect(),
        };

        Ok(Self {
            listen_addr,
            log_level,
            store,
            data_dir,
            idle_timeout,
            mailbox_capacity,
            presence_timeout: Duration::from_millis(presence_timeout_ms),
            counter_fields,
        })
    }

    /// Registry tuning derived from this config.
    pub fn registry(&self) -> RegistryConfig {
        RegistryConfig {
            mailbox_capacity: self.mailbox_capacity,
            idle_timeout: self.idle_timeout,
            ..RegistryConfig::default()
        }
    }

    /// Path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("actors.db")
    }
}
