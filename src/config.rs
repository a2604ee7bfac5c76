use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{parse_cents, Cents};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct CashierConfig {
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub database: String,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3002".to_string(),
            database: "cashier.db".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    /// Balance a wallet starts with on first touch, e.g. "1000.00"
    pub opening_balance: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            opening_balance: "1000.00".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub timestamp_tolerance_secs: u64,
    pub nonce_retention_secs: u64,
    pub sweep_interval_secs: u64,
    /// service id -> shared secret
    pub services: HashMap<String, String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance_secs: 300,
            nonce_retention_secs: 600,
            sweep_interval_secs: 600,
            services: HashMap::new(),
        }
    }
}

impl AuthConfig {
    pub fn timestamp_tolerance(&self) -> Duration {
        Duration::from_secs(self.timestamp_tolerance_secs)
    }

    pub fn nonce_retention(&self) -> Duration {
        Duration::from_secs(self.nonce_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl CashierConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let opening = self.opening_balance()?;
        if opening < 0 {
            bail!("ledger.opening_balance must not be negative");
        }
        if self.auth.sweep_interval_secs == 0 {
            bail!("auth.sweep_interval_secs must be positive");
        }
        for (service_id, secret) in &self.auth.services {
            if service_id.is_empty() || secret.is_empty() {
                bail!("auth.services entries need a non-empty id and secret");
            }
        }
        Ok(())
    }

    pub fn opening_balance(&self) -> Result<Cents> {
        parse_cents(&self.ledger.opening_balance)
            .with_context(|| format!("Invalid ledger.opening_balance '{}'", self.ledger.opening_balance))
    }
}
