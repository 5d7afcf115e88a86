//! Configuration management for the agent wallet.

use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub remote: RemoteConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Base endpoint of the custody service, without a trailing slash.
    pub base_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl RemoteConfig {
    /// Staging endpoint used when nothing else is configured.
    pub const DEFAULT_BASE_URL: &'static str = "https://staging.crossmint.com";
    /// Production endpoint.
    pub const PRODUCTION_BASE_URL: &'static str = "https://www.crossmint.com";

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct StoreConfig {
    /// Wallet file holding one identity record per agent.
    pub path: PathBuf,
    /// Optional key used to seal secret seeds at rest.
    pub master_key: Option<String>,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("path", &self.path)
            .field(
                "master_key",
                &self.master_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Deadlines and intervals for status polling, in milliseconds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_transfer_timeout_ms")]
    pub transfer_timeout_ms: u64,
    #[serde(default = "default_broadcast_timeout_ms")]
    pub broadcast_timeout_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            transfer_timeout_ms: default_transfer_timeout_ms(),
            broadcast_timeout_ms: default_broadcast_timeout_ms(),
            interval_ms: default_interval_ms(),
        }
    }
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_transfer_timeout_ms() -> u64 {
    60_000
}

fn default_broadcast_timeout_ms() -> u64 {
    30_000
}

fn default_interval_ms() -> u64 {
    2_000
}

/// `~/.agent-wallet/wallets.json`, or a relative path when `HOME` is unset.
pub fn default_store_path() -> PathBuf {
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".agent-wallet")
        .join("wallets.json")
}

impl Config {
    /// Load configuration from environment variables.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = PollingConfig::default();

        Ok(Self {
            remote: RemoteConfig {
                base_url: env::var("CUSTODY_API_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|_| RemoteConfig::DEFAULT_BASE_URL.to_string()),
                timeout_secs: parse_env("HTTP_TIMEOUT_SECS")?
                    .unwrap_or_else(default_http_timeout_secs),
            },
            store: StoreConfig {
                path: env::var("WALLET_STORE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| default_store_path()),
                master_key: env::var("WALLET_MASTER_KEY").ok().filter(|k| !k.is_empty()),
            },
            polling: PollingConfig {
                transfer_timeout_ms: parse_env("TRANSFER_WAIT_TIMEOUT_MS")?
                    .unwrap_or(defaults.transfer_timeout_ms),
                broadcast_timeout_ms: parse_env("PURCHASE_BROADCAST_TIMEOUT_MS")?
                    .unwrap_or(defaults.broadcast_timeout_ms),
                interval_ms: parse_env("POLL_INTERVAL_MS")?.unwrap_or(defaults.interval_ms),
            },
        })
    }

    /// Load configuration from a file, with `AGENT_WALLET__*` overrides.
    ///
    /// `AGENT_WALLET__REMOTE__BASE_URL=https://...` overrides `remote.base_url`.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("remote.base_url", RemoteConfig::DEFAULT_BASE_URL)?
            .set_default(
                "store.path",
                default_store_path().to_string_lossy().into_owned(),
            )?
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("AGENT_WALLET").separator("__"))
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.remote.base_url = config.remote.base_url.trim_end_matches('/').to_string();
        Ok(config)
    }

    /// Configuration for tests (memory-friendly defaults, fast polling).
    pub fn test_config() -> Self {
        Self {
            remote: RemoteConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                timeout_secs: 5,
            },
            store: StoreConfig {
                path: env::temp_dir().join("agent-wallet-test.json"),
                master_key: None,
            },
            polling: PollingConfig {
                transfer_timeout_ms: 1_000,
                broadcast_timeout_ms: 1_000,
                interval_ms: 100,
            },
        }
    }
}

#[allow(clippy::result_large_err)]
fn parse_env(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            Error::configuration(format!("{} must be a whole number, got '{}'", name, raw))
        }),
        Err(_) => Ok(None),
    }
}
