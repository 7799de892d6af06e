//! Environment-level settings
//!
//! Built once at startup and shared with the runtime. Business logic never
//! reads the environment itself.
//!
//! | Variable | Default |
//! |---|---|
//! | `DDNS_CONFIG_PATH` | `config.enc.json` |
//! | `DDNS_STATE_PATH` | `agent.db` |
//! | `DDNS_MASTER_KEY` | required |
//! | `DDNS_CHECK_IP_URL` | `https://api.ipify.org` |
//! | `DDNS_CHECK_IP_HOST_ALLOWLIST` | empty |
//! | `DDNS_UPDATE_HOST_ALLOWLIST` | empty |
//! | `DDNS_IP_LOOKUP_TIMEOUT_SECS` | `10` |
//! | `DDNS_UPDATE_TIMEOUT_SECS` | `20` |
//! | `DDNS_LOG_LEVEL` | `info` |

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::url_guard::HostAllowlist;

pub const DEFAULT_CONFIG_PATH: &str = "config.enc.json";
pub const DEFAULT_STATE_PATH: &str = "agent.db";
pub const DEFAULT_CHECK_IP_URL: &str = "https://api.ipify.org";
pub const DEFAULT_IP_LOOKUP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_UPDATE_TIMEOUT_SECS: u64 = 20;

/// Process-wide agent settings
#[derive(Clone)]
pub struct AgentSettings {
    /// Configuration source written by the publisher
    pub config_path: PathBuf,

    /// SQLite file holding history and cache
    pub state_path: PathBuf,

    /// Hex-encoded AES-256-GCM key
    /// ⚠️ NEVER log this value
    pub master_key: String,

    /// Check-IP URL used while the configuration source is empty
    pub default_check_ip_url: String,

    pub check_ip_allowlist: HostAllowlist,
    pub update_allowlist: HostAllowlist,

    pub ip_lookup_timeout: Duration,
    pub update_timeout: Duration,

    pub log_level: String,
}

impl fmt::Debug for AgentSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSettings")
            .field("config_path", &self.config_path)
            .field("state_path", &self.state_path)
            .field("master_key", &"<REDACTED>")
            .field("default_check_ip_url", &self.default_check_ip_url)
            .field("check_ip_allowlist", &self.check_ip_allowlist)
            .field("update_allowlist", &self.update_allowlist)
            .field("ip_lookup_timeout", &self.ip_lookup_timeout)
            .field("update_timeout", &self.update_timeout)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl AgentSettings {
    /// Settings with defaults and the given key, for embedding and tests
    pub fn new(
        config_path: impl Into<PathBuf>,
        state_path: impl Into<PathBuf>,
        master_key: impl Into<String>,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            state_path: state_path.into(),
            master_key: master_key.into(),
            default_check_ip_url: DEFAULT_CHECK_IP_URL.to_string(),
            check_ip_allowlist: HostAllowlist::default(),
            update_allowlist: HostAllowlist::default(),
            ip_lookup_timeout: Duration::from_secs(DEFAULT_IP_LOOKUP_TIMEOUT_SECS),
            update_timeout: Duration::from_secs(DEFAULT_UPDATE_TIMEOUT_SECS),
            log_level: "info".to_string(),
        }
    }

    /// Build settings from a variable lookup, then validate them
    ///
    /// The daemon passes `|key| std::env::var(key).ok()`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let master_key = var("DDNS_MASTER_KEY").ok_or_else(|| {
            Error::settings(
                "DDNS_MASTER_KEY is required. \
                Set it via: export DDNS_MASTER_KEY=<64 hex characters>",
            )
        })?;

        let settings = Self {
            config_path: var("DDNS_CONFIG_PATH")
                .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
                .into(),
            state_path: var("DDNS_STATE_PATH")
                .unwrap_or_else(|| DEFAULT_STATE_PATH.to_string())
                .into(),
            master_key,
            default_check_ip_url: var("DDNS_CHECK_IP_URL")
                .unwrap_or_else(|| DEFAULT_CHECK_IP_URL.to_string()),
            check_ip_allowlist: HostAllowlist::parse(var("DDNS_CHECK_IP_HOST_ALLOWLIST").as_deref()),
            update_allowlist: HostAllowlist::parse(var("DDNS_UPDATE_HOST_ALLOWLIST").as_deref()),
            ip_lookup_timeout: parse_secs(
                "DDNS_IP_LOOKUP_TIMEOUT_SECS",
                var("DDNS_IP_LOOKUP_TIMEOUT_SECS"),
                DEFAULT_IP_LOOKUP_TIMEOUT_SECS,
                1..=120,
            )?,
            update_timeout: parse_secs(
                "DDNS_UPDATE_TIMEOUT_SECS",
                var("DDNS_UPDATE_TIMEOUT_SECS"),
                DEFAULT_UPDATE_TIMEOUT_SECS,
                1..=300,
            )?,
            log_level: var("DDNS_LOG_LEVEL")
                .unwrap_or_else(|| "info".to_string())
                .to_lowercase(),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        let key = self.master_key.trim();
        if key.len() != 64 || !key.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::settings(
                "DDNS_MASTER_KEY must be 64 hex characters (a 256-bit key)",
            ));
        }

        if self.config_path.as_os_str().is_empty() {
            return Err(Error::settings("DDNS_CONFIG_PATH cannot be empty"));
        }
        if self.state_path.as_os_str().is_empty() {
            return Err(Error::settings("DDNS_STATE_PATH cannot be empty"));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(Error::settings(format!(
                    "DDNS_LOG_LEVEL '{}' is not valid. \
                    Valid levels: trace, debug, info, warn, error",
                    self.log_level
                )));
            }
        }

        Ok(())
    }
}

fn parse_secs(
    name: &str,
    raw: Option<String>,
    default: u64,
    range: std::ops::RangeInclusive<u64>,
) -> Result<Duration> {
    let secs = match raw {
        None => default,
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            Error::settings(format!("{name} must be a whole number of seconds. Got: {raw}"))
        })?,
    };
    if !range.contains(&secs) {
        return Err(Error::settings(format!(
            "{name} must be between {} and {} seconds. Got: {secs}",
            range.start(),
            range.end()
        )));
    }
    Ok(Duration::from_secs(secs))
}
