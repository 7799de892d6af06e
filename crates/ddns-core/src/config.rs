//! Agent configuration and its loader
//!
//! The configuration source is a JSON document written by an external
//! publisher:
//!
//! ```json
//! {
//!   "check_ip_url": "https://api.ipify.org",
//!   "manual_ip_enabled": false,
//!   "manual_ip_address": null,
//!   "targets": [
//!     {
//!       "id": "7",
//!       "hostname": "www",
//!       "update_url": "https://dynamicdns.park-your-domain.com/update?host={hostname}&domain=example.com&password={token}&ip={ip}",
//!       "encrypted_token": "9f3c…",
//!       "interval": 300
//!     }
//!   ]
//! }
//! ```
//!
//! Unknown fields are rejected. A zero-length or whitespace-only source is a
//! valid "not yet published" state with no targets.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};

/// The agent's declarative configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// URL returning the caller's public IP as plain text
    pub check_ip_url: String,

    /// Use `manual_ip_address` instead of looking the IP up
    #[serde(default)]
    pub manual_ip_enabled: bool,

    /// Operator-supplied IPv4/IPv6 literal
    #[serde(default)]
    pub manual_ip_address: Option<String>,

    /// Update targets, processed in this order
    pub targets: Vec<TargetConfig>,
}

impl AgentConfig {
    /// A configuration with no targets
    pub fn empty(check_ip_url: impl Into<String>) -> Self {
        Self {
            check_ip_url: check_ip_url.into(),
            manual_ip_enabled: false,
            manual_ip_address: None,
            targets: Vec::new(),
        }
    }

    /// Parse and validate a configuration document
    ///
    /// Blank input yields [`AgentConfig::empty`] with `default_check_ip_url`.
    pub fn parse(text: &str, default_check_ip_url: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::empty(default_check_ip_url));
        }
        let config: Self = serde_json::from_str(text)
            .map_err(|e| Error::config_invalid(format!("malformed configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.check_ip_url)
            .map_err(|e| Error::config_invalid(format!("check_ip_url is not a URL: {e}")))?;

        // A blank address means "not configured"
        if let Some(address) = self
            .manual_ip_address
            .as_deref()
            .filter(|address| !address.trim().is_empty())
        {
            address.trim().parse::<IpAddr>().map_err(|_| {
                Error::config_invalid(format!(
                    "manual_ip_address '{address}' is not a valid IPv4 or IPv6 address"
                ))
            })?;
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            target.validate()?;
            if !seen.insert(target.id.as_str()) {
                return Err(Error::config_invalid(format!(
                    "duplicate target id '{}'",
                    target.id
                )));
            }
        }

        Ok(())
    }

    /// The manual override address, if the override is enabled and usable
    pub fn manual_ip(&self) -> Option<&str> {
        if !self.manual_ip_enabled {
            return None;
        }
        self.manual_ip_address
            .as_deref()
            .map(str::trim)
            .filter(|address| !address.is_empty())
    }

    /// Shortest target interval, in seconds
    pub fn min_interval_secs(&self) -> Option<u64> {
        self.targets.iter().map(|target| target.interval).min()
    }
}

/// One record to keep updated at a provider
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Unique within a configuration
    pub id: String,

    pub hostname: String,

    /// Template with `{token}`, `{hostname}`, `{id}` and `{ip}` placeholders
    pub update_url: String,

    /// Opaque ciphertext; see [`crate::crypto`]
    pub encrypted_token: String,

    /// Seconds between cycles this target wants
    pub interval: u64,
}

// Ciphertext stays out of logs as well.
impl std::fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetConfig")
            .field("id", &self.id)
            .field("hostname", &self.hostname)
            .field("encrypted_token", &"<REDACTED>")
            .field("interval", &self.interval)
            .finish()
    }
}

impl TargetConfig {
    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::config_invalid("target id cannot be empty"));
        }
        if self.hostname.trim().is_empty() {
            return Err(Error::config_invalid(format!(
                "target '{}' has an empty hostname",
                self.id
            )));
        }
        if self.interval == 0 {
            return Err(Error::config_invalid(format!(
                "target '{}' interval must be > 0",
                self.id
            )));
        }
        Url::parse(&self.update_url).map_err(|e| {
            Error::config_invalid(format!(
                "target '{}' update_url is not a URL: {e}",
                self.id
            ))
        })?;
        Ok(())
    }
}

/// Change marker for the configuration source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

/// Reads the configuration source and detects changes to it
#[derive(Debug)]
pub struct ConfigLoader {
    path: PathBuf,
    default_check_ip_url: String,
    fingerprint: Option<Fingerprint>,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>, default_check_ip_url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_check_ip_url: default_check_ip_url.into(),
            fingerprint: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the source unconditionally
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigMissing`] if the source does not exist
    /// - [`Error::ConfigInvalid`] if it is malformed or fails validation
    pub async fn load(&mut self) -> Result<AgentConfig> {
        let fingerprint = self.current_fingerprint().await?;
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| self.read_error(e))?;

        // Recorded before parsing so a broken document is reported once,
        // not on every cycle until it is fixed.
        self.fingerprint = fingerprint;
        let text = String::from_utf8(bytes)
            .map_err(|e| Error::config_invalid(format!("configuration is not UTF-8: {e}")))?;
        let config = AgentConfig::parse(&text, &self.default_check_ip_url)?;
        debug!(
            "Loaded configuration from {}: {} target(s)",
            self.path.display(),
            config.targets.len()
        );
        Ok(config)
    }

    /// Reload only if the source changed since the last observation
    ///
    /// # Returns
    ///
    /// - `Ok(Some(config))`: The source changed and was reloaded
    /// - `Ok(None)`: Unchanged, or the source disappeared (the caller keeps
    ///   its last good configuration)
    /// - `Err(Error)`: The source changed but could not be loaded
    pub async fn load_if_changed(&mut self) -> Result<Option<AgentConfig>> {
        let fingerprint = match self.current_fingerprint().await? {
            Some(fingerprint) => fingerprint,
            None => {
                if self.fingerprint.take().is_some() {
                    warn!(
                        "Configuration source {} disappeared; keeping the last good configuration",
                        self.path.display()
                    );
                }
                return Ok(None);
            }
        };

        if self.fingerprint == Some(fingerprint) {
            return Ok(None);
        }

        self.load().await.map(Some)
    }

    async fn current_fingerprint(&self) -> Result<Option<Fingerprint>> {
        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => Ok(Some(Fingerprint {
                modified: metadata.modified().ok(),
                len: metadata.len(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn read_error(&self, err: std::io::Error) -> Error {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::config_missing(self.path.display().to_string())
        } else {
            Error::Io(err)
        }
    }
}
