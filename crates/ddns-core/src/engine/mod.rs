//! Agent runtime
//!
//! The AgentRuntime owns the active configuration and drives the update
//! cycle:
//! - Determining the current public IP (manual override or lookup)
//! - Detecting global IP changes against the cached `last_ip`
//! - Skipping targets already synchronized for an unchanged IP
//! - Sending one update request per remaining target
//! - Recording every attempt in the state store
//!
//! ## Cycle
//!
//! ```text
//!   ┌──────┐   ┌───────────────┐   ┌────────────────┐   ┌──────────┐
//!   │ Idle │──▶│ DeterminingIP │──▶│ PerTargetLoop  │──▶│ Sleeping │
//!   └──────┘   └───────────────┘   └────────────────┘   └──────────┘
//!      ▲                                                      │
//!      └──────────────── reload check / stop check ◀──────────┘
//! ```
//!
//! ## Failure Isolation
//!
//! Every per-target failure (decryption, URL rejection, transport error,
//! provider error) becomes an `error` [`UpdateRecord`] and processing moves
//! on to the next target. Only storage failures leave the cycle as `Err`.

pub mod signals;
pub mod template;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{AgentConfig, ConfigLoader, TargetConfig};
use crate::error::{Error, Result};
use crate::response;
use crate::settings::AgentSettings;
use crate::traits::{HttpClient, SecretToken, StateStore, TokenDecryptor, UpdateRecord};
use crate::url_guard;

pub use signals::{RuntimeSignals, SleepOutcome};
pub use template::{UpdateUrlValues, render_update_url};

/// Cache key holding the last observed public IP
pub const LAST_IP_KEY: &str = "last_ip";

/// Shortest sleep between cycles, in seconds
pub const MIN_SLEEP_SECS: u64 = 30;

/// Sleep between cycles while no targets are configured, in seconds
pub const IDLE_SLEEP_SECS: u64 = 60;

/// Cache key holding the IP a target was last synchronized to
pub fn target_cache_key(target_id: &str) -> String {
    format!("{LAST_IP_KEY}:{target_id}")
}

/// How the cycle's IP was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpSource {
    /// Manual override address, no network call
    Manual,
    /// Automatic lookup via the check-IP URL
    Lookup,
    /// Manual override enabled without an address; looked up instead
    ManualFallback,
}

/// What happened to one target during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    /// Already synchronized for the current IP; no request was made
    Skipped { target_id: String },
    /// An update was attempted and recorded
    Attempted(UpdateRecord),
}

impl TargetOutcome {
    pub fn target_id(&self) -> &str {
        match self {
            TargetOutcome::Skipped { target_id } => target_id,
            TargetOutcome::Attempted(record) => &record.target_id,
        }
    }

    pub fn record(&self) -> Option<&UpdateRecord> {
        match self {
            TargetOutcome::Skipped { .. } => None,
            TargetOutcome::Attempted(record) => Some(record),
        }
    }
}

/// Summary of one update cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// `None` when the IP could not be determined, or no targets exist
    pub current_ip: Option<String>,
    /// `None` when the cycle had no targets
    pub ip_source: Option<IpSource>,
    /// The observed IP matched the cached `last_ip`
    pub unchanged: bool,
    /// One entry per target, in configuration order
    pub outcomes: Vec<TargetOutcome>,
}

impl CycleReport {
    fn idle() -> Self {
        Self {
            current_ip: None,
            ip_source: None,
            unchanged: false,
            outcomes: Vec::new(),
        }
    }

    pub fn attempted(&self) -> impl Iterator<Item = &UpdateRecord> {
        self.outcomes.iter().filter_map(TargetOutcome::record)
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, TargetOutcome::Skipped { .. }))
            .count()
    }
}

/// Single-worker DDNS agent
///
/// ## Lifecycle
///
/// 1. Create with [`AgentRuntime::new()`] (loads the configuration)
/// 2. Start with [`AgentRuntime::run()`]
/// 3. The loop runs until a stop is requested through [`RuntimeSignals`]
/// 4. The state store is closed before `run` returns
///
/// Cycles run sequentially, one target at a time. The configuration is
/// replaced wholesale on reload; a cycle never sees a partial update.
pub struct AgentRuntime {
    settings: Arc<AgentSettings>,
    loader: ConfigLoader,
    config: AgentConfig,
    store: Box<dyn StateStore>,
    http: Box<dyn HttpClient>,
    decryptor: Box<dyn TokenDecryptor>,
}

impl AgentRuntime {
    /// Create a runtime and load the initial configuration
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ConfigMissing`] or [`Error::ConfigInvalid`] if the
    /// configuration source cannot be loaded. Unlike a scheduled reload,
    /// this is fatal.
    pub async fn new(
        settings: Arc<AgentSettings>,
        store: Box<dyn StateStore>,
        http: Box<dyn HttpClient>,
        decryptor: Box<dyn TokenDecryptor>,
    ) -> Result<Self> {
        let mut loader = ConfigLoader::new(
            settings.config_path.clone(),
            settings.default_check_ip_url.clone(),
        );
        let config = loader.load().await?;
        info!(
            "Loaded {} target(s) from {}",
            config.targets.len(),
            loader.path().display()
        );

        Ok(Self {
            settings,
            loader,
            config,
            store,
            http,
            decryptor,
        })
    }

    /// The active configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Reload the configuration if it changed, or unconditionally if `forced`
    ///
    /// Failures are logged and the previous configuration stays active.
    ///
    /// # Returns
    ///
    /// `true` if a new configuration was installed
    pub async fn refresh_config(&mut self, forced: bool) -> bool {
        let loaded = if forced {
            info!("Reload requested; reloading configuration");
            self.loader.load().await.map(Some)
        } else {
            self.loader.load_if_changed().await
        };

        match loaded {
            Ok(Some(config)) => {
                info!("Configuration reloaded: {} target(s)", config.targets.len());
                self.config = config;
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!("Configuration reload failed, keeping previous configuration: {}", e);
                false
            }
        }
    }

    /// Seconds to sleep after a cycle
    ///
    /// `max(30, shortest target interval)`, or 60 with no targets.
    pub fn sleep_interval(&self) -> Duration {
        let secs = self
            .config
            .min_interval_secs()
            .map(|secs| secs.max(MIN_SLEEP_SECS))
            .unwrap_or(IDLE_SLEEP_SECS);
        Duration::from_secs(secs)
    }

    /// Run one update cycle against the active configuration
    ///
    /// # Errors
    ///
    /// Only [`Error::StateStore`]. Per-target writes that fail do not stop
    /// the remaining targets; the first such failure is returned after the
    /// loop.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let config = &self.config;
        if config.targets.is_empty() {
            info!("No targets configured; nothing to update");
            return Ok(CycleReport::idle());
        }

        let (current_ip, ip_source) = self.determine_ip(config).await;

        let cached_ip = self.store.get_cache(LAST_IP_KEY).await?;
        let unchanged = match (&current_ip, &cached_ip) {
            (Some(current), Some(cached)) => !current.is_empty() && current == cached,
            _ => false,
        };

        if unchanged {
            info!("Public IP unchanged; updating only targets not yet synchronized");
        } else if let Some(ip) = &current_ip {
            info!(
                "Public IP is {} (previously {})",
                ip,
                cached_ip.as_deref().unwrap_or("unknown")
            );
            // Written before any target so a crash mid-cycle does not
            // repeat the global change.
            self.store.set_cache(LAST_IP_KEY, ip).await?;
        } else {
            warn!("Public IP unknown; attempting every target without an IP");
        }

        let mut outcomes = Vec::with_capacity(config.targets.len());
        let mut storage_failure: Option<Error> = None;

        for target in &config.targets {
            let key = target_cache_key(&target.id);

            if unchanged {
                if let Some(ip) = &current_ip {
                    match self.store.get_cache(&key).await {
                        Ok(Some(synced)) if synced == *ip => {
                            debug!("Target {} already synchronized to {}, skipping", target.id, ip);
                            outcomes.push(TargetOutcome::Skipped {
                                target_id: target.id.clone(),
                            });
                            continue;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("Failed to read cache for target {}: {}", target.id, e);
                            storage_failure.get_or_insert(e);
                        }
                    }
                }
            }

            let record = self.process_target(target, current_ip.as_deref()).await;

            if record.is_success() {
                info!(
                    "Updated target {} ({}): {}",
                    target.id, target.hostname, record.message
                );
            } else {
                warn!(
                    "Update failed for target {} ({}): {}",
                    target.id, target.hostname, record.message
                );
            }

            if let Err(e) = self.store.log_update(&record).await {
                error!("Failed to record update for target {}: {}", target.id, e);
                storage_failure.get_or_insert(e);
            }

            if record.is_success() {
                if let Some(ip) = &current_ip {
                    if let Err(e) = self.store.set_cache(&key, ip).await {
                        error!("Failed to cache IP for target {}: {}", target.id, e);
                        storage_failure.get_or_insert(e);
                    }
                }
            }

            outcomes.push(TargetOutcome::Attempted(record));
        }

        if let Some(e) = storage_failure {
            return Err(e);
        }

        Ok(CycleReport {
            current_ip,
            ip_source: Some(ip_source),
            unchanged,
            outcomes,
        })
    }

    /// Run cycles until a stop is requested
    ///
    /// A pending reload request forces a reload at the top of the next
    /// cycle; otherwise the source is reloaded only when it changed.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean stop
    /// - `Err(Error)`: A storage failure ended the loop
    pub async fn run(&mut self, signals: &RuntimeSignals) -> Result<()> {
        info!(
            "Agent started with {} target(s)",
            self.config.targets.len()
        );

        let result = loop {
            if signals.is_stop_requested() {
                break Ok(());
            }

            let forced = signals.take_reload();
            self.refresh_config(forced).await;

            if let Err(e) = self.run_cycle().await {
                error!("Update cycle aborted: {}", e);
                break Err(e);
            }

            let interval = self.sleep_interval();
            debug!("Sleeping {}s until the next cycle", interval.as_secs());
            match signals.sleep(interval).await {
                SleepOutcome::Stopped => break Ok(()),
                SleepOutcome::Interrupted => debug!("Sleep interrupted"),
                SleepOutcome::Elapsed => {}
            }
        };

        info!("Stopping agent");
        match self.store.close().await {
            Ok(()) => info!("State store closed, agent stopped"),
            Err(e) => {
                error!("Failed to close state store: {}", e);
                if result.is_ok() {
                    return Err(e);
                }
            }
        }

        result
    }

    async fn determine_ip(&self, config: &AgentConfig) -> (Option<String>, IpSource) {
        if config.manual_ip_enabled {
            if let Some(address) = config.manual_ip() {
                debug!("Using manual IP {}", address);
                return (Some(address.to_string()), IpSource::Manual);
            }
            warn!("Manual IP override is enabled but no address is configured; falling back to automatic lookup");
            return (self.lookup_ip(config).await, IpSource::ManualFallback);
        }

        (self.lookup_ip(config).await, IpSource::Lookup)
    }

    /// Public IP from the check-IP URL; `None` on any failure
    async fn lookup_ip(&self, config: &AgentConfig) -> Option<String> {
        let url = match url_guard::validate(&config.check_ip_url, &self.settings.check_ip_allowlist) {
            Ok(url) => url,
            Err(reason) => {
                warn!("Check-IP URL rejected: {}", reason);
                return None;
            }
        };

        let response = match self.http.get(&url, self.settings.ip_lookup_timeout).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Public IP lookup failed: {}", e);
                return None;
            }
        };

        if !response.is_success() {
            warn!("Public IP lookup returned HTTP {}", response.status);
            return None;
        }

        match response.body.trim().parse::<IpAddr>() {
            Ok(ip) => {
                debug!("Public IP lookup returned {}", ip);
                Some(ip.to_string())
            }
            Err(_) => {
                warn!("Public IP lookup returned a body that is not an IP address");
                None
            }
        }
    }

    /// Attempt one target; every failure becomes an `error` record
    async fn process_target(&self, target: &TargetConfig, ip: Option<&str>) -> UpdateRecord {
        let token = match self.decryptor.decrypt(&target.encrypted_token) {
            Ok(token) => token,
            Err(e) => return UpdateRecord::failure(&target.id, &e, ip),
        };

        let mut record = self
            .send_update(target, &token, ip)
            .await
            .unwrap_or_else(|e| UpdateRecord::failure(&target.id, &e, ip));
        record.message = token.scrub(&record.message);
        record
    }

    async fn send_update(
        &self,
        target: &TargetConfig,
        token: &SecretToken,
        ip: Option<&str>,
    ) -> Result<UpdateRecord> {
        let rendered = render_update_url(
            &target.update_url,
            &UpdateUrlValues {
                token: token.expose(),
                hostname: &target.hostname,
                id: &target.id,
                ip: ip.unwrap_or(""),
            },
        );
        let url = url_guard::validate(&rendered, &self.settings.update_allowlist)?;

        let response = self.http.get(&url, self.settings.update_timeout).await?;
        let interpretation = response::interpret(&response.body, Some(response.status));

        Ok(UpdateRecord::new(
            target.id.clone(),
            interpretation.status,
            interpretation.message,
            Some(response.status),
            ip.map(str::to_string),
        ))
    }
}
