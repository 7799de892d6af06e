//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles that let the runtime be driven
//! without network access:
//! - [`ScriptedHttpClient`]: canned responses chosen by URL prefix, recording
//!   every URL requested
//! - [`FlakyStateStore`]: a memory store whose writes can be made to fail
//! - Config helpers that write a configuration source with a fresh
//!   modification time

#![allow(dead_code)]

use async_trait::async_trait;
use ddns_core::error::{Error, Result};
use ddns_core::traits::{
    CacheEntry, HttpClient, HttpResponse, StateStore, TokenDecryptor, UpdateRecord,
};
use ddns_core::{AesGcmTokenCipher, AgentRuntime, AgentSettings, MemoryStateStore};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use url::Url;

/// Master key shared by every contract test
pub const MASTER_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

pub const CHECK_IP_URL: &str = "https://ip.example.net/";
pub const UPDATE_BASE: &str = "https://dyn.example.com/update";

pub const NAMECHEAP_OK: &str = "<interface-response><ErrCount>0</ErrCount><Done>true</Done></interface-response>";

/// Canned reply for one URL prefix
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(HttpResponse),
    Fail { message: String, status: Option<u16> },
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Reply::Respond(HttpResponse::new(200, body))
    }

    pub fn status(status: u16, body: &str) -> Self {
        Reply::Respond(HttpResponse::new(status, body))
    }

    pub fn fail(message: &str) -> Self {
        Reply::Fail {
            message: message.to_string(),
            status: None,
        }
    }
}

/// An HttpClient that answers from a script and records every request
///
/// Clones share the script and the request log.
#[derive(Debug, Clone, Default)]
pub struct ScriptedHttpClient {
    routes: Arc<Mutex<Vec<(String, Reply)>>>,
    requests: Arc<Mutex<Vec<String>>>,
    timeouts: Arc<Mutex<Vec<Duration>>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests whose URL starts with `prefix`
    ///
    /// Later routes take precedence over earlier ones.
    pub fn route(self, prefix: &str, reply: Reply) -> Self {
        self.set_route(prefix, reply);
        self
    }

    pub fn set_route(&self, prefix: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .insert(0, (prefix.to_string(), reply));
    }

    /// Every requested URL, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests whose URL starts with `prefix`
    pub fn requests_to(&self, prefix: &str) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|url| url.starts_with(prefix))
            .collect()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn get(&self, url: &Url, timeout: Duration) -> Result<HttpResponse> {
        let url = url.as_str().to_string();
        self.requests.lock().unwrap().push(url.clone());
        self.timeouts.lock().unwrap().push(timeout);

        let reply = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail { message, status }) => Err(Error::Network { message, status }),
            None => Err(Error::network("connection refused")),
        }
    }
}

/// A memory state store whose writes can be made to fail
#[derive(Debug, Clone, Default)]
pub struct FlakyStateStore {
    inner: MemoryStateStore,
    fail_all_writes: Arc<AtomicBool>,
    fail_cache_reads: Arc<AtomicBool>,
    fail_log_for: Arc<Mutex<HashSet<String>>>,
    failed_writes: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl FlakyStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying store, for inspecting what was written
    pub fn memory(&self) -> &MemoryStateStore {
        &self.inner
    }

    pub fn fail_all_writes(&self) {
        self.fail_all_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_cache_reads(&self) {
        self.fail_cache_reads.store(true, Ordering::SeqCst);
    }

    /// Fail `log_update` for one target only
    pub fn fail_log_for(&self, target_id: &str) {
        self.fail_log_for
            .lock()
            .unwrap()
            .insert(target_id.to_string());
    }

    pub fn failed_writes(&self) -> usize {
        self.failed_writes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn write_failure(&self) -> Error {
        self.failed_writes.fetch_add(1, Ordering::SeqCst);
        Error::state_store("disk I/O error")
    }
}

#[async_trait]
impl StateStore for FlakyStateStore {
    async fn log_update(&self, record: &UpdateRecord) -> Result<()> {
        if self.fail_all_writes.load(Ordering::SeqCst)
            || self.fail_log_for.lock().unwrap().contains(&record.target_id)
        {
            return Err(self.write_failure());
        }
        self.inner.log_update(record).await
    }

    async fn cache_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        if self.fail_cache_reads.load(Ordering::SeqCst) {
            return Err(Error::state_store("database is locked"));
        }
        self.inner.cache_entry(key).await
    }

    async fn set_cache(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_all_writes.load(Ordering::SeqCst) {
            return Err(self.write_failure());
        }
        self.inner.set_cache(key, value).await
    }

    async fn recent_updates(&self, limit: usize) -> Result<Vec<UpdateRecord>> {
        self.inner.recent_updates(limit).await
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.inner.close().await
    }
}

/// A decryptor that always fails
pub struct BrokenDecryptor;

impl TokenDecryptor for BrokenDecryptor {
    fn decrypt(&self, _ciphertext: &str) -> Result<ddns_core::traits::SecretToken> {
        Err(Error::decryption("ciphertext was tampered with or the key is wrong"))
    }
}

pub fn cipher() -> AesGcmTokenCipher {
    AesGcmTokenCipher::from_hex_key(MASTER_KEY).unwrap()
}

pub fn encrypt(token: &str) -> String {
    cipher().encrypt(token).unwrap()
}

/// Settings pointing at `dir`, using the test key and default timeouts
pub fn settings_in(dir: &Path) -> AgentSettings {
    AgentSettings::new(dir.join("config.json"), dir.join("agent.db"), MASTER_KEY)
}

/// A target entry using a Namecheap-style update URL
pub fn target(id: &str, hostname: &str, token: &str, interval: u64) -> Value {
    json!({
        "id": id,
        "hostname": hostname,
        "update_url": format!("{UPDATE_BASE}?host={{hostname}}&password={{token}}&ip={{ip}}"),
        "encrypted_token": encrypt(token),
        "interval": interval,
    })
}

/// A configuration using automatic lookup against [`CHECK_IP_URL`]
pub fn config_with(targets: Vec<Value>) -> Value {
    json!({
        "check_ip_url": CHECK_IP_URL,
        "manual_ip_enabled": false,
        "manual_ip_address": null,
        "targets": targets,
    })
}

/// Write a configuration source, guaranteeing a new fingerprint
pub fn write_config(path: &Path, config: &Value) {
    write_raw_config(path, &serde_json::to_string_pretty(config).unwrap());
}

pub fn write_raw_config(path: &Path, text: &str) {
    let previous = std::fs::metadata(path).and_then(|m| m.modified()).ok();
    std::fs::write(path, text).unwrap();

    let now = SystemTime::now();
    let modified = match previous {
        Some(previous) if previous + Duration::from_secs(1) > now => {
            previous + Duration::from_secs(1)
        }
        _ => now,
    };
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(modified)
        .unwrap();
}

/// Everything a contract test needs to drive a runtime
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub http: ScriptedHttpClient,
    pub store: FlakyStateStore,
}

impl Harness {
    /// A harness whose configuration source holds `config`
    ///
    /// The check-IP URL answers `ip` unless `ip` is `None`.
    pub fn new(config: &Value, ip: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        write_config(&dir.path().join("config.json"), config);

        let http = ScriptedHttpClient::new().route(UPDATE_BASE, Reply::ok(NAMECHEAP_OK));
        let http = match ip {
            Some(ip) => http.route(CHECK_IP_URL, Reply::ok(ip)),
            None => http.route(CHECK_IP_URL, Reply::fail("operation timed out")),
        };

        Self {
            dir,
            http,
            store: FlakyStateStore::new(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.json")
    }

    pub fn settings(&self) -> AgentSettings {
        settings_in(self.dir.path())
    }

    pub async fn runtime(&self) -> AgentRuntime {
        self.runtime_with(self.settings()).await
    }

    pub async fn runtime_with(&self, settings: AgentSettings) -> AgentRuntime {
        AgentRuntime::new(
            Arc::new(settings),
            Box::new(self.store.clone()),
            Box::new(self.http.clone()),
            Box::new(cipher()),
        )
        .await
        .unwrap()
    }

    /// Update requests only, excluding IP lookups
    pub fn update_requests(&self) -> Vec<String> {
        self.http.requests_to(UPDATE_BASE)
    }

    pub async fn history(&self) -> Vec<UpdateRecord> {
        self.store.memory().history().await
    }
}
