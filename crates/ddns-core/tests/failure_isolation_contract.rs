//! Contract Test: Failure Isolation & Secret Handling
//!
//! This test verifies that one broken target never takes the others down,
//! and that decrypted tokens never reach durable state.
//!
//! Constraints verified:
//! - Rejected URLs are recorded without any network call
//! - Decryption failures are recorded and the loop continues
//! - Transport failures keep their message and response code
//! - Tokens echoed by a provider or a transport error are scrubbed
//! - Storage failures surface as errors, after the remaining targets ran

mod common;

use common::*;
use ddns_core::engine::RuntimeSignals;
use ddns_core::error::Error;
use ddns_core::traits::UpdateStatus;
use ddns_core::url_guard::{HostAllowlist, UrlRejection};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn loopback_update_url_is_rejected_without_network_call() {
    let mut loopback = target("1", "www", "tok-1", 300);
    loopback["update_url"] = json!("https://127.0.0.1/update?host={hostname}&password={token}");
    let config = config_with(vec![loopback, target("2", "@", "tok-2", 300)]);
    let harness = Harness::new(&config, Some("203.0.113.5"));
    let runtime = harness.runtime().await;

    let report = assert_ok!(runtime.run_cycle().await);
    assert_eq!(report.attempted().count(), 2);

    assert!(harness.http.requests_to("https://127.0.0.1").is_empty());
    assert_eq!(harness.update_requests().len(), 1);

    let history = harness.history().await;
    assert_eq!(history[0].target_id, "1");
    assert_eq!(history[0].status, UpdateStatus::Error);
    assert_eq!(history[0].response_code, None);
    assert_eq!(
        history[0].message,
        UrlRejection::HostRejected("127.0.0.1".to_string()).to_string()
    );

    assert_eq!(history[1].target_id, "2");
    assert_eq!(history[1].status, UpdateStatus::Success);
}

#[tokio::test]
async fn host_outside_allowlist_is_rejected() {
    let config = config_with(vec![target("1", "www", "tok-1", 300)]);
    let harness = Harness::new(&config, Some("203.0.113.5"));
    let mut settings = harness.settings();
    settings.update_allowlist = HostAllowlist::from_hosts(["dynamicdns.park-your-domain.com"]);
    let runtime = harness.runtime_with(settings).await;

    assert_ok!(runtime.run_cycle().await);

    assert!(harness.update_requests().is_empty());
    let history = harness.history().await;
    assert_eq!(history[0].status, UpdateStatus::Error);
    assert!(history[0].message.contains("not in the allowlist"));
}

#[tokio::test]
async fn plain_http_update_url_is_rejected() {
    let mut insecure = target("1", "www", "tok-1", 300);
    insecure["update_url"] = json!("http://dyn.example.com/update?password={token}");
    let harness = Harness::new(&config_with(vec![insecure]), Some("203.0.113.5"));
    let runtime = harness.runtime().await;

    assert_ok!(runtime.run_cycle().await);

    assert_eq!(harness.http.requests_to("http://").len(), 0);
    let history = harness.history().await;
    assert_eq!(
        history[0].message,
        UrlRejection::SchemeRejected("http".to_string()).to_string()
    );
}

#[tokio::test]
async fn undecryptable_token_fails_only_its_target() {
    let mut broken = target("1", "www", "tok-1", 300);
    broken["encrypted_token"] = json!("deadbeef");
    let config = config_with(vec![broken, target("2", "@", "tok-2", 300)]);
    let harness = Harness::new(&config, Some("203.0.113.5"));
    let runtime = harness.runtime().await;

    assert_ok!(runtime.run_cycle().await);

    let updates = harness.update_requests();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].contains("host=@"));

    let history = harness.history().await;
    assert_eq!(history[0].status, UpdateStatus::Error);
    assert!(history[0].message.starts_with("Token decryption failed"));
    assert_eq!(history[1].status, UpdateStatus::Success);
}

#[tokio::test]
async fn transport_failure_keeps_message_and_status() {
    let config = config_with(vec![target("1", "www", "tok-1", 300)]);
    let harness = Harness::new(&config, Some("203.0.113.5"));
    harness.http.set_route(
        UPDATE_BASE,
        Reply::Fail {
            message: "error decoding response body".to_string(),
            status: Some(502),
        },
    );
    let runtime = harness.runtime().await;

    assert_ok!(runtime.run_cycle().await);

    let history = harness.history().await;
    assert_eq!(history[0].status, UpdateStatus::Error);
    assert_eq!(history[0].message, "error decoding response body");
    assert_eq!(history[0].response_code, Some(502));
}

#[tokio::test]
async fn echoed_token_never_reaches_history_or_cache() {
    let token = "s3cret-ddns-password";
    let config = config_with(vec![target("1", "www", token, 300), target("2", "@", token, 300)]);
    let harness = Harness::new(&config, Some("203.0.113.5"));
    harness.http.set_route(
        &format!("{UPDATE_BASE}?host=www"),
        Reply::ok(&format!(
            "<r><ErrCount>1</ErrCount><Err1>bad password {token}</Err1></r>"
        )),
    );
    harness.http.set_route(
        &format!("{UPDATE_BASE}?host=@"),
        Reply::fail(&format!("connection closed while requesting password={token}")),
    );
    let runtime = harness.runtime().await;

    assert_ok!(runtime.run_cycle().await);

    // The token did go out on the wire
    assert!(harness.update_requests().iter().all(|url| url.contains(token)));

    let history = harness.history().await;
    assert_eq!(history.len(), 2);
    for record in &history {
        assert!(!record.message.contains(token), "{}", record.message);
        assert!(record.message.contains("[REDACTED]"));
    }

    let cache = harness.store.memory().cache_snapshot().await;
    assert!(cache.values().all(|value| !value.contains(token)));
}

#[tokio::test]
async fn decryptor_failure_for_all_targets_still_records_each() {
    let config = config_with(vec![target("1", "www", "tok-1", 300), target("2", "@", "tok-2", 300)]);
    let harness = Harness::new(&config, Some("203.0.113.5"));
    let runtime = ddns_core::AgentRuntime::new(
        std::sync::Arc::new(harness.settings()),
        Box::new(harness.store.clone()),
        Box::new(harness.http.clone()),
        Box::new(BrokenDecryptor),
    )
    .await
    .unwrap();

    assert_ok!(runtime.run_cycle().await);

    assert!(harness.update_requests().is_empty());
    let history = harness.history().await;
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|r| r.status == UpdateStatus::Error));
}

#[tokio::test]
async fn failed_history_write_does_not_stop_remaining_targets() {
    let config = config_with(vec![target("1", "www", "tok-1", 300), target("2", "@", "tok-2", 300)]);
    let harness = Harness::new(&config, Some("203.0.113.5"));
    harness.store.fail_log_for("1");
    let runtime = harness.runtime().await;

    let err = assert_err!(runtime.run_cycle().await);
    assert!(err.is_storage_failure());

    // Both targets were contacted; the second one was recorded
    assert_eq!(harness.update_requests().len(), 2);
    let history = harness.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].target_id, "2");
    assert_eq!(harness.store.failed_writes(), 1);
}

#[tokio::test]
async fn unreadable_cache_aborts_before_any_target() {
    let config = config_with(vec![target("1", "www", "tok-1", 300)]);
    let harness = Harness::new(&config, Some("203.0.113.5"));
    harness.store.fail_cache_reads();
    let runtime = harness.runtime().await;

    let err = assert_err!(runtime.run_cycle().await);
    assert!(matches!(err, Error::StateStore(_)));
    assert!(harness.update_requests().is_empty());
}

#[tokio::test]
async fn storage_failure_ends_the_loop_and_closes_the_store() {
    let config = config_with(vec![target("1", "www", "tok-1", 300)]);
    let harness = Harness::new(&config, Some("203.0.113.5"));
    harness.store.fail_all_writes();
    let mut runtime = harness.runtime().await;

    let signals = RuntimeSignals::new();
    let result = tokio::time::timeout(std::time::Duration::from_secs(5), runtime.run(&signals))
        .await
        .unwrap();

    assert!(matches!(result, Err(Error::StateStore(_))));
    assert!(harness.store.is_closed());
}
