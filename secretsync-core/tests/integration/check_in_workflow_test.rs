// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Check-in Workflow Integration Tests
//!
//! A device lifecycle: no config yet, first bundle, unchanged, rotation,
//! and finally every secret withdrawn.

use std::fs;

use secretsync_core::{HttpResponse, NotModified, SyncError};

use crate::common::{Fixture, SERVER_DATE};

fn ok(body: Vec<u8>) -> HttpResponse {
    HttpResponse::new(200)
        .with_header("Date", SERVER_DATE)
        .with_body(body)
}

/// Test: Full device lifecycle across cycles
#[test]
fn test_device_lifecycle() {
    let fx = Fixture::new();
    let mut agent = fx.agent();

    // Device not yet assigned any config
    fx.http.respond(HttpResponse::new(204));
    assert!(matches!(
        agent.check_in(),
        Err(SyncError::NotModified(NotModified::NoConfig))
    ));

    // First bundle
    fx.http.respond(ok(fx.bundle(&[
        ("mqtt.conf", "user=dev\npass=one\n", &["/usr/bin/systemctl", "restart", "mqtt"]),
        ("api.token", "tok-1", &[]),
    ])));
    let report = agent.check_in().unwrap();
    assert_eq!(report.written, vec!["api.token", "mqtt.conf"]);
    assert_eq!(fx.hooks.names(), vec!["mqtt.conf"]);
    fx.hooks.clear();

    // Nothing new
    fx.http.respond(HttpResponse::new(304));
    assert!(agent.check_in().unwrap_err().is_not_modified());

    // Token rotated, MQTT password unchanged
    fx.http.respond(ok(fx.bundle(&[
        ("mqtt.conf", "user=dev\npass=one\n", &["/usr/bin/systemctl", "restart", "mqtt"]),
        ("api.token", "tok-2", &[]),
    ])));
    let report = agent.check_in().unwrap();
    assert_eq!(report.written, vec!["api.token"]);
    assert!(fx.hooks.names().is_empty());
    assert_eq!(fx.read_secret("api.token").unwrap(), "tok-2");

    // Everything withdrawn
    fx.http.respond(ok(b"{}".to_vec()));
    let report = agent.check_in().unwrap();
    assert_eq!(report.removed, vec!["api.token", "mqtt.conf"]);
    assert!(fx.secret_files().is_empty());
    assert_eq!(fx.hooks.names(), vec!["mqtt.conf"]);
    assert_eq!(fs::read(fx.encrypted_config()).unwrap(), b"{}");

    // Every conditional request after the first bundle carried the stamp
    let requests = fx.http.requests();
    assert_eq!(requests.len(), 5);
    assert!(requests[0].header_value("If-Modified-Since").is_none());
    assert!(requests[1].header_value("If-Modified-Since").is_none());
    for request in &requests[2..] {
        assert_eq!(request.header_value("If-Modified-Since"), Some(SERVER_DATE));
    }
}

/// Test: A failed cycle is retried in full by the next one
#[test]
fn test_failed_cycle_is_retried() {
    let fx = Fixture::new();
    let mut agent = fx.agent();
    let body = fx.bundle(&[("a.conf", "alpha", &["/bin/true"])]);

    // Secrets dir missing: nothing persisted, so the next cycle is unconditional
    fs::remove_dir(fx.secrets_dir()).unwrap();
    fx.http.respond(ok(body.clone()));
    assert!(agent.check_in().is_err());
    assert!(!fx.encrypted_config().exists());

    fs::create_dir(fx.secrets_dir()).unwrap();
    fx.http.respond(ok(body));
    agent.check_in().unwrap();

    assert_eq!(fx.read_secret("a.conf").unwrap(), "alpha");
    assert_eq!(fx.hooks.names(), vec!["a.conf"]);
    assert!(fx.http.requests()[1]
        .header_value("If-Modified-Since")
        .is_none());
}
