// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for the encrypted bundle codec

mod common;

use std::cell::Cell;

use secretsync_core::{
    decode, decode_file, BundleError, CryptoCapability, CryptoError, DecodeMode, SoftwareKey,
};

use common::sealed_bundle;

/// Capability that counts decrypt calls and refuses them all.
#[derive(Default)]
struct CountingCapability {
    calls: Cell<usize>,
}

impl CryptoCapability for CountingCapability {
    fn decrypt(&self, _ciphertext: &str) -> Result<Vec<u8>, CryptoError> {
        self.calls.set(self.calls.get() + 1);
        Err(CryptoError::DecryptionFailed)
    }

    fn close(&mut self) {}
}

#[test]
fn test_decrypt_mode_decrypts_every_entry() {
    let key = SoftwareKey::generate().unwrap();
    let raw = sealed_bundle(
        &key.public_key(),
        &[
            ("a.conf", "alpha", &[]),
            ("b.conf", "bravo", &["/usr/bin/systemctl", "restart", "b"]),
        ],
    );

    let snapshot = decode(&raw, DecodeMode::Decrypt(&key)).unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.get("a.conf").unwrap().value, b"alpha");
    assert!(snapshot.get("a.conf").unwrap().on_changed.is_empty());
    assert_eq!(snapshot.get("b.conf").unwrap().value, b"bravo");
    assert_eq!(
        snapshot.get("b.conf").unwrap().on_changed,
        vec!["/usr/bin/systemctl", "restart", "b"]
    );
}

#[test]
fn test_one_bad_entry_fails_whole_decode() {
    let key = SoftwareKey::generate().unwrap();
    let stranger = SoftwareKey::generate().unwrap();

    let good = sealed_bundle(&key.public_key(), &[("good", "ok", &[])]);
    let bad = sealed_bundle(&stranger.public_key(), &[("bad", "nope", &[])]);

    // Merge both objects into one bundle
    let mut merged: serde_json::Map<String, serde_json::Value> =
        serde_json::from_slice(&good).unwrap();
    let bad: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&bad).unwrap();
    merged.extend(bad);
    let raw = serde_json::to_vec(&merged).unwrap();

    match decode(&raw, DecodeMode::Decrypt(&key)) {
        Err(BundleError::Decrypt { name, source }) => {
            assert_eq!(name, "bad");
            assert_eq!(source, CryptoError::DecryptionFailed);
        }
        other => panic!("expected decrypt failure, got {:?}", other),
    }
}

#[test]
fn test_names_only_never_touches_capability() {
    let key = SoftwareKey::generate().unwrap();
    let raw = sealed_bundle(&key.public_key(), &[("a", "1", &[]), ("b", "2", &[])]);

    let counting = CountingCapability::default();
    let snapshot = decode(&raw, DecodeMode::NamesOnly).unwrap();
    assert_eq!(snapshot.names().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(counting.calls.get(), 0);

    // The same bundle through the refusing capability fails on first use
    assert!(decode(&raw, DecodeMode::Decrypt(&counting)).is_err());
    assert_eq!(counting.calls.get(), 1);
}

#[test]
fn test_empty_bundle() {
    let snapshot = decode(b"{}", DecodeMode::NamesOnly).unwrap();
    assert!(snapshot.is_empty());
}

#[test]
fn test_rejects_value_of_wrong_type() {
    let err = decode(br#"{"a": {"Value": 42}}"#, DecodeMode::NamesOnly).unwrap_err();
    assert!(matches!(err, BundleError::Malformed(_)));
}

#[test]
fn test_rejects_separator_in_name() {
    assert!(decode(br#"{"a\\b": {"Value": "x"}}"#, DecodeMode::NamesOnly).is_err());
    assert!(decode(br#"{"sub/a": {"Value": "x"}}"#, DecodeMode::NamesOnly).is_err());
    assert!(decode(br#"{".": {"Value": "x"}}"#, DecodeMode::NamesOnly).is_err());
}

#[test]
fn test_rejects_temp_suffix_in_name() {
    let raw = br#"{"a.conf": {"Value": "x"}, "a.conf.tmp": {"Value": "y"}}"#;
    let err = decode(raw, DecodeMode::NamesOnly).unwrap_err();
    assert!(err.to_string().contains("a.conf.tmp"));
}

#[test]
fn test_decode_file_reads_persisted_bundle() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("config.encrypted");
    std::fs::write(&path, br#"{"token": {"Value": "c2VhbGVk"}}"#).unwrap();

    let snapshot = decode_file(&path, DecodeMode::NamesOnly).unwrap();
    assert!(snapshot.contains("token"));
}
