// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Common Test Utilities
//!
//! Shared fixtures for the agent tests: a device key with a scripted HTTP
//! transport, a hook runner that records instead of spawning, and helpers to
//! build sealed bundles the way the server does.

#![allow(dead_code)]

pub mod strategies;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use p256::PublicKey;
use serde_json::{json, Map, Value};
use tempfile::TempDir;

use secretsync_core::{
    seal, Agent, CycleResources, CycleSession, HardwareToken, HookRunner, Materializer,
    MockTransport, SimulatedToken, SoftwareKey, SyncError,
};

pub const CONFIG_URL: &str = "https://ota.example.com:8443/config";

/// `Date` header used by scripted 200 responses.
pub const SERVER_DATE: &str = "Mon, 02 Jan 2006 15:04:05 GMT";

/// [`SERVER_DATE`] as seconds since the epoch.
pub const SERVER_DATE_SECS: u64 = 1_136_214_245;

/// One entry of a bundle under construction: name, plaintext, hook.
pub type Entry<'a> = (&'a str, &'a str, &'a [&'a str]);

/// Builds a bundle the way the server does: each value sealed to `recipient`.
pub fn sealed_bundle(recipient: &PublicKey, entries: &[Entry<'_>]) -> Vec<u8> {
    let mut bundle = Map::new();
    for (name, plaintext, hook) in entries {
        let mut entry = Map::new();
        entry.insert(
            "Value".to_string(),
            Value::String(seal(recipient, plaintext.as_bytes()).unwrap()),
        );
        if !hook.is_empty() {
            entry.insert("OnChanged".to_string(), json!(hook));
        }
        bundle.insert(name.to_string(), Value::Object(entry));
    }
    serde_json::to_vec(&Value::Object(bundle)).unwrap()
}

/// Hook runner that records `(name, path)` instead of spawning.
#[derive(Debug, Clone, Default)]
pub struct RecordingHooks {
    calls: Arc<Mutex<Vec<(String, PathBuf)>>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the hooks run so far, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl HookRunner for RecordingHooks {
    fn run(&self, name: &str, path: &Path, _command: &[String]) {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), path.to_path_buf()));
    }
}

/// Cycle resources handing out a software key and a shared mock transport.
#[derive(Clone)]
pub struct StaticResources {
    pub key: SoftwareKey,
    pub http: MockTransport,
}

impl CycleResources for StaticResources {
    fn open(&self) -> Result<CycleSession, SyncError> {
        Ok(CycleSession {
            crypto: Box::new(self.key.clone()),
            http: Box::new(self.http.clone()),
        })
    }
}

/// Cycle resources opening a fresh simulated token session per cycle.
///
/// Keeps every session's open flag so tests can check they were closed.
#[derive(Clone)]
pub struct TokenResources {
    pub secret: p256::SecretKey,
    pub http: MockTransport,
    pub sessions: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
}

impl TokenResources {
    pub fn new(http: MockTransport) -> Self {
        let secret = p256::SecretKey::from_slice(&[0x42; 32]).unwrap();
        TokenResources {
            secret,
            http,
            sessions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }

    /// Number of sessions opened and still open.
    pub fn open_sessions(&self) -> (usize, usize) {
        let sessions = self.sessions.lock().unwrap();
        let open = sessions.iter().filter(|s| s.load(Ordering::SeqCst)).count();
        (sessions.len(), open)
    }
}

impl CycleResources for TokenResources {
    fn open(&self) -> Result<CycleSession, SyncError> {
        let token = SimulatedToken::new(self.secret.clone(), b"client-cert".to_vec());
        self.sessions.lock().unwrap().push(token.open_flag());
        Ok(CycleSession {
            crypto: Box::new(HardwareToken::new(Box::new(token))),
            http: Box::new(self.http.clone()),
        })
    }
}

/// Device layout in a temporary directory.
pub struct Fixture {
    pub dir: TempDir,
    pub key: SoftwareKey,
    pub http: MockTransport,
    pub hooks: RecordingHooks,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("secrets")).unwrap();
        Fixture {
            dir,
            key: SoftwareKey::generate().unwrap(),
            http: MockTransport::new(),
            hooks: RecordingHooks::new(),
        }
    }

    pub fn secrets_dir(&self) -> PathBuf {
        self.dir.path().join("secrets")
    }

    pub fn secret(&self, name: &str) -> PathBuf {
        self.secrets_dir().join(name)
    }

    pub fn encrypted_config(&self) -> PathBuf {
        self.dir.path().join("config.encrypted")
    }

    pub fn read_secret(&self, name: &str) -> Option<String> {
        fs::read_to_string(self.secret(name)).ok()
    }

    /// Bundle sealed to this fixture's device key.
    pub fn bundle(&self, entries: &[Entry<'_>]) -> Vec<u8> {
        sealed_bundle(&self.key.public_key(), entries)
    }

    pub fn materializer(&self) -> Materializer {
        Materializer::new(self.secrets_dir()).with_hook_runner(self.hooks.clone())
    }

    pub fn agent(&self) -> Agent {
        Agent::new(
            CONFIG_URL,
            self.encrypted_config(),
            self.materializer(),
            StaticResources {
                key: self.key.clone(),
                http: self.http.clone(),
            },
        )
    }

    /// Sorted file names in the secrets directory.
    pub fn secret_files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.secrets_dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
