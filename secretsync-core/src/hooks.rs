// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! One-shot initialization hooks
//!
//! Components register named hooks that need the cycle's key and HTTP client
//! once, e.g. to enroll with a second service. Each cycle runs every pending
//! hook; a hook that succeeds is dropped, a failing one is retried next cycle.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::path::Path;

use tracing::{error, info};

use crate::crypto::CryptoCapability;
use crate::transport::HttpTransport;

/// Error returned by an init hook.
pub type HookError = Box<dyn Error + Send + Sync>;

type InitHook = Box<dyn FnMut(&HookContext<'_>) -> Result<(), HookError>>;

/// What a hook gets to work with during one cycle.
pub struct HookContext<'a> {
    pub crypto: &'a dyn CryptoCapability,
    pub http: &'a dyn HttpTransport,
    pub secrets_dir: &'a Path,
    pub config_url: &'a str,
}

impl fmt::Debug for HookContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("secrets_dir", &self.secrets_dir)
            .field("config_url", &self.config_url)
            .finish_non_exhaustive()
    }
}

/// Pending init hooks keyed by name.
#[derive(Default)]
pub struct InitHookRegistry {
    hooks: HashMap<String, InitHook>,
}

impl fmt::Debug for InitHookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.hooks.keys()).finish()
    }
}

impl InitHookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook, replacing any pending hook with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, hook: F)
    where
        F: FnMut(&HookContext<'_>) -> Result<(), HookError> + 'static,
    {
        self.hooks.insert(name.into(), Box::new(hook));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every pending hook once, dropping those that succeed.
    ///
    /// No ordering is guaranteed between hooks.
    pub fn run(&mut self, ctx: &HookContext<'_>) {
        self.hooks.retain(|name, hook| {
            info!(hook = %name, "Running initialization");
            match hook(ctx) {
                Ok(()) => false,
                Err(e) => {
                    error!(hook = %name, "Initialization failed: {}", e);
                    true
                }
            }
        });
    }
}
