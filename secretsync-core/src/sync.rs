// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Agent
//!
//! Drives one check-in against the config server:
//!
//! 1. open the cycle resources (device key and HTTP client)
//! 2. run pending init hooks
//! 3. conditional GET with `If-Modified-Since` from the persisted bundle
//! 4. on 200: decrypt, materialize, then persist the bundle stamped with the
//!    server's `Date`
//!
//! The persisted bundle is only replaced after every secret file was written,
//! so a failed cycle is retried in full next time.

use std::fs::{File, FileTimes};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::bundle::{decode, decode_file, ConfigSnapshot, DecodeMode};
use crate::config::AgentConfig;
use crate::crypto::CryptoCapability;
use crate::device::DeviceResources;
use crate::error::{NotModified, SyncError};
use crate::hooks::{HookContext, InitHookRegistry};
use crate::materialize::{atomic_write, ApplyReport, Materializer};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Persisted bundle file name inside the config directory.
pub const ENCRYPTED_CONFIG_FILE: &str = "config.encrypted";

/// IMF-fixdate, the only format servers are required to accept.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Resources held for exactly one cycle.
///
/// Dropping the session closes the crypto capability.
pub struct CycleSession {
    pub crypto: Box<dyn CryptoCapability>,
    pub http: Box<dyn HttpTransport>,
}

impl Drop for CycleSession {
    fn drop(&mut self) {
        self.crypto.close();
    }
}

/// Opens fresh cycle resources.
pub trait CycleResources {
    fn open(&self) -> Result<CycleSession, SyncError>;
}

/// Formats a timestamp for `If-Modified-Since`.
pub fn format_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format(HTTP_DATE_FORMAT)
        .to_string()
}

/// Parses a `Date` header value.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(SystemTime::from)
}

fn set_mtime(path: &Path, time: SystemTime) -> std::io::Result<()> {
    let file = File::options().write(true).open(path)?;
    file.set_times(FileTimes::new().set_accessed(time).set_modified(time))
}

/// Secret sync agent.
pub struct Agent {
    config_url: String,
    encrypted_config: PathBuf,
    materializer: Materializer,
    resources: Box<dyn CycleResources>,
    hooks: InitHookRegistry,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("config_url", &self.config_url)
            .field("encrypted_config", &self.encrypted_config)
            .field("materializer", &self.materializer)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn new(
        config_url: impl Into<String>,
        encrypted_config: impl Into<PathBuf>,
        materializer: Materializer,
        resources: impl CycleResources + 'static,
    ) -> Self {
        Agent {
            config_url: config_url.into(),
            encrypted_config: encrypted_config.into(),
            materializer,
            resources: Box::new(resources),
            hooks: InitHookRegistry::new(),
        }
    }

    /// Builds the agent for a device configuration.
    ///
    /// Opens and releases the cycle resources once, so a broken key or token
    /// setup fails here instead of on the first check-in.
    pub fn from_config(config: &AgentConfig) -> Result<Self, SyncError> {
        let resources = DeviceResources::new(config.clone());
        drop(resources.open()?);

        Ok(Self::new(
            config.config_url.clone(),
            config.encrypted_config_path(),
            Materializer::new(&config.secrets_dir),
            resources,
        ))
    }

    pub fn config_url(&self) -> &str {
        &self.config_url
    }

    pub fn encrypted_config(&self) -> &Path {
        &self.encrypted_config
    }

    pub fn hooks(&self) -> &InitHookRegistry {
        &self.hooks
    }

    /// Registry for one-shot init hooks.
    pub fn hooks_mut(&mut self) -> &mut InitHookRegistry {
        &mut self.hooks
    }

    /// Runs one check-in cycle.
    ///
    /// `SyncError::NotModified` means the device is up to date.
    pub fn check_in(&mut self) -> Result<ApplyReport, SyncError> {
        let session = self.resources.open()?;
        self.run_hooks(&session);

        let response = self.fetch(session.http.as_ref())?;
        self.accept(session.crypto.as_ref(), &response)
    }

    /// Runs pending init hooks without checking in.
    pub fn call_init_hooks(&mut self) -> Result<(), SyncError> {
        let session = self.resources.open()?;
        self.run_hooks(&session);
        Ok(())
    }

    /// Materializes the persisted bundle again without contacting the server.
    ///
    /// No previous snapshot is used, so nothing is removed.
    pub fn extract(&self) -> Result<ApplyReport, SyncError> {
        let session = self.resources.open()?;
        let snapshot = decode_file(
            &self.encrypted_config,
            DecodeMode::Decrypt(session.crypto.as_ref()),
        )?;
        Ok(self.materializer.apply(None, &snapshot)?)
    }

    fn run_hooks(&mut self, session: &CycleSession) {
        if self.hooks.is_empty() {
            return;
        }
        let ctx = HookContext {
            crypto: session.crypto.as_ref(),
            http: session.http.as_ref(),
            secrets_dir: self.materializer.secrets_dir(),
            config_url: &self.config_url,
        };
        self.hooks.run(&ctx);
    }

    fn fetch(&self, http: &dyn HttpTransport) -> Result<HttpResponse, SyncError> {
        let mut request = HttpRequest::get(&self.config_url).header("Connection", "close");
        // Don't pull it down unless it changed
        if let Ok(modified) = self.encrypted_config.metadata().and_then(|m| m.modified()) {
            request = request.header("If-Modified-Since", format_http_date(modified));
        }

        let response = http.get(&request)?;
        match response.status {
            200 => Ok(response),
            304 => {
                info!("Config on server has not changed");
                Err(SyncError::NotModified(NotModified::Unchanged))
            }
            204 => {
                info!("Device has no config defined on server");
                Err(SyncError::NotModified(NotModified::NoConfig))
            }
            status => Err(SyncError::Http {
                url: self.config_url.clone(),
                status,
                body: response.body_text(),
            }),
        }
    }

    fn accept(
        &self,
        crypto: &dyn CryptoCapability,
        response: &HttpResponse,
    ) -> Result<ApplyReport, SyncError> {
        let next = decode(&response.body, DecodeMode::Decrypt(crypto))?;
        let prev = self.load_previous()?;
        let report = self.materializer.apply(prev.as_ref(), &next)?;

        atomic_write(&self.encrypted_config, &response.body).map_err(|source| SyncError::Io {
            path: self.encrypted_config.clone(),
            source,
        })?;

        let stamp = match response.header("Date").and_then(parse_http_date) {
            Some(stamp) => stamp,
            None => {
                warn!("Unable to get modtime of config file, defaulting to 'now'");
                SystemTime::now()
            }
        };
        set_mtime(&self.encrypted_config, stamp).map_err(|source| SyncError::Io {
            path: self.encrypted_config.clone(),
            source,
        })?;

        info!(
            written = report.written.len(),
            removed = report.removed.len(),
            "Config updated"
        );
        Ok(report)
    }

    fn load_previous(&self) -> Result<Option<ConfigSnapshot>, SyncError> {
        match decode_file(&self.encrypted_config, DecodeMode::NamesOnly) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => {
                warn!("Unable to load previous config version: {}", e);
                Err(e.into())
            }
        }
    }
}
