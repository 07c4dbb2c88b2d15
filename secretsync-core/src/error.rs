// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Error Types
//!
//! Errors surfaced by one sync cycle. [`SyncError::NotModified`] is a normal
//! outcome, not a failure; callers check it with [`SyncError::is_not_modified`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::bundle::BundleError;
use crate::config::ConfigError;
use crate::crypto::CryptoError;
use crate::materialize::MaterializeError;
use crate::transport::TransportError;

/// Why the server had nothing new.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotModified {
    /// 304: the bundle did not change since the local copy.
    Unchanged,
    /// 204: no bundle is defined for this device.
    NoConfig,
}

impl fmt::Display for NotModified {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotModified::Unchanged => f.write_str("Config unchanged on server"),
            NotModified::NoConfig => f.write_str("no config defined for device"),
        }
    }
}

/// Sync error types.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    NotModified(NotModified),

    #[error("Unable to get {url} - HTTP_{status}: {body}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Unable to decrypt {name}: {source}")]
    Decrypt {
        name: String,
        #[source]
        source: CryptoError,
    },

    #[error("Invalid config bundle: {0}")]
    Format(String),

    #[error("Unable to apply config: {0}")]
    Materialize(#[from] MaterializeError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// True for the 304/204 outcomes.
    pub fn is_not_modified(&self) -> bool {
        matches!(self, SyncError::NotModified(_))
    }

    /// True when the device key or token cannot be opened. Retrying the
    /// next cycle will not help, so the agent should stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Config(_))
    }
}

impl From<BundleError> for SyncError {
    fn from(err: BundleError) -> Self {
        match err {
            BundleError::Decrypt { name, source } => SyncError::Decrypt { name, source },
            BundleError::Io { path, source } => SyncError::Io { path, source },
            other => SyncError::Format(other.to_string()),
        }
    }
}
