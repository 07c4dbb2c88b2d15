// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Agent configuration
//!
//! Read from the device's `sota.toml`, the same file the update client uses.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::crypto::{parse_key_id, CryptoError, TokenSettings};
use crate::sync::ENCRYPTED_CONFIG_FILE;
use crate::transport::DEFAULT_TIMEOUT;

/// Environment variable overriding the config URL.
pub const CONFIG_URL_ENV: &str = "CONFIG_URL";

/// Agent configuration file name inside the config directory.
pub const SOTA_TOML: &str = "sota.toml";

/// Server used when `tls.server` is not set.
pub const DEFAULT_SERVER: &str = "https://ota-lite.foundries.io:8443";

/// Label of the token holding the device key.
pub const DEFAULT_TOKEN_LABEL: &str = "aktualizr";

#[derive(Debug, Default, Deserialize)]
struct SotaToml {
    #[serde(default)]
    tls: TlsTable,
    #[serde(default)]
    import: ImportTable,
    #[serde(default)]
    p11: P11Table,
}

#[derive(Debug, Default, Deserialize)]
struct TlsTable {
    server: Option<String>,
    ca_source: Option<String>,
    pkey_source: Option<String>,
    cert_source: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ImportTable {
    tls_cacert_path: Option<String>,
    tls_clientcert_path: Option<String>,
    tls_pkey_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct P11Table {
    module: Option<String>,
    pass: Option<String>,
    label: Option<String>,
    tls_pkey_id: Option<String>,
    tls_clientcert_id: Option<String>,
}

/// Returns a required value, treating empty strings as missing.
fn required<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str, ConfigError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(key)),
    }
}

/// Where the device key and client certificate live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// PEM files on disk.
    File {
        client_cert: PathBuf,
        client_key: PathBuf,
    },
    /// PKCS#11 token.
    Pkcs11(TokenSettings),
}

impl KeySource {
    fn from_sota(sota: &SotaToml) -> Result<Self, ConfigError> {
        let ca_source = required(&sota.tls.ca_source, "tls.ca_source")?;
        if ca_source != "file" {
            return Err(ConfigError::InvalidValue {
                key: "tls.ca_source",
                value: ca_source.to_string(),
            });
        }

        let pkey_source = normalize_source(required(&sota.tls.pkey_source, "tls.pkey_source")?)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "tls.pkey_source",
                value: sota.tls.pkey_source.clone().unwrap_or_default(),
            })?;
        let cert_source = required(&sota.tls.cert_source, "tls.cert_source")?;
        if normalize_source(cert_source) != Some(pkey_source) {
            return Err(ConfigError::InvalidValue {
                key: "tls.cert_source",
                value: cert_source.to_string(),
            });
        }

        if pkey_source == "file" {
            return Ok(KeySource::File {
                client_cert: PathBuf::from(required(
                    &sota.import.tls_clientcert_path,
                    "import.tls_clientcert_path",
                )?),
                client_key: PathBuf::from(required(
                    &sota.import.tls_pkey_path,
                    "import.tls_pkey_path",
                )?),
            });
        }

        let p11 = &sota.p11;
        let settings = TokenSettings {
            module: PathBuf::from(required(&p11.module, "p11.module")?),
            pin: required(&p11.pass, "p11.pass")?.to_string(),
            label: p11
                .label
                .clone()
                .filter(|label| !label.is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_LABEL.to_string()),
            key_id: parse_key_id(required(&p11.tls_pkey_id, "p11.tls_pkey_id")?)
                .map_err(ConfigError::Key)?,
            cert_id: parse_key_id(required(&p11.tls_clientcert_id, "p11.tls_clientcert_id")?)
                .map_err(ConfigError::Key)?,
        };
        Ok(KeySource::Pkcs11(settings))
    }

    /// Returns true for token-backed keys.
    pub fn is_token(&self) -> bool {
        matches!(self, KeySource::Pkcs11(_))
    }
}

fn normalize_source(source: &str) -> Option<&'static str> {
    match source {
        "file" => Some("file"),
        "pkcs11" | "token" => Some("pkcs11"),
        _ => None,
    }
}

/// Configuration for the sync agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Directory holding `sota.toml` and the persisted bundle
    pub config_dir: PathBuf,

    /// Directory the secret files are materialized into
    pub secrets_dir: PathBuf,

    /// Full URL of the config endpoint
    pub config_url: String,

    /// CA bundle used to verify the server
    pub ca_file: PathBuf,

    /// Device key and client certificate location
    pub key_source: KeySource,

    /// HTTP timeout per request
    pub timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("/var/sota"),
            secrets_dir: PathBuf::from("/var/run/secrets"),
            config_url: format!("{}/config", DEFAULT_SERVER),
            ca_file: PathBuf::from("/var/sota/root.crt"),
            key_source: KeySource::File {
                client_cert: PathBuf::from("/var/sota/client.pem"),
                client_key: PathBuf::from("/var/sota/pkey.pem"),
            },
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl AgentConfig {
    /// Loads `<config_dir>/sota.toml`, honoring `CONFIG_URL` from the environment.
    pub fn load(config_dir: &Path, secrets_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(SOTA_TOML);
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let url_override = std::env::var(CONFIG_URL_ENV)
            .ok()
            .filter(|url| !url.is_empty());
        Self::from_toml_str(&text, config_dir, secrets_dir, url_override)
    }

    /// Parses `sota.toml` content.
    ///
    /// `url_override` replaces `<tls.server>/config` when set.
    pub fn from_toml_str(
        text: &str,
        config_dir: &Path,
        secrets_dir: &Path,
        url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let sota: SotaToml = toml::from_str(text)?;
        let key_source = KeySource::from_sota(&sota)?;
        let ca_file = PathBuf::from(required(
            &sota.import.tls_cacert_path,
            "import.tls_cacert_path",
        )?);

        let config_url = match url_override {
            Some(url) => url,
            None => {
                let server = sota
                    .tls
                    .server
                    .as_deref()
                    .filter(|server| !server.is_empty())
                    .unwrap_or(DEFAULT_SERVER);
                format!("{}/config", server)
            }
        };

        Ok(Self {
            config_dir: config_dir.to_path_buf(),
            secrets_dir: secrets_dir.to_path_buf(),
            config_url,
            ca_file,
            key_source,
            ..Self::default()
        })
    }

    /// Path of the persisted bundle.
    pub fn encrypted_config_path(&self) -> PathBuf {
        self.config_dir.join(ENCRYPTED_CONFIG_FILE)
    }

    /// Override the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the config URL
    pub fn with_config_url(mut self, url: impl Into<String>) -> Self {
        self.config_url = url.into();
        self
    }

    /// Override the secrets directory
    pub fn with_secrets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.secrets_dir = dir.into();
        self
    }
}

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to decode sota.toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing {0} in sota.toml")]
    Missing(&'static str),

    #[error("Invalid value {value} in sota.toml for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid key: {0}")]
    Key(CryptoError),

    #[error("Unable to open token: {0}")]
    Token(CryptoError),

    #[error("Invalid TLS configuration: {0}")]
    Tls(String),

    #[error("Unsupported configuration: {0}")]
    Unsupported(String),
}
