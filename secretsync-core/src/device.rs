// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device cycle resources built from the agent configuration.

use std::fs;
use std::path::Path;

use tracing::debug;
use zeroize::Zeroizing;

use crate::config::{AgentConfig, ConfigError, KeySource};
use crate::crypto::SoftwareKey;
use crate::error::SyncError;
use crate::sync::{CycleResources, CycleSession};
use crate::tls;
use crate::transport::ReqwestTransport;

/// Opens the configured device key and a mutual-TLS client per cycle.
#[derive(Debug, Clone)]
pub struct DeviceResources {
    config: AgentConfig,
}

impl DeviceResources {
    pub fn new(config: AgentConfig) -> Self {
        DeviceResources { config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn transport(&self, tls: rustls::ClientConfig) -> Result<ReqwestTransport, ConfigError> {
        ReqwestTransport::new(tls, self.config.timeout).map_err(|e| ConfigError::Tls(e.to_string()))
    }

    fn open_file(
        &self,
        client_cert: &Path,
        client_key: &Path,
    ) -> Result<CycleSession, ConfigError> {
        let pem = fs::read_to_string(client_key)
            .map(Zeroizing::new)
            .map_err(|source| ConfigError::Read {
                path: client_key.to_path_buf(),
                source,
            })?;
        let key = SoftwareKey::from_pem(&pem).map_err(ConfigError::Key)?;

        let tls = tls::file_client_config(&self.config.ca_file, client_cert, client_key)?;
        debug!("Opened file-backed device key");
        Ok(CycleSession {
            crypto: Box::new(key),
            http: Box::new(self.transport(tls)?),
        })
    }

    #[cfg(feature = "pkcs11")]
    fn open_token(&self, settings: &crate::crypto::TokenSettings) -> Result<CycleSession, ConfigError> {
        use crate::crypto::HardwareToken;

        let token = HardwareToken::open(settings).map_err(ConfigError::Token)?;
        let certificate = token
            .certificate_der()
            .ok_or(ConfigError::Token(crate::crypto::CryptoError::Closed))?;
        let tls = tls::token_client_config(&self.config.ca_file, token.shared_session(), certificate)?;
        debug!(label = %settings.label, "Opened token-backed device key");
        Ok(CycleSession {
            crypto: Box::new(token),
            http: Box::new(self.transport(tls)?),
        })
    }

    #[cfg(not(feature = "pkcs11"))]
    fn open_token(&self, _settings: &crate::crypto::TokenSettings) -> Result<CycleSession, ConfigError> {
        Err(ConfigError::Unsupported(
            "built without PKCS#11 support".to_string(),
        ))
    }
}

impl CycleResources for DeviceResources {
    fn open(&self) -> Result<CycleSession, SyncError> {
        let session = match &self.config.key_source {
            KeySource::File {
                client_cert,
                client_key,
            } => self.open_file(client_cert, client_key)?,
            KeySource::Pkcs11(settings) => self.open_token(settings)?,
        };
        Ok(session)
    }
}
