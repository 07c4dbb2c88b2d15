// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mutual TLS client configuration
//!
//! The server is verified against the configured CA bundle only (no system
//! roots). The client authenticates either with a PEM certificate and key
//! or with a certificate and key held in a PKCS#11 token. In token mode every
//! handshake signature is computed by the token through the session shared
//! with the decryption capability.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use p256::ecdsa::Signature;
use ring::digest::{digest, SHA256};
use rustls::client::ResolvesClientCert;
use rustls::crypto::CryptoProvider;
use rustls::sign::{CertifiedKey, Signer, SigningKey};
use rustls::{ClientConfig, RootCertStore, SignatureAlgorithm, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tracing::debug;

use crate::config::ConfigError;
use crate::crypto::SharedSession;

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn tls_error(context: &str, path: &Path) -> impl Fn(rustls_pki_types::pem::Error) -> ConfigError {
    let prefix = format!("{} {}", context, path.display());
    move |e| ConfigError::Tls(format!("{}: {}", prefix, e))
}

/// Loads every certificate of a PEM bundle.
fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    CertificateDer::pem_file_iter(path)
        .map_err(tls_error("unable to read", path))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(tls_error("invalid certificate in", path))
}

/// Builds the trust store from the CA bundle.
fn load_roots(ca_file: &Path) -> Result<RootCertStore, ConfigError> {
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(load_certificates(ca_file)?);
    debug!(added, ignored, "Loaded CA bundle");
    if added == 0 {
        return Err(ConfigError::Tls(format!(
            "no usable CA certificate in {}",
            ca_file.display()
        )));
    }
    Ok(roots)
}

fn builder(
    ca_file: &Path,
) -> Result<rustls::ConfigBuilder<ClientConfig, rustls::client::WantsClientCert>, ConfigError> {
    let roots = load_roots(ca_file)?;
    Ok(ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| ConfigError::Tls(e.to_string()))?
        .with_root_certificates(roots))
}

/// Client configuration authenticating with PEM files.
pub fn file_client_config(
    ca_file: &Path,
    client_cert: &Path,
    client_key: &Path,
) -> Result<ClientConfig, ConfigError> {
    let chain = load_certificates(client_cert)?;
    let key = PrivateKeyDer::from_pem_file(client_key).map_err(tls_error("unable to read", client_key))?;

    builder(ca_file)?
        .with_client_auth_cert(chain, key)
        .map_err(|e| ConfigError::Tls(e.to_string()))
}

/// Client configuration authenticating with a token-held key.
pub fn token_client_config(
    ca_file: &Path,
    session: SharedSession,
    certificate: Vec<u8>,
) -> Result<ClientConfig, ConfigError> {
    let key = Arc::new(TokenSigningKey { session });
    let certified = CertifiedKey::new(vec![CertificateDer::from(certificate)], key);
    let resolver = TokenCertResolver {
        certified: Arc::new(certified),
    };

    Ok(builder(ca_file)?.with_client_cert_resolver(Arc::new(resolver)))
}

/// Always presents the token certificate.
#[derive(Debug)]
struct TokenCertResolver {
    certified: Arc<CertifiedKey>,
}

impl ResolvesClientCert for TokenCertResolver {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.certified))
    }

    fn has_certs(&self) -> bool {
        true
    }
}

/// P-256 key inside the token.
pub(crate) struct TokenSigningKey {
    session: SharedSession,
}

impl fmt::Debug for TokenSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigningKey").finish_non_exhaustive()
    }
}

impl SigningKey for TokenSigningKey {
    fn choose_scheme(&self, offered: &[SignatureScheme]) -> Option<Box<dyn Signer>> {
        offered
            .contains(&SignatureScheme::ECDSA_NISTP256_SHA256)
            .then(|| {
                Box::new(TokenSigner {
                    session: Arc::clone(&self.session),
                }) as Box<dyn Signer>
            })
    }

    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::ECDSA
    }
}

struct TokenSigner {
    session: SharedSession,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl Signer for TokenSigner {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, rustls::Error> {
        let hash = digest(&SHA256, message);
        let guard = self
            .session
            .lock()
            .map_err(|_| rustls::Error::General("token session poisoned".into()))?;
        let session = guard
            .as_ref()
            .ok_or_else(|| rustls::Error::General("token session closed".into()))?;

        let raw = session
            .sign_digest(hash.as_ref())
            .map_err(|e| rustls::Error::General(e.to_string()))?;
        // Tokens return r || s; TLS wants DER
        let signature = Signature::from_slice(&raw)
            .map_err(|e| rustls::Error::General(format!("invalid token signature: {}", e)))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }

    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::ECDSA_NISTP256_SHA256
    }
}
