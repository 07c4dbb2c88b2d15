// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Software-held device key.

use p256::pkcs8::DecodePrivateKey;
use p256::{PublicKey, SecretKey};
use ring::rand::SystemRandom;

use super::ecies;
use super::{CryptoCapability, CryptoError};

/// P-256 device key held in process memory.
///
/// The secret scalar is zeroized when the key is closed or dropped.
#[derive(Clone)]
pub struct SoftwareKey {
    secret: Option<SecretKey>,
    public: PublicKey,
}

impl std::fmt::Debug for SoftwareKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Don't expose key bytes in debug output
        f.debug_struct("SoftwareKey")
            .field("secret", &"[REDACTED]")
            .field("closed", &self.secret.is_none())
            .finish()
    }
}

impl SoftwareKey {
    /// Parses a PEM encoded private key (PKCS#8 `PRIVATE KEY` or SEC1 `EC PRIVATE KEY`).
    pub fn from_pem(pem: &str) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_pkcs8_pem(pem)
            .or_else(|_| SecretKey::from_sec1_pem(pem))
            .map_err(|_| CryptoError::UnsupportedKey)?;
        Ok(Self::from_secret(secret))
    }

    /// Generates a fresh random key.
    pub fn generate() -> Result<Self, CryptoError> {
        let secret = ecies::random_secret_key(&SystemRandom::new())?;
        Ok(Self::from_secret(secret))
    }

    fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        SoftwareKey {
            secret: Some(secret),
            public,
        }
    }

    /// Returns the public half, the key values are sealed to.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Returns true once [`CryptoCapability::close`] ran.
    pub fn is_closed(&self) -> bool {
        self.secret.is_none()
    }
}

impl CryptoCapability for SoftwareKey {
    fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, CryptoError> {
        let secret = self.secret.as_ref().ok_or(CryptoError::Closed)?;
        ecies::open_with(ciphertext, |peer| ecies::agree(secret, peer))
    }

    fn close(&mut self) {
        self.secret = None;
    }
}
